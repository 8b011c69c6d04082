//! HTTP object fetcher.
//!
//! Object downloads run as jobs on the worker pool with their results
//! materialized into temp files; the small text resources of the ref
//! resolution phase (`config`, ref files, the summary) are fetched
//! synchronously on the caller's thread. Either way every transferred byte
//! lands in one shared counter for progress reporting.
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time;

use reqwest::blocking::Client;
use reqwest::Url;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::pool::Runner;

/// Default number of parallel object requests.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Per-request timeout. The pull itself has no deadline beyond cancellation.
pub const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} fetching {url}")]
    Status { status: u16, url: Url },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("request cancelled")]
    Cancelled,
}

/// Extend a base URL with a repository-relative path.
pub fn suburl(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        segments.extend(path.split('/'));
    }
    url
}

pub struct Fetcher {
    client: Client,
    runner: Runner,
    tmpdir: PathBuf,
    cancel: Arc<AtomicBool>,
    bytes: Arc<AtomicU64>,
    inflight: Arc<AtomicUsize>,
}

impl Fetcher {
    /// Create a fetcher downloading into `tmpdir`, running its requests on
    /// the given pool and aborting early once `cancel` is raised.
    pub fn new(runner: Runner, tmpdir: PathBuf, cancel: Arc<AtomicBool>) -> Result<Self, Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            runner,
            tmpdir,
            cancel,
            bytes: Arc::new(AtomicU64::new(0)),
            inflight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue an asynchronous GET of `url` into a temp file. `reply` runs on
    /// a worker thread when the transfer finishes, fails, or is skipped due
    /// to cancellation; the temp file unlinks on drop.
    pub fn request(&self, url: Url, reply: impl FnOnce(Result<NamedTempFile, Error>) + Send + 'static) {
        let client = self.client.clone();
        let tmpdir = self.tmpdir.clone();
        let cancel = self.cancel.clone();
        let bytes = self.bytes.clone();
        let inflight = self.inflight.clone();

        inflight.fetch_add(1, Ordering::Relaxed);
        self.runner.submit(move || {
            let result = if cancel.load(Ordering::Relaxed) {
                Err(Error::Cancelled)
            } else {
                fetch_to_temp(&client, url, &tmpdir, &bytes)
            };
            inflight.fetch_sub(1, Ordering::Relaxed);
            reply(result);
        });
    }

    /// Fetch a small resource synchronously, returning its raw bytes.
    pub fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, Error> {
        log::debug!(target: "fetch", "GET {url}");

        let mut response = self.client.get(url.clone()).send()?;
        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: url.clone(),
            });
        }
        let mut buf = Vec::new();
        let n = response.copy_to(&mut buf)?;
        self.bytes.fetch_add(n, Ordering::Relaxed);

        Ok(buf)
    }

    /// Total bytes transferred so far, over all requests.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// One-line description of the fetcher's state, for the progress line.
    pub fn state_text(&self) -> String {
        format!("{} requests in flight", self.inflight.load(Ordering::Relaxed))
    }
}

fn fetch_to_temp(
    client: &Client,
    url: Url,
    tmpdir: &std::path::Path,
    bytes: &AtomicU64,
) -> Result<NamedTempFile, Error> {
    log::debug!(target: "fetch", "GET {url}");

    let mut response = client.get(url.clone()).send()?;
    if !response.status().is_success() {
        return Err(Error::Status {
            status: response.status().as_u16(),
            url,
        });
    }
    let mut temp = NamedTempFile::new_in(tmpdir)?;
    let n = response.copy_to(temp.as_file_mut())?;
    bytes.fetch_add(n, Ordering::Relaxed);

    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suburl_handles_trailing_slash() {
        let with = Url::parse("http://example.com/repo/").unwrap();
        let without = Url::parse("http://example.com/repo").unwrap();

        assert_eq!(
            suburl(&with, "config").as_str(),
            "http://example.com/repo/config"
        );
        assert_eq!(
            suburl(&without, "config").as_str(),
            "http://example.com/repo/config"
        );
    }

    #[test]
    fn test_suburl_splits_path_segments() {
        let base = Url::parse("http://example.com/repo").unwrap();
        let url = suburl(&base, "refs/heads/main");

        assert_eq!(url.as_str(), "http://example.com/repo/refs/heads/main");
    }
}
