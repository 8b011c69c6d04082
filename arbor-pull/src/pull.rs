//! The pull coordinator and fetch dispatcher.
//!
//! `pull` resolves what commits a remote should deliver, then drives two
//! cooperating single-threaded schedulers until the transitive closure of
//! those commits is local: the scanner thread walks metadata discovering
//! referents, while this thread dispatches fetches, stages results, and
//! decides when both sides are quiescent.
//!
//! Quiescence cannot be read off the counters alone: a scan still running
//! may be about to emit fetch requests that have not reached this thread
//! yet. The two sides therefore round-trip a serial-numbered idle token.
//! The dispatcher posts `MainIdle(serial)` into the scan queue; the scanner
//! echoes the token back only once its queue is drained, with every fetch
//! request it produced ordered ahead of the echo. An echo carrying the
//! current serial latches `scan_is_idle`. Completed metadata stages clear
//! the latch (their scans may discover more work), and the scanner's
//! `ScanIdle` markers prompt the dispatcher to issue a fresh token with a
//! bumped serial, which invalidates any stale echo still in flight. The
//! pull is done when the latch is set and nothing is being fetched or
//! staged.
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time;

use crossbeam_channel as chan;
use reqwest::Url;
use tempfile::NamedTempFile;

use arbor::storage::MODE_ARCHIVE_Z2;
use arbor::{config::KeyFile, Digest, ObjectName, ObjectType, Store};

use crate::fetcher;
use crate::fetcher::{suburl, Fetcher};
use crate::pool::{Pool, Runner};
use crate::scanner::{ScanMessage, Scanner};
use crate::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Also pull the commits on each commit's `related` list.
    pub follow_related: bool,
    /// Render a progress line while pulling.
    pub verbose: bool,
}

/// Outcome of a successful pull.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub requested_metadata: u32,
    pub fetched_metadata: u32,
    pub requested_content: u32,
    pub fetched_content: u32,
    pub scanned_metadata: u32,
    pub bytes_transferred: u64,
    pub elapsed: time::Duration,
    /// Remote refs advanced by this pull, with their new targets.
    pub updated_refs: Vec<(String, Digest)>,
}

/// Events handled by the dispatcher. Fetch requests and idle markers come
/// from the scanner thread; completions come from the worker pool.
pub(crate) enum Event {
    /// The scanner wants an object we don't have.
    Fetch(ObjectName),
    /// The scanner drained its queue.
    ScanIdle,
    /// The scanner echoed an idle token back.
    MainIdle(u64),
    /// A scan failed; the pull is over.
    ScanFailed(Error),
    MetaFetched {
        name: ObjectName,
        result: Result<NamedTempFile, fetcher::Error>,
    },
    ContentFetched {
        name: ObjectName,
        result: Result<NamedTempFile, fetcher::Error>,
    },
    MetaStaged {
        name: ObjectName,
        result: Result<Digest, Error>,
    },
    ContentStaged {
        name: ObjectName,
        result: Result<Digest, Error>,
    },
}

/// Byte-rate smoothing for the progress line: an exponential moving
/// average, alpha 0.5, over one-second buckets.
#[derive(Default)]
struct Throughput {
    have_previous: bool,
    previous_bytes_sec: u64,
    previous_total: u64,
}

impl Throughput {
    fn update(&mut self, total: u64) -> u64 {
        let delta = total.saturating_sub(self.previous_total);
        let smoothed = if self.have_previous {
            delta / 2 + self.previous_bytes_sec / 2
        } else {
            self.have_previous = true;
            delta
        };
        self.previous_bytes_sec = smoothed;
        self.previous_total = total;

        smoothed
    }
}

struct Dispatcher<'a> {
    store: &'a Store,
    fetcher: &'a Fetcher,
    runner: Runner,
    base: Url,
    scan_tx: chan::Sender<ScanMessage>,
    events_tx: chan::Sender<Event>,
    cancel: Arc<AtomicBool>,
    n_scanned: Arc<AtomicU32>,
    verbose: bool,

    idle_serial: u64,
    scan_is_idle: bool,
    n_outstanding_meta_fetches: u32,
    n_outstanding_content_fetches: u32,
    n_outstanding_meta_stages: u32,
    n_outstanding_content_stages: u32,
    n_requested_meta: u32,
    n_requested_content: u32,
    n_fetched_meta: u32,
    n_fetched_content: u32,

    error: Option<Error>,
    throughput: Throughput,
}

impl<'a> Dispatcher<'a> {
    fn outstanding(&self) -> u32 {
        self.n_outstanding_meta_fetches
            + self.n_outstanding_content_fetches
            + self.n_outstanding_meta_stages
            + self.n_outstanding_content_stages
    }

    /// Record the first error and cancel everything in flight; later errors
    /// are logged and dropped.
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.cancel.store(true, Ordering::Relaxed);
            self.error = Some(error);
        } else if !matches!(error, Error::Cancelled) {
            log::warn!(target: "pull", "dropping subsequent error: {error}");
        }
    }

    /// Drive the event loop until quiescence or the first error.
    fn run(&mut self, events: &chan::Receiver<Event>) -> Result<(), Error> {
        let ticker = chan::tick(time::Duration::from_secs(1));
        loop {
            chan::select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => return Err(Error::Internal("event channel closed".to_owned())),
                },
                recv(ticker) -> _ => self.report_progress(),
            }
            if let Some(error) = self.error.take() {
                return Err(error);
            }
            if self.scan_is_idle && self.outstanding() == 0 {
                log::debug!(target: "pull", "scan is idle and nothing is outstanding; done");
                return Ok(());
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Fetch(name) => self.dispatch_fetch(name),
            Event::MainIdle(serial) => {
                if serial == self.idle_serial {
                    debug_assert!(!self.scan_is_idle);
                    log::debug!(target: "pull", "metadata scan is idle");
                    self.scan_is_idle = true;
                } else {
                    log::trace!(target: "pull", "discarding stale idle token {serial}");
                }
            }
            Event::ScanIdle => {
                if !self.scan_is_idle {
                    self.idle_serial += 1;
                    self.scan_tx
                        .send(ScanMessage::MainIdle(self.idle_serial))
                        .ok();
                }
            }
            Event::ScanFailed(error) => self.fail(error),
            Event::MetaFetched { name, result } => {
                self.n_outstanding_meta_fetches -= 1;
                self.n_fetched_meta += 1;
                match result {
                    Err(e) => self.fail(e.into()),
                    Ok(temp) => {
                        log::debug!(target: "pull", "fetch of {name} complete");
                        self.stage_metadata(name, temp);
                    }
                }
            }
            Event::MetaStaged { name, result } => {
                self.n_outstanding_meta_stages -= 1;
                match result {
                    Err(e) => self.fail(e),
                    Ok(computed) if computed != name.digest => {
                        self.fail(Error::Checksum { name, computed });
                    }
                    Ok(_) => {
                        log::debug!(target: "pull", "stage of {name} complete");
                        // The staged object may reference more work; the
                        // latched idle no longer holds.
                        self.scan_is_idle = false;
                        self.scan_tx.send(ScanMessage::Scan(name)).ok();
                    }
                }
            }
            Event::ContentFetched { name, result } => {
                self.n_outstanding_content_fetches -= 1;
                match result {
                    Err(e) => self.fail(e.into()),
                    Ok(temp) => {
                        log::debug!(target: "pull", "fetch of {name} complete");
                        self.stage_content(name, temp);
                    }
                }
            }
            Event::ContentStaged { name, result } => {
                self.n_outstanding_content_stages -= 1;
                match result {
                    Err(e) => self.fail(e),
                    Ok(computed) if computed != name.digest => {
                        self.fail(Error::Checksum { name, computed });
                    }
                    Ok(_) => {
                        log::debug!(target: "pull", "stage of {name} complete");
                        self.n_fetched_content += 1;
                    }
                }
            }
        }
    }

    fn dispatch_fetch(&mut self, name: ObjectName) {
        let url = suburl(&self.base, &name.relative_path());
        let is_meta = name.kind.is_meta();

        if is_meta {
            self.n_outstanding_meta_fetches += 1;
            self.n_requested_meta += 1;
        } else {
            self.n_outstanding_content_fetches += 1;
            self.n_requested_content += 1;
        }
        let events = self.events_tx.clone();
        self.fetcher.request(url, move |result| {
            let event = if is_meta {
                Event::MetaFetched { name, result }
            } else {
                Event::ContentFetched { name, result }
            };
            events.send(event).ok();
        });
    }

    /// Hand a fetched metadata temp file to the pool for parsing and
    /// staging. The temp file is owned by the job and unlinks when the job
    /// finishes, on every path.
    fn stage_metadata(&mut self, name: ObjectName, temp: NamedTempFile) {
        self.n_outstanding_meta_stages += 1;

        let store = self.store.clone();
        let cancel = self.cancel.clone();
        let events = self.events_tx.clone();
        self.runner.submit(move || {
            let result = if cancel.load(Ordering::Relaxed) {
                Err(Error::Cancelled)
            } else {
                store
                    .stage_metadata(name.kind, temp.path())
                    .map_err(Error::from)
            };
            drop(temp);
            events.send(Event::MetaStaged { name, result }).ok();
        });
    }

    fn stage_content(&mut self, name: ObjectName, temp: NamedTempFile) {
        self.n_outstanding_content_stages += 1;

        let store = self.store.clone();
        let cancel = self.cancel.clone();
        let events = self.events_tx.clone();
        self.runner.submit(move || {
            let result = if cancel.load(Ordering::Relaxed) {
                Err(Error::Cancelled)
            } else {
                store.stage_content(temp.path()).map_err(Error::from)
            };
            drop(temp);
            events.send(Event::ContentStaged { name, result }).ok();
        });
    }

    /// Render the 1 Hz status line.
    fn report_progress(&mut self) {
        let mut status = String::new();

        if !self.scan_is_idle {
            status.push_str(&format!(
                "scan: {} metadata; ",
                self.n_scanned.load(Ordering::Relaxed)
            ));
        }
        let stages = self.n_outstanding_meta_stages + self.n_outstanding_content_stages;
        if stages > 0 {
            status.push_str(&format!("writing: {stages} objects; "));
        }
        let fetches = self.n_outstanding_meta_fetches + self.n_outstanding_content_fetches;
        if fetches > 0 {
            status.push_str(&format!(
                "fetch: {}/{} metadata {}/{} content; ",
                self.n_fetched_meta,
                self.n_requested_meta,
                self.n_fetched_content,
                self.n_requested_content
            ));
            let rate = self.throughput.update(self.fetcher.bytes_transferred());
            if rate < 1024 {
                status.push_str(&format!("{rate} B/s; "));
            } else {
                status.push_str(&format!("{:.1} KiB/s; ", rate as f64 / 1024.0));
            }
            status.push_str(&self.fetcher.state_text());
        }
        log::debug!(target: "pull", "{status}");
        if self.verbose {
            eprint!("\r{status}");
        }
    }
}

fn fetch_text(fetcher: &Fetcher, url: Url, what: &'static str) -> Result<String, Error> {
    let bytes = fetcher.fetch_bytes(&url)?;
    String::from_utf8(bytes).map_err(|_| Error::NotUtf8(what))
}

/// Fetch and parse the remote's published keyfile config.
fn fetch_remote_config(fetcher: &Fetcher, base: &Url) -> Result<KeyFile, Error> {
    let text = fetch_text(fetcher, suburl(base, "config"), "remote config")?;
    KeyFile::parse(&text).map_err(|e| Error::Corrupt(format!("remote config: {e}")))
}

/// Resolve a branch to its commit digest via `refs/heads/<branch>`.
fn fetch_ref(fetcher: &Fetcher, base: &Url, branch: &str) -> Result<Digest, Error> {
    let url = suburl(base, &format!("refs/heads/{branch}"));
    let text = fetch_text(fetcher, url, "ref")?;

    Digest::from_str(text.trim())
        .map_err(|e| Error::Corrupt(format!("ref {branch:?} is not a valid digest: {e}")))
}

/// Parse the `refs/summary` resource: one `<digest> <ref>` pair per line.
fn parse_ref_summary(contents: &str) -> Result<Vec<(String, Digest)>, Error> {
    let mut refs = Vec::new();

    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        let (digest, name) = line
            .split_once(' ')
            .ok_or_else(|| Error::Corrupt("invalid ref summary; missing ' ' in line".to_owned()))?;
        if name.is_empty() {
            return Err(Error::Corrupt("invalid ref summary; empty ref name".to_owned()));
        }
        let digest = Digest::from_str(digest)
            .map_err(|e| Error::Corrupt(format!("invalid digest in ref summary: {e}")))?;
        refs.push((name.to_owned(), digest));
    }
    Ok(refs)
}

/// Pull refs or commits from `remote` into the local store.
///
/// Each token in `tokens` is either a full hex commit digest or a branch
/// name. With no tokens, the remote's configured `branches` list is used,
/// falling back to the published ref summary. Refs already at their remote
/// digest produce no work; everything else is completed to its full object
/// closure before any ref is advanced.
pub fn pull(store: &Store, remote: &str, tokens: &[String], opts: Options) -> Result<Stats, Error> {
    let start = time::Instant::now();

    let base = store
        .remote_url(remote)?
        .ok_or_else(|| Error::MissingRemote(remote.to_owned()))?;
    let base = Url::parse(&base).map_err(|_| Error::InvalidUrl(base.clone()))?;

    let pool = Pool::with(fetcher::DEFAULT_CONCURRENCY, "fetch")?;
    let cancel = Arc::new(AtomicBool::new(false));
    let fetcher = Fetcher::new(pool.runner(), store.tmpdir(), cancel.clone())?;

    // Only archive-z2 remotes can be pulled from.
    let remote_config = fetch_remote_config(&fetcher, &base)?;
    let mode = remote_config.get("core", None, "mode").unwrap_or("bare");
    if mode != MODE_ARCHIVE_Z2 {
        return Err(Error::Unsupported(mode.to_owned()));
    }

    // Resolve the argument list to commits and refs.
    let mut commits_to_fetch: Vec<Digest> = Vec::new();
    let mut requested_refs: Vec<(String, Digest)> = Vec::new();

    if !tokens.is_empty() {
        for token in tokens {
            if let Ok(digest) = Digest::from_str(token) {
                commits_to_fetch.push(digest);
            } else {
                let digest = fetch_ref(&fetcher, &base, token)?;
                requested_refs.push((token.clone(), digest));
            }
        }
    } else if let Some(branches) = store.remote_branches(remote)? {
        if branches.is_empty() {
            log::info!(target: "pull", "no configured branches for remote {remote}");
        }
        for branch in branches {
            let digest = fetch_ref(&fetcher, &base, &branch)?;
            requested_refs.push((branch, digest));
        }
    } else {
        let summary = fetch_text(&fetcher, suburl(&base, "refs/summary"), "ref summary")?;
        requested_refs = parse_ref_summary(&summary)?;
    }

    // Work out the seed set before anything concurrent starts. Unchanged
    // refs are skipped entirely.
    let mut seeds: Vec<ObjectName> = commits_to_fetch
        .iter()
        .map(|digest| ObjectName::new(*digest, ObjectType::Commit))
        .collect();
    let mut updated_refs: Vec<(String, Digest)> = Vec::new();

    for (name, digest) in requested_refs {
        match store.resolve_ref(Some(remote), &name)? {
            Some(current) if current == digest => {
                log::info!(target: "pull", "no changes in {remote}/{name}");
            }
            _ => {
                seeds.push(ObjectName::new(digest, ObjectType::Commit));
                updated_refs.push((name, digest));
            }
        }
    }

    let txn = store.prepare_transaction()?;

    let (scan_tx, scan_rx) = chan::unbounded();
    let (events_tx, events_rx) = chan::unbounded();
    let n_scanned = Arc::new(AtomicU32::new(0));

    let scanner = Scanner::new(
        store.clone(),
        opts.follow_related,
        scan_rx,
        events_tx.clone(),
        n_scanned.clone(),
    );
    let scanner = thread::Builder::new()
        .name("scan".to_owned())
        .spawn(move || scanner.run())?;

    for seed in &seeds {
        scan_tx.send(ScanMessage::Scan(*seed)).ok();
    }

    let mut dispatcher = Dispatcher {
        store,
        fetcher: &fetcher,
        runner: pool.runner(),
        base,
        scan_tx: scan_tx.clone(),
        events_tx,
        cancel,
        n_scanned: n_scanned.clone(),
        verbose: opts.verbose,
        idle_serial: 1,
        scan_is_idle: false,
        n_outstanding_meta_fetches: 0,
        n_outstanding_content_fetches: 0,
        n_outstanding_meta_stages: 0,
        n_outstanding_content_stages: 0,
        n_requested_meta: 0,
        n_requested_content: 0,
        n_fetched_meta: 0,
        n_fetched_content: 0,
        error: None,
        throughput: Throughput::default(),
    };
    // Prime the idle token.
    scan_tx.send(ScanMessage::MainIdle(dispatcher.idle_serial)).ok();

    let outcome = dispatcher.run(&events_rx);

    if opts.verbose {
        eprintln!();
    }
    let stats = Stats {
        requested_metadata: dispatcher.n_requested_meta,
        fetched_metadata: dispatcher.n_fetched_meta,
        requested_content: dispatcher.n_requested_content,
        fetched_content: dispatcher.n_fetched_content,
        scanned_metadata: n_scanned.load(Ordering::Relaxed),
        bytes_transferred: fetcher.bytes_transferred(),
        elapsed: start.elapsed(),
        updated_refs: Vec::new(),
    };

    // Shut both schedulers down before touching refs: ask the scanner to
    // quit and join it, then drain the worker pool.
    scan_tx.send(ScanMessage::Quit).ok();
    drop(scan_tx);
    drop(dispatcher);
    drop(events_rx);
    if scanner.join().is_err() {
        log::error!(target: "pull", "scanner thread panicked");
    }
    drop(fetcher);
    pool.run();

    match outcome {
        Err(e) => {
            // Abort: the transaction lock is released on drop, refs stay
            // untouched. Already-staged objects are kept; the next pull
            // finds them by digest.
            drop(txn);
            Err(e)
        }
        Ok(()) => {
            txn.commit()?;

            let mut stats = stats;
            for (name, digest) in &updated_refs {
                store.write_ref(Some(remote), name, *digest)?;
                log::info!(target: "pull", "remote {remote}/{name} is now {digest}");
            }
            stats.updated_refs = updated_refs;

            log::info!(
                target: "pull",
                "{} metadata, {} content objects fetched; {} bytes transferred in {}s",
                stats.fetched_metadata,
                stats.fetched_content,
                stats.bytes_transferred,
                stats.elapsed.as_secs(),
            );
            Ok(stats)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Digest {
        Digest::from_bytes([byte; 32])
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Store,
        pool: Pool,
        fetcher: Fetcher,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Store::init(dir.path()).unwrap();
            let pool = Pool::with(1, "test").unwrap();
            let cancel = Arc::new(AtomicBool::new(false));
            let fetcher = Fetcher::new(pool.runner(), store.tmpdir(), cancel).unwrap();

            Self {
                _dir: dir,
                store,
                pool,
                fetcher,
            }
        }

        fn dispatcher(
            &self,
            scan_tx: chan::Sender<ScanMessage>,
            events_tx: chan::Sender<Event>,
        ) -> Dispatcher<'_> {
            Dispatcher {
                store: &self.store,
                fetcher: &self.fetcher,
                runner: self.pool.runner(),
                base: Url::parse("http://localhost:1/repo").unwrap(),
                scan_tx,
                events_tx,
                cancel: Arc::new(AtomicBool::new(false)),
                n_scanned: Arc::new(AtomicU32::new(0)),
                verbose: false,
                idle_serial: 1,
                scan_is_idle: false,
                n_outstanding_meta_fetches: 0,
                n_outstanding_content_fetches: 0,
                n_outstanding_meta_stages: 0,
                n_outstanding_content_stages: 0,
                n_requested_meta: 0,
                n_requested_content: 0,
                n_fetched_meta: 0,
                n_fetched_content: 0,
                error: None,
                throughput: Throughput::default(),
            }
        }
    }

    #[test]
    fn test_idle_token_latches_on_current_serial() {
        let fixture = Fixture::new();
        let (scan_tx, _scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);

        dispatcher.handle(Event::MainIdle(1));
        assert!(dispatcher.scan_is_idle);
    }

    #[test]
    fn test_stale_idle_token_is_discarded() {
        let fixture = Fixture::new();
        let (scan_tx, _scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);
        dispatcher.idle_serial = 2;

        dispatcher.handle(Event::MainIdle(1));
        assert!(!dispatcher.scan_is_idle);
    }

    #[test]
    fn test_scan_idle_bumps_serial_and_reissues_token() {
        let fixture = Fixture::new();
        let (scan_tx, scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);

        dispatcher.handle(Event::ScanIdle);
        assert_eq!(dispatcher.idle_serial, 2);
        assert!(matches!(scan_rx.try_recv(), Ok(ScanMessage::MainIdle(2))));

        // Once idle is latched, further drain markers are ignored.
        dispatcher.handle(Event::MainIdle(2));
        assert!(dispatcher.scan_is_idle);
        dispatcher.handle(Event::ScanIdle);
        assert_eq!(dispatcher.idle_serial, 2);
        assert!(scan_rx.try_recv().is_err());
    }

    #[test]
    fn test_meta_stage_clears_idle_and_requeues_scan() {
        let fixture = Fixture::new();
        let (scan_tx, scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);
        dispatcher.scan_is_idle = true;
        dispatcher.n_outstanding_meta_stages = 1;

        let name = ObjectName::new(digest(1), ObjectType::Commit);
        dispatcher.handle(Event::MetaStaged {
            name,
            result: Ok(digest(1)),
        });

        assert!(!dispatcher.scan_is_idle);
        assert_eq!(dispatcher.n_outstanding_meta_stages, 0);
        assert!(matches!(scan_rx.try_recv(), Ok(ScanMessage::Scan(n)) if n == name));
    }

    #[test]
    fn test_checksum_mismatch_fails_pull() {
        let fixture = Fixture::new();
        let (scan_tx, _scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);
        dispatcher.n_outstanding_content_stages = 1;

        let name = ObjectName::new(digest(1), ObjectType::File);
        dispatcher.handle(Event::ContentStaged {
            name,
            result: Ok(digest(2)),
        });

        assert!(matches!(dispatcher.error, Some(Error::Checksum { .. })));
        assert_eq!(dispatcher.n_fetched_content, 0);
    }

    #[test]
    fn test_first_error_wins() {
        let fixture = Fixture::new();
        let (scan_tx, _scan_rx) = chan::unbounded();
        let (events_tx, _events_rx) = chan::unbounded();
        let mut dispatcher = fixture.dispatcher(scan_tx, events_tx);

        dispatcher.fail(Error::Corrupt("first".to_owned()));
        dispatcher.fail(Error::Corrupt("second".to_owned()));

        assert!(matches!(dispatcher.error, Some(Error::Corrupt(ref s)) if s == "first"));
        assert!(dispatcher.cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn test_parse_ref_summary() {
        let d = digest(0xab).to_hex();
        let summary = format!("{d} main\n\n{d} next\n");
        let refs = parse_ref_summary(&summary).unwrap();

        assert_eq!(
            refs,
            vec![
                ("main".to_owned(), digest(0xab)),
                ("next".to_owned(), digest(0xab)),
            ]
        );

        // An empty summary is fine: nothing to pull.
        assert!(parse_ref_summary("").unwrap().is_empty());

        // A line without a separator is corrupt.
        assert!(matches!(
            parse_ref_summary("deadbeef"),
            Err(Error::Corrupt(_))
        ));
        // So is a bad digest.
        assert!(matches!(
            parse_ref_summary("nothex main"),
            Err(Error::Corrupt(_))
        ));
    }
}
