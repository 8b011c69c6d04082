//! The pull engine: download a set of refs from a remote repository into a
//! local [`arbor::Store`], importing only objects the store does not
//! already have.
//!
//! The interesting part is the concurrent pipeline behind [`pull`]: a
//! scanner thread discovering the transitive closure of the requested
//! commits, and a dispatcher feeding missing objects through a bounded pool
//! of HTTP workers, with a round-tripped idle token deciding when both
//! sides are done. See the `pull` module for the protocol.
pub mod fetcher;

mod ledger;
mod pool;
mod pull;
mod scanner;

use std::io;

use thiserror::Error;

use arbor::{Digest, ObjectName};

pub use fetcher::DEFAULT_CONCURRENCY;
pub use pull::{pull, Options, Stats};

#[derive(Debug, Error)]
pub enum Error {
    #[error("network request failed: {0}")]
    Network(fetcher::Error),
    #[error("fetched {0} is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("corrupt remote data: {0}")]
    Corrupt(String),
    #[error("object {name}: fetched data hashes to {computed}")]
    Checksum { name: ObjectName, computed: Digest },
    #[error("cannot pull from a remote in {0:?} mode")]
    Unsupported(String),
    #[error("remote {0:?} has no configured url")]
    MissingRemote(String),
    #[error("failed to parse url {0:?}")]
    InvalidUrl(String),
    #[error("pull was cancelled")]
    Cancelled,
    #[error("invariant violated: {0}")]
    Internal(String),
    #[error(transparent)]
    Storage(#[from] arbor::storage::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<fetcher::Error> for Error {
    fn from(err: fetcher::Error) -> Self {
        match err {
            fetcher::Error::Cancelled => Error::Cancelled,
            err => Error::Network(err),
        }
    }
}
