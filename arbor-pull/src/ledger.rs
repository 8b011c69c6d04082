//! In-memory dedup ledgers for a single pull.
//!
//! The ledger is owned outright by the scanner thread; no other thread
//! reads or writes it. All sets grow monotonically for the life of a pull.
use std::collections::HashSet;

use arbor::{Digest, ObjectName};

#[derive(Debug, Default)]
pub struct Ledger {
    scanned: HashSet<ObjectName>,
    requested_meta: HashSet<Digest>,
    requested_content: HashSet<Digest>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a metadata object as fully scanned: every referent has been
    /// enqueued for fetch or confirmed present. Returns true iff newly
    /// inserted.
    pub fn mark_scanned(&mut self, name: ObjectName) -> bool {
        self.scanned.insert(name)
    }

    pub fn is_scanned(&self, name: &ObjectName) -> bool {
        self.scanned.contains(name)
    }

    /// Record that a fetch was enqueued for a metadata digest. Returns true
    /// iff newly inserted; a digest is only ever fetched on `true`.
    pub fn mark_requested_meta(&mut self, digest: Digest) -> bool {
        self.requested_meta.insert(digest)
    }

    pub fn is_requested_meta(&self, digest: &Digest) -> bool {
        self.requested_meta.contains(digest)
    }

    /// As [`Ledger::mark_requested_meta`], for content digests.
    pub fn mark_requested_content(&mut self, digest: Digest) -> bool {
        self.requested_content.insert(digest)
    }

    pub fn is_requested_content(&self, digest: &Digest) -> bool {
        self.requested_content.contains(digest)
    }
}
