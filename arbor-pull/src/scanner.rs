//! The metadata scanner.
//!
//! A dedicated thread walks metadata objects already in the store,
//! discovering their referents: referents that are present are recursed
//! into, missing ones are recorded in the ledger exactly once and handed to
//! the dispatcher as fetch requests. The thread owns the ledger outright;
//! the only state it shares is the scanned-object counter read by the
//! progress printer.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel as chan;

use arbor::objects::{validate_filename, MAX_RECURSION};
use arbor::{ObjectName, ObjectType, Store};

use crate::ledger::Ledger;
use crate::pull::Event;
use crate::Error;

/// Messages accepted by the scanner thread.
pub enum ScanMessage {
    /// Scan a metadata object known to be in the store.
    Scan(ObjectName),
    /// Idle token from the dispatcher; echoed back when the queue drains.
    MainIdle(u64),
    /// Stop the thread.
    Quit,
}

pub struct Scanner {
    store: Store,
    follow_related: bool,
    messages: chan::Receiver<ScanMessage>,
    events: chan::Sender<Event>,
    ledger: Ledger,
    n_scanned: Arc<AtomicU32>,
}

impl Scanner {
    pub fn new(
        store: Store,
        follow_related: bool,
        messages: chan::Receiver<ScanMessage>,
        events: chan::Sender<Event>,
        n_scanned: Arc<AtomicU32>,
    ) -> Self {
        Self {
            store,
            follow_related,
            messages,
            events,
            ledger: Ledger::new(),
            n_scanned,
        }
    }

    /// Serve the scan queue until told to quit.
    ///
    /// Each wakeup drains the queue as one batch. Idle tokens observed
    /// during the drain are collapsed into the latest one, which is echoed
    /// to the dispatcher only after all scans in the batch have run, so any
    /// fetch requests those scans emitted are queued ahead of the echoed
    /// token. A `ScanIdle` marker follows every drain.
    pub fn run(mut self) {
        while let Ok(msg) = self.messages.recv() {
            let mut last_idle = None;
            let mut next = Some(msg);

            while let Some(msg) = next {
                match msg {
                    ScanMessage::Scan(name) => {
                        log::trace!(target: "scan", "scanning {name}");
                        if let Err(e) = self.scan_one(name, 0) {
                            self.events.send(Event::ScanFailed(e)).ok();
                            return;
                        }
                    }
                    ScanMessage::MainIdle(serial) => {
                        last_idle = Some(serial);
                    }
                    ScanMessage::Quit => {
                        log::debug!(target: "scan", "scanner shutting down..");
                        return;
                    }
                }
                next = match self.messages.try_recv() {
                    Ok(msg) => Some(msg),
                    Err(chan::TryRecvError::Empty) => None,
                    Err(chan::TryRecvError::Disconnected) => return,
                };
            }
            if let Some(serial) = last_idle {
                self.events.send(Event::MainIdle(serial)).ok();
            }
            // The queue is drained; let the dispatcher know.
            if self.events.send(Event::ScanIdle).is_err() {
                return;
            }
        }
    }

    /// Scan a single object name at the given tree depth.
    ///
    /// Present objects are recursed into by type and recorded as scanned;
    /// absent ones are marked requested (once) and emitted as a fetch
    /// request. Objects already scanned or already requested produce no
    /// work.
    fn scan_one(&mut self, name: ObjectName, depth: usize) -> Result<(), Error> {
        if self.ledger.is_scanned(&name) {
            return Ok(());
        }
        let is_requested = if name.kind.is_meta() {
            self.ledger.is_requested_meta(&name.digest)
        } else {
            self.ledger.is_requested_content(&name.digest)
        };
        let is_stored = self.store.has_object(&name);

        if !is_stored && !is_requested {
            if name.kind.is_meta() {
                self.ledger.mark_requested_meta(name.digest);
            } else {
                self.ledger.mark_requested_content(name.digest);
            }
            self.events.send(Event::Fetch(name)).ok();
        } else if is_stored {
            match name.kind {
                ObjectType::Commit => self.scan_commit(name, depth)?,
                ObjectType::DirTree => self.scan_dirtree(name, depth)?,
                ObjectType::DirMeta => {}
                ObjectType::File => {
                    return Err(Error::Internal(format!(
                        "asked to scan content object {name}"
                    )));
                }
            }
            self.ledger.mark_scanned(name);
            self.n_scanned.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Recurse into a commit's root tree and root meta, and optionally the
    /// commits on its `related` list.
    fn scan_commit(&mut self, name: ObjectName, depth: usize) -> Result<(), Error> {
        if depth > MAX_RECURSION {
            return Err(Error::Corrupt("exceeded maximum recursion".to_owned()));
        }
        let commit = self
            .store
            .load_commit(name.digest)
            .map_err(|e| Error::Corrupt(e.to_string()))?;

        self.scan_one(ObjectName::new(commit.root_tree, ObjectType::DirTree), depth + 1)?;
        self.scan_one(ObjectName::new(commit.root_meta, ObjectType::DirMeta), depth + 1)?;

        if self.follow_related {
            for (ref_name, digest) in &commit.related {
                log::debug!(target: "scan", "following related commit {ref_name}");
                self.scan_one(ObjectName::new(*digest, ObjectType::Commit), depth + 1)?;
            }
        }
        Ok(())
    }

    /// Walk a directory tree: request missing file contents, recurse into
    /// sub-trees and their metadata.
    fn scan_dirtree(&mut self, name: ObjectName, depth: usize) -> Result<(), Error> {
        if depth > MAX_RECURSION {
            return Err(Error::Corrupt("exceeded maximum recursion".to_owned()));
        }
        let tree = self
            .store
            .load_dirtree(name.digest)
            .map_err(|e| Error::Corrupt(e.to_string()))?;

        for entry in &tree.files {
            validate_filename(&entry.name).map_err(|e| Error::Corrupt(e.to_string()))?;

            let file = ObjectName::new(entry.content, ObjectType::File);
            if !self.store.has_object(&file) && self.ledger.mark_requested_content(entry.content) {
                self.events.send(Event::Fetch(file)).ok();
            }
        }
        for entry in &tree.dirs {
            validate_filename(&entry.name).map_err(|e| Error::Corrupt(e.to_string()))?;

            self.scan_one(ObjectName::new(entry.tree, ObjectType::DirTree), depth + 1)?;
            self.scan_one(ObjectName::new(entry.meta, ObjectType::DirMeta), depth + 1)?;
        }
        Ok(())
    }
}
