//! The on-disk repository store.
//!
//! Layout, relative to the repository root:
//!
//! ```text
//! config                      keyfile; `[core] mode=archive-z2`
//! objects/<aa>/<rest>.<ext>   zlib-compressed object files
//! refs/heads/<name>           local branch heads
//! refs/remotes/<remote>/<name> last-pulled remote heads
//! tmp/                        staging scratch space
//! ```
//!
//! Objects are immutable and addressed by the SHA-256 of their canonical
//! uncompressed bytes; writes go through a temp file in `tmp/` and are
//! renamed into place, so a crash never leaves a partial object visible.
use std::fs;
use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest as _, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::KeyFile;
use crate::objects::{Digest, DigestError, ObjectName, ObjectType};
use crate::wire;
use crate::wire::{Commit, Decode, DirMeta, DirTree, Encode, FileHeader};

/// The one repository mode this store reads and writes.
pub const MODE_ARCHIVE_Z2: &str = "archive-z2";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("repository config: {0}")]
    Config(#[from] crate::config::Error),
    #[error("object {name} not found")]
    NotFound { name: ObjectName },
    #[error("object {name} is corrupt: {err}")]
    CorruptObject { name: ObjectName, err: wire::Error },
    #[error("fetched {kind} payload is corrupt: {err}")]
    CorruptPayload { kind: ObjectType, err: wire::Error },
    #[error("content body is {actual} bytes, header claims {expected}")]
    ContentSize { expected: u64, actual: u64 },
    #[error("ref {name:?} holds an invalid digest: {err}")]
    CorruptRef { name: String, err: DigestError },
    #[error("unsupported repository mode {0:?}")]
    UnsupportedMode(String),
    #[error("another transaction is in progress")]
    TransactionInProgress,
    #[error("not a repository: {0:?} has no config")]
    NotARepository(PathBuf),
}

/// Handle to a repository on disk. Cheap to clone; all operations are
/// reads or atomic renames, so clones may be used from multiple threads.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a new repository at `root`.
    pub fn init(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        fs::create_dir_all(root.join("refs").join("heads"))?;
        fs::create_dir_all(root.join("refs").join("remotes"))?;

        let mut config = KeyFile::new();
        config.set("core", None, "repo_version", "1");
        config.set("core", None, "mode", MODE_ARCHIVE_Z2);
        fs::write(root.join("config"), config.to_string())?;

        log::debug!(target: "storage", "initialized repository at {:?}", root);

        Ok(Self { root })
    }

    /// Open an existing repository, verifying its mode.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        if !root.join("config").is_file() {
            return Err(Error::NotARepository(root));
        }
        let store = Self { root };
        let config = store.config()?;
        match config.get("core", None, "mode") {
            Some(MODE_ARCHIVE_Z2) => Ok(store),
            Some(other) => Err(Error::UnsupportedMode(other.to_owned())),
            None => Err(Error::UnsupportedMode(String::from("<unset>"))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for staging scratch files; same filesystem as the object
    /// directory so renames into place are atomic.
    pub fn tmpdir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Parse the repository's config keyfile.
    pub fn config(&self) -> Result<KeyFile, Error> {
        let text = fs::read_to_string(self.root.join("config"))?;
        Ok(KeyFile::parse(&text)?)
    }

    /// The parent repository, if `core.parent` is set.
    pub fn parent(&self) -> Result<Option<Store>, Error> {
        match self.config()?.get("core", None, "parent") {
            None => Ok(None),
            Some(path) => Ok(Some(Store::open(path)?)),
        }
    }

    /// Look up `remote.<name>.url`, consulting parent repositories when the
    /// key is absent locally.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>, Error> {
        if let Some(url) = self.config()?.get("remote", Some(remote), "url") {
            return Ok(Some(url.to_owned()));
        }
        match self.parent()? {
            Some(parent) => parent.remote_url(remote),
            None => Ok(None),
        }
    }

    /// The configured `branches` list for a remote, if any. Not inherited.
    pub fn remote_branches(&self, remote: &str) -> Result<Option<Vec<String>>, Error> {
        Ok(self.config()?.get_list("remote", Some(remote), "branches"))
    }

    fn object_path(&self, name: &ObjectName) -> PathBuf {
        self.root.join(name.relative_path())
    }

    pub fn has_object(&self, name: &ObjectName) -> bool {
        self.object_path(name).is_file()
    }

    /// Read and decompress an object's canonical bytes.
    fn read_object(&self, name: &ObjectName) -> Result<Vec<u8>, Error> {
        let file = fs::File::open(self.object_path(name)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NotFound { name: *name }
            } else {
                Error::Io(e)
            }
        })?;
        let mut bytes = Vec::new();
        ZlibDecoder::new(file).read_to_end(&mut bytes)?;

        Ok(bytes)
    }

    fn load<T: Decode>(&self, name: ObjectName) -> Result<T, Error> {
        let bytes = self.read_object(&name)?;
        T::decode_all(&bytes).map_err(|err| Error::CorruptObject { name, err })
    }

    pub fn load_commit(&self, digest: Digest) -> Result<Commit, Error> {
        self.load(ObjectName::new(digest, ObjectType::Commit))
    }

    pub fn load_dirtree(&self, digest: Digest) -> Result<DirTree, Error> {
        self.load(ObjectName::new(digest, ObjectType::DirTree))
    }

    pub fn load_dirmeta(&self, digest: Digest) -> Result<DirMeta, Error> {
        self.load(ObjectName::new(digest, ObjectType::DirMeta))
    }

    /// Write canonical bytes as a compressed object file under their
    /// computed digest, via a temp file and an atomic rename.
    fn write_object(&self, kind: ObjectType, bytes: &[u8]) -> Result<Digest, Error> {
        let digest = Digest::from_bytes(Sha256::digest(bytes).into());
        let name = ObjectName::new(digest, kind);
        let path = self.object_path(&name);

        if path.is_file() {
            return Ok(digest);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let temp = NamedTempFile::new_in(self.tmpdir())?;
        let mut encoder = ZlibEncoder::new(temp, Compression::default());
        encoder.write_all(bytes)?;
        let temp = encoder.finish()?;
        temp.persist(&path).map_err(|e| e.error)?;

        log::debug!(target: "storage", "wrote object {name}");

        Ok(digest)
    }

    /// Encode and store a metadata payload, returning its digest.
    pub fn write_metadata(&self, kind: ObjectType, payload: &impl Encode) -> Result<Digest, Error> {
        debug_assert!(kind.is_meta());
        self.write_object(kind, &payload.encoded())
    }

    /// Store a content object from its header and body, returning its digest.
    pub fn write_content(&self, header: &FileHeader, body: &[u8]) -> Result<Digest, Error> {
        debug_assert_eq!(header.size, body.len() as u64);
        let mut bytes = header.encoded();
        bytes.extend_from_slice(body);
        self.write_object(ObjectType::File, &bytes)
    }

    /// Stage a fetched metadata object: decompress the temp file, check that
    /// it parses as `kind`, and store it under its computed digest. The
    /// caller compares the returned digest against the one it requested.
    pub fn stage_metadata(&self, kind: ObjectType, payload: &Path) -> Result<Digest, Error> {
        let corrupt = |err| Error::CorruptPayload { kind, err };
        let file = fs::File::open(payload)?;
        let mut bytes = Vec::new();
        ZlibDecoder::new(file).read_to_end(&mut bytes)?;

        match kind {
            ObjectType::Commit => {
                Commit::decode_all(&bytes).map_err(corrupt)?;
            }
            ObjectType::DirTree => {
                DirTree::decode_all(&bytes).map_err(corrupt)?;
            }
            ObjectType::DirMeta => {
                DirMeta::decode_all(&bytes).map_err(corrupt)?;
            }
            ObjectType::File => unreachable!("content is staged via stage_content"),
        }
        self.write_object(kind, &bytes)
    }

    /// Stage a fetched content object: decompress, validate the stream
    /// header, and store under the computed digest.
    pub fn stage_content(&self, payload: &Path) -> Result<Digest, Error> {
        let file = fs::File::open(payload)?;
        let mut decoder = ZlibDecoder::new(file);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;

        let header = FileHeader::decode(&mut &bytes[..]).map_err(|err| Error::CorruptPayload {
            kind: ObjectType::File,
            err,
        })?;
        let body_len = bytes.len() as u64 - header.encoded().len() as u64;
        if body_len != header.size {
            return Err(Error::ContentSize {
                expected: header.size,
                actual: body_len,
            });
        }
        self.write_object(ObjectType::File, &bytes)
    }

    /// Read a content object back as its header and body.
    pub fn load_content(&self, digest: Digest) -> Result<(FileHeader, Vec<u8>), Error> {
        let name = ObjectName::new(digest, ObjectType::File);
        let bytes = self.read_object(&name)?;
        let mut cursor = &bytes[..];
        let header =
            FileHeader::decode(&mut cursor).map_err(|err| Error::CorruptObject { name, err })?;

        Ok((header, cursor.to_vec()))
    }

    fn ref_path(&self, remote: Option<&str>, name: &str) -> PathBuf {
        match remote {
            None => self.root.join("refs").join("heads").join(name),
            Some(remote) => self.root.join("refs").join("remotes").join(remote).join(name),
        }
    }

    /// Point a ref at a commit digest.
    pub fn write_ref(&self, remote: Option<&str>, name: &str, digest: Digest) -> Result<(), Error> {
        let path = self.ref_path(remote, name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut temp = NamedTempFile::new_in(self.tmpdir())?;
        writeln!(temp, "{digest}")?;
        temp.persist(&path).map_err(|e| e.error)?;

        Ok(())
    }

    /// Resolve a ref to its commit digest; `Ok(None)` when the ref does not
    /// exist.
    pub fn resolve_ref(&self, remote: Option<&str>, name: &str) -> Result<Option<Digest>, Error> {
        let path = self.ref_path(remote, name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let digest = Digest::from_str(contents.trim()).map_err(|err| Error::CorruptRef {
            name: name.to_owned(),
            err,
        })?;

        Ok(Some(digest))
    }

    /// Begin a transaction. Staged objects become visible immediately (they
    /// are content-addressed); the transaction gates ref updates and takes
    /// an exclusive lock so only one pull mutates the repository at a time.
    pub fn prepare_transaction(&self) -> Result<Transaction, Error> {
        let lock = self.tmpdir().join("transaction.lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => Ok(Transaction { lock: Some(lock) }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::TransactionInProgress)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// An exclusive repository transaction. Dropping without [`Transaction::commit`]
/// aborts: already-staged objects are kept (the next pull reuses them by
/// digest) but the caller must not write refs.
#[must_use]
pub struct Transaction {
    lock: Option<PathBuf>,
}

impl Transaction {
    pub fn commit(mut self) -> Result<(), Error> {
        if let Some(lock) = self.lock.take() {
            fs::remove_file(lock)?;
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = fs::remove_file(&lock) {
                log::warn!(target: "storage", "failed to release transaction lock: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::DIGEST_SIZE;

    fn digest(byte: u8) -> Digest {
        Digest::from_bytes([byte; DIGEST_SIZE])
    }

    fn sample_commit() -> Commit {
        Commit {
            timestamp: 1346363340,
            author: "tester".to_owned(),
            related: vec![],
            root_tree: digest(1),
            root_meta: digest(2),
        }
    }

    /// Compress canonical bytes the way a remote serves them.
    fn compressed(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_init_and_open() {
        let dir = tempfile::tempdir().unwrap();
        Store::init(dir.path()).unwrap();
        let store = Store::open(dir.path()).unwrap();

        assert_eq!(
            store.config().unwrap().get("core", None, "mode"),
            Some(MODE_ARCHIVE_Z2)
        );
    }

    #[test]
    fn test_open_rejects_unknown_mode() {
        let dir = tempfile::tempdir().unwrap();
        Store::init(dir.path()).unwrap();

        let mut config = KeyFile::parse(
            &std::fs::read_to_string(dir.path().join("config")).unwrap(),
        )
        .unwrap();
        config.set("core", None, "mode", "bare");
        std::fs::write(dir.path().join("config"), config.to_string()).unwrap();

        assert!(matches!(
            Store::open(dir.path()),
            Err(Error::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_write_and_load_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();
        let commit = sample_commit();

        let d = store.write_metadata(ObjectType::Commit, &commit).unwrap();
        assert!(store.has_object(&ObjectName::new(d, ObjectType::Commit)));
        assert_eq!(store.load_commit(d).unwrap(), commit);

        // Same bytes, same address.
        let again = store.write_metadata(ObjectType::Commit, &commit).unwrap();
        assert_eq!(again, d);
    }

    #[test]
    fn test_load_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        assert!(matches!(
            store.load_commit(digest(9)),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_stage_metadata_computes_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();
        let commit = sample_commit();
        let canonical = commit.encoded();

        let fetched = dir.path().join("fetched");
        std::fs::write(&fetched, compressed(&canonical)).unwrap();

        let staged = store.stage_metadata(ObjectType::Commit, &fetched).unwrap();
        let expected = Digest::from_bytes(Sha256::digest(&canonical).into());

        assert_eq!(staged, expected);
        assert_eq!(store.load_commit(staged).unwrap(), commit);
    }

    #[test]
    fn test_stage_metadata_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        let fetched = dir.path().join("fetched");
        std::fs::write(&fetched, compressed(b"not a commit")).unwrap();

        assert!(store.stage_metadata(ObjectType::Commit, &fetched).is_err());
    }

    #[test]
    fn test_stage_content_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();
        let body = b"hello world\n";
        let header = FileHeader::regular(body.len() as u64);

        let written = store.write_content(&header, body).unwrap();

        let mut stream = header.encoded();
        stream.extend_from_slice(body);
        let fetched = dir.path().join("fetched");
        std::fs::write(&fetched, compressed(&stream)).unwrap();

        let staged = store.stage_content(&fetched).unwrap();
        assert_eq!(staged, written);

        let (loaded_header, loaded_body) = store.load_content(staged).unwrap();
        assert_eq!(loaded_header, header);
        assert_eq!(loaded_body, body);
    }

    #[test]
    fn test_stage_content_rejects_short_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        let mut stream = FileHeader::regular(100).encoded();
        stream.extend_from_slice(b"way too short");
        let fetched = dir.path().join("fetched");
        std::fs::write(&fetched, compressed(&stream)).unwrap();

        assert!(store.stage_content(&fetched).is_err());
    }

    #[test]
    fn test_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        assert_eq!(store.resolve_ref(Some("origin"), "main").unwrap(), None);

        store.write_ref(Some("origin"), "main", digest(3)).unwrap();
        assert_eq!(
            store.resolve_ref(Some("origin"), "main").unwrap(),
            Some(digest(3))
        );

        store.write_ref(None, "main", digest(4)).unwrap();
        assert_eq!(store.resolve_ref(None, "main").unwrap(), Some(digest(4)));
    }

    #[test]
    fn test_resolve_rejects_corrupt_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        std::fs::write(
            dir.path().join("refs").join("heads").join("bad"),
            "not a digest\n",
        )
        .unwrap();

        assert!(matches!(
            store.resolve_ref(None, "bad"),
            Err(Error::CorruptRef { .. })
        ));
    }

    #[test]
    fn test_remote_url_inherited_from_parent() {
        let parent_dir = tempfile::tempdir().unwrap();
        let parent = Store::init(parent_dir.path()).unwrap();
        let mut config = parent.config().unwrap();
        config.set("remote", Some("origin"), "url", "http://example.com/r");
        std::fs::write(parent_dir.path().join("config"), config.to_string()).unwrap();

        let child_dir = tempfile::tempdir().unwrap();
        let child = Store::init(child_dir.path()).unwrap();
        let mut config = child.config().unwrap();
        config.set(
            "core",
            None,
            "parent",
            parent_dir.path().to_str().unwrap(),
        );
        std::fs::write(child_dir.path().join("config"), config.to_string()).unwrap();

        assert_eq!(
            child.remote_url("origin").unwrap().as_deref(),
            Some("http://example.com/r")
        );
        assert_eq!(child.remote_url("upstream").unwrap(), None);
    }

    #[test]
    fn test_transaction_excludes_concurrent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::init(dir.path()).unwrap();

        let txn = store.prepare_transaction().unwrap();
        assert!(matches!(
            store.prepare_transaction(),
            Err(Error::TransactionInProgress)
        ));
        txn.commit().unwrap();

        // Released; a new transaction may begin.
        let txn = store.prepare_transaction().unwrap();
        drop(txn);
        store.prepare_transaction().unwrap().commit().unwrap();
    }
}
