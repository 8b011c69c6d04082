//! Canonical binary encodings for object payloads.
//!
//! All integers are big-endian; strings are UTF-8 with a `u16` length prefix;
//! repeated sections carry a `u32` count. An object's digest is SHA-256 over
//! these canonical bytes, so encoders must be deterministic: what you decode
//! is byte-for-byte what you re-encode.
use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::objects::{Digest, DIGEST_SIZE};

/// Maximum number of entries accepted in one repeated section. Guards the
/// decoder against allocating from a hostile count prefix.
pub const MAX_ENTRIES: u32 = 1 << 20;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("string is not valid UTF-8")]
    InvalidString(#[from] std::str::Utf8Error),
    #[error("entry count {0} exceeds limit")]
    EntryCount(u32),
    #[error("trailing bytes after payload")]
    TrailingBytes,
}

impl Error {
    /// Whether the input simply ran out, as opposed to holding bad data.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Encode a payload into its canonical byte form.
pub trait Encode {
    fn encode<W: io::Write>(&self, w: &mut W) -> io::Result<()>;

    fn encoded(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf).expect("in-memory writes are infallible");
        buf
    }
}

/// Decode a payload from its canonical byte form.
pub trait Decode: Sized {
    fn decode<R: io::Read>(r: &mut R) -> Result<Self, Error>;

    /// Decode from a complete buffer, rejecting trailing garbage.
    fn decode_all(mut bytes: &[u8]) -> Result<Self, Error> {
        let value = Self::decode(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(value)
    }
}

fn write_string<W: io::Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u16::<BigEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: io::Read>(r: &mut R) -> Result<String, Error> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    let s = std::str::from_utf8(&buf)?;

    Ok(s.to_owned())
}

fn write_digest<W: io::Write>(w: &mut W, digest: &Digest) -> io::Result<()> {
    w.write_all(digest.as_bytes())
}

fn read_digest<R: io::Read>(r: &mut R) -> Result<Digest, Error> {
    let mut raw = [0u8; DIGEST_SIZE];
    r.read_exact(&mut raw)?;

    Ok(Digest::from_bytes(raw))
}

fn read_count<R: io::Read>(r: &mut R) -> Result<u32, Error> {
    let n = r.read_u32::<BigEndian>()?;
    if n > MAX_ENTRIES {
        return Err(Error::EntryCount(n));
    }
    Ok(n)
}

fn write_xattrs<W: io::Write>(w: &mut W, xattrs: &[(String, Vec<u8>)]) -> io::Result<()> {
    w.write_u32::<BigEndian>(xattrs.len() as u32)?;
    for (key, value) in xattrs {
        write_string(w, key)?;
        w.write_u32::<BigEndian>(value.len() as u32)?;
        w.write_all(value)?;
    }
    Ok(())
}

fn read_xattrs<R: io::Read>(r: &mut R) -> Result<Vec<(String, Vec<u8>)>, Error> {
    let n = read_count(r)?;
    let mut xattrs = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let key = read_string(r)?;
        let len = r.read_u32::<BigEndian>()? as usize;
        let mut value = vec![0; len];
        r.read_exact(&mut value)?;
        xattrs.push((key, value));
    }
    Ok(xattrs)
}

/// A root snapshot record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// Seconds since the epoch; opaque to the pull engine.
    pub timestamp: u64,
    /// Free-form author string; opaque to the pull engine.
    pub author: String,
    /// Other commits this one is associated with, by name.
    pub related: Vec<(String, Digest)>,
    /// Digest of the root directory tree.
    pub root_tree: Digest,
    /// Digest of the root directory metadata.
    pub root_meta: Digest,
}

impl Encode for Commit {
    fn encode<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<BigEndian>(self.timestamp)?;
        write_string(w, &self.author)?;
        w.write_u32::<BigEndian>(self.related.len() as u32)?;
        for (name, digest) in &self.related {
            write_string(w, name)?;
            write_digest(w, digest)?;
        }
        write_digest(w, &self.root_tree)?;
        write_digest(w, &self.root_meta)
    }
}

impl Decode for Commit {
    fn decode<R: io::Read>(r: &mut R) -> Result<Self, Error> {
        let timestamp = r.read_u64::<BigEndian>()?;
        let author = read_string(r)?;
        let n = read_count(r)?;
        let mut related = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = read_string(r)?;
            let digest = read_digest(r)?;
            related.push((name, digest));
        }
        let root_tree = read_digest(r)?;
        let root_meta = read_digest(r)?;

        Ok(Self {
            timestamp,
            author,
            related,
            root_tree,
            root_meta,
        })
    }
}

/// A directory listing: plain files by content digest, sub-directories by
/// (tree, meta) digest pair. Entry order is preserved by the codec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirTree {
    pub files: Vec<FileEntry>,
    pub dirs: Vec<DirEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub content: Digest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub tree: Digest,
    pub meta: Digest,
}

impl Encode for DirTree {
    fn encode<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.files.len() as u32)?;
        for file in &self.files {
            write_string(w, &file.name)?;
            write_digest(w, &file.content)?;
        }
        w.write_u32::<BigEndian>(self.dirs.len() as u32)?;
        for dir in &self.dirs {
            write_string(w, &dir.name)?;
            write_digest(w, &dir.tree)?;
            write_digest(w, &dir.meta)?;
        }
        Ok(())
    }
}

impl Decode for DirTree {
    fn decode<R: io::Read>(r: &mut R) -> Result<Self, Error> {
        let n = read_count(r)?;
        let mut files = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = read_string(r)?;
            let content = read_digest(r)?;
            files.push(FileEntry { name, content });
        }
        let n = read_count(r)?;
        let mut dirs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = read_string(r)?;
            let tree = read_digest(r)?;
            let meta = read_digest(r)?;
            dirs.push(DirEntry { name, tree, meta });
        }
        Ok(Self { files, dirs })
    }
}

/// Directory permissions and ownership. A leaf: references no other object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: Vec<(String, Vec<u8>)>,
}

impl DirMeta {
    /// A plain `drwxr-xr-x` root-owned directory.
    pub fn directory_default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: 0o40755,
            xattrs: Vec::new(),
        }
    }
}

impl Encode for DirMeta {
    fn encode<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.uid)?;
        w.write_u32::<BigEndian>(self.gid)?;
        w.write_u32::<BigEndian>(self.mode)?;
        write_xattrs(w, &self.xattrs)
    }
}

impl Decode for DirMeta {
    fn decode<R: io::Read>(r: &mut R) -> Result<Self, Error> {
        let uid = r.read_u32::<BigEndian>()?;
        let gid = r.read_u32::<BigEndian>()?;
        let mode = r.read_u32::<BigEndian>()?;
        let xattrs = read_xattrs(r)?;

        Ok(Self {
            uid,
            gid,
            mode,
            xattrs,
        })
    }
}

/// Header of a content stream: file metadata followed by `size` raw bytes.
/// The file object's digest covers the header and the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: Vec<(String, Vec<u8>)>,
    pub size: u64,
}

impl FileHeader {
    /// A plain `-rw-r--r--` root-owned file of the given size.
    pub fn regular(size: u64) -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            xattrs: Vec::new(),
            size,
        }
    }
}

impl Encode for FileHeader {
    fn encode<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.uid)?;
        w.write_u32::<BigEndian>(self.gid)?;
        w.write_u32::<BigEndian>(self.mode)?;
        write_xattrs(w, &self.xattrs)?;
        w.write_u64::<BigEndian>(self.size)
    }
}

impl Decode for FileHeader {
    fn decode<R: io::Read>(r: &mut R) -> Result<Self, Error> {
        let uid = r.read_u32::<BigEndian>()?;
        let gid = r.read_u32::<BigEndian>()?;
        let mode = r.read_u32::<BigEndian>()?;
        let xattrs = read_xattrs(r)?;
        let size = r.read_u64::<BigEndian>()?;

        Ok(Self {
            uid,
            gid,
            mode,
            xattrs,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Digest {
        Digest::from_bytes([byte; DIGEST_SIZE])
    }

    #[test]
    fn test_commit_codec() {
        let commit = Commit {
            timestamp: 1346363340,
            author: "walters".to_owned(),
            related: vec![("dev".to_owned(), digest(9))],
            root_tree: digest(1),
            root_meta: digest(2),
        };
        let decoded = Commit::decode_all(&commit.encoded()).unwrap();

        assert_eq!(decoded, commit);
    }

    #[test]
    fn test_dirtree_preserves_entry_order() {
        let tree = DirTree {
            files: vec![
                FileEntry {
                    name: "zebra".to_owned(),
                    content: digest(1),
                },
                FileEntry {
                    name: "aardvark".to_owned(),
                    content: digest(2),
                },
            ],
            dirs: vec![DirEntry {
                name: "sub".to_owned(),
                tree: digest(3),
                meta: digest(4),
            }],
        };
        let decoded = DirTree::decode_all(&tree.encoded()).unwrap();

        assert_eq!(decoded, tree);
        assert_eq!(decoded.files[0].name, "zebra");
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let commit = Commit {
            timestamp: 0,
            author: String::new(),
            related: vec![],
            root_tree: digest(1),
            root_meta: digest(2),
        };
        let bytes = commit.encoded();
        let err = Commit::decode_all(&bytes[..bytes.len() - 1]).unwrap_err();

        assert!(err.is_eof());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = DirMeta::directory_default().encoded();
        bytes.push(0xff);

        assert!(matches!(
            DirMeta::decode_all(&bytes),
            Err(Error::TrailingBytes)
        ));
    }

    #[test]
    fn test_decode_rejects_hostile_count() {
        let mut bytes = Vec::new();
        // A dirtree claiming u32::MAX file entries.
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());

        assert!(matches!(
            DirTree::decode_all(&bytes),
            Err(Error::EntryCount(_))
        ));
    }
}
