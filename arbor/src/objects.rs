//! Object identity: digests, object types and object names.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Size of a raw object digest, in bytes.
pub const DIGEST_SIZE: usize = 32;
/// Size of a hex-encoded object digest, in characters.
pub const DIGEST_HEX_SIZE: usize = DIGEST_SIZE * 2;

/// Maximum directory-tree depth accepted while walking a commit.
pub const MAX_RECURSION: usize = 256;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("invalid digest length {0}, expected {DIGEST_HEX_SIZE} hex characters")]
    InvalidLength(usize),
    #[error("digest is not lowercase hex")]
    NotLowercase,
    #[error("invalid digest encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A SHA-256 content digest. The digest of an object is computed over its
/// canonical (uncompressed) encoded bytes and doubles as its address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Canonical lowercase hex encoding.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = DigestError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; DIGEST_SIZE] = bytes
            .try_into()
            .map_err(|_| DigestError::InvalidLength(bytes.len() * 2))?;
        Ok(Self(raw))
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_HEX_SIZE {
            return Err(DigestError::InvalidLength(s.len()));
        }
        // `hex` accepts uppercase; the canonical form is lowercase only.
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(DigestError::NotLowercase);
        }
        let mut raw = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut raw)?;

        Ok(Self(raw))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// The four object kinds stored in a repository.
///
/// The first three are *metadata*: they reference other objects and are
/// parsed while scanning. [`ObjectType::File`] is the only *content* kind
/// and is always a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Commit,
    DirTree,
    DirMeta,
    File,
}

impl ObjectType {
    /// Whether objects of this type are parsed and scanned for referents.
    pub fn is_meta(&self) -> bool {
        !matches!(self, Self::File)
    }

    /// On-disk and on-wire file extension for this type.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::DirTree => "dirtree",
            Self::DirMeta => "dirmeta",
            Self::File => "filez",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An object's name: its digest paired with its type. Two names are equal
/// iff both components are; all dedup sets are keyed by names or raw digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    pub digest: Digest,
    pub kind: ObjectType,
}

impl ObjectName {
    pub fn new(digest: Digest, kind: ObjectType) -> Self {
        Self { digest, kind }
    }

    /// Repository-relative path of the object file, eg.
    /// `objects/ab/cdef….commit`. The first two hex characters fan the
    /// object directory out into 256 buckets.
    pub fn relative_path(&self) -> String {
        let hex = self.digest.to_hex();
        let (prefix, rest) = hex.split_at(2);

        format!("objects/{}/{}.{}", prefix, rest, self.kind.extension())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.digest, self.kind.extension())
    }
}

#[derive(Debug, Error)]
#[error("invalid filename {0:?}")]
pub struct InvalidFilename(pub String);

/// Validate a name found in a directory tree entry. Rejects empty names,
/// `.`, `..`, and names containing `/` or NUL.
pub fn validate_filename(name: &str) -> Result<(), InvalidFilename> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(InvalidFilename(name.to_owned()));
    }
    Ok(())
}
