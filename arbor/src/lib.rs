//! Core library of the arbor content-addressed object store: the object
//! model and its canonical encodings, the on-disk repository, and keyfile
//! configuration. The pull engine lives in the `arbor-pull` crate.
pub mod config;
pub mod objects;
pub mod storage;
pub mod wire;

pub use objects::{Digest, ObjectName, ObjectType, MAX_RECURSION};
pub use storage::Store;
