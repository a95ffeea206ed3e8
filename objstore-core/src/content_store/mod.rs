//! The content-store contract (component A) and its two reference
//! implementations (A').
//!
//! The engine treats a content store as an external collaborator: it
//! only ever calls `get`/`put`/`info`/`flush`. Everything in this
//! module exists so the engine is runnable and testable on its own.

pub mod fs;
pub mod memory;

use crate::error::Result;
use crate::object_id::ContentAddress;

/// Which hash function a store uses to derive addresses from bytes.
/// Both are exercised by the test suite; BLAKE3 is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Blake3,
    Sha256,
}

impl Default for HashAlgo {
    fn default() -> Self {
        HashAlgo::Blake3
    }
}

pub(crate) fn digest_hex(algo: HashAlgo, bytes: &[u8]) -> String {
    match algo {
        HashAlgo::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        HashAlgo::Sha256 => {
            use sha2::{Digest, Sha256};
            hex::encode(Sha256::digest(bytes))
        }
    }
}

pub(crate) fn address_for(algo: HashAlgo, prefix: Option<char>, bytes: &[u8]) -> Result<ContentAddress> {
    let digest = digest_hex(algo, bytes);
    match prefix {
        Some(p) if p != '\0' => ContentAddress::with_prefix(p, &digest),
        _ => Ok(ContentAddress::from_hex_digest(&digest)),
    }
}

/// Metadata about a previously stored blob, per the external contract.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub packed_length: u64,
    pub pack_blob_id: String,
    pub compression_header: u32,
}

/// What the object engine requires from a backing store (`SPEC_FULL.md` §6).
///
/// `put` is content-addressed: the returned address is a pure
/// function of `bytes` (the `prefix` only steers bucketing, it is not
/// mixed into addressing).
pub trait ContentStore: Send + Sync {
    fn get(&self, addr: &ContentAddress) -> Result<Vec<u8>>;
    fn put(&self, prefix: char, bytes: &[u8]) -> Result<ContentAddress>;
    fn info(&self, addr: &ContentAddress) -> Result<BlobInfo>;
    fn flush(&self) -> Result<()>;
}
