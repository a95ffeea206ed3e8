use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{ObjectEngineError, Result};
use crate::object_id::ContentAddress;

use super::{BlobInfo, ContentStore, HashAlgo, address_for};

/// An in-memory content store, for tests and `--memory` CLI runs.
/// `flush` is a no-op: every put is immediately visible to every get
/// in the process.
pub struct MemoryStore {
    algo: HashAlgo,
    blobs: Mutex<HashMap<ContentAddress, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_algo(HashAlgo::default())
    }

    pub fn with_algo(algo: HashAlgo) -> Self {
        MemoryStore {
            algo,
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct blobs currently held. Handy for the
    /// dedup/backing-blob-count assertions in the testable properties.
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, addr: &ContentAddress) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .ok_or_else(|| ObjectEngineError::ObjectNotFound(addr.to_string()))
    }

    fn put(&self, prefix: char, bytes: &[u8]) -> Result<ContentAddress> {
        let addr = address_for(self.algo, Some(prefix), bytes)?;
        self.blobs
            .lock()
            .unwrap()
            .entry(addr.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(addr)
    }

    fn info(&self, addr: &ContentAddress) -> Result<BlobInfo> {
        let blobs = self.blobs.lock().unwrap();
        let bytes = blobs
            .get(addr)
            .ok_or_else(|| ObjectEngineError::ObjectNotFound(addr.to_string()))?;
        Ok(BlobInfo {
            packed_length: bytes.len() as u64,
            pack_blob_id: addr.to_string(),
            compression_header: 0,
        })
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_content_addressed_and_idempotent() {
        let store = MemoryStore::new();
        let a1 = store.put('p', b"hello").unwrap();
        let a2 = store.put('p', b"hello").unwrap();
        assert_eq!(a1, a2);
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn missing_blob_is_not_found() {
        let store = MemoryStore::new();
        let addr = store.put('p', b"x").unwrap();
        let other = MemoryStore::new();
        assert!(other.get(&addr).is_err());
    }
}
