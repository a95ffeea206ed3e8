//! Compressor registry (component B).
//!
//! Registration happens once, at first access to the registry; a
//! duplicate name or header id is a programmer error and panics,
//! matching the "fatal at init, never a silent overwrite" rule for
//! the crate's process-wide registries.

mod store;
mod zstd_codec;

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{ObjectEngineError, Result};

/// The 4-byte big-endian marker every compressed payload is tagged
/// with. Decompression fails the read if the marker doesn't match the
/// codec it was dispatched to.
pub type HeaderId = u32;

pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;
    fn header_id(&self) -> HeaderId;

    /// Compress `input`, returning the header id followed by the
    /// codec-specific bytes.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(4 + input.len());
        out.extend_from_slice(&self.header_id().to_be_bytes());
        self.encode(input, &mut out)?;
        Ok(out)
    }

    /// Decompress a payload previously produced by [`Compressor::compress`].
    fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < 4 {
            return Err(ObjectEngineError::InvalidCompressionHeader {
                expected: self.header_id(),
                got: 0,
            });
        }
        let got = u32::from_be_bytes(payload[..4].try_into().unwrap());
        if got != self.header_id() {
            return Err(ObjectEngineError::InvalidCompressionHeader {
                expected: self.header_id(),
                got,
            });
        }
        self.decode(&payload[4..])
    }

    /// Append codec-specific compressed bytes for `input` to `out`.
    fn encode(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Decode codec-specific bytes (header already stripped).
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;
}

struct Registry {
    by_name: HashMap<&'static str, &'static dyn Compressor>,
    by_header: HashMap<HeaderId, &'static dyn Compressor>,
}

impl Registry {
    fn new() -> Self {
        let mut r = Registry {
            by_name: HashMap::new(),
            by_header: HashMap::new(),
        };
        r.register(&store::StoreCompressor);
        r.register(&zstd_codec::ZstdCompressor);
        r
    }

    fn register(&mut self, c: &'static dyn Compressor) {
        if self.by_name.contains_key(c.name()) {
            panic!("compressor already registered: {}", c.name());
        }
        if self.by_header.contains_key(&c.header_id()) {
            panic!(
                "compressor header id already registered: {} -> {}",
                c.header_id(),
                c.name()
            );
        }
        self.by_name.insert(c.name(), c);
        self.by_header.insert(c.header_id(), c);
    }
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));

/// Look up a registered compressor by its configuration name (e.g. `"zstd"`).
pub fn by_name(name: &str) -> Result<&'static dyn Compressor> {
    REGISTRY
        .read()
        .unwrap()
        .by_name
        .get(name)
        .copied()
        .ok_or_else(|| ObjectEngineError::UnknownCompressor(name.to_string()))
}

/// Look up a registered compressor by the header id read from a payload.
pub fn by_header_id(id: HeaderId) -> Result<&'static dyn Compressor> {
    REGISTRY
        .read()
        .unwrap()
        .by_header
        .get(&id)
        .copied()
        .ok_or(ObjectEngineError::InvalidCompressionHeader {
            expected: id,
            got: id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_round_trips() {
        let c = by_name("store").unwrap();
        let payload = c.compress(b"hello world").unwrap();
        assert_eq!(c.decompress(&payload).unwrap(), b"hello world");
    }

    #[test]
    fn zstd_round_trips() {
        let c = by_name("zstd").unwrap();
        let data = vec![b'a'; 4096];
        let payload = c.compress(&data).unwrap();
        assert!(payload.len() < data.len());
        assert_eq!(c.decompress(&payload).unwrap(), data);
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let store = by_name("store").unwrap();
        let zstd = by_name("zstd").unwrap();
        let payload = zstd.compress(b"x").unwrap();
        let err = store.decompress(&payload).unwrap_err();
        assert!(matches!(
            err,
            ObjectEngineError::InvalidCompressionHeader { .. }
        ));
    }
}
