//! Content splitter registry (component C).

mod buzhash;
mod fixed;

use crate::error::{ObjectEngineError, Result};

/// A named default matching the conventional target chunk size used
/// throughout the test fixtures and CLI defaults.
pub const DEFAULT_SPLITTER_NAME: &str = "DYNAMIC-4M-BUZHASH";

/// A stateful byte-stream chunker. One instance is owned exclusively
/// by a single writer stream; `should_split` is called for every byte
/// appended to the writer's buffer.
pub trait Splitter: Send {
    /// Hard ceiling on a single chunk's size; the writer forces a cut
    /// when its buffer reaches this length even if `should_split`
    /// never fires on its own.
    fn max_segment_size(&self) -> usize;

    /// Feed one byte of input; returns true if the writer should cut
    /// the buffer immediately after this byte.
    fn should_split(&mut self, byte: u8) -> bool;

    /// Reset internal state after a cut, so the next chunk starts clean.
    fn reset(&mut self);

    /// Scan `buf` for the first split point, defaulting to a
    /// byte-at-a-time scan. Implementations with a faster bulk
    /// algorithm may override this.
    fn next_split_point(&mut self, buf: &[u8]) -> Option<usize> {
        for (i, &b) in buf.iter().enumerate() {
            if self.should_split(b) {
                return Some(i + 1);
            }
        }
        None
    }
}

/// Construct a splitter instance from its configuration name.
///
/// Recognized forms: `FIXED-<N>` (optionally suffixed `K`/`M`/`G` for
/// binary units) and `DYNAMIC-<avg>-BUZHASH` (same unit suffixes on
/// the average chunk size).
pub fn make(name: &str) -> Result<Box<dyn Splitter>> {
    if let Some(rest) = name.strip_prefix("FIXED-") {
        let n = parse_size(rest).ok_or_else(|| ObjectEngineError::UnknownSplitter(name.into()))?;
        return Ok(Box::new(fixed::Fixed::new(n)));
    }
    if let Some(rest) = name.strip_prefix("DYNAMIC-") {
        if let Some(avg_str) = rest.strip_suffix("-BUZHASH") {
            let avg =
                parse_size(avg_str).ok_or_else(|| ObjectEngineError::UnknownSplitter(name.into()))?;
            return Ok(Box::new(buzhash::Buzhash::new(avg)));
        }
    }
    Err(ObjectEngineError::UnknownSplitter(name.into()))
}

fn parse_size(s: &str) -> Option<usize> {
    let (digits, mult) = match s.chars().last() {
        Some('K') => (&s[..s.len() - 1], 1024),
        Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        Some('G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.parse::<usize>().ok().map(|n| n * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_names() {
        let s = make("FIXED-1000").unwrap();
        assert_eq!(s.max_segment_size(), 1000);
        let s = make("FIXED-1M").unwrap();
        assert_eq!(s.max_segment_size(), 1024 * 1024);
    }

    #[test]
    fn parses_buzhash_names() {
        let s = make(DEFAULT_SPLITTER_NAME).unwrap();
        assert!(s.max_segment_size() > 0);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(make("BOGUS-1").is_err());
    }
}
