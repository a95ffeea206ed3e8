//! The object ID algebra (component D).
//!
//! An [`ObjectId`] is a pure value: it carries no timestamps or
//! counters, only a function of content and codec choice. See
//! `SPEC_FULL.md` §4.3 for the full contract.

use std::fmt;

use crate::error::{ObjectEngineError, Result};

/// A raw content address as handed back by a [`crate::content_store::ContentStore`].
///
/// Grammar: an optional single lowercase bucket letter in `g..=z`,
/// followed by an even number (>= 2) of lowercase hex digits.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Parse and validate a rendered content address.
    pub fn parse(s: &str) -> Result<Self> {
        validate_address_grammar(s)?;
        Ok(Self(s.to_string()))
    }

    /// Wrap an address already known to be well-formed (e.g. one just
    /// returned by a content store's `put`), without a bucket prefix.
    pub fn from_hex_digest(hex_digest: &str) -> Self {
        Self(hex_digest.to_ascii_lowercase())
    }

    /// Wrap an address with an explicit single-letter bucket prefix.
    pub fn with_prefix(prefix: char, hex_digest: &str) -> Result<Self> {
        if !('g'..='z').contains(&prefix) {
            return Err(ObjectEngineError::InvalidObjectId {
                id: format!("{prefix}{hex_digest}"),
                reason: "bucket prefix must be a single lowercase letter in g..=z".into(),
            });
        }
        let s = format!("{prefix}{}", hex_digest.to_ascii_lowercase());
        Self::parse(&s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_address_grammar(s: &str) -> Result<()> {
    let bad = || ObjectEngineError::InvalidObjectId {
        id: s.to_string(),
        reason: "expected optional g..z bucket prefix followed by an even run of >=2 hex digits"
            .into(),
    };
    if s.is_empty() {
        return Err(bad());
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    let hex_part: &str = if ('g'..='z').contains(&first) {
        &s[first.len_utf8()..]
    } else {
        s
    };
    if hex_part.len() < 2 || hex_part.len() % 2 != 0 {
        return Err(bad());
    }
    if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(bad());
    }
    if hex_part.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(bad());
    }
    Ok(())
}

/// A compact object identifier. See `SPEC_FULL.md` §3 for the
/// invariants this type must uphold.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ObjectId {
    /// The unique representation of a zero-length object.
    Empty,
    /// The object's bytes are exactly the backing blob's bytes.
    Direct(ContentAddress),
    /// The backing blob must be decompressed (header-tagged) before use.
    CompressedDirect(ContentAddress),
    /// The object's bytes are the seek table of the wrapped id.
    Indirect(Box<ObjectId>),
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl ObjectId {
    pub fn wrap_direct(addr: ContentAddress) -> Self {
        ObjectId::Direct(addr)
    }

    /// Mark a direct id as carrying a compressed payload. Fails if
    /// `self` is not a (plain) direct id.
    pub fn wrap_compressed(self) -> Result<Self> {
        match self {
            ObjectId::Direct(addr) => Ok(ObjectId::CompressedDirect(addr)),
            other => Err(ObjectEngineError::InvalidObjectId {
                id: other.render(),
                reason: "wrap_compressed requires a direct object id".into(),
            }),
        }
    }

    pub fn wrap_indirect(self) -> Self {
        ObjectId::Indirect(Box::new(self))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ObjectId::Empty)
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self, ObjectId::Indirect(_))
    }

    /// Defined iff `self` is direct (compressed or not).
    pub fn content_id(&self) -> Option<(&ContentAddress, bool)> {
        match self {
            ObjectId::Direct(addr) => Some((addr, false)),
            ObjectId::CompressedDirect(addr) => Some((addr, true)),
            _ => None,
        }
    }

    /// Defined iff `self` is indirect.
    pub fn index_object_id(&self) -> Option<&ObjectId> {
        match self {
            ObjectId::Indirect(inner) => Some(inner),
            _ => None,
        }
    }

    /// Render the textual wire form (`SPEC_FULL.md` §6 / spec.md §6).
    pub fn render(&self) -> String {
        match self {
            ObjectId::Empty => String::new(),
            ObjectId::Direct(addr) => addr.as_str().to_string(),
            ObjectId::CompressedDirect(addr) => format!("Z{addr}"),
            ObjectId::Indirect(inner) => format!("I{}", inner.render()),
        }
    }

    /// Parse the textual wire form, accepting the legacy `D` prefix on
    /// direct ids for compatibility (spec.md §6).
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(ObjectId::Empty);
        }
        let mut chars = s.chars();
        match chars.next().unwrap() {
            'I' => {
                let inner = ObjectId::parse(&s[1..])?;
                if matches!(inner, ObjectId::Empty) {
                    return Err(ObjectEngineError::InvalidObjectId {
                        id: s.to_string(),
                        reason: "indirect id cannot wrap the empty id".into(),
                    });
                }
                Ok(ObjectId::Indirect(Box::new(inner)))
            }
            'Z' => {
                let addr = ContentAddress::parse(&s[1..])?;
                Ok(ObjectId::CompressedDirect(addr))
            }
            'D' => {
                let addr = ContentAddress::parse(&s[1..])?;
                Ok(ObjectId::Direct(addr))
            }
            _ => {
                let addr = ContentAddress::parse(s)?;
                Ok(ObjectId::Direct(addr))
            }
        }
    }

    /// Validate a rendered object id against the grammar.
    pub fn validate(s: &str) -> Result<()> {
        Self::parse(s).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_trips() {
        assert_eq!(ObjectId::Empty.render(), "");
        assert!(matches!(ObjectId::parse("").unwrap(), ObjectId::Empty));
    }

    #[test]
    fn direct_round_trips() {
        let addr = ContentAddress::parse(
            "05c6e08f1d03a6ff0bb94782feef40546db1dde55feb2d74bb4a67eef7450bec",
        );
        // odd-length digest above is intentionally invalid; use a valid one:
        assert!(addr.is_err());
        let addr = ContentAddress::from_hex_digest(
            "05c6e08f1d03a6ff0bb94782feef40546db1dde55feb2d74bb4a67eef7450be",
        );
        let id = ObjectId::wrap_direct(addr);
        let rendered = id.render();
        let back = ObjectId::parse(&rendered).unwrap();
        assert_eq!(id, back);
        assert!(ObjectId::validate(&rendered).is_ok());
    }

    #[test]
    fn legacy_d_prefix_strips_on_render() {
        let legacy = "Daabbccdd";
        let parsed = ObjectId::parse(legacy).unwrap();
        assert_eq!(parsed.render(), "aabbccdd");
    }

    #[test]
    fn compressed_and_indirect_wrap() {
        let addr = ContentAddress::from_hex_digest("aabbccdd");
        let direct = ObjectId::wrap_direct(addr);
        let compressed = direct.wrap_compressed().unwrap();
        assert_eq!(compressed.render(), "Zaabbccdd");
        let indirect = compressed.wrap_indirect();
        assert_eq!(indirect.render(), "IZaabbccdd");
        assert!(indirect.is_indirect());
        assert!(indirect.index_object_id().is_some());
        assert!(indirect.content_id().is_none());
    }

    #[test]
    fn content_id_defined_only_for_direct() {
        let addr = ContentAddress::from_hex_digest("aabbccdd");
        let direct = ObjectId::wrap_direct(addr.clone());
        assert_eq!(direct.content_id().unwrap().0, &addr);
        assert!(!direct.content_id().unwrap().1);
        assert!(ObjectId::Empty.content_id().is_none());
    }

    #[test]
    fn bucket_prefix_round_trips() {
        let addr = ContentAddress::with_prefix('p', "aabbccdd").unwrap();
        assert_eq!(addr.as_str(), "paabbccdd");
        assert!(ContentAddress::with_prefix('a', "aabbccdd").is_err());
    }

    #[test]
    fn reject_malformed_address() {
        assert!(ContentAddress::parse("zz").is_err()); // prefix consumes the only other char, nothing left
        assert!(ContentAddress::parse("a").is_err()); // odd length, too short
        assert!(ContentAddress::parse("AB").is_err()); // uppercase
    }
}
