//! Seek tables and the indirect-object payload that encodes them on
//! the wire (data model §3 / §6).

use serde::{Deserialize, Serialize};

use crate::error::{ObjectEngineError, Result};
use crate::object_id::ObjectId;

pub const STREAM_TAG: &str = "kopia:indirect";

/// One row of a seek table: a contiguous byte range backed by `child_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekRow {
    pub start: u64,
    pub length: u64,
    pub child_id: ObjectId,
}

impl SeekRow {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

#[derive(Serialize, Deserialize)]
struct RawEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<u64>,
    l: u64,
    o: String,
}

#[derive(Serialize, Deserialize)]
struct RawIndirect {
    stream: String,
    entries: Vec<RawEntry>,
}

/// Encode a seek table into the bytes an indirect object wraps.
/// `s` is omitted whenever it equals the previous row's end offset.
pub fn encode(rows: &[SeekRow]) -> Result<Vec<u8>> {
    let mut entries = Vec::with_capacity(rows.len());
    let mut running_end = 0u64;
    for row in rows {
        let s = if row.start == running_end {
            None
        } else {
            Some(row.start)
        };
        entries.push(RawEntry {
            s,
            l: row.length,
            o: row.child_id.render(),
        });
        running_end = row.end();
    }
    let raw = RawIndirect {
        stream: STREAM_TAG.to_string(),
        entries,
    };
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&raw, &mut buf)
        .map_err(|e| ObjectEngineError::InvalidIndirectObject(e.to_string()))?;
    Ok(buf)
}

/// Decode a seek table, filling in omitted `s` fields and validating
/// contiguity (`row[0].start == 0`, `row[i+1].start == row[i].end()`).
pub fn decode(bytes: &[u8]) -> Result<Vec<SeekRow>> {
    let raw: RawIndirect = ciborium::de::from_reader(bytes)
        .map_err(|e| ObjectEngineError::InvalidIndirectObject(e.to_string()))?;
    if raw.stream != STREAM_TAG {
        return Err(ObjectEngineError::InvalidIndirectObject(format!(
            "unexpected stream tag {:?}",
            raw.stream
        )));
    }
    let mut rows = Vec::with_capacity(raw.entries.len());
    let mut running_end = 0u64;
    for e in raw.entries {
        let start = e.s.unwrap_or(running_end);
        if start != running_end {
            return Err(ObjectEngineError::InvalidIndirectObject(format!(
                "non-contiguous row: expected start {running_end}, got {start}"
            )));
        }
        let child_id = ObjectId::parse(&e.o)?;
        running_end = start + e.l;
        rows.push(SeekRow {
            start,
            length: e.l,
            child_id,
        });
    }
    Ok(rows)
}

/// Binary-search `rows` (sorted by `start`) for the row containing `offset`.
pub fn find_row(rows: &[SeekRow], offset: u64) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    let mut lo = 0usize;
    let mut hi = rows.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if rows[mid].end() <= offset {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo < rows.len() && rows[lo].start <= offset {
        Some(lo)
    } else {
        None
    }
}
