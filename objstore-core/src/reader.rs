//! The object reader (component F): a seekable view over a stream
//! previously produced by [`crate::writer::ObjectWriter`].

use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::compress;
use crate::content_store::ContentStore;
use crate::error::{ObjectEngineError, Result};
use crate::index::{self, SeekRow};
use crate::object_id::ObjectId;

/// Worker count for [`parallel_read`], per spec.md §4.5's fixed default.
pub const DEFAULT_PARALLEL_WORKERS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub enum Whence {
    Start,
    Current,
    End,
}

pub struct ObjectReader {
    store: Arc<dyn ContentStore>,
    rows: Vec<SeekRow>,
    length: u64,
    current_position: u64,
    current_chunk_index: Option<usize>,
    current_chunk_buf: Option<Vec<u8>>,
    chunk_pos: usize,
}

impl ObjectReader {
    /// Open `id` for reading. Indirect ids are resolved by reading
    /// their index object (recursively, for nested indirection) and
    /// decoding its seek table; `length()` is then immediately known.
    pub fn open(store: Arc<dyn ContentStore>, id: &ObjectId) -> Result<Self> {
        let rows = resolve_rows(&store, id)?;
        let length = rows.last().map(SeekRow::end).unwrap_or(0);
        Ok(ObjectReader {
            store,
            rows,
            length,
            current_position: 0,
            current_chunk_index: None,
            current_chunk_buf: None,
            chunk_pos: 0,
        })
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Read up to `dst.len()` bytes, returning how many were read.
    /// `0` means end-of-stream, not an error.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < dst.len() && self.current_position < self.length {
            if self.current_chunk_buf.is_none() {
                let idx = index::find_row(&self.rows, self.current_position)
                    .expect("current_position < length implies a containing row exists");
                let row = &self.rows[idx];
                let buf = open_chunk(&self.store, row)?;
                self.chunk_pos = (self.current_position - row.start) as usize;
                self.current_chunk_index = Some(idx);
                self.current_chunk_buf = Some(buf);
            }
            let buf = self.current_chunk_buf.as_ref().unwrap();
            let avail = buf.len() - self.chunk_pos;
            let want = (dst.len() - written).min(avail);
            dst[written..written + want].copy_from_slice(&buf[self.chunk_pos..self.chunk_pos + want]);
            written += want;
            self.chunk_pos += want;
            self.current_position += want as u64;
            if self.chunk_pos >= buf.len() {
                self.current_chunk_buf = None;
                self.current_chunk_index = None;
            }
        }
        Ok(written)
    }

    /// Seek to `offset` relative to `whence`. Seeking past the end of
    /// the object is a legal no-op that yields immediate EOF on the
    /// next read, per the pinned open question in spec.md §9.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Start => 0,
            Whence::Current => self.current_position as i64,
            Whence::End => self.length as i64,
        };
        let target = base.saturating_add(offset).max(0) as u64;

        let new_row = index::find_row(&self.rows, target);
        if new_row != self.current_chunk_index {
            self.current_chunk_buf = None;
            self.current_chunk_index = new_row;
            if let Some(idx) = new_row {
                self.chunk_pos = (target - self.rows[idx].start) as usize;
            }
        } else if let Some(idx) = new_row {
            self.chunk_pos = (target - self.rows[idx].start) as usize;
        }
        self.current_position = target;
        Ok(self.current_position)
    }

    /// Release buffers. Defined for parity with the writer's `close`.
    pub fn close(&mut self) {
        self.current_chunk_buf = None;
        self.current_chunk_index = None;
    }
}

fn resolve_rows(store: &Arc<dyn ContentStore>, id: &ObjectId) -> Result<Vec<SeekRow>> {
    if id.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(inner) = id.index_object_id() {
        let index_bytes = read_object_fully(store, inner)?;
        return index::decode(&index_bytes);
    }
    let bytes = read_object_fully(store, id)?;
    Ok(vec![SeekRow {
        start: 0,
        length: bytes.len() as u64,
        child_id: id.clone(),
    }])
}

/// Fully materialize the bytes an (arbitrarily nested) id refers to.
pub(crate) fn read_object_fully(store: &Arc<dyn ContentStore>, id: &ObjectId) -> Result<Vec<u8>> {
    if id.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(inner) = id.index_object_id() {
        let index_bytes = read_object_fully(store, inner)?;
        let rows = index::decode(&index_bytes)?;
        let mut out = Vec::new();
        for row in &rows {
            out.extend_from_slice(&open_chunk(store, row)?);
        }
        return Ok(out);
    }
    let (addr, compressed) = id.content_id().expect("non-indirect, non-empty id is direct");
    let raw = store.get(addr)?;
    decode_payload(raw, compressed)
}

fn decode_payload(raw: Vec<u8>, compressed: bool) -> Result<Vec<u8>> {
    if !compressed {
        return Ok(raw);
    }
    if raw.len() < 4 {
        return Err(ObjectEngineError::InvalidCompressionHeader {
            expected: 0,
            got: 0,
        });
    }
    let header = u32::from_be_bytes(raw[..4].try_into().unwrap());
    let codec = compress::by_header_id(header)?;
    codec.decompress(&raw)
}

pub fn open_chunk(store: &Arc<dyn ContentStore>, row: &SeekRow) -> Result<Vec<u8>> {
    let bytes = read_object_fully(store, &row.child_id)?;
    if bytes.len() as u64 != row.length {
        return Err(ObjectEngineError::ChunkLengthMismatch {
            id: row.child_id.clone(),
            declared: row.length,
            actual: bytes.len() as u64,
        });
    }
    Ok(bytes)
}

/// Read every chunk of a multi-chunk indirect object in parallel,
/// invoking `callback(offset, bytes)` once per chunk in arbitrary
/// order. Fails with `NotParallelizable` if `id` isn't a multi-chunk
/// indirect object. A callback error aborts the remaining workers.
pub fn parallel_read<F>(store: Arc<dyn ContentStore>, id: &ObjectId, callback: F) -> Result<()>
where
    F: Fn(u64, Vec<u8>) -> Result<()> + Send + Sync,
{
    let inner = id
        .index_object_id()
        .ok_or(ObjectEngineError::NotParallelizable)?;
    let index_bytes = read_object_fully(&store, inner)?;
    let rows = index::decode(&index_bytes)?;
    if rows.len() < 2 {
        return Err(ObjectEngineError::NotParallelizable);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(DEFAULT_PARALLEL_WORKERS)
        .build()
        .map_err(|e| ObjectEngineError::WriteFailed(e.to_string()))?;
    let error_slot: Mutex<Option<ObjectEngineError>> = Mutex::new(None);

    pool.install(|| {
        rows.par_iter().for_each(|row| {
            if error_slot.lock().unwrap().is_some() {
                return;
            }
            let outcome = open_chunk(&store, row).and_then(|bytes| callback(row.start, bytes));
            if let Err(e) = outcome {
                let mut slot = error_slot.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
        });
    });

    match error_slot.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::memory::MemoryStore;
    use crate::writer::{ObjectWriter, WriterOptions};

    fn write_all(store: Arc<dyn ContentStore>, data: &[u8], splitter_name: &str) -> ObjectId {
        let mut w = ObjectWriter::new(
            store,
            WriterOptions {
                splitter_name: splitter_name.to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        w.write(data).unwrap();
        w.result().unwrap()
    }

    #[test]
    fn round_trip_single_chunk() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let id = write_all(store.clone(), &data, "FIXED-1048576");
        let mut r = ObjectReader::open(store, &id).unwrap();
        assert_eq!(r.length(), data.len() as u64);
        let mut out = vec![0u8; data.len()];
        let n = r.read(&mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(out, data);
        assert_eq!(r.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn round_trip_multi_chunk() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let data: Vec<u8> = (0..3005u32).map(|i| (i % 7) as u8).collect();
        let id = write_all(store.clone(), &data, "FIXED-1000");
        let mut r = ObjectReader::open(store, &id).unwrap();
        let mut out = vec![0u8; data.len()];
        let mut total = 0;
        while total < out.len() {
            let n = r.read(&mut out[total..]).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn seek_then_read_matches_slice() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let data: Vec<u8> = (0..3005u32).map(|i| (i % 251) as u8).collect();
        let id = write_all(store.clone(), &data, "FIXED-1000");
        let mut r = ObjectReader::open(store, &id).unwrap();
        r.seek(1500, Whence::Start).unwrap();
        let mut out = vec![0u8; 100];
        let n = r.read(&mut out).unwrap();
        assert_eq!(n, 100);
        assert_eq!(out, data[1500..1600]);
    }

    #[test]
    fn seek_past_end_yields_eof() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let data = vec![1u8; 10];
        let id = write_all(store.clone(), &data, "FIXED-1048576");
        let mut r = ObjectReader::open(store, &id).unwrap();
        let pos = r.seek(1000, Whence::Start).unwrap();
        assert_eq!(pos, 1000);
        let mut out = [0u8; 4];
        assert_eq!(r.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn parallel_reader_tiles_whole_object() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let data = vec![9u8; 3_000_000];
        let id = write_all(store.clone(), &data, "FIXED-1048576");
        let seen: Arc<Mutex<Vec<(u64, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        parallel_read(store, &id, move |offset, bytes| {
            seen2.lock().unwrap().push((offset, bytes.len()));
            Ok(())
        })
        .unwrap();
        let mut pairs = seen.lock().unwrap().clone();
        pairs.sort_by_key(|(off, _)| *off);
        assert!(pairs.len() >= 2);
        let mut cursor = 0u64;
        for (off, len) in pairs {
            assert_eq!(off, cursor);
            cursor += len as u64;
        }
        assert_eq!(cursor, 3_000_000);
    }

    #[test]
    fn non_indirect_object_rejects_parallel_read() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let id = write_all(store.clone(), b"short", "FIXED-1048576");
        let err = parallel_read(store, &id, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, ObjectEngineError::NotParallelizable));
    }
}
