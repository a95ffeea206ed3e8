//! The object writer (component E): turns a byte stream into a tree
//! of backing blobs and hands back a compact [`ObjectId`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::compress::Compressor;
use crate::content_store::ContentStore;
use crate::error::{ObjectEngineError, Result};
use crate::index::{self, SeekRow};
use crate::object_id::ObjectId;
use crate::splitter::{self, Splitter, DEFAULT_SPLITTER_NAME};
use crate::util::semaphore::{Semaphore, WaitGroup};

/// The reserved bucket letter used for an indirect object's own seek
/// table payload, distinct from any caller-chosen data prefix.
const INDEX_PREFIX: char = 'x';

/// Sentinel meaning "no bucket letter": the rendered address is a
/// bare hex digest, matching the common case in spec.md §6 and the
/// literal end-to-end hash vectors in §8.
pub const NO_PREFIX: char = '\0';

pub struct WriterOptions {
    /// Free-form description surfaced in logs, not persisted.
    pub description: String,
    /// Single lowercase letter in `g..=z` used to bucket this
    /// stream's content addresses, or [`NO_PREFIX`] for a bare digest.
    pub prefix: char,
    /// Name of a registered compressor, or `None` to store chunks
    /// uncompressed.
    pub compressor: Option<String>,
    /// Maximum number of in-flight async chunk writes. `0` disables
    /// async write-behind: every chunk is written on the calling thread.
    pub async_writes: usize,
    /// Name of a registered splitter.
    pub splitter_name: String,
    /// Shared cancellation handle. Pass the same token to every writer
    /// in a scope to cancel them together; `None` gives this writer
    /// its own token that nothing else can reach.
    pub cancel_token: Option<CancelToken>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            description: String::new(),
            prefix: NO_PREFIX,
            compressor: None,
            async_writes: 0,
            splitter_name: DEFAULT_SPLITTER_NAME.to_string(),
            cancel_token: None,
        }
    }
}

/// A scope-wide cooperative cancellation handle. Cloning shares the
/// same underlying flag, so one token can be handed to several
/// writers and cancel all of them together.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct PendingRow {
    start: u64,
    length: u64,
    child_id: Option<ObjectId>,
}

#[derive(Default)]
struct StickyError(Mutex<Option<String>>);

impl StickyError {
    fn set(&self, err: &ObjectEngineError) {
        let mut slot = self.0.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err.to_string());
        }
    }

    fn get(&self) -> Option<ObjectEngineError> {
        self.0
            .lock()
            .unwrap()
            .clone()
            .map(ObjectEngineError::WriteFailed)
    }
}

pub struct ObjectWriter {
    store: Arc<dyn ContentStore>,
    splitter: Box<dyn Splitter>,
    compressor: Option<&'static dyn Compressor>,
    prefix: char,
    #[allow(dead_code)]
    description: String,
    buffer: Vec<u8>,
    seek_table: Arc<Mutex<Vec<PendingRow>>>,
    current_position: u64,
    async_writes: usize,
    semaphore: Arc<Semaphore>,
    wait_group: Arc<WaitGroup>,
    sticky: Arc<StickyError>,
    finished_id: Option<ObjectId>,
    cancel: CancelToken,
}

impl ObjectWriter {
    pub fn new(store: Arc<dyn ContentStore>, opts: WriterOptions) -> Result<Self> {
        let splitter = splitter::make(&opts.splitter_name)?;
        let compressor = match opts.compressor {
            Some(name) => Some(crate::compress::by_name(&name)?),
            None => None,
        };
        Ok(ObjectWriter {
            store,
            splitter,
            compressor,
            prefix: opts.prefix,
            description: opts.description,
            buffer: Vec::new(),
            seek_table: Arc::new(Mutex::new(Vec::new())),
            current_position: 0,
            async_writes: opts.async_writes,
            semaphore: Semaphore::new(opts.async_writes.max(1)),
            wait_group: Arc::new(WaitGroup::new()),
            sticky: Arc::new(StickyError::default()),
            finished_id: None,
            cancel: opts.cancel_token.unwrap_or_default(),
        })
    }

    /// A clone of this writer's cancellation handle. Share it with
    /// other writers in the same scope, or call `.cancel()` on it
    /// from another thread to abort this one cooperatively.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Append bytes to the in-progress stream. Aborts immediately,
    /// without buffering or splitting, once cancelled.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ObjectEngineError::Cancelled);
        }
        if let Some(e) = self.sticky.get() {
            return Err(e);
        }
        for &b in bytes {
            self.buffer.push(b);
            let forced = self.buffer.len() >= self.splitter.max_segment_size();
            if self.splitter.should_split(b) || forced {
                self.flush_buffer()?;
            }
        }
        if let Some(e) = self.sticky.get() {
            return Err(e);
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.buffer);
        let len = bytes.len() as u64;
        let row_idx = {
            let mut table = self.seek_table.lock().unwrap();
            let idx = table.len();
            table.push(PendingRow {
                start: self.current_position,
                length: len,
                child_id: None,
            });
            idx
        };
        self.current_position += len;

        if self.cancel.is_cancelled() {
            // Cooperative cancellation: no further puts are initiated.
            // Already-dispatched async puts are left to finish on
            // their own; `result`/`checkpoint` will surface `Cancelled`.
            return Ok(());
        }

        if self.async_writes == 0 {
            if let Err(e) =
                prepare_and_write_chunk(&self.store, self.compressor, self.prefix, row_idx, &bytes, &self.seek_table)
            {
                self.sticky.set(&e);
            }
        } else {
            let permit = self.semaphore.acquire();
            let store = self.store.clone();
            let compressor = self.compressor;
            let prefix = self.prefix;
            let seek_table = self.seek_table.clone();
            let sticky = self.sticky.clone();
            self.wait_group.add(1);
            let wait_group = self.wait_group.clone();
            rayon::spawn(move || {
                let _permit = permit;
                if let Err(e) =
                    prepare_and_write_chunk(&store, compressor, prefix, row_idx, &bytes, &seek_table)
                {
                    sticky.set(&e);
                }
                wait_group.done();
            });
        }
        Ok(())
    }

    /// Return an id covering all bytes flushed so far (buffered and
    /// in-flight async writes are either all visible or none are).
    pub fn checkpoint(&mut self) -> Result<ObjectId> {
        self.flush_buffer()?;
        self.wait_group.wait();
        if let Some(e) = self.sticky.get() {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(ObjectEngineError::Cancelled);
        }
        self.materialize()
    }

    /// Flush any residual bytes, wait for async writes, and return the
    /// final id. Idempotent: later calls return the same id.
    pub fn result(&mut self) -> Result<ObjectId> {
        if let Some(id) = &self.finished_id {
            return Ok(id.clone());
        }
        let id = self.checkpoint()?;
        self.finished_id = Some(id.clone());
        Ok(id)
    }

    /// Wait for outstanding async writes and release buffers. Never
    /// fails visibly.
    pub fn close(&mut self) {
        self.wait_group.wait();
        self.buffer.clear();
    }

    fn materialize(&self) -> Result<ObjectId> {
        let table = self.seek_table.lock().unwrap();
        if table.is_empty() {
            return Ok(ObjectId::Empty);
        }
        if table.len() == 1 {
            return table[0]
                .child_id
                .clone()
                .ok_or_else(|| ObjectEngineError::WriteFailed("row missing child id".into()));
        }
        let mut rows = Vec::with_capacity(table.len());
        for row in table.iter() {
            let child_id = row
                .child_id
                .clone()
                .ok_or_else(|| ObjectEngineError::WriteFailed("row missing child id".into()))?;
            rows.push(SeekRow {
                start: row.start,
                length: row.length,
                child_id,
            });
        }
        drop(table);

        let payload = index::encode(&rows)?;
        let mut inner = ObjectWriter::new(
            self.store.clone(),
            WriterOptions {
                description: "index".to_string(),
                prefix: INDEX_PREFIX,
                compressor: None,
                async_writes: 0,
                splitter_name: format!("FIXED-{}", payload.len().max(1)),
                cancel_token: None,
            },
        )?;
        inner.write(&payload)?;
        let inner_id = inner.result()?;
        Ok(inner_id.wrap_indirect())
    }
}

fn prepare_and_write_chunk(
    store: &Arc<dyn ContentStore>,
    compressor: Option<&'static dyn Compressor>,
    prefix: char,
    row_idx: usize,
    bytes: &[u8],
    seek_table: &Arc<Mutex<Vec<PendingRow>>>,
) -> Result<()> {
    let (payload, compressed): (Vec<u8>, bool) = match compressor {
        Some(c) => {
            let candidate = c.compress(bytes)?;
            if candidate.len() < bytes.len() {
                (candidate, true)
            } else {
                (bytes.to_vec(), false)
            }
        }
        None => (bytes.to_vec(), false),
    };

    let addr = store.put(prefix, &payload)?;
    let mut id = ObjectId::wrap_direct(addr);
    if compressed {
        id = id.wrap_compressed()?;
    }

    let mut table = seek_table.lock().unwrap();
    table[row_idx].child_id = Some(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::memory::MemoryStore;

    fn writer(store: Arc<dyn ContentStore>, splitter_name: &str) -> ObjectWriter {
        ObjectWriter::new(
            store,
            WriterOptions {
                splitter_name: splitter_name.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn single_small_write_is_direct() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w = writer(store.clone(), "FIXED-1048576");
        w.write(b"the quick brown fox jumps over the lazy dog").unwrap();
        let id = w.result().unwrap();
        assert!(!id.is_indirect());
        assert!(id.content_id().is_some());
    }

    #[test]
    fn empty_write_yields_empty_id() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w = writer(store, "FIXED-1048576");
        let id = w.result().unwrap();
        assert!(id.is_empty());
    }

    #[test]
    fn split_writes_produce_equal_ids_for_equal_bytes() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w1 = writer(store.clone(), "FIXED-1048576");
        w1.write(&[0u8; 100]).unwrap();
        let id1 = w1.result().unwrap();

        let mut w2 = writer(store, "FIXED-1048576");
        w2.write(&[0u8; 50]).unwrap();
        w2.write(&[0u8; 50]).unwrap();
        let id2 = w2.result().unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn multi_chunk_stream_is_indirect_and_dedups() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w = writer(store.clone(), "FIXED-1000");
        w.write(&[0u8; 3005]).unwrap();
        let id = w.result().unwrap();
        assert!(id.is_indirect());
    }

    #[test]
    fn cancel_before_result_is_reported() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w = writer(store, "FIXED-1048576");
        w.write(b"some bytes").unwrap();
        w.cancel_token().cancel();
        assert!(matches!(w.write(b"more"), Err(ObjectEngineError::Cancelled)));
        assert!(matches!(w.result(), Err(ObjectEngineError::Cancelled)));
    }

    #[test]
    fn shared_token_cancels_every_writer_in_scope() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let token = CancelToken::new();
        let mut w1 = ObjectWriter::new(
            store.clone(),
            WriterOptions {
                splitter_name: "FIXED-1048576".to_string(),
                cancel_token: Some(token.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        let mut w2 = ObjectWriter::new(
            store,
            WriterOptions {
                splitter_name: "FIXED-1048576".to_string(),
                cancel_token: Some(token.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        token.cancel();
        assert!(matches!(w1.write(b"x"), Err(ObjectEngineError::Cancelled)));
        assert!(matches!(w2.write(b"y"), Err(ObjectEngineError::Cancelled)));
    }

    #[test]
    fn async_writes_still_produce_deterministic_id() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let mut w = ObjectWriter::new(
            store,
            WriterOptions {
                splitter_name: "FIXED-1000".to_string(),
                async_writes: 4,
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..3005 {
            w.write(&[0u8]).unwrap();
        }
        let id = w.result().unwrap();
        assert!(id.is_indirect());
    }
}
