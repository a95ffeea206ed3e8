//! The verifier / tree walker (component G): a parallel graph walk
//! over objects, deduplicating by id and accumulating errors up to a
//! configurable cap.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::content_store::ContentStore;
use crate::error::{ObjectEngineError, Result};
use crate::object_id::{ContentAddress, ObjectId};
use crate::reader::read_object_fully;
use crate::stats::{Reporter, Stats};

/// A node in the tree being walked. The walker dispatches on the
/// variant rather than on a trait object, matching the source's
/// `fs.Entry` polymorphism (design notes §9).
pub enum Entry {
    File {
        path: PathBuf,
        id: ObjectId,
        size: u64,
    },
    Directory {
        path: PathBuf,
        id: ObjectId,
        children: Vec<Entry>,
    },
    Symlink {
        path: PathBuf,
        target: PathBuf,
    },
    StreamingFile {
        path: PathBuf,
        id: ObjectId,
    },
    ErrorEntry {
        path: PathBuf,
        message: String,
    },
}

impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Entry::File { path, .. }
            | Entry::Directory { path, .. }
            | Entry::Symlink { path, .. }
            | Entry::StreamingFile { path, .. }
            | Entry::ErrorEntry { path, .. } => path,
        }
    }

    pub fn id(&self) -> Option<&ObjectId> {
        match self {
            Entry::File { id, .. } | Entry::Directory { id, .. } | Entry::StreamingFile { id, .. } => {
                Some(id)
            }
            Entry::Symlink { .. } | Entry::ErrorEntry { .. } => None,
        }
    }
}

/// Recursively collect every backing content address a (possibly
/// indirect) id transitively references.
pub fn verify_object(store: &Arc<dyn ContentStore>, id: &ObjectId) -> Result<Vec<ContentAddress>> {
    let mut out = Vec::new();
    collect_addresses(store, id, &mut out)?;
    Ok(out)
}

fn collect_addresses(
    store: &Arc<dyn ContentStore>,
    id: &ObjectId,
    out: &mut Vec<ContentAddress>,
) -> Result<()> {
    if id.is_empty() {
        return Ok(());
    }
    if let Some(inner) = id.index_object_id() {
        collect_addresses(store, inner, out)?;
        let index_bytes = read_object_fully(store, inner)?;
        let rows = crate::index::decode(&index_bytes)?;
        for row in &rows {
            collect_addresses(store, &row.child_id, out)?;
        }
        return Ok(());
    }
    let (addr, _) = id.content_id().expect("non-indirect, non-empty id is direct");
    out.push(addr.clone());
    Ok(())
}

/// Deterministic stand-in for the "with probability `percent`/100"
/// sampling clause: derives a threshold from the id itself so repeat
/// runs over the same tree make the same sampling decisions.
fn should_deep_verify(id: &ObjectId, percent: u8) -> bool {
    if percent == 0 {
        return false;
    }
    if percent >= 100 {
        return true;
    }
    let h = blake3::hash(id.render().as_bytes());
    let bucket = (h.as_bytes()[0] as u16 * 100) / 256;
    bucket < percent as u16
}

pub struct WalkerOptions {
    /// 0 = unlimited, 1 = fail-fast.
    pub max_errors: usize,
    pub verify_files_percent: u8,
    pub stats_interval: Duration,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        WalkerOptions {
            max_errors: 0,
            verify_files_percent: 0,
            stats_interval: Duration::from_secs(1),
        }
    }
}

pub struct Walker {
    store: Arc<dyn ContentStore>,
    seen: Mutex<HashSet<ObjectId>>,
    errors: Mutex<Vec<ObjectEngineError>>,
    max_errors: usize,
    verify_files_percent: u8,
    pub stats: Arc<Stats>,
    entry_callback: Box<dyn Fn(&Entry) -> Result<()> + Send + Sync>,
}

impl Walker {
    pub fn new(
        store: Arc<dyn ContentStore>,
        opts: WalkerOptions,
        entry_callback: impl Fn(&Entry) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Walker {
            store,
            seen: Mutex::new(HashSet::new()),
            errors: Mutex::new(Vec::new()),
            max_errors: opts.max_errors,
            verify_files_percent: opts.verify_files_percent,
            stats: Stats::new(),
            entry_callback: Box::new(entry_callback),
        }
    }

    fn should_stop(&self) -> bool {
        self.max_errors != 0 && self.errors.lock().unwrap().len() >= self.max_errors
    }

    fn record_error(&self, e: ObjectEngineError) {
        let mut errors = self.errors.lock().unwrap();
        if self.max_errors == 0 || errors.len() < self.max_errors {
            errors.push(e);
        }
    }

    /// Walk `root`, reporting progress on `self.stats` at most once
    /// per `interval`, and return the aggregated result.
    pub fn walk(&self, root: &Entry, interval: Duration) -> Result<()> {
        let _reporter = Reporter::spawn(self.stats.clone(), interval);
        rayon::scope(|scope| {
            self.process(scope, root);
        });
        self.finish()
    }

    fn process<'scope>(&'scope self, scope: &rayon::Scope<'scope>, entry: &'scope Entry) {
        if self.should_stop() {
            return;
        }
        if let Some(id) = entry.id() {
            let mut seen = self.seen.lock().unwrap();
            if !seen.insert(id.clone()) {
                return;
            }
        }
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = (self.entry_callback)(entry) {
            self.record_error(e);
            return;
        }

        if let Entry::Directory { children, .. } = entry {
            for child in children {
                scope.spawn(move |s| self.process(s, child));
            }
        }
    }

    /// Resolve `id` to its backing content addresses, optionally
    /// checking each against a known-existing set, and with
    /// probability `verify_files_percent / 100` read the whole object
    /// end-to-end to force integrity checking.
    pub fn verify_file(
        &self,
        id: &ObjectId,
        existing_blobs: Option<&HashSet<ContentAddress>>,
    ) -> Result<()> {
        let addrs = verify_object(&self.store, id)?;
        if let Some(existing) = existing_blobs {
            for addr in &addrs {
                if !existing.contains(addr) {
                    return Err(ObjectEngineError::ObjectNotFound(addr.to_string()));
                }
            }
        } else {
            for addr in &addrs {
                self.store.info(addr)?;
            }
        }

        if should_deep_verify(id, self.verify_files_percent) {
            let bytes = read_object_fully(&self.store, id)?;
            self.stats.read_files.fetch_add(1, Ordering::Relaxed);
            self.stats
                .read_bytes
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let mut errors = self.errors.lock().unwrap();
        let errors = std::mem::take(&mut *errors);
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap()),
            n => Err(ObjectEngineError::Aggregate(n)),
        }
    }
}

/// Re-exported for callers (e.g. the CLI) that want to stream
/// individual chunks during a walk without pulling in `reader`.
pub use crate::reader::open_chunk as read_chunk;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::memory::MemoryStore;
    use crate::writer::{ObjectWriter, WriterOptions};
    use std::sync::atomic::AtomicUsize;

    fn write(store: Arc<dyn ContentStore>, data: &[u8]) -> ObjectId {
        let mut w = ObjectWriter::new(
            store,
            WriterOptions {
                splitter_name: "FIXED-1000".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        w.write(data).unwrap();
        w.result().unwrap()
    }

    #[test]
    fn visits_each_distinct_id_exactly_once() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let shared_id = write(store.clone(), &[0u8; 2000]);
        let root = Entry::Directory {
            path: PathBuf::from("/"),
            id: ObjectId::wrap_direct(ContentAddress::from_hex_digest("aa")),
            children: vec![
                Entry::File {
                    path: PathBuf::from("/a"),
                    id: shared_id.clone(),
                    size: 2000,
                },
                Entry::File {
                    path: PathBuf::from("/b"),
                    id: shared_id,
                    size: 2000,
                },
            ],
        };
        let visits = Arc::new(AtomicUsize::new(0));
        let visits2 = visits.clone();
        let walker = Walker::new(store, WalkerOptions::default(), move |_entry| {
            visits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        walker.walk(&root, Duration::from_millis(50)).unwrap();
        // root + 1 distinct file id (second file is a dedup no-op)
        assert_eq!(visits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn aggregates_errors_past_one() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let root = Entry::Directory {
            path: PathBuf::from("/"),
            id: ObjectId::wrap_direct(ContentAddress::from_hex_digest("aa")),
            children: vec![
                Entry::File {
                    path: PathBuf::from("/a"),
                    id: ObjectId::wrap_direct(ContentAddress::from_hex_digest("bb")),
                    size: 0,
                },
                Entry::File {
                    path: PathBuf::from("/b"),
                    id: ObjectId::wrap_direct(ContentAddress::from_hex_digest("cc")),
                    size: 0,
                },
            ],
        };
        let walker = Walker::new(store, WalkerOptions::default(), |entry| {
            if matches!(entry, Entry::File { .. }) {
                Err(ObjectEngineError::ObjectNotFound(
                    entry.path().display().to_string(),
                ))
            } else {
                Ok(())
            }
        });
        let err = walker.walk(&root, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ObjectEngineError::Aggregate(2)));
    }

    #[test]
    fn verify_file_checks_backing_blobs() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let id = write(store.clone(), &[0u8; 3005]);
        let walker = Walker::new(store, WalkerOptions::default(), |_| Ok(()));
        walker.verify_file(&id, None).unwrap();
    }
}
