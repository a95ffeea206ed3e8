//! Lightweight atomic counters shared by the writer and the walker,
//! surfaced by the CLI and by the walker's periodic stats output
//! (spec.md §4.6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Stats {
    pub processed: AtomicU64,
    pub bytes: AtomicU64,
    pub read_files: AtomicU64,
    pub read_bytes: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Stats::default())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            read_files: self.read_files.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub bytes: u64,
    pub read_files: u64,
    pub read_bytes: u64,
}

/// Periodically logs a [`Stats`] snapshot at `tracing::info!` level
/// until `stop` flips to true, throttled to at most once per `interval`.
pub struct Reporter {
    handle: Option<JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl Reporter {
    pub fn spawn(stats: Arc<Stats>, interval: Duration) -> Self {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut last = Instant::now();
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
                if last.elapsed() >= interval {
                    let s = stats.snapshot();
                    tracing::info!(
                        processed = s.processed,
                        bytes = s.bytes,
                        read_files = s.read_files,
                        read_bytes = s.read_bytes,
                        "walker progress"
                    );
                    last = Instant::now();
                }
            }
        });
        Reporter {
            handle: Some(handle),
            stop,
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let stats = Stats::new();
        stats.processed.fetch_add(3, Ordering::Relaxed);
        stats.bytes.fetch_add(100, Ordering::Relaxed);
        let snap = stats.snapshot();
        assert_eq!(snap.processed, 3);
        assert_eq!(snap.bytes, 100);
    }

    #[test]
    fn reporter_stops_cleanly_on_drop() {
        let stats = Stats::new();
        let reporter = Reporter::spawn(stats, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        drop(reporter);
    }
}
