//! A small counting semaphore for gating the writer's in-flight async
//! write tasks. `rayon` has no bundled primitive for this, so it's
//! hand-rolled on top of `Condvar`, the smallest correct building
//! block for a bounded task pool over a shared thread pool.

use std::sync::{Arc, Condvar, Mutex};

pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Arc<Self> {
        Arc::new(Semaphore {
            state: Mutex::new(permits),
            cond: Condvar::new(),
        })
    }

    /// Block until a permit is available, then take it. The guard owns
    /// a clone of the `Arc`, so it can be moved into a spawned task
    /// and release the permit when that task finishes.
    pub fn acquire(self: &Arc<Self>) -> SemaphoreGuard {
        let mut count = self.state.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
        drop(count);
        SemaphoreGuard { sem: self.clone() }
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }
}

/// Releases its permit on drop, including on panic unwind, so a
/// failed async task can never leak a permit.
pub struct SemaphoreGuard {
    sem: Arc<Semaphore>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        self.sem.release();
    }
}

/// Waits for a known number of in-flight tasks to report completion,
/// the writer's async join point (`result` / `close`).
pub struct WaitGroup {
    state: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        WaitGroup {
            state: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn add(&self, n: usize) {
        *self.state.lock().unwrap() += n;
    }

    pub fn done(&self) {
        let mut count = self.state.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.state.lock().unwrap();
        while *count != 0 {
            count = self.cond.wait(count).unwrap();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn semaphore_bounds_concurrency() {
        let sem = Semaphore::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let wg = Arc::new(WaitGroup::new());
        wg.add(8);
        for _ in 0..8 {
            let sem = sem.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let wg = wg.clone();
            rayon::spawn(move || {
                let _permit = sem.acquire();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                wg.done();
            });
        }
        wg.wait();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
