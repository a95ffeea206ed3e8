use once_cell::sync::Lazy;

use super::Splitter;

const WINDOW: usize = 64;

/// Fixed per-byte hash table, generated once from a deterministic
/// seed so the same bytes always produce the same cut points, in this
/// process and in any other run of this code.
static TABLE: Lazy<[u64; 256]> = Lazy::new(|| {
    let mut table = [0u64; 256];
    let mut state: u64 = 0x9e3779b97f4a7c15;
    for slot in table.iter_mut() {
        state = state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        *slot = z ^ (z >> 31);
    }
    table
});

/// Content-defined splitter using a rolling hash over a 64-byte
/// window. The window length equals the hash width (64 bits), so the
/// outgoing byte's contribution can be removed with a plain XOR
/// instead of a rotated one (`rol(x, 64) == x`).
pub struct Buzhash {
    window: [u8; WINDOW],
    pos: usize,
    filled: usize,
    hash: u64,
    count: usize,
    min: usize,
    max: usize,
    mask: u64,
}

impl Buzhash {
    pub fn new(avg: usize) -> Self {
        let avg = avg.max(WINDOW);
        let min = avg / 4;
        let max = avg * 4;
        // mask selects roughly 1-in-avg cut points.
        let mask = (avg.next_power_of_two() as u64).saturating_sub(1);
        Buzhash {
            window: [0u8; WINDOW],
            pos: 0,
            filled: 0,
            hash: 0,
            count: 0,
            min,
            max,
            mask,
        }
    }
}

impl Splitter for Buzhash {
    fn max_segment_size(&self) -> usize {
        self.max
    }

    fn should_split(&mut self, byte: u8) -> bool {
        let outgoing = self.window[self.pos];
        self.window[self.pos] = byte;
        self.pos = (self.pos + 1) % WINDOW;

        self.hash = self.hash.rotate_left(1) ^ TABLE[byte as usize];
        if self.filled == WINDOW {
            self.hash ^= TABLE[outgoing as usize];
        } else {
            self.filled += 1;
        }

        self.count += 1;
        if self.count >= self.max {
            self.reset();
            return true;
        }
        if self.count >= self.min && (self.hash & self.mask) == 0 {
            self.reset();
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.window = [0u8; WINDOW];
        self.pos = 0;
        self.filled = 0;
        self.hash = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_instances() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let cut_points = |avg: usize| {
            let mut b = Buzhash::new(avg);
            let mut cuts = Vec::new();
            for (i, &byte) in data.iter().enumerate() {
                if b.should_split(byte) {
                    cuts.push(i + 1);
                }
            }
            cuts
        };
        assert_eq!(cut_points(4096), cut_points(4096));
    }

    #[test]
    fn respects_hard_maximum() {
        let mut b = Buzhash::new(1024);
        let max = b.max_segment_size();
        let zeros = vec![0u8; max * 2];
        let mut last_cut = 0usize;
        for (i, &byte) in zeros.iter().enumerate() {
            if b.should_split(byte) {
                assert!(i + 1 - last_cut <= max);
                last_cut = i + 1;
            }
        }
    }
}
