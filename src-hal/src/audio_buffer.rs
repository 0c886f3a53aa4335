//! Lock-free audio rings shared by the output and input streams
//!
//! Both stream directions run on the HAL's real-time IO threads, so every
//! operation here is bounded, allocation-free and lock-free. Storage is
//! allocated once in the constructor and never resized.
//!
//! Two layouts sit behind [`SampleRing`]:
//! - [`SharedCursorRing`]: one cursor used by both roles. Writes land at the
//!   cursor without moving it; reads copy from the cursor and advance it.
//! - [`DualCursorRing`]: a classic SPSC ring with independent write and read
//!   cursors. A writer that laps the reader drags the read cursor forward,
//!   so the reader always sees the newest `capacity` samples.
//!
//! Memory ordering is weak on purpose: samples are relaxed atomics and carry
//! no happens-before edge. A reader racing a writer may observe a mix of old
//! and new samples in the same read; it never observes an out-of-bounds slot.

use atomic_float::AtomicF32;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Fixed-capacity interleaved sample ring used by the IO path
pub trait SampleRing: Send + Sync {
    /// Number of sample slots (frames * channels)
    fn capacity(&self) -> usize;

    /// Current read position, always `< capacity()`
    fn cursor(&self) -> usize;

    /// Copy `samples` into the ring; wraps and overwrites, never fails
    fn write(&self, samples: &[f32]);

    /// Fill `out` from the ring and advance the read position
    fn read(&self, out: &mut [f32]);

    /// Move the cursor(s) back to slot 0; sample contents are kept
    fn reset(&self);
}

fn allocate_slots(capacity: usize) -> Box<[AtomicF32]> {
    (0..capacity.max(1)).map(|_| AtomicF32::new(0.0)).collect()
}

#[inline(always)]
fn store_wrapping(slots: &[AtomicF32], start: usize, samples: &[f32]) {
    let n = slots.len();
    let mut index = start % n;
    for &sample in samples {
        slots[index].store(sample, Ordering::Relaxed);
        index += 1;
        if index == n {
            index = 0;
        }
    }
}

#[inline(always)]
fn load_wrapping(slots: &[AtomicF32], start: usize, out: &mut [f32]) {
    let n = slots.len();
    let mut index = start % n;
    for sample in out.iter_mut() {
        *sample = slots[index].load(Ordering::Relaxed);
        index += 1;
        if index == n {
            index = 0;
        }
    }
}

/// Single-cursor ring: the cursor only moves on read
pub struct SharedCursorRing {
    slots: Box<[AtomicF32]>,
    cursor: CachePadded<AtomicUsize>,
}

impl SharedCursorRing {
    /// Create a ring of `capacity` samples (at least one slot)
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: allocate_slots(capacity),
            cursor: CachePadded::new(AtomicUsize::new(0)),
        }
    }
}

impl SampleRing for SharedCursorRing {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    fn write(&self, samples: &[f32]) {
        let start = self.cursor.load(Ordering::Relaxed);
        store_wrapping(&self.slots, start, samples);
    }

    fn read(&self, out: &mut [f32]) {
        let start = self.cursor.load(Ordering::Relaxed);
        load_wrapping(&self.slots, start, out);
        let n = self.slots.len();
        let next = (start % n + out.len() % n) % n;
        self.cursor.store(next, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }
}

/// Two-cursor SPSC ring with overwrite-on-wrap
///
/// Positions are free-running sample counters; slot index is `pos % capacity`.
pub struct DualCursorRing {
    slots: Box<[AtomicF32]>,
    write_pos: CachePadded<AtomicU64>,
    read_pos: CachePadded<AtomicU64>,
}

impl DualCursorRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: allocate_slots(capacity),
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Unread samples, capped at capacity
    pub fn available(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Relaxed);
        w.saturating_sub(r).min(self.slots.len() as u64) as usize
    }
}

impl SampleRing for DualCursorRing {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn cursor(&self) -> usize {
        (self.read_pos.load(Ordering::Relaxed) % self.slots.len() as u64) as usize
    }

    fn write(&self, samples: &[f32]) {
        let n = self.slots.len() as u64;
        let w = self.write_pos.load(Ordering::Relaxed);
        // Only the newest `n` samples of an oversized write can survive
        let skip = (samples.len() as u64).saturating_sub(n);
        let start = w + skip;
        store_wrapping(&self.slots, (start % n) as usize, &samples[skip as usize..]);
        self.write_pos
            .store(w + samples.len() as u64, Ordering::Release);
    }

    fn read(&self, out: &mut [f32]) {
        let n = self.slots.len() as u64;
        let w = self.write_pos.load(Ordering::Acquire);
        let mut r = self.read_pos.load(Ordering::Relaxed);
        if w.saturating_sub(r) > n {
            // Lapped: the oldest surviving sample is `w - n`
            r = w - n;
        }
        let take = (w.saturating_sub(r) as usize).min(out.len());
        let (filled, silent) = out.split_at_mut(take);
        load_wrapping(&self.slots, (r % n) as usize, filled);
        silent.fill(0.0);
        self.read_pos.store(r + take as u64, Ordering::Release);
    }

    fn reset(&self) {
        self.write_pos.store(0, Ordering::Relaxed);
        self.read_pos.store(0, Ordering::Relaxed);
    }
}
