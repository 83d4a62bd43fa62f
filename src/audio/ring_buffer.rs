//! Lock-free single-producer/single-consumer ring buffer for capture audio.
//!
//! Samples and their timestamps are kept in lock-step without a per-sample
//! lock: each `append` records one `(start_index, timestamp)` anchor, and
//! any sample's wall-clock time is derived from the nearest preceding
//! anchor by sample-count offset.

use std::collections::VecDeque;
use std::time::Instant;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

#[derive(Debug, Clone, Copy)]
struct Anchor {
    /// Monotonically increasing sample index of the first sample in the block.
    start_index: u64,
    timestamp: Instant,
}

/// Owns both halves; single-threaded within the Capture Stage, per §4.1.
pub struct RingBuffer {
    prod: HeapProd<i16>,
    cons: HeapCons<i16>,
    capacity: usize,
    sample_rate: u32,
    next_index: u64,
    /// Oldest retained sample's global index; used to translate `tail()`
    /// windows and to drop anchors that have scrolled out of the buffer.
    oldest_index: u64,
    anchors: VecDeque<Anchor>,
}

impl RingBuffer {
    pub fn new(sample_rate: u32, duration_secs: f32) -> Self {
        let capacity = ((sample_rate as f32) * duration_secs).ceil() as usize;
        let rb = HeapRb::<i16>::new(capacity.max(1));
        let (prod, cons) = rb.split();
        Self {
            prod,
            cons,
            capacity,
            sample_rate,
            next_index: 0,
            oldest_index: 0,
            anchors: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Append a block of samples with a single base timestamp for the block.
    /// Overwrites the oldest samples on overflow.
    pub fn append(&mut self, samples: &[i16], base_timestamp: Instant) {
        if samples.is_empty() {
            return;
        }
        self.anchors.push_back(Anchor {
            start_index: self.next_index,
            timestamp: base_timestamp,
        });

        // `ringbuf` does not overwrite on its own: make room for the
        // incoming block by dropping the oldest samples first.
        let incoming = samples.len().min(self.capacity);
        let occupied = self.cons.occupied_len();
        let free = self.capacity - occupied;
        if incoming > free {
            self.cons.skip(incoming - free);
        }
        let pushed = self.prod.push_slice(&samples[samples.len() - incoming..]);
        debug_assert_eq!(pushed, incoming, "ring buffer push_slice should never be short after making room");
        self.next_index += samples.len() as u64;

        let occupied = self.cons.occupied_len() as u64;
        self.oldest_index = self.next_index.saturating_sub(occupied);

        while let Some(anchor) = self.anchors.front() {
            if anchor.start_index + 1 < self.oldest_index {
                self.anchors.pop_front();
            } else {
                break;
            }
        }
    }

    /// Copy the most recent `duration` of samples; fewer if unavailable.
    pub fn tail(&mut self, duration_secs: f32) -> Vec<i16> {
        let want = ((self.sample_rate as f32) * duration_secs).ceil() as usize;
        let available = self.cons.occupied_len();
        let take = want.min(available);
        if take == 0 {
            return Vec::new();
        }

        let skip = available - take;
        let mut scratch = vec![0i16; available];
        let read = self.cons.pop_slice(&mut scratch);
        scratch.truncate(read);

        let written = self.prod.push_slice(&scratch);
        debug_assert_eq!(written, scratch.len());

        scratch.split_off(skip.min(scratch.len()))
    }

    /// Timestamp of the sample at global index `idx`, derived from the
    /// nearest anchor at or before it.
    pub fn timestamp_at(&self, idx: u64) -> Option<Instant> {
        let anchor = self.anchors.iter().rev().find(|a| a.start_index <= idx)?;
        let offset_samples = idx.saturating_sub(anchor.start_index);
        let offset_nanos = (offset_samples as u64)
            .saturating_mul(1_000_000_000)
            .checked_div(self.sample_rate as u64)?;
        Some(anchor.timestamp + std::time::Duration::from_nanos(offset_nanos))
    }

    pub fn clear(&mut self) {
        self.cons.clear();
        self.anchors.clear();
        self.oldest_index = self.next_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_tail_roundtrip() {
        let mut rb = RingBuffer::new(16_000, 1.0);
        let samples: Vec<i16> = (0..1000).map(|i| i as i16).collect();
        rb.append(&samples, Instant::now());
        let tail = rb.tail(1.0);
        assert_eq!(tail, samples);
    }

    #[test]
    fn overflow_overwrites_oldest() {
        let mut rb = RingBuffer::new(10, 1.0);
        let first: Vec<i16> = (0..10).collect();
        let second: Vec<i16> = (10..15).collect();
        rb.append(&first, Instant::now());
        rb.append(&second, Instant::now());
        let tail = rb.tail(1.0);
        assert_eq!(tail, vec![5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn tail_returns_all_when_fewer_available() {
        let mut rb = RingBuffer::new(16_000, 1.0);
        let samples: Vec<i16> = vec![1, 2, 3];
        rb.append(&samples, Instant::now());
        assert_eq!(rb.tail(1.0), samples);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut rb = RingBuffer::new(16_000, 1.0);
        rb.append(&[1, 2, 3], Instant::now());
        rb.clear();
        assert!(rb.tail(1.0).is_empty());
    }
}
