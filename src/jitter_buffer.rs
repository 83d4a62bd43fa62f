//! Fixed-capacity FIFO of PCM chunks smoothing the worker's bursty
//! emission against the output device's periodic drain.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct JitterBuffer {
    inner: Mutex<VecDeque<Vec<f32>>>,
    capacity_chunks: usize,
}

impl JitterBuffer {
    /// `target_ms` worth of audio at `sample_rate`, expressed as a number
    /// of `chunk_samples`-sized chunks (minimum of one).
    pub fn new(target_ms: u32, sample_rate: u32, chunk_samples: usize) -> Self {
        let target_samples = (sample_rate as u64 * target_ms as u64 / 1000) as usize;
        let capacity_chunks = (target_samples / chunk_samples.max(1)).max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity_chunks)),
            capacity_chunks,
        }
    }

    /// Push a chunk; drops the oldest chunk if at capacity rather than
    /// blocking the worker (the worker already has its own unbounded wait
    /// on D2 upstream of this buffer).
    pub fn push(&self, chunk: Vec<f32>) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity_chunks {
            guard.pop_front();
        }
        guard.push_back(chunk);
    }

    pub fn pop(&self) -> Option<Vec<f32>> {
        self.inner.lock().pop_front()
    }

    pub fn flush(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conserves_samples_pushed_in_equals_popped_out() {
        let jb = JitterBuffer::new(250, 44_100, 1024);
        let mut total_in = 0usize;
        for i in 0..5 {
            let chunk = vec![i as f32; 1024];
            total_in += chunk.len();
            jb.push(chunk);
        }
        let mut total_out = 0usize;
        while let Some(chunk) = jb.pop() {
            total_out += chunk.len();
        }
        assert_eq!(total_in, total_out);
    }

    #[test]
    fn flush_empties_buffer() {
        let jb = JitterBuffer::new(250, 44_100, 1024);
        jb.push(vec![0.0; 1024]);
        jb.flush();
        assert!(jb.is_empty());
    }
}
