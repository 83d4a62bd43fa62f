//! Bounded, backpressure-aware FIFO between pipeline stages.
//!
//! Strict FIFO, fixed capacity, bounded or blocking pushes/pops. Built on
//! `crossbeam-channel`'s bounded channel, which already provides the
//! `send_timeout`/`recv_timeout` primitives this contract needs.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::error::QueueError;

pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    closed: std::sync::atomic::AtomicBool,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx,
            rx,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Block up to `timeout` attempting to enqueue. Returns `Full` on
    /// timeout, `Closed` if the queue has been closed.
    pub fn try_push(&self, item: T, timeout: Duration) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        match self.tx.send_timeout(item, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                if self.is_closed() {
                    Err(QueueError::Closed)
                } else {
                    Err(QueueError::Full)
                }
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(QueueError::Closed),
        }
    }

    /// Block indefinitely until the item is enqueued or the queue closes.
    /// Used by the Worker Stage, which is not on the real-time path.
    pub fn push_blocking(&self, item: T) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.tx.send(item).map_err(|_| QueueError::Closed)
    }

    /// Block up to `timeout` attempting to dequeue. Returns `Empty` on
    /// timeout, `Closed` once the queue is closed and drained.
    pub fn try_pop(&self, timeout: Duration) -> Result<T, QueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(item),
            Err(RecvTimeoutError::Timeout) => {
                if self.is_closed() {
                    Err(QueueError::Closed)
                } else {
                    Err(QueueError::Empty)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Mark the queue closed. Already-queued items remain poppable; new
    /// pushes fail and blocked waiters observe `Closed` at their next
    /// timeout tick.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stays_within_capacity() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        assert!(q.try_push(1, Duration::from_millis(10)).is_ok());
        assert!(q.try_push(2, Duration::from_millis(10)).is_ok());
        assert!(matches!(
            q.try_push(3, Duration::from_millis(10)),
            Err(QueueError::Full)
        ));
        assert_eq!(q.len(), 2);
        assert!(q.len() <= q.capacity());
    }

    #[test]
    fn close_rejects_subsequent_pushes() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.close();
        assert!(matches!(
            q.try_push(1, Duration::from_millis(10)),
            Err(QueueError::Closed)
        ));
    }

    #[test]
    fn fifo_order_preserved() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        for i in 0..4 {
            q.try_push(i, Duration::from_millis(10)).unwrap();
        }
        for i in 0..4 {
            assert_eq!(q.try_pop(Duration::from_millis(10)).unwrap(), i);
        }
    }
}
