//! Bounded queue with drop-oldest backpressure.

use endoguide_core::{EndoGuideError, Frame, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Result of a [`DropOldestQueue::push`].
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    Accepted,
    /// The queue was full; the returned item was evicted to make room.
    ReplacedOldest(T),
}

impl<T> PushOutcome<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// The evicted item, if any.
    pub fn evicted(self) -> Option<T> {
        match self {
            Self::Accepted => None,
            Self::ReplacedOldest(item) => Some(item),
        }
    }
}

/// Fixed-capacity FIFO shared between threads.
///
/// Freshness beats completeness: when the queue is full, `push` evicts the
/// oldest entry instead of blocking the producer, so consumers always work
/// on the most recent frames. `push` never blocks; `pop_timeout` blocks for
/// at most its timeout.
pub struct DropOldestQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

/// Input queue of the stream processor.
pub type FrameQueue = DropOldestQueue<Frame>;

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EndoGuideError::config("queue capacity must be at least 1"));
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        })
    }

    /// Append an item, evicting the oldest one when full.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let outcome = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        self.not_empty.notify_one();

        match outcome {
            Some(old) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::ReplacedOldest(old)
            }
            None => PushOutcome::Accepted,
        }
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.is_empty() {
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        items.pop_front()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wake every waiter so it can re-check external conditions.
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for DropOldestQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropOldestQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count())
            .finish()
    }
}
