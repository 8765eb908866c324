//! Bounded blocking message queue connecting pipeline nodes.
//!
//! Every node owns one [`MessageQueue`]; upstream stages push into it and the
//! node's worker threads pop from it. The queue provides the backpressure and
//! shutdown semantics the node state machine relies on: `push` blocks while
//! the queue is full, `pop` blocks while it is empty, and `terminate` wakes
//! every waiter, lets pops drain the remaining items, then reports closure.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Counters sampled from a queue, reported through node stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Configured capacity.
    pub capacity: usize,
    /// Total items pushed over the queue's lifetime (across restarts).
    pub total_pushed: u64,
    /// Highest occupancy observed.
    pub max_size_observed: usize,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    terminate: bool,
    total_pushed: u64,
    max_size_observed: usize,
}

/// A bounded FIFO queue with blocking push/pop and drain-on-terminate.
///
/// Items are delivered in arrival order at the lock. After [`terminate`]
/// pushes are refused (the item is handed back) while pops continue to drain
/// whatever is buffered and then return `None`. [`restart`] reopens the queue
/// for another processing cycle.
///
/// [`terminate`]: MessageQueue::terminate
/// [`restart`]: MessageQueue::restart
pub struct MessageQueue<T> {
    capacity: usize,
    inner: Mutex<QueueInner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> MessageQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// A zero capacity would block every push forever, so it is raised to 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                terminate: false,
                total_pushed: 0,
                max_size_observed: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes an item, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the item back when the queue is terminating, whether the
    /// termination arrived before the call or while it was blocked.
    pub fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity && !inner.terminate {
            self.not_full.wait(&mut inner);
        }
        if inner.terminate {
            return Err(item);
        }
        inner.items.push_back(item);
        inner.total_pushed += 1;
        if inner.items.len() > inner.max_size_observed {
            inner.max_size_observed = inner.items.len();
        }
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` only once the queue is terminating and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while inner.items.is_empty() && !inner.terminate {
            self.not_empty.wait(&mut inner);
        }
        let item = inner.items.pop_front();
        drop(inner);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Requests termination: wakes all waiters; subsequent pushes are refused
    /// and pops drain the remaining items before returning `None`.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.terminate = true;
        drop(inner);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Reopens a terminated queue so it can carry another processing cycle.
    pub fn restart(&self) {
        self.inner.lock().terminate = false;
    }

    /// Current number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the queue currently holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the queue's lifetime counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            capacity: self.capacity,
            total_pushed: inner.total_pushed,
            max_size_observed: inner.max_size_observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::with_capacity(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue = MessageQueue::with_capacity(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(42).unwrap();
        assert_eq!(queue.pop(), Some(42));
    }

    #[test]
    fn test_push_blocks_until_capacity_frees() {
        let queue = Arc::new(MessageQueue::with_capacity(1));
        queue.push(1u32).unwrap();

        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.pop()
            })
        };

        // Blocks until the popper frees a slot.
        queue.push(2).unwrap();
        assert_eq!(popper.join().unwrap(), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_pop_blocks_until_item_arrives() {
        let queue = Arc::new(MessageQueue::with_capacity(4));

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(7u32).unwrap();
            })
        };

        assert_eq!(queue.pop(), Some(7));
        pusher.join().unwrap();
    }

    #[test]
    fn test_terminate_drains_then_closes() {
        let queue = MessageQueue::with_capacity(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        queue.terminate();

        // Remaining items drain in order, then the queue reports closure.
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_after_terminate_returns_item() {
        let queue = MessageQueue::with_capacity(2);
        queue.terminate();
        assert_eq!(queue.push(9u32), Err(9));
    }

    #[test]
    fn test_terminate_wakes_blocked_push() {
        let queue = Arc::new(MessageQueue::with_capacity(1));
        queue.push(1u32).unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        thread::sleep(Duration::from_millis(50));
        queue.terminate();
        assert_eq!(pusher.join().unwrap(), Err(2));
    }

    #[test]
    fn test_restart_reopens_queue() {
        let queue = MessageQueue::with_capacity(4);
        queue.push(1u32).unwrap();
        queue.terminate();
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);

        queue.restart();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(2));

        // Counters persist across the restart.
        assert_eq!(queue.stats().total_pushed, 2);
    }

    #[test]
    fn test_stats_track_occupancy() {
        let queue = MessageQueue::with_capacity(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        queue.pop();

        let stats = queue.stats();
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.total_pushed, 3);
        assert_eq!(stats.max_size_observed, 3);
    }

    #[test]
    fn test_many_producers_one_consumer() {
        let queue = Arc::new(MessageQueue::with_capacity(4));
        let mut producers = vec![];
        for t in 0..4u32 {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in 0..100u32 {
                    queue.push(t * 1000 + i).unwrap();
                }
            }));
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop() {
                    seen.push(item);
                }
                seen
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        queue.terminate();
        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), 400);

        // Per-producer order is preserved even though interleaving is not.
        for t in 0..4u32 {
            let from_t: Vec<u32> = seen.iter().copied().filter(|v| v / 1000 == t).collect();
            assert_eq!(from_t.len(), 100);
            assert!(from_t.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
