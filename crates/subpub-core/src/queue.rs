//! Blocking mailbox queues.
//!
//! [`Queue`] is a thread-safe container with blocking, timeout-bounded `put`
//! and `get`. The storage discipline is pluggable through [`Store`]:
//! first-in first-out ([`Fifo`]), last-in first-out ([`Lifo`]) or smallest
//! first ([`Priority`]).

use crate::error::MailboxError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

/// Capacity meaning "no bound".
pub const UNBOUNDED: usize = 0;

/// Storage discipline for mailbox queues.
pub trait Store<I>: Default + Send {
    /// Name of the blocking queue using this store.
    const KIND: &'static str;
    /// Name of the async queue using this store.
    const ASYNC_KIND: &'static str;

    /// Add an item.
    fn push(&mut self, item: I);

    /// Remove the next item.
    fn pop(&mut self) -> Option<I>;

    /// Number of stored items.
    fn len(&self) -> usize;

    /// Check if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First in, first out.
#[derive(Debug)]
pub struct Fifo<I>(VecDeque<I>);

impl<I> Default for Fifo<I> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<I: Send> Store<I> for Fifo<I> {
    const KIND: &'static str = "Queue";
    const ASYNC_KIND: &'static str = "AsyncQueue";

    fn push(&mut self, item: I) {
        self.0.push_back(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.0.pop_front()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Last in, first out.
#[derive(Debug)]
pub struct Lifo<I>(Vec<I>);

impl<I> Default for Lifo<I> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<I: Send> Store<I> for Lifo<I> {
    const KIND: &'static str = "LifoQueue";
    const ASYNC_KIND: &'static str = "AsyncLifoQueue";

    fn push(&mut self, item: I) {
        self.0.push(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.0.pop()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Smallest item first.
#[derive(Debug)]
pub struct Priority<I: Ord>(BinaryHeap<Reverse<I>>);

impl<I: Ord> Default for Priority<I> {
    fn default() -> Self {
        Self(BinaryHeap::new())
    }
}

impl<I: Ord + Send> Store<I> for Priority<I> {
    const KIND: &'static str = "PriorityQueue";
    const ASYNC_KIND: &'static str = "AsyncPriorityQueue";

    fn push(&mut self, item: I) {
        self.0.push(Reverse(item));
    }

    fn pop(&mut self) -> Option<I> {
        self.0.pop().map(|Reverse(item)| item)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// A blocking FIFO queue.
pub type FifoQueue<I> = Queue<I, Fifo<I>>;

/// A blocking LIFO queue.
pub type LifoQueue<I> = Queue<I, Lifo<I>>;

/// A blocking priority queue, smallest item first.
pub type PriorityQueue<I> = Queue<I, Priority<I>>;

/// A thread-safe queue with blocking, timeout-bounded operations.
pub struct Queue<I, S = Fifo<I>> {
    items: Mutex<S>,
    maxsize: usize,
    not_empty: Condvar,
    not_full: Condvar,
    _item: PhantomData<fn(I) -> I>,
}

impl<I, S: Store<I>> Queue<I, S> {
    /// Create an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::bounded(UNBOUNDED)
    }

    /// Create a queue holding at most `maxsize` items. Zero means unbounded.
    #[must_use]
    pub fn bounded(maxsize: usize) -> Self {
        Self {
            items: Mutex::new(S::default()),
            maxsize,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            _item: PhantomData,
        }
    }

    /// Name of this queue kind.
    #[must_use]
    pub fn kind() -> &'static str {
        S::KIND
    }

    /// Get the capacity. Zero means unbounded.
    #[must_use]
    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Get the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Check if the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.maxsize != UNBOUNDED && self.len() >= self.maxsize
    }

    /// Put an item, waiting up to `timeout` for a free slot.
    ///
    /// `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if no slot became free in time.
    pub fn put(&self, item: I, timeout: Option<Duration>) -> Result<(), MailboxError> {
        let mut items = self.items.lock();
        let maxsize = self.maxsize;
        let has_room = wait_until(&self.not_full, &mut items, deadline(timeout), |items| {
            maxsize == UNBOUNDED || items.len() < maxsize
        });
        if !has_room {
            return Err(MailboxError::Full);
        }

        items.push(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Put an item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the queue is at capacity.
    pub fn try_put(&self, item: I) -> Result<(), MailboxError> {
        self.put(item, Some(Duration::ZERO))
    }

    /// Get the next item, waiting up to `timeout` for one to arrive.
    ///
    /// `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] if nothing arrived in time.
    pub fn get(&self, timeout: Option<Duration>) -> Result<I, MailboxError> {
        let mut items = self.items.lock();
        if !wait_until(&self.not_empty, &mut items, deadline(timeout), |items| {
            !items.is_empty()
        }) {
            return Err(MailboxError::Empty);
        }

        let item = items.pop().ok_or(MailboxError::Empty)?;
        drop(items);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Get the next item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] if the queue is empty.
    pub fn try_get(&self) -> Result<I, MailboxError> {
        self.get(Some(Duration::ZERO))
    }
}

impl<I, S: Store<I>> Default for Queue<I, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, S: Store<I>> fmt::Debug for Queue<I, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::KIND)
            .field("len", &self.len())
            .field("maxsize", &self.maxsize)
            .finish()
    }
}

/// Turn a relative timeout into a deadline. `None` means no deadline.
fn deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

/// Wait on `condvar` until `ready` holds or the deadline passes.
///
/// Returns whether `ready` holds on return.
fn wait_until<S>(
    condvar: &Condvar,
    guard: &mut MutexGuard<'_, S>,
    deadline: Option<Instant>,
    ready: impl Fn(&S) -> bool,
) -> bool {
    while !ready(&**guard) {
        match deadline {
            Some(deadline) => {
                if condvar.wait_until(guard, deadline).timed_out() {
                    return ready(&**guard);
                }
            }
            None => condvar.wait(guard),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = FifoQueue::new();
        for i in 0..3 {
            queue.try_put(i).unwrap();
        }
        assert_eq!(queue.len(), 3);
        let drained: Vec<i32> = (0..3).map(|_| queue.try_get().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lifo_order() {
        let queue = LifoQueue::new();
        for i in 0..3 {
            queue.try_put(i).unwrap();
        }
        let drained: Vec<i32> = (0..3).map(|_| queue.try_get().unwrap()).collect();
        assert_eq!(drained, vec![2, 1, 0]);
    }

    #[test]
    fn test_priority_order() {
        let queue = PriorityQueue::new();
        for i in [5, 1, 3] {
            queue.try_put(i).unwrap();
        }
        let drained: Vec<i32> = (0..3).map(|_| queue.try_get().unwrap()).collect();
        assert_eq!(drained, vec![1, 3, 5]);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FifoQueue::<u8>::kind(), "Queue");
        assert_eq!(LifoQueue::<u8>::kind(), "LifoQueue");
        assert_eq!(PriorityQueue::<u8>::kind(), "PriorityQueue");
    }

    #[test]
    fn test_bounded_put_full() {
        let queue = FifoQueue::bounded(1);
        queue.try_put("Pollux").unwrap();
        assert!(queue.is_full());
        assert!(matches!(queue.try_put("Castor"), Err(MailboxError::Full)));
        assert!(matches!(
            queue.put("Castor", Some(Duration::from_millis(1))),
            Err(MailboxError::Full)
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_put_waits_for_timeout() {
        let queue = FifoQueue::bounded(1);
        queue.try_put(1).unwrap();

        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        assert!(queue.put(2, Some(timeout)).is_err());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_get_empty() {
        let queue: FifoQueue<i32> = FifoQueue::new();
        assert!(matches!(queue.try_get(), Err(MailboxError::Empty)));
        assert!(matches!(
            queue.get(Some(Duration::from_millis(1))),
            Err(MailboxError::Empty)
        ));
    }

    #[test]
    fn test_get_wakes_on_put() {
        let queue = Arc::new(FifoQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.try_put(404).unwrap();
            })
        };

        assert_eq!(queue.get(None).unwrap(), 404);
        producer.join().unwrap();
    }

    #[test]
    fn test_put_wakes_on_get() {
        let queue = Arc::new(FifoQueue::bounded(1));
        queue.try_put(1).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.try_get().unwrap()
            })
        };

        queue.put(2, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(consumer.join().unwrap(), 1);
        assert_eq!(queue.try_get().unwrap(), 2);
    }

    #[test]
    fn test_zero_maxsize_is_unbounded() {
        let queue = FifoQueue::bounded(UNBOUNDED);
        for i in 0..1000 {
            queue.try_put(i).unwrap();
        }
        assert!(!queue.is_full());
    }
}
