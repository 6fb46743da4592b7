//! Async mailbox queues.
//!
//! [`AsyncQueue`] mirrors [`Queue`](crate::queue::Queue) for tasks on a tokio
//! runtime: `put` and `get` suspend the calling task instead of blocking the
//! thread. The internal lock is never held across an await point.

use crate::error::MailboxError;
use crate::queue::{Fifo, Lifo, Priority, Store, UNBOUNDED};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time;

/// An async FIFO queue.
pub type AsyncFifoQueue<I> = AsyncQueue<I, Fifo<I>>;

/// An async LIFO queue.
pub type AsyncLifoQueue<I> = AsyncQueue<I, Lifo<I>>;

/// An async priority queue, smallest item first.
pub type AsyncPriorityQueue<I> = AsyncQueue<I, Priority<I>>;

/// A queue whose blocking operations suspend the current task.
pub struct AsyncQueue<I, S = Fifo<I>> {
    items: Mutex<S>,
    maxsize: usize,
    not_empty: Notify,
    not_full: Notify,
    _item: PhantomData<fn(I) -> I>,
}

impl<I, S: Store<I>> AsyncQueue<I, S> {
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
            not_empty: Notify::new(),
            not_full: Notify::new(),
            _item: PhantomData,
        }
    }

    /// Name of this queue kind.
    #[must_use]
    pub fn kind() -> &'static str {
        S::ASYNC_KIND
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
    /// `None` waits indefinitely. If the returned future is dropped before
    /// completing, the item is dropped too.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if no slot became free in time.
    pub async fn put(&self, item: I, timeout: Option<Duration>) -> Result<(), MailboxError> {
        match timeout {
            Some(timeout) => time::timeout(timeout, self.put_wait(item))
                .await
                .map_err(|_| MailboxError::Full),
            None => {
                self.put_wait(item).await;
                Ok(())
            }
        }
    }

    /// Put an item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the queue is at capacity.
    pub fn try_put(&self, item: I) -> Result<(), MailboxError> {
        self.push(item).map_err(|_| MailboxError::Full)
    }

    /// Get the next item, waiting up to `timeout` for one to arrive.
    ///
    /// `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] if nothing arrived in time.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<I, MailboxError> {
        match timeout {
            Some(timeout) => time::timeout(timeout, self.get_wait())
                .await
                .map_err(|_| MailboxError::Empty),
            None => Ok(self.get_wait().await),
        }
    }

    /// Get the next item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] if the queue is empty.
    pub fn try_get(&self) -> Result<I, MailboxError> {
        self.pop().ok_or(MailboxError::Empty)
    }

    async fn put_wait(&self, mut item: I) {
        loop {
            // Register interest before checking so a concurrent get is not missed.
            let notified = self.not_full.notified();
            match self.push(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            notified.await;
        }
    }

    async fn get_wait(&self) -> I {
        loop {
            let notified = self.not_empty.notified();
            if let Some(item) = self.pop() {
                return item;
            }
            notified.await;
        }
    }

    /// Push if there is room, handing the item back otherwise.
    fn push(&self, item: I) -> Result<(), I> {
        let mut items = self.items.lock();
        if self.maxsize != UNBOUNDED && items.len() >= self.maxsize {
            return Err(item);
        }
        items.push(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<I> {
        let item = self.items.lock().pop()?;
        self.not_full.notify_one();
        Some(item)
    }
}

impl<I, S: Store<I>> Default for AsyncQueue<I, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, S: Store<I>> fmt::Debug for AsyncQueue<I, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::ASYNC_KIND)
            .field("len", &self.len())
            .field("maxsize", &self.maxsize)
            .finish()
    }
}
