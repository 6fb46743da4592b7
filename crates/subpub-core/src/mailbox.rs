//! Mailbox capabilities.
//!
//! The broker only ever puts into a mailbox; getting is left to the consumer
//! holding it. [`Mailbox`] is the blocking capability used by
//! [`SubPub`](crate::SubPub), [`AsyncMailbox`] the suspending one used by
//! [`AsyncSubPub`](crate::AsyncSubPub).
//!
//! The fault-aware decorators carry `Result<T, Fault>` payloads and hand a
//! delivered [`Fault`] back to the consumer as an error on retrieval.

use crate::async_queue::AsyncQueue;
use crate::error::MailboxError;
use crate::message::{Fault, Message};
use crate::queue::{Fifo, Queue, Store};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// A mailbox the broker can deliver into from any thread.
pub trait Mailbox<T>: Send + Sync + 'static {
    /// Deliver a message, waiting up to `timeout` for room. `None` waits
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    fn put(&self, message: Message<T>, timeout: Option<Duration>) -> Result<(), MailboxError>;

    /// Name reported for factories producing this mailbox.
    fn kind() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// A mailbox the broker can deliver into from async tasks.
#[async_trait]
pub trait AsyncMailbox<T>: Send + Sync + 'static {
    /// Deliver a message, suspending up to `timeout` for room. `None` waits
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    async fn put(&self, message: Message<T>, timeout: Option<Duration>)
        -> Result<(), MailboxError>;

    /// Name reported for factories producing this mailbox.
    fn kind() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

impl<T, S> Mailbox<T> for Queue<Message<T>, S>
where
    T: Send + 'static,
    S: Store<Message<T>> + 'static,
{
    fn put(&self, message: Message<T>, timeout: Option<Duration>) -> Result<(), MailboxError> {
        Queue::put(self, message, timeout)
    }

    fn kind() -> &'static str {
        Queue::<Message<T>, S>::kind()
    }
}

#[async_trait]
impl<T, S> AsyncMailbox<T> for AsyncQueue<Message<T>, S>
where
    T: Send + 'static,
    S: Store<Message<T>> + 'static,
{
    async fn put(
        &self,
        message: Message<T>,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        AsyncQueue::put(self, message, timeout).await
    }

    fn kind() -> &'static str {
        AsyncQueue::<Message<T>, S>::kind()
    }
}

/// Queue entry of a fault-aware mailbox: a message or a raw fault.
pub type FaultEntry<T> = Result<Message<T>, Fault>;

/// A blocking mailbox that raises delivered faults on retrieval.
pub struct FaultAwareQueue<T, S = Fifo<FaultEntry<T>>> {
    inner: Queue<FaultEntry<T>, S>,
}

impl<T, S: Store<FaultEntry<T>>> FaultAwareQueue<T, S> {
    /// Create an unbounded mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Queue::new() }
    }

    /// Create a mailbox holding at most `maxsize` entries.
    #[must_use]
    pub fn bounded(maxsize: usize) -> Self {
        Self {
            inner: Queue::bounded(maxsize),
        }
    }

    /// Get the number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the mailbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Put a message, as the wrapped queue would.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    pub fn put(
        &self,
        message: Message<Result<T, Fault>>,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        self.inner.put(message.transpose(), timeout)
    }

    /// Put a fault that is not tied to any topic.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    pub fn put_fault(&self, fault: Fault, timeout: Option<Duration>) -> Result<(), MailboxError> {
        self.inner.put(Err(fault), timeout)
    }

    /// Get the next message, failing with any fault delivered in its place.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] on timeout or [`MailboxError::Fault`]
    /// if the next entry is a fault.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Message<T>, MailboxError> {
        Ok(self.inner.get(timeout)??)
    }

    /// Get the next message without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`FaultAwareQueue::get`].
    pub fn try_get(&self) -> Result<Message<T>, MailboxError> {
        Ok(self.inner.try_get()??)
    }
}

impl<T, S: Store<FaultEntry<T>>> Default for FaultAwareQueue<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Store<FaultEntry<T>>> fmt::Debug for FaultAwareQueue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultAwareQueue")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<T, S> Mailbox<Result<T, Fault>> for FaultAwareQueue<T, S>
where
    T: Send + 'static,
    S: Store<FaultEntry<T>> + 'static,
{
    fn put(
        &self,
        message: Message<Result<T, Fault>>,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        FaultAwareQueue::put(self, message, timeout)
    }

    fn kind() -> &'static str {
        "FaultAwareQueue"
    }
}

/// An async mailbox that raises delivered faults on retrieval.
pub struct AsyncFaultAwareQueue<T, S = Fifo<FaultEntry<T>>> {
    inner: AsyncQueue<FaultEntry<T>, S>,
}

impl<T, S: Store<FaultEntry<T>>> AsyncFaultAwareQueue<T, S> {
    /// Create an unbounded mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: AsyncQueue::new(),
        }
    }

    /// Create a mailbox holding at most `maxsize` entries.
    #[must_use]
    pub fn bounded(maxsize: usize) -> Self {
        Self {
            inner: AsyncQueue::bounded(maxsize),
        }
    }

    /// Get the number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the mailbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Put a message, as the wrapped queue would.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    pub async fn put(
        &self,
        message: Message<Result<T, Fault>>,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        self.inner.put(message.transpose(), timeout).await
    }

    /// Put a fault that is not tied to any topic.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`] if the mailbox stayed full.
    pub async fn put_fault(
        &self,
        fault: Fault,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        self.inner.put(Err(fault), timeout).await
    }

    /// Get the next message, failing with any fault delivered in its place.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Empty`] on timeout or [`MailboxError::Fault`]
    /// if the next entry is a fault.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Message<T>, MailboxError> {
        Ok(self.inner.get(timeout).await??)
    }

    /// Get the next message without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncFaultAwareQueue::get`].
    pub fn try_get(&self) -> Result<Message<T>, MailboxError> {
        Ok(self.inner.try_get()??)
    }
}

impl<T, S: Store<FaultEntry<T>>> Default for AsyncFaultAwareQueue<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Store<FaultEntry<T>>> fmt::Debug for AsyncFaultAwareQueue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFaultAwareQueue")
            .field("inner", &self.inner)
            .finish()
    }
}

#[async_trait]
impl<T, S> AsyncMailbox<Result<T, Fault>> for AsyncFaultAwareQueue<T, S>
where
    T: Send + 'static,
    S: Store<FaultEntry<T>> + 'static,
{
    async fn put(
        &self,
        message: Message<Result<T, Fault>>,
        timeout: Option<Duration>,
    ) -> Result<(), MailboxError> {
        AsyncFaultAwareQueue::put(self, message, timeout).await
    }

    fn kind() -> &'static str {
        "AsyncFaultAwareQueue"
    }
}
