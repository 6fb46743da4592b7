//! Async publish/subscribe broker.
//!
//! Same semantics as [`SubPub`](crate::SubPub), for tasks on a tokio runtime.
//! The subscription scan never yields; tasks only suspend while waiting for
//! room in a subscriber's mailbox.

use crate::async_queue::AsyncQueue;
use crate::config::SubPubConfig;
use crate::error::SubPubError;
use crate::mailbox::AsyncMailbox;
use crate::message::{Message, Publication};
use crate::registry::{Registry, SubPubStats};
use crate::topic::{Pattern, TopicMatcher};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{trace, warn};

type Factory<M> = Box<dyn Fn() -> M + Send + Sync>;

/// A publish/subscribe broker for async tasks.
///
/// `M` is the mailbox type created by [`AsyncSubPub::subscribe`].
pub struct AsyncSubPub<T, M = AsyncQueue<Message<T>>> {
    registry: Registry<T, dyn AsyncMailbox<T>>,
    factory: Factory<M>,
    factory_name: Cow<'static, str>,
    timeout: Duration,
}

impl<T> AsyncSubPub<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a broker from configuration, using FIFO mailboxes bounded by
    /// `config.capacity`.
    #[must_use]
    pub fn with_config(config: &SubPubConfig) -> Self {
        let capacity = config.capacity;
        Self::with_factory(
            AsyncQueue::<Message<T>>::kind(),
            move || AsyncQueue::bounded(capacity),
            config.timeout(),
        )
    }
}

impl<T, M> AsyncSubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: AsyncMailbox<T> + Default,
{
    /// Create a broker with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(crate::DEFAULT_TIMEOUT)
    }

    /// Create a broker with a custom default publish timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_factory(M::kind(), M::default, timeout)
    }
}

impl<T, M> AsyncSubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: AsyncMailbox<T>,
{
    /// Create a broker with a custom mailbox factory.
    #[must_use]
    pub fn with_factory(
        name: impl Into<Cow<'static, str>>,
        factory: impl Fn() -> M + Send + Sync + 'static,
        timeout: Duration,
    ) -> Self {
        Self {
            registry: Registry::new(),
            factory: Box::new(factory),
            factory_name: name.into(),
            timeout,
        }
    }

    /// Get the name of the mailbox factory.
    #[must_use]
    pub fn queue_factory(&self) -> &str {
        &self.factory_name
    }

    /// Get the default publish timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> SubPubStats {
        self.registry.stats()
    }

    /// Get the retained payload of a topic.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<T> {
        self.registry.retained(topic)
    }

    /// Subscribe to a pattern with a new mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or a retained message could
    /// not be delivered within the default timeout.
    pub async fn subscribe(&self, pattern: impl Into<Pattern>) -> Result<Arc<M>, SubPubError> {
        let mailbox = Arc::new((self.factory)());
        self.subscribe_with(pattern, &mailbox).await
    }

    /// Subscribe to a pattern, delivering into an existing mailbox.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncSubPub::subscribe`].
    pub async fn subscribe_with<Q: AsyncMailbox<T>>(
        &self,
        pattern: impl Into<Pattern>,
        mailbox: &Arc<Q>,
    ) -> Result<Arc<Q>, SubPubError> {
        let matcher = TopicMatcher::compile(pattern)?;
        let handle: Weak<Q> = Arc::downgrade(mailbox);
        let handle: Weak<dyn AsyncMailbox<T>> = handle;

        for message in self.registry.register(matcher, handle) {
            mailbox.put(message, Some(self.timeout)).await?;
        }
        Ok(Arc::clone(mailbox))
    }

    /// Remove the first live subscription to `pattern`.
    pub async fn unsubscribe(&self, pattern: impl Into<Pattern>) -> bool {
        self.registry.remove(&pattern.into())
    }

    /// Remove every subscription.
    ///
    /// Returns how many subscriptions still had a live mailbox.
    pub async fn unsubscribe_all(&self) -> usize {
        self.registry.clear()
    }

    /// Publish a payload using the default timeout.
    ///
    /// # Errors
    ///
    /// See [`AsyncSubPub::publish_with`].
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: T,
    ) -> Result<bool, SubPubError> {
        self.publish_with(Publication::new(topic, payload)).await
    }

    /// Publish a message.
    ///
    /// Returns whether any live subscription matched.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`](crate::MailboxError::Full) if a
    /// subscriber's mailbox stays full for the whole timeout. Delivery stops
    /// there, as it does if the returned future is dropped mid-delivery.
    pub async fn publish_with(&self, publication: Publication<T>) -> Result<bool, SubPubError> {
        let timeout = publication.put_timeout(self.timeout);
        let Publication {
            topic,
            payload,
            retain,
            ..
        } = publication;

        let recipients = self.registry.publish(&topic, payload.as_ref(), retain);
        let Some(payload) = payload else {
            return Ok(!recipients.is_empty());
        };

        trace!(topic = %topic, recipients = recipients.len(), "Publishing message");

        for (mailbox, topic_match) in &recipients {
            let message = Message::new(topic_match.clone(), payload.clone());
            if let Err(e) = mailbox.put(message, timeout).await {
                warn!(topic = %topic, pattern = %topic_match.pattern(), error = %e, "Delivery failed");
                return Err(e.into());
            }
        }

        Ok(!recipients.is_empty())
    }
}

impl<T, M> Default for AsyncSubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: AsyncMailbox<T> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> fmt::Debug for AsyncSubPub<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AsyncSubPub(queue_factory={}, timeout={:?})",
            self.factory_name, self.timeout
        )
    }
}
