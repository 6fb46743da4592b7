//! Message types for SubPub.
//!
//! A [`Publication`] is what a producer hands to the broker; a [`Message`] is
//! what lands in a subscriber's mailbox.

use crate::topic::TopicMatch;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A delivered message: the topic match and the published payload.
///
/// Messages compare by payload, then by published topic.
#[derive(Debug, Clone)]
pub struct Message<T> {
    /// How the subscriber's pattern matched the published topic.
    pub topic_match: TopicMatch,
    /// The published payload.
    pub payload: T,
}

impl<T> Message<T> {
    /// Create a new message.
    #[must_use]
    pub fn new(topic_match: TopicMatch, payload: T) -> Self {
        Self {
            topic_match,
            payload,
        }
    }

    /// Get the published topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic_match.topic()
    }

    /// Get the captured wildcard groups.
    #[must_use]
    pub fn groups(&self) -> Vec<Option<&str>> {
        self.topic_match.groups()
    }

    /// Split into match and payload.
    #[must_use]
    pub fn into_parts(self) -> (TopicMatch, T) {
        (self.topic_match, self.payload)
    }
}

impl<T, E> Message<Result<T, E>> {
    /// Turn a message carrying a result into a result carrying a message.
    pub fn transpose(self) -> Result<Message<T>, E> {
        let Self {
            topic_match,
            payload,
        } = self;
        payload.map(|payload| Message::new(topic_match, payload))
    }
}

impl<T: PartialEq> PartialEq for Message<T> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.topic() == other.topic()
    }
}

impl<T: Eq> Eq for Message<T> {}

// Priority mailboxes order by payload first, then by topic.
impl<T: Ord> PartialOrd for Message<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Message<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.payload
            .cmp(&other.payload)
            .then_with(|| self.topic().cmp(other.topic()))
    }
}

/// An error value delivered through a mailbox like any other payload.
///
/// Publishing `Err(fault)` to a subscriber using a fault-aware mailbox makes
/// the subscriber's next `get` fail with that fault.
#[derive(Clone)]
pub struct Fault(Arc<anyhow::Error>);

impl Fault {
    /// Wrap an error.
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(error)))
    }

    /// Create a fault from a message.
    #[must_use]
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Downcast to the wrapped error type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// How long a publish may wait for mailbox capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PutTimeout {
    /// Use the broker's configured timeout.
    #[default]
    Default,
    /// Wait indefinitely.
    Blocking,
    /// Wait at most this long.
    After(Duration),
}

/// A message to be published.
#[derive(Debug, Clone)]
pub struct Publication<T> {
    /// Target topic.
    pub topic: String,
    /// Payload. `None` only makes sense for retained publications, where it
    /// clears the retained payload for `topic`.
    pub payload: Option<T>,
    /// Whether to store the payload as the topic's retained message.
    pub retain: bool,
    timeout: PutTimeout,
}

impl<T> Publication<T> {
    /// Create a new publication.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            payload: Some(payload),
            retain: false,
            timeout: PutTimeout::Default,
        }
    }

    /// Create a publication that clears the retained payload of a topic.
    #[must_use]
    pub fn clear(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: None,
            retain: true,
            timeout: PutTimeout::Default,
        }
    }

    /// Retain the payload for late subscribers.
    #[must_use]
    pub fn retain(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Wait at most `timeout` for each subscriber's mailbox.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = PutTimeout::After(timeout);
        self
    }

    /// Wait indefinitely for each subscriber's mailbox.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.timeout = PutTimeout::Blocking;
        self
    }

    /// Resolve the put timeout against the broker default. `None` blocks.
    #[must_use]
    pub fn put_timeout(&self, default: Duration) -> Option<Duration> {
        match self.timeout {
            PutTimeout::Default => Some(default),
            PutTimeout::Blocking => None,
            PutTimeout::After(timeout) => Some(timeout),
        }
    }
}
