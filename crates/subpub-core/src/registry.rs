//! Subscription registry shared by both brokers.
//!
//! The registry knows nothing about how delivery blocks. It is generic over the
//! mailbox handle type `H` (`dyn Mailbox<T>` or `dyn AsyncMailbox<T>`) and only
//! ever holds [`Weak`] handles to mailboxes, so a subscription dies with its
//! mailbox and is pruned the next time a scan runs into it.
//!
//! Retained payloads live in a [`DashMap`] for lock-free lookups, but every
//! write to it and every replay read happens under the subscription lock.

use crate::message::Message;
use crate::topic::{Pattern, TopicMatch, TopicMatcher};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A registered subscription.
struct Subscription<H: ?Sized> {
    matcher: TopicMatcher,
    mailbox: Weak<H>,
}

impl<H: ?Sized> Subscription<H> {
    fn is_alive(&self) -> bool {
        self.mailbox.strong_count() > 0
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPubStats {
    /// Number of subscriptions whose mailbox is still alive.
    pub subscriptions: usize,
    /// Number of topics with a retained payload.
    pub retained: usize,
}

/// Ordered subscriptions plus the retained-message table.
pub struct Registry<T, H: ?Sized> {
    /// Subscriptions in registration order.
    subscriptions: Mutex<Vec<Subscription<H>>>,
    /// Retained payloads by exact topic.
    retained: DashMap<String, T>,
}

impl<T: Clone, H: ?Sized> Registry<T, H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            retained: DashMap::new(),
        }
    }

    /// Register a subscription.
    ///
    /// Returns the retained messages matching the new subscription, which the
    /// caller must deliver into the mailbox. The replay is collected under the
    /// same lock as retained updates, so a concurrent retained publish reaches
    /// the new subscription either through the replay or live, never both.
    pub fn register(&self, matcher: TopicMatcher, mailbox: Weak<H>) -> Vec<Message<T>> {
        let mut subscriptions = self.subscriptions.lock();

        let retained: Vec<Message<T>> = self
            .retained
            .iter()
            .filter_map(|entry| {
                matcher
                    .matches(entry.key())
                    .map(|topic_match| Message::new(topic_match, entry.value().clone()))
            })
            .collect();

        if !retained.is_empty() {
            debug!(
                pattern = %matcher.pattern(),
                count = retained.len(),
                "Replaying retained messages"
            );
        }
        debug!(
            pattern = %matcher.pattern(),
            subscriptions = subscriptions.len() + 1,
            "Subscribed"
        );
        subscriptions.push(Subscription { matcher, mailbox });
        retained
    }

    /// Set or clear the retained payload of a topic.
    pub fn retain(&self, topic: &str, payload: Option<T>) {
        let _subscriptions = self.subscriptions.lock();
        self.store_retained(topic, payload);
    }

    /// Get the retained payload of a topic.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<T> {
        self.retained.get(topic).map(|entry| entry.value().clone())
    }

    /// Collect the live mailboxes whose pattern matches `topic`, in
    /// registration order. Dead subscriptions are pruned along the way.
    ///
    /// The returned handles keep the mailboxes alive for the delivery that
    /// follows, outside the registry lock.
    pub fn matching(&self, topic: &str) -> Vec<(Arc<H>, TopicMatch)> {
        let mut subscriptions = self.subscriptions.lock();
        Self::collect(&mut subscriptions, topic)
    }

    /// Prepare a publish: update the retained entry of `topic` when `retain`
    /// is set, then collect the recipients as [`Registry::matching`] does.
    ///
    /// Both steps happen in one critical section with respect to
    /// [`Registry::register`].
    pub fn publish(
        &self,
        topic: &str,
        payload: Option<&T>,
        retain: bool,
    ) -> Vec<(Arc<H>, TopicMatch)> {
        let mut subscriptions = self.subscriptions.lock();
        if retain {
            self.store_retained(topic, payload.cloned());
        }
        Self::collect(&mut subscriptions, topic)
    }

    fn store_retained(&self, topic: &str, payload: Option<T>) {
        match payload {
            Some(payload) => {
                self.retained.insert(topic.to_string(), payload);
                debug!(topic = %topic, "Retained message stored");
            }
            None => {
                if self.retained.remove(topic).is_some() {
                    debug!(topic = %topic, "Retained message cleared");
                }
            }
        }
    }

    fn collect(subscriptions: &mut Vec<Subscription<H>>, topic: &str) -> Vec<(Arc<H>, TopicMatch)> {
        let mut matched = Vec::new();
        let before = subscriptions.len();

        subscriptions.retain(|subscription| {
            if !subscription.is_alive() {
                return false;
            }
            if let Some(topic_match) = subscription.matcher.matches(topic) {
                // The mailbox may have died since the liveness check.
                match subscription.mailbox.upgrade() {
                    Some(mailbox) => matched.push((mailbox, topic_match)),
                    None => return false,
                }
            }
            true
        });

        let pruned = before - subscriptions.len();
        if pruned > 0 {
            debug!(pruned, "Pruned dead subscriptions");
        }
        trace!(topic = %topic, recipients = matched.len(), "Matched subscriptions");
        matched
    }

    /// Remove the first live subscription whose pattern equals `pattern`.
    pub fn remove(&self, pattern: &Pattern) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(Subscription::is_alive);

        match subscriptions
            .iter()
            .position(|subscription| subscription.matcher.pattern() == pattern)
        {
            Some(index) => {
                subscriptions.remove(index);
                debug!(pattern = %pattern, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Remove every subscription.
    ///
    /// Returns how many of them still had a live mailbox.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.subscriptions.lock());
        let live = removed.iter().filter(|s| s.is_alive()).count();
        debug!(live, total = removed.len(), "Unsubscribed from all patterns");
        live
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubPubStats {
        SubPubStats {
            subscriptions: self
                .subscriptions
                .lock()
                .iter()
                .filter(|s| s.is_alive())
                .count(),
            retained: self.retained.len(),
        }
    }
}

impl<T: Clone, H: ?Sized> Default for Registry<T, H> {
    fn default() -> Self {
        Self::new()
    }
}
