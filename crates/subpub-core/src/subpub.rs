//! Blocking publish/subscribe broker.

use crate::config::SubPubConfig;
use crate::error::SubPubError;
use crate::mailbox::Mailbox;
use crate::message::{Message, Publication};
use crate::queue::Queue;
use crate::registry::{Registry, SubPubStats};
use crate::topic::{Pattern, TopicMatcher};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{trace, warn};

type Factory<M> = Box<dyn Fn() -> M + Send + Sync>;

/// A publish/subscribe broker for OS threads.
///
/// Delivery blocks the publishing thread while a subscriber's mailbox is
/// full, up to the publish timeout. Subscriptions last as long as their
/// mailbox: dropping the last [`Arc`] to it unsubscribes implicitly.
///
/// `M` is the mailbox type created by [`SubPub::subscribe`].
pub struct SubPub<T, M = Queue<Message<T>>> {
    registry: Registry<T, dyn Mailbox<T>>,
    factory: Factory<M>,
    factory_name: Cow<'static, str>,
    timeout: Duration,
}

impl<T> SubPub<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a broker from configuration, using FIFO mailboxes bounded by
    /// `config.capacity`.
    #[must_use]
    pub fn with_config(config: &SubPubConfig) -> Self {
        let capacity = config.capacity;
        Self::with_factory(
            Queue::<Message<T>>::kind(),
            move || Queue::bounded(capacity),
            config.timeout(),
        )
    }
}

impl<T, M> SubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mailbox<T> + Default,
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

impl<T, M> SubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mailbox<T>,
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
    /// Every call creates an independent subscription, even for a pattern
    /// that is already subscribed. Retained messages matching the pattern are
    /// delivered right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or a retained message could
    /// not be delivered within the default timeout.
    pub fn subscribe(&self, pattern: impl Into<Pattern>) -> Result<Arc<M>, SubPubError> {
        let mailbox = Arc::new((self.factory)());
        self.subscribe_with(pattern, &mailbox)
    }

    /// Subscribe to a pattern, delivering into an existing mailbox.
    ///
    /// The same mailbox may back any number of subscriptions.
    ///
    /// # Errors
    ///
    /// Same as [`SubPub::subscribe`].
    pub fn subscribe_with<Q: Mailbox<T>>(
        &self,
        pattern: impl Into<Pattern>,
        mailbox: &Arc<Q>,
    ) -> Result<Arc<Q>, SubPubError> {
        let matcher = TopicMatcher::compile(pattern)?;
        let handle: Weak<Q> = Arc::downgrade(mailbox);
        let handle: Weak<dyn Mailbox<T>> = handle;

        for message in self.registry.register(matcher, handle) {
            mailbox.put(message, Some(self.timeout))?;
        }
        Ok(Arc::clone(mailbox))
    }

    /// Remove the first live subscription to `pattern`.
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, pattern: impl Into<Pattern>) -> bool {
        self.registry.remove(&pattern.into())
    }

    /// Remove every subscription.
    ///
    /// Returns how many subscriptions still had a live mailbox.
    pub fn unsubscribe_all(&self) -> usize {
        self.registry.clear()
    }

    /// Publish a payload using the default timeout.
    ///
    /// Returns whether any live subscription matched.
    ///
    /// # Errors
    ///
    /// See [`SubPub::publish_with`].
    pub fn publish(&self, topic: impl Into<String>, payload: T) -> Result<bool, SubPubError> {
        self.publish_with(Publication::new(topic, payload))
    }

    /// Publish a message.
    ///
    /// Retained publications update the retained table first. The payload is
    /// then delivered to every matching live subscription in registration
    /// order. A publication without payload delivers nothing but still
    /// reports whether a live subscription matched.
    ///
    /// Returns whether any live subscription matched.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Full`](crate::MailboxError::Full) if a
    /// subscriber's mailbox stays full for the whole timeout. Delivery stops
    /// there: earlier subscribers keep their copy, later ones get nothing.
    pub fn publish_with(&self, publication: Publication<T>) -> Result<bool, SubPubError> {
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
            if let Err(e) = mailbox.put(message, timeout) {
                warn!(topic = %topic, pattern = %topic_match.pattern(), error = %e, "Delivery failed");
                return Err(e.into());
            }
        }

        Ok(!recipients.is_empty())
    }
}

impl<T, M> Default for SubPub<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Mailbox<T> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> fmt::Debug for SubPub<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubPub(queue_factory={}, timeout={:?})",
            self.factory_name, self.timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailboxError;
    use crate::mailbox::FaultAwareQueue;
    use crate::message::Fault;
    use crate::queue::{LifoQueue, PriorityQueue};
    use crate::topic::MqttTopic;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_debug_repr() {
        let sp: SubPub<i32> = SubPub::new();
        assert_eq!(format!("{sp:?}"), "SubPub(queue_factory=Queue, timeout=10s)");

        let sp: SubPub<Result<i32, Fault>, FaultAwareQueue<i32>> = SubPub::new();
        assert_eq!(
            format!("{sp:?}"),
            "SubPub(queue_factory=FaultAwareQueue, timeout=10s)"
        );
    }

    #[test]
    fn test_factory_and_timeout() {
        let sp: SubPub<i32> = SubPub::with_timeout(Duration::from_millis(5));
        assert_eq!(sp.queue_factory(), "Queue");
        assert_eq!(sp.timeout(), Duration::from_millis(5));

        let sp: SubPub<i32, LifoQueue<Message<i32>>> =
            SubPub::with_factory("Lifo", LifoQueue::new, Duration::from_secs(1));
        assert_eq!(sp.queue_factory(), "Lifo");
    }

    #[test]
    fn test_with_config() {
        let config = SubPubConfig {
            timeout_ms: 1,
            capacity: 1,
        };
        let sp: SubPub<i32> = SubPub::with_config(&config);
        assert_eq!(sp.timeout(), Duration::from_millis(1));

        let q = sp.subscribe("Saturn").unwrap();
        assert_eq!(q.maxsize(), 1);
        sp.publish("Saturn", 1).unwrap();
        assert!(sp.publish("Saturn", 2).unwrap_err().is_full());
    }

    #[test]
    fn test_fault_aware_factory() {
        let sp: SubPub<Result<i32, Fault>, FaultAwareQueue<i32>> = SubPub::new();
        let q = sp.subscribe("MelodiesOfLife").unwrap();

        sp.publish("MelodiesOfLife", Ok(1)).unwrap();
        sp.publish("MelodiesOfLife", Err(Fault::msg("To Zanarkand")))
            .unwrap();

        assert_eq!(q.try_get().unwrap().payload, 1);
        assert!(matches!(q.try_get(), Err(MailboxError::Fault(_))));
    }

    #[test]
    fn test_subscribe_twice() {
        let sp: SubPub<i32> = SubPub::new();
        let q1 = sp.subscribe("EyesOnMe").unwrap();
        let q2 = sp.subscribe("EyesOnMe").unwrap();
        assert!(!Arc::ptr_eq(&q1, &q2));

        assert!(sp.publish("EyesOnMe", 7).unwrap());
        assert_eq!(q1.try_get().unwrap().payload, 7);
        assert_eq!(q2.try_get().unwrap().payload, 7);
    }

    #[test]
    fn test_subscribe_simple() {
        let sp = SubPub::<i32>::new();
        let q = sp.subscribe("Aerith/Theme").unwrap();
        assert!(sp.publish("Aerith/Theme", 81611).unwrap());

        let message = q.get(None).unwrap();
        assert_eq!(message.topic(), "Aerith/Theme");
        assert_eq!(message.payload, 81611);
    }

    #[test]
    fn test_no_match_no_delivery() {
        let sp = SubPub::<i32>::new();
        let q = sp.subscribe("Aerith/Theme").unwrap();
        assert!(!sp.publish("Tifa/Theme", 1).unwrap());
        assert!(q.is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let sp = SubPub::<i32>::new();
        let topic = "Olofsbäcks Gård";
        let q = sp.subscribe(topic).unwrap();
        sp.publish(topic, 81611).unwrap();
        assert!(q.try_get().is_ok());

        assert!(sp.unsubscribe(topic));
        assert!(!sp.publish(topic, 81611).unwrap());
        assert!(matches!(q.try_get(), Err(MailboxError::Empty)));
    }

    #[test]
    fn test_unsubscribe_not_subscribed() {
        let sp = SubPub::<i32>::new();
        assert!(!sp.unsubscribe("Happiness"));
    }

    #[test]
    fn test_unsubscribe_all() {
        let sp = SubPub::<i32>::new();
        assert_eq!(sp.unsubscribe_all(), 0);

        let _ = sp.subscribe("Chalmers").unwrap();
        let _ = sp.subscribe("GU").unwrap();
        assert_eq!(sp.unsubscribe_all(), 0);

        // Keep references
        let _q1 = sp.subscribe("Chalmers").unwrap();
        let _q2 = sp.subscribe("GU").unwrap();
        assert_eq!(sp.unsubscribe_all(), 2);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let sp = SubPub::<i32>::new();
        {
            let _q = sp.subscribe("Trädgårdsgatan/23").unwrap();
            assert!(sp.publish("Trädgårdsgatan/23", 404).unwrap());
        }
        // Mailbox dropped => automatic unsubscribe
        assert!(!sp.publish("Trädgårdsgatan/23", 404).unwrap());
        assert_eq!(sp.stats().subscriptions, 0);
    }

    #[test]
    fn test_subscribe_custom_mailbox() {
        let sp = SubPub::<i32>::new();
        let q: Arc<PriorityQueue<Message<i32>>> = Arc::new(PriorityQueue::new());
        let q_out = sp.subscribe_with("", &q).unwrap();
        assert!(Arc::ptr_eq(&q_out, &q));
        let q_out = sp.subscribe_with("", &q).unwrap();
        assert!(Arc::ptr_eq(&q_out, &q));

        let lifo: Arc<LifoQueue<Message<i32>>> = Arc::new(LifoQueue::new());
        sp.subscribe_with("", &lifo).unwrap();
        let fifo = sp.subscribe("").unwrap();

        sp.publish("x", 2).unwrap();
        sp.publish("y", 1).unwrap();

        // Two subscriptions share the priority mailbox.
        assert_eq!(q.len(), 4);
        assert_eq!(q.try_get().unwrap().payload, 1);
        assert_eq!(lifo.try_get().unwrap().payload, 1);
        assert_eq!(fifo.try_get().unwrap().payload, 2);
    }

    #[test]
    fn test_publish_no_one_cares() {
        let sp = SubPub::<&str>::new();
        assert!(!sp.publish("Hans Andersson", "Water").unwrap());
    }

    #[test]
    fn test_publish_retained() {
        let sp = SubPub::<&str>::new();
        let topic = "Sober";
        let recv = sp
            .publish_with(Publication::new(topic, "Nope").retain())
            .unwrap();
        assert!(!recv);
        assert_eq!(sp.retained(topic), Some("Nope"));

        let q = sp.subscribe(topic).unwrap();
        let message = q.try_get().unwrap();
        assert_eq!(message.topic_match.pattern(), topic);
        assert_eq!(message.payload, "Nope");
    }

    #[test]
    fn test_publish_retained_to_wildcard_subscriber() {
        let sp = SubPub::<&str>::new();
        sp.publish_with(Publication::new("home/kitchen/temp", "21").retain())
            .unwrap();
        sp.publish_with(Publication::new("garden/temp", "12").retain())
            .unwrap();

        let q = sp.subscribe(MqttTopic::new("home/#")).unwrap();
        let message = q.try_get().unwrap();
        assert_eq!(message.groups(), vec![Some("kitchen/temp")]);
        assert!(q.try_get().is_err());
    }

    #[test]
    fn test_publish_remove_retained() {
        let sp = SubPub::<&str>::new();
        let topic = "JudgmentDay";
        sp.publish_with(Publication::new(topic, "anything but None").retain())
            .unwrap();
        sp.subscribe(topic).unwrap().try_get().unwrap();

        sp.publish_with(Publication::clear(topic)).unwrap();
        assert!(matches!(
            sp.subscribe(topic).unwrap().try_get(),
            Err(MailboxError::Empty)
        ));
        assert_eq!(sp.stats().retained, 0);
    }

    #[test]
    fn test_clear_reports_live_subscribers() {
        let sp = SubPub::<&str>::new();
        let topic = "JudgmentDay";
        assert!(!sp.publish_with(Publication::clear(topic)).unwrap());

        let q = sp.subscribe(topic).unwrap();
        assert!(sp.publish_with(Publication::clear(topic)).unwrap());
        assert!(q.is_empty());

        drop(q);
        assert!(!sp.publish_with(Publication::clear(topic)).unwrap());
        assert_eq!(sp.stats().subscriptions, 0);
    }

    #[test]
    fn test_retained_publish_racing_subscribe_delivers_once() {
        for _ in 0..500 {
            let sp = Arc::new(SubPub::<i32>::new());
            let barrier = Arc::new(Barrier::new(2));

            let publisher = {
                let sp = Arc::clone(&sp);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sp.publish_with(Publication::new("t", 1).retain()).unwrap();
                })
            };

            barrier.wait();
            let q = sp.subscribe("t").unwrap();
            publisher.join().unwrap();

            assert_eq!(q.len(), 1);
        }
    }

    #[test]
    fn test_publish_block_and_timeout() {
        let sp = SubPub::<&str>::new();
        let topic = "Saturn";
        let q: Arc<Queue<Message<&str>>> = Arc::new(Queue::bounded(1));
        sp.subscribe_with(topic, &q).unwrap();
        sp.publish(topic, "Pollux").unwrap();

        let err = sp
            .publish_with(Publication::new(topic, "Castor").with_timeout(Duration::from_millis(1)))
            .unwrap_err();
        assert!(matches!(err, SubPubError::Mailbox(MailboxError::Full)));
    }

    #[test]
    fn test_publish_waits_for_full_timeout() {
        let sp = SubPub::<i32>::new();
        let q: Arc<Queue<Message<i32>>> = Arc::new(Queue::bounded(1));
        sp.subscribe_with("t", &q).unwrap();
        sp.publish("t", 1).unwrap();

        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        let result = sp.publish_with(Publication::new("t", 2).with_timeout(timeout));
        assert!(result.unwrap_err().is_full());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_publish_unblocks_when_consumer_drains() {
        let sp = Arc::new(SubPub::<i32>::new());
        let q: Arc<Queue<Message<i32>>> = Arc::new(Queue::bounded(1));
        sp.subscribe_with("t", &q).unwrap();
        sp.publish("t", 1).unwrap();

        let publisher = {
            let sp = Arc::clone(&sp);
            thread::spawn(move || sp.publish_with(Publication::new("t", 2).blocking()))
        };

        assert_eq!(q.get(None).unwrap().payload, 1);
        assert!(publisher.join().unwrap().unwrap());
        assert_eq!(q.get(Some(Duration::from_secs(5))).unwrap().payload, 2);
    }

    #[test]
    fn test_partial_delivery_on_full_mailbox() {
        let sp = SubPub::<i32>::new();
        let first = sp.subscribe("t").unwrap();
        let full: Arc<Queue<Message<i32>>> = Arc::new(Queue::bounded(1));
        sp.subscribe_with("t", &full).unwrap();
        let last = sp.subscribe("t").unwrap();
        full.try_put(Message::new(
            TopicMatcher::compile("t").unwrap().matches("t").unwrap(),
            0,
        ))
        .unwrap();

        let result = sp.publish_with(Publication::new("t", 1).with_timeout(Duration::from_millis(1)));
        assert!(result.unwrap_err().is_full());
        assert_eq!(first.try_get().unwrap().payload, 1);
        assert!(last.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let sp = SubPub::<i32>::new();
        let err = sp.subscribe(MqttTopic::new("a/#/b")).unwrap_err();
        assert!(matches!(err, SubPubError::Pattern(_)));
        assert_eq!(sp.stats().subscriptions, 0);
    }

    #[test]
    fn test_mqtt_style() {
        let sp = SubPub::<&str>::new();
        let topic = MqttTopic::new("Daniel/+/+/+/#");
        let q = sp.subscribe(&topic).unwrap();
        sp.publish("Daniel/2005/12/18/02:45:00", "So help me God")
            .unwrap();

        let message = q.get(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(
            message.groups(),
            vec![Some("2005"), Some("12"), Some("18"), Some("02:45:00")]
        );
        assert_eq!(message.payload, "So help me God");
        assert!(sp.unsubscribe(&topic));
    }

    #[test]
    fn test_with_threads() {
        let sp = Arc::new(SubPub::<u32>::new());
        let q = sp.subscribe(r"\d+").unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let sp = Arc::clone(&sp);
                thread::spawn(move || sp.publish(i.to_string(), i))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().unwrap());
        }

        let mut received: Vec<u32> = (0..10)
            .map(|_| q.get(Some(Duration::from_secs(1))).unwrap().payload)
            .collect();
        received.sort_unstable();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }
}
