//! # subpub-core
//!
//! In-process publish/subscribe with topic pattern matching.
//!
//! This crate provides two brokers sharing one subscription model:
//!
//! - **SubPub** - Blocking broker for OS threads
//! - **AsyncSubPub** - Suspending broker for tokio tasks
//! - **Topic** - Regex and MQTT-style patterns with capture groups
//! - **Mailbox** - Bounded FIFO, LIFO and priority queues, plus fault-aware variants
//!
//! Subscribers hold their mailbox; the broker only keeps a weak handle, so
//! dropping the mailbox ends the subscription.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Publisher  │────▶│  Registry   │────▶│   Mailbox   │────▶ Consumer
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Retained   │
//!                     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use subpub_core::{MqttTopic, SubPub};
//!
//! let sp = SubPub::<&str>::new();
//! let q = sp.subscribe(MqttTopic::new("sensor/+/temp")).unwrap();
//!
//! assert!(sp.publish("sensor/kitchen/temp", "21.5").unwrap());
//!
//! let message = q.try_get().unwrap();
//! assert_eq!(message.groups(), vec![Some("kitchen")]);
//! assert_eq!(message.payload, "21.5");
//! ```

use std::time::Duration;

pub mod async_queue;
pub mod async_subpub;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod queue;
pub mod registry;
pub mod subpub;
pub mod topic;

/// Default time `publish` waits for room in a full mailbox.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(config::DEFAULT_TIMEOUT_MS);

pub use async_queue::{AsyncFifoQueue, AsyncLifoQueue, AsyncPriorityQueue, AsyncQueue};
pub use async_subpub::AsyncSubPub;
pub use config::SubPubConfig;
pub use error::{MailboxError, SubPubError};
pub use mailbox::{AsyncFaultAwareQueue, AsyncMailbox, FaultAwareQueue, Mailbox};
pub use message::{Fault, Message, Publication};
pub use queue::{FifoQueue, LifoQueue, PriorityQueue, Queue};
pub use registry::{Registry, SubPubStats};
pub use subpub::SubPub;
pub use topic::{MqttTopic, Pattern, PatternError, TopicMatch, TopicMatcher};
