//! Error types for SubPub.

use crate::message::Fault;
use crate::topic::PatternError;
use thiserror::Error;

/// Mailbox errors.
#[derive(Debug, Clone, Error)]
pub enum MailboxError {
    /// The mailbox stayed full until the put timed out.
    #[error("Mailbox full")]
    Full,

    /// The mailbox stayed empty until the get timed out.
    #[error("Mailbox empty")]
    Empty,

    /// A fault was delivered in place of a payload.
    #[error("Delivered fault: {0}")]
    Fault(#[from] Fault),
}

/// SubPub errors.
#[derive(Debug, Clone, Error)]
pub enum SubPubError {
    /// The subscription pattern could not be compiled.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    /// Delivery into a mailbox failed.
    #[error("Delivery failed: {0}")]
    Mailbox(#[from] MailboxError),
}

impl SubPubError {
    /// Check whether this is a capacity fault from a full mailbox.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Mailbox(MailboxError::Full))
    }
}
