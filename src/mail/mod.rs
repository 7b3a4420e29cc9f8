//! Durable mail between agents.
//!
//! A message is delivered once the store accepts the create. Pinning and
//! the live banner are extras that report a [`BestEffort`] outcome.

mod mailbox;
mod message;
mod router;

pub use mailbox::Mailbox;
pub use message::{MailItem, Message, MessageType, Priority};
pub use router::{MESSAGE_TYPE, MailRouter, SendReport};

/// Outcome of a side operation whose failure must not propagate.
///
/// Callers may drop it freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    Done,
    Skipped(String),
    Failed(String),
}

impl BestEffort {
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for BestEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Skipped(why) => write!(f, "skipped ({why})"),
            Self::Failed(why) => write!(f, "failed ({why})"),
        }
    }
}
