use crate::address::Address;
use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::error::{GtError, Result};
use crate::store::{CreateRequest, RecordId, RecordStore};
use crate::template;
use crate::tmux::{Tmux, TmuxCommandRunner};

use super::{BestEffort, Mailbox, Message};

/// Record type used for mail in the durable store.
pub const MESSAGE_TYPE: &str = "message";

/// Outcome of [`MailRouter::send_detailed`]. Only `id` is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub id: RecordId,
    pub pin: BestEffort,
    pub notify: BestEffort,
}

/// Writes messages to the durable store and pokes live recipients.
pub struct MailRouter<'a, S, R, C> {
    store: S,
    tmux: &'a Tmux<R>,
    clock: &'a C,
}

impl<'a, S: RecordStore, R: TmuxCommandRunner, C: Clock> MailRouter<'a, S, R, C> {
    pub const fn new(store: S, tmux: &'a Tmux<R>, clock: &'a C) -> Self {
        Self { store, tmux, clock }
    }

    /// Persist `message` and return its record id.
    ///
    /// The durable create is the delivery; pinning and the live banner are
    /// attempted afterwards and never turn a successful create into an error.
    pub fn send(&self, message: &Message) -> Result<RecordId> {
        self.send_detailed(message).map(|report| report.id)
    }

    pub fn send_detailed(&self, message: &Message) -> Result<SendReport> {
        let request = CreateRequest {
            record_type: MESSAGE_TYPE.into(),
            title: message.subject.clone(),
            body: message.body.clone(),
            assignee: Some(message.to.identity()),
            priority: Some(message.priority.to_store()),
            labels: message.labels(),
            parent: None,
        };
        let id = self.store.create(&request)?;
        tracing::info!(%id, to = %message.to, from = %message.from, "mail created");

        let pin = if message.pinned {
            self.pin(&id)
        } else {
            BestEffort::Skipped("not pinned".into())
        };
        let notify = self.notify(message);
        Ok(SendReport { id, pin, notify })
    }

    fn pin(&self, id: &str) -> BestEffort {
        match self.store.pin(id) {
            Ok(()) => BestEffort::Done,
            Err(e) => {
                tracing::warn!(%id, error = %e, "pin failed");
                BestEffort::Failed(e.to_string())
            }
        }
    }

    fn notify(&self, message: &Message) -> BestEffort {
        let session_id = message.to.session_id();
        let banner = match template::mail_banner(&message.from.identity(), &message.subject) {
            Ok(text) => text,
            Err(e) => return BestEffort::Failed(format!("{e:#}")),
        };
        let channel = DeliveryChannel::new(self.tmux, self.clock);
        match channel.nudge(&session_id, &message.from, &banner) {
            Ok(()) => {
                tracing::debug!(session = %session_id, "recipient notified");
                BestEffort::Done
            }
            Err(GtError::SessionNotFound(_)) => {
                tracing::debug!(session = %session_id, "recipient not running, no banner");
                BestEffort::Skipped("recipient not running".into())
            }
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "notify failed");
                BestEffort::Failed(e.to_string())
            }
        }
    }

    /// Read-only view of the records assigned to `address`.
    pub fn mailbox(&self, address: Address) -> Mailbox<&S> {
        Mailbox::new(&self.store, address)
    }
}
