use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::store::{Record, RecordId};

/// Urgency of a message. Maps onto the store's numeric range, 0 = most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const fn to_store(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// Inverse of [`Priority::to_store`]; out-of-range values clamp to `Low`.
    pub const fn from_store(value: u8) -> Self {
        match value {
            0 => Self::Urgent,
            1 => Self::High,
            2 => Self::Normal,
            _ => Self::Low,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Notification,
    Request,
    Task,
    Reply,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Request => "request",
            Self::Task => "task",
            Self::Reply => "reply",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "notification" => Some(Self::Notification),
            "request" => Some(Self::Request),
            "task" => Some(Self::Task),
            "reply" => Some(Self::Reply),
            _ => None,
        }
    }
}

/// A message to route. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Address,
    pub to: Address,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub msg_type: MessageType,
    pub thread_id: Option<String>,
    pub reply_to: Option<RecordId>,
    pub pinned: bool,
}

impl Message {
    pub fn new(from: Address, to: Address, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from,
            to,
            subject: subject.into(),
            body: body.into(),
            priority: Priority::default(),
            msg_type: MessageType::default(),
            thread_id: None,
            reply_to: None,
            pinned: false,
        }
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn msg_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    #[must_use]
    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, id: impl Into<RecordId>) -> Self {
        self.reply_to = Some(id.into());
        self
    }

    #[must_use]
    pub const fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Routing labels. The message type is left out when it is the default.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = vec![format!("from:{}", self.from.identity())];
        if let Some(ref thread) = self.thread_id {
            labels.push(format!("thread:{thread}"));
        }
        if let Some(ref reply_to) = self.reply_to {
            labels.push(format!("reply-to:{reply_to}"));
        }
        if self.msg_type != MessageType::Notification {
            labels.push(format!("msg-type:{}", self.msg_type.as_str()));
        }
        labels
    }
}

/// A message as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailItem {
    pub id: RecordId,
    /// Sender identity as recorded; kept as text since old records may
    /// carry addresses this version no longer parses.
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub msg_type: MessageType,
    pub thread_id: Option<String>,
    pub reply_to: Option<RecordId>,
    pub pinned: bool,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Record> for MailItem {
    fn from(record: Record) -> Self {
        let from = record.label_value("from").unwrap_or("unknown").to_string();
        let thread_id = record.label_value("thread").map(str::to_string);
        let reply_to = record.label_value("reply-to").map(str::to_string);
        let msg_type = record
            .label_value("msg-type")
            .and_then(MessageType::parse)
            .unwrap_or_default();
        Self {
            id: record.id,
            from,
            to: record.assignee.unwrap_or_default(),
            subject: record.title,
            body: record.description,
            priority: record.priority.map(Priority::from_store).unwrap_or_default(),
            msg_type,
            thread_id,
            reply_to,
            pinned: record.pinned,
            status: record.status,
            created_at: record.created_at,
        }
    }
}
