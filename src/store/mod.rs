//! Client side of the durable record store.
//!
//! The store owns id allocation and consistency; this layer never retries
//! a create, so a create that reached the store is never duplicated here.

mod bd;
#[cfg(test)]
mod memory;

pub use bd::BdStore;
#[cfg(test)]
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GtError;

/// Opaque id allocated by the store.
pub type RecordId = String;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl From<StoreError> for GtError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => GtError::StoreUnavailable(msg),
            StoreError::Rejected(msg) => GtError::StoreRejected(msg),
        }
    }
}

/// Fields of a record to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    pub record_type: String,
    pub title: String,
    pub body: String,
    pub assignee: Option<String>,
    /// 0 is most urgent.
    pub priority: Option<u8>,
    pub labels: Vec<String>,
    pub parent: Option<RecordId>,
}

/// Partial update; `None`/empty fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub status: Option<String>,
    pub description: Option<String>,
    pub add_labels: Vec<String>,
}

/// Query over records. Every set field must match; all `labels` must be
/// present on the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub record_type: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<String>,
    pub labels: Vec<String>,
}

impl ListFilter {
    pub fn matches(&self, record: &Record) -> bool {
        self.record_type
            .as_ref()
            .is_none_or(|t| *t == record.record_type)
            && self
                .assignee
                .as_ref()
                .is_none_or(|a| record.assignee.as_ref() == Some(a))
            && self.status.as_ref().is_none_or(|s| *s == record.status)
            && self.labels.iter().all(|l| record.labels.contains(l))
    }
}

/// A record as read back from the store. Parsing is tolerant: unknown
/// fields are ignored and most fields default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default, alias = "issue_type", rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub parent: Option<RecordId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Value of the first `key:value` label with this key.
    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.iter().find_map(|l| {
            l.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix(':'))
        })
    }
}

/// Request/response protocol to the durable store.
pub trait RecordStore: Send + Sync {
    fn create(&self, request: &CreateRequest) -> Result<RecordId, StoreError>;
    fn pin(&self, id: &str) -> Result<(), StoreError>;
    fn list(&self, filter: &ListFilter) -> Result<Vec<Record>, StoreError>;
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;
    fn update(&self, id: &str, update: &UpdateRequest) -> Result<(), StoreError>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn create(&self, request: &CreateRequest) -> Result<RecordId, StoreError> {
        (**self).create(request)
    }

    fn pin(&self, id: &str) -> Result<(), StoreError> {
        (**self).pin(id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Record>, StoreError> {
        (**self).list(filter)
    }

    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        (**self).get(id)
    }

    fn update(&self, id: &str, update: &UpdateRequest) -> Result<(), StoreError> {
        (**self).update(id, update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &[&str]) -> Record {
        Record {
            id: "gt-1".into(),
            record_type: "message".into(),
            title: "t".into(),
            description: String::new(),
            status: "open".into(),
            priority: Some(2),
            assignee: Some("wyvern/Toast".into()),
            labels: labels.iter().map(ToString::to_string).collect(),
            pinned: false,
            parent: None,
            created_at: None,
        }
    }

    #[test]
    fn filter_matches_all_fields() {
        let rec = record(&["from:mayor", "thread:t1"]);
        assert!(ListFilter::default().matches(&rec));
        assert!(ListFilter {
            record_type: Some("message".into()),
            assignee: Some("wyvern/Toast".into()),
            status: Some("open".into()),
            labels: vec!["from:mayor".into()],
        }
        .matches(&rec));
        assert!(!ListFilter {
            labels: vec!["from:deacon".into()],
            ..Default::default()
        }
        .matches(&rec));
        assert!(!ListFilter {
            assignee: Some("mayor".into()),
            ..Default::default()
        }
        .matches(&rec));
    }

    #[test]
    fn label_value_lookup() {
        let rec = record(&["from:wyvern/crew/max", "thread:t1"]);
        assert_eq!(rec.label_value("from"), Some("wyvern/crew/max"));
        assert_eq!(rec.label_value("thread"), Some("t1"));
        assert_eq!(rec.label_value("reply-to"), None);
    }

    #[test]
    fn parse_tolerates_missing_and_extra_fields() {
        let rec: Record = serde_json::from_str(
            r#"{"id":"gt-9","issue_type":"digest","title":"x","extra":42}"#,
        )
        .unwrap();
        assert_eq!(rec.record_type, "digest");
        assert!(rec.labels.is_empty());
        assert!(!rec.pinned);
    }

    #[test]
    fn store_error_maps_to_taxonomy() {
        assert!(matches!(
            GtError::from(StoreError::Unavailable("down".into())),
            GtError::StoreUnavailable(_)
        ));
        assert!(matches!(
            GtError::from(StoreError::Rejected("bad".into())),
            GtError::StoreRejected(_)
        ));
    }
}
