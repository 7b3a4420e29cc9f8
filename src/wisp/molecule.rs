use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::store::{Record, RecordId};

/// Prefix of every id in the ephemeral namespace.
pub const WISP_PREFIX: &str = "wisp-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Pending,
        }
    }
}

/// Non-terminal states. Terminal outcomes remove the wisp, so they are
/// never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoleculeState {
    #[default]
    Active,
    Squashing,
}

/// A unit of cyclic work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Molecule {
    pub id: String,
    pub proto: String,
    pub steps: Vec<Step>,
    pub wisp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordId>,
    /// Process that owns the wisp; gc reclaims the wisp once it is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub state: MoleculeState,
    /// Bumped on every write to the ephemeral store.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Molecule {
    /// At least one step, all of them complete.
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Complete)
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Complete)
            .count()
    }

    /// Mark `step` complete. Returns false when the molecule has no such step.
    pub fn complete_step(&mut self, step: &str) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step) {
            Some(s) => {
                s.status = StepStatus::Complete;
                true
            }
            None => false,
        }
    }
}

pub fn is_wisp_id(id: &str) -> bool {
    id.starts_with(WISP_PREFIX)
}

/// `wisp-` plus the first 8 hex digits of SHA-256 over the proto name, the
/// time and fresh random bytes.
pub fn new_wisp_id(proto: &str, now: DateTime<Utc>) -> String {
    let nonce: [u8; 16] = rand::random();
    let mut hasher = Sha256::new();
    hasher.update(proto.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(nonce);
    let hex = format!("{:x}", hasher.finalize());
    format!("{WISP_PREFIX}{}", &hex[..8])
}

/// Shape of a durable molecule's description field.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct DurableBody {
    pub proto: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

/// Compacted summary of a squashed molecule, kept in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub parent: Option<RecordId>,
    pub squashed_from: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Record> for Digest {
    fn from(record: Record) -> Self {
        let squashed_from = record
            .label_value("squashed-from")
            .unwrap_or_default()
            .to_string();
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            parent: record.parent,
            squashed_from,
            created_at: record.created_at,
        }
    }
}
