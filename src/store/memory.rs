//! In-process record store for unit tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::{CreateRequest, ListFilter, Record, RecordId, RecordStore, StoreError, UpdateRequest};

#[derive(Default)]
struct Inner {
    records: Vec<Record>,
    calls: Vec<String>,
    next_id: u64,
    fail_create: Option<StoreError>,
    fail_pin: bool,
    fail_update: Option<StoreError>,
}

/// Records kept in memory with ids `gt-1`, `gt-2`, ... Every call is logged.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent create fail with `err`.
    #[must_use]
    pub fn failing_create(self, err: StoreError) -> Self {
        self.lock().fail_create = Some(err);
        self
    }

    /// Make creates fail from now on.
    pub fn fail_creates(&self, err: StoreError) {
        self.lock().fail_create = Some(err);
    }

    /// Make every subsequent pin fail.
    #[must_use]
    pub fn failing_pin(self) -> Self {
        self.lock().fail_pin = true;
        self
    }

    /// Make every subsequent update fail with `err`.
    #[must_use]
    pub fn failing_update(self, err: StoreError) -> Self {
        self.lock().fail_update = Some(err);
        self
    }

    /// Operation log, one entry per call: `create <type>`, `pin <id>`, ...
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }
}

impl RecordStore for MemoryStore {
    fn create(&self, request: &CreateRequest) -> Result<RecordId, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("create {}", request.record_type));
        if let Some(ref err) = inner.fail_create {
            return Err(err.clone());
        }
        inner.next_id += 1;
        let id = format!("gt-{}", inner.next_id);
        inner.records.push(Record {
            id: id.clone(),
            record_type: request.record_type.clone(),
            title: request.title.clone(),
            description: request.body.clone(),
            status: "open".into(),
            priority: request.priority,
            assignee: request.assignee.clone(),
            labels: request.labels.clone(),
            pinned: false,
            parent: request.parent.clone(),
            created_at: Some(Utc::now()),
        });
        Ok(id)
    }

    fn pin(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("pin {id}"));
        if inner.fail_pin {
            return Err(StoreError::Unavailable("pin failed".into()));
        }
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Rejected(format!("no record {id}")))?;
        record.pinned = true;
        Ok(())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Record>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push("list".into());
        Ok(inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("get {id}"));
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    fn update(&self, id: &str, update: &UpdateRequest) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("update {id}"));
        if let Some(ref err) = inner.fail_update {
            return Err(err.clone());
        }
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Rejected(format!("no record {id}")))?;
        if let Some(ref status) = update.status {
            record.status.clone_from(status);
        }
        if let Some(ref description) = update.description {
            record.description.clone_from(description);
        }
        for label in &update.add_labels {
            if !record.labels.contains(label) {
                record.labels.push(label.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let store = MemoryStore::new();
        let a = store.create(&CreateRequest::default()).unwrap();
        let b = store.create(&CreateRequest::default()).unwrap();
        assert_eq!(a, "gt-1");
        assert_eq!(b, "gt-2");
    }

    #[test]
    fn pin_and_update() {
        let store = MemoryStore::new();
        let id = store
            .create(&CreateRequest {
                record_type: "message".into(),
                ..Default::default()
            })
            .unwrap();
        store.pin(&id).unwrap();
        store
            .update(
                &id,
                &UpdateRequest {
                    status: Some("closed".into()),
                    add_labels: vec!["done".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        let rec = store.get(&id).unwrap().unwrap();
        assert!(rec.pinned);
        assert_eq!(rec.status, "closed");
        assert_eq!(rec.labels, vec!["done"]);
        assert_eq!(store.calls(), vec!["create message", "pin gt-1", "update gt-1", "get gt-1"]);
    }

    #[test]
    fn failure_toggles() {
        let store = MemoryStore::new().failing_create(StoreError::Unavailable("down".into()));
        assert_eq!(
            store.create(&CreateRequest::default()).unwrap_err(),
            StoreError::Unavailable("down".into())
        );
        assert!(store.records().is_empty());

        let store = MemoryStore::new().failing_pin();
        let id = store.create(&CreateRequest::default()).unwrap();
        assert!(store.pin(&id).is_err());
    }
}
