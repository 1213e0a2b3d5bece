//! Tracking-store collaborator
//!
//! Durable plan status lives in an external tracking record (an issue, in
//! this system's convention), not in a private database. The store exposes
//! read-modify-write primitives; callers must re-read labels before every
//! modification because the record is eventually consistent and may be
//! edited concurrently by humans.

use crate::error::PersistenceError;
use crate::types::{Annotation, TrackingRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// External durable store of tracking records.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// All open records for a plan, in ascending id order.
    async fn open_records(&self, plan_id: &str) -> Result<Vec<TrackingRecord>, PersistenceError>;

    /// One record by id.
    async fn record(&self, record_id: u64) -> Result<TrackingRecord, PersistenceError>;

    /// Current labels of a record. Always read fresh before modifying.
    async fn labels(&self, record_id: u64) -> Result<Vec<String>, PersistenceError>;

    /// Replace a record's labels wholesale.
    async fn set_labels(
        &self,
        record_id: u64,
        labels: Vec<String>,
    ) -> Result<(), PersistenceError>;

    /// Append an immutable progress annotation.
    async fn append_annotation(
        &self,
        record_id: u64,
        annotation: Annotation,
    ) -> Result<(), PersistenceError>;
}

/// In-memory reference store, used by tests and as the behavioral model for
/// real store implementations.
#[derive(Debug, Default)]
pub struct InMemoryTrackingStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    records: BTreeMap<u64, TrackingRecord>,
}

impl InMemoryTrackingStore {
    /// Empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an open record for `plan_id`, returning its id.
    pub fn create_record(&self, plan_id: &str) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            id,
            TrackingRecord {
                id,
                plan_id: plan_id.to_string(),
                open: true,
                labels: vec![crate::state::labels::plan_label(plan_id)],
                annotations: Vec::new(),
            },
        );
        id
    }

    /// Close a record, removing it from the open set.
    pub fn close_record(&self, record_id: u64) {
        if let Some(record) = self.inner.lock().records.get_mut(&record_id) {
            record.open = false;
        }
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn open_records(&self, plan_id: &str) -> Result<Vec<TrackingRecord>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| r.open && r.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn record(&self, record_id: u64) -> Result<TrackingRecord, PersistenceError> {
        self.inner
            .lock()
            .records
            .get(&record_id)
            .cloned()
            .ok_or(PersistenceError::RecordNotFound { record_id })
    }

    async fn labels(&self, record_id: u64) -> Result<Vec<String>, PersistenceError> {
        Ok(self.record(record_id).await?.labels)
    }

    async fn set_labels(
        &self,
        record_id: u64,
        labels: Vec<String>,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(&record_id)
            .ok_or(PersistenceError::RecordNotFound { record_id })?;
        record.labels = labels;
        Ok(())
    }

    async fn append_annotation(
        &self,
        record_id: u64,
        annotation: Annotation,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(&record_id)
            .ok_or(PersistenceError::RecordNotFound { record_id })?;
        record.annotations.push(annotation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn records_are_scoped_to_plan_and_openness() {
        let store = InMemoryTrackingStore::new();
        let a = store.create_record("plan-a");
        let _b = store.create_record("plan-b");

        assert_eq!(store.open_records("plan-a").await.unwrap().len(), 1);
        store.close_record(a);
        assert!(store.open_records("plan-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn annotations_append_in_order() {
        let store = InMemoryTrackingStore::new();
        let id = store.create_record("p1");

        for status in [StepStatus::Running, StepStatus::Completed] {
            store
                .append_annotation(
                    id,
                    Annotation {
                        step_id: "1".into(),
                        chunk: None,
                        status,
                        body: String::new(),
                        timestamp: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let record = store.record(id).await.unwrap();
        assert_eq!(record.annotations.len(), 2);
        assert_eq!(record.annotations[1].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_record_is_an_error() {
        let store = InMemoryTrackingStore::new();
        assert!(matches!(
            store.record(99).await,
            Err(PersistenceError::RecordNotFound { record_id: 99 })
        ));
    }
}
