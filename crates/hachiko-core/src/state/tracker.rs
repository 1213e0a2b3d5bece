//! Progress tracking and step progression
//!
//! [`ProgressTracker`] is the only writer of step statuses. It keeps the
//! external tracking record authoritative: labels carry the plan's single
//! current status, annotations are the append-only history, and per-step
//! statuses are recovered from that history (last annotation per step/chunk
//! wins) rather than cached.
//!
//! Updates for one plan are serialized through a per-plan async lock so
//! concurrent triggers cannot interleave label and annotation writes.
//! Different plans proceed in parallel.

use crate::error::{HachikoError, PersistenceError};
use crate::plan::{MigrationPlan, MigrationStep, StepGraph};
use crate::state::dispatch::StepDispatcher;
use crate::state::labels::{is_status_label, plan_label, status_label};
use crate::state::render::render_metadata;
use crate::state::store::TrackingStore;
use crate::state::transitions::validate_transition;
use crate::types::{
    Annotation, DispatchPayload, ProgressMetadata, StepStatus, TrackingRecord,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key of one tracked status: `(step_id, chunk)`.
pub type StepKey = (String, Option<String>);

/// What a progress update did.
///
/// Anomalies are reported through this value rather than raised: a missing
/// record or a rejected transition must not take down the caller's flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was updated
    Applied {
        /// Record that received the update
        record_id: u64,
    },
    /// No open tracking record exists for the plan
    NoOpenRecord,
    /// The requested transition is outside the allowed relation
    RejectedTransition {
        /// Current status
        from: StepStatus,
        /// Requested status
        to: StepStatus,
    },
}

/// The migration state machine's tracking half.
pub struct ProgressTracker<S> {
    store: Arc<S>,
    plan_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: TrackingStore> ProgressTracker<S> {
    /// Create a tracker over a tracking store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            plan_locks: DashMap::new(),
        }
    }

    fn plan_lock(&self, plan_id: &str) -> Arc<Mutex<()>> {
        self.plan_locks
            .entry(plan_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The single open tracking record for a plan.
    ///
    /// When several records are open (an external anomaly), the lowest
    /// numeric id wins deterministically and a warning is logged.
    async fn open_record(
        &self,
        plan_id: &str,
    ) -> Result<Option<TrackingRecord>, PersistenceError> {
        let records = self.store.open_records(plan_id).await.map_err(|e| {
            tracing::error!("reading tracking records for plan '{}' failed: {}", plan_id, e);
            e
        })?;
        if records.len() > 1 {
            tracing::warn!(
                "plan '{}' has {} open tracking records; using the lowest id",
                plan_id,
                records.len()
            );
        }
        Ok(records.into_iter().min_by_key(|r| r.id))
    }

    /// Record a step-status transition.
    ///
    /// Replaces the record's prior status label (after re-reading current
    /// labels, so concurrent external edits are never clobbered) and appends
    /// an immutable annotation carrying the step id, status, and rendered
    /// metadata. A missing open record or an illegal transition is reported
    /// through the [`UpdateOutcome`]; persistence failures are logged with
    /// plan/step context and re-raised.
    pub async fn update_progress(
        &self,
        plan_id: &str,
        step_id: &str,
        chunk: Option<&str>,
        status: StepStatus,
        metadata: &ProgressMetadata,
    ) -> Result<UpdateOutcome, PersistenceError> {
        self.apply(plan_id, step_id, chunk, status, metadata, true)
            .await
    }

    /// Re-queue a step as a new attempt.
    ///
    /// This is the explicit external decision the transition relation does
    /// not model: a terminal `failed` step gets a fresh `queued` status.
    pub async fn requeue(
        &self,
        plan_id: &str,
        step_id: &str,
        chunk: Option<&str>,
    ) -> Result<UpdateOutcome, PersistenceError> {
        self.apply(
            plan_id,
            step_id,
            chunk,
            StepStatus::Queued,
            &ProgressMetadata::new(),
            false,
        )
        .await
    }

    async fn apply(
        &self,
        plan_id: &str,
        step_id: &str,
        chunk: Option<&str>,
        status: StepStatus,
        metadata: &ProgressMetadata,
        enforce_transitions: bool,
    ) -> Result<UpdateOutcome, PersistenceError> {
        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;

        let Some(record) = self.open_record(plan_id).await? else {
            tracing::warn!(
                "no open tracking record for plan '{}'; dropping {} update for step '{}'",
                plan_id,
                status,
                step_id
            );
            return Ok(UpdateOutcome::NoOpenRecord);
        };

        let key: StepKey = (step_id.to_string(), chunk.map(str::to_string));
        if enforce_transitions {
            if let Some(prior) = last_status(&record, &key) {
                if let Err(e) = validate_transition(prior, status) {
                    tracing::warn!("plan '{}' step '{}': {}", plan_id, step_id, e);
                    return Ok(UpdateOutcome::RejectedTransition {
                        from: prior,
                        to: status,
                    });
                }
                if prior == StepStatus::Paused {
                    if let Some(resume_to) = last_unpaused_status(&record, &key) {
                        if status != resume_to {
                            tracing::warn!(
                                "plan '{}' step '{}': paused step must resume to {}, not {}",
                                plan_id,
                                step_id,
                                resume_to,
                                status
                            );
                            return Ok(UpdateOutcome::RejectedTransition {
                                from: StepStatus::Paused,
                                to: status,
                            });
                        }
                    }
                }
            }
        }

        // Read-modify-write: the record may have been relabeled externally
        // since it was fetched, so filter against its current labels.
        let current = self.store.labels(record.id).await.map_err(|e| {
            tracing::error!(
                "reading labels of record #{} (plan '{}') failed: {}",
                record.id,
                plan_id,
                e
            );
            e
        })?;
        let mut labels: Vec<String> = current
            .into_iter()
            .filter(|label| !is_status_label(label))
            .collect();
        let plan_marker = plan_label(plan_id);
        if !labels.contains(&plan_marker) {
            labels.push(plan_marker);
        }
        labels.push(status_label(status));

        let persist = |e: PersistenceError| {
            tracing::error!(
                "updating tracking record #{} for plan '{}' step '{}' failed: {}",
                record.id,
                plan_id,
                step_id,
                e
            );
            e
        };
        self.store
            .set_labels(record.id, labels)
            .await
            .map_err(persist)?;
        self.store
            .append_annotation(
                record.id,
                Annotation {
                    step_id: step_id.to_string(),
                    chunk: chunk.map(str::to_string),
                    status,
                    body: render_metadata(metadata),
                    timestamp: Utc::now(),
                },
            )
            .await
            .map_err(persist)?;

        tracing::info!(
            "plan '{}' step '{}' is now {}",
            plan_id,
            step_id,
            status
        );
        Ok(UpdateOutcome::Applied {
            record_id: record.id,
        })
    }

    /// Current status of every tracked `(step, chunk)` of a plan, recovered
    /// from the open record's annotation history.
    pub async fn step_statuses(
        &self,
        plan_id: &str,
    ) -> Result<BTreeMap<StepKey, StepStatus>, PersistenceError> {
        Ok(self
            .open_record(plan_id)
            .await?
            .map(|record| statuses_from(&record))
            .unwrap_or_default())
    }

    /// Compute and dispatch the next eligible step after `completed_step_id`
    /// reached a terminal outcome.
    ///
    /// The next step is the first topologically-eligible unstarted step
    /// whose dependencies are all terminal-success (`completed` or
    /// `skipped`). Nothing is dispatched when the completed step did not
    /// actually succeed, when every remaining step is started, or when no
    /// open record exists.
    pub async fn emit_next_step<D>(
        &self,
        plan: &MigrationPlan,
        completed_step_id: &str,
        chunk: Option<&str>,
        dispatcher: &D,
    ) -> Result<Option<DispatchPayload>, HachikoError>
    where
        D: StepDispatcher + ?Sized,
    {
        let statuses = self.step_statuses(&plan.id).await?;

        let completed_key: StepKey =
            (completed_step_id.to_string(), chunk.map(str::to_string));
        let outcome = statuses.get(&completed_key).copied();
        if !outcome.is_some_and(StepStatus::is_terminal_success) {
            tracing::debug!(
                "step '{}' of plan '{}' is {:?}; nothing to dispatch",
                completed_step_id,
                plan.id,
                outcome
            );
            return Ok(None);
        }

        let steps = plan.steps();
        let next = StepGraph::build(plan)
            .topo_order()
            .into_iter()
            .filter_map(|id| steps.iter().find(|s| s.id == id))
            .find(|step| {
                !step_started(&statuses, &step.id)
                    && step
                        .dependencies
                        .iter()
                        .all(|dep| dependency_satisfied(&statuses, &steps, dep))
            });

        let Some(next) = next else {
            tracing::info!("plan '{}' has no further eligible steps", plan.id);
            return Ok(None);
        };

        let payload = DispatchPayload {
            plan_id: plan.id.clone(),
            step_id: next.id.clone(),
            chunk: None,
            prompt_config: plan.frontmatter.prompt_config.clone(),
        };
        dispatcher.dispatch(payload.clone()).await?;
        tracing::info!(
            "dispatched step '{}' of plan '{}' after '{}'",
            payload.step_id,
            plan.id,
            completed_step_id
        );
        Ok(Some(payload))
    }
}

fn statuses_from(record: &TrackingRecord) -> BTreeMap<StepKey, StepStatus> {
    let mut statuses = BTreeMap::new();
    for annotation in &record.annotations {
        statuses.insert(
            (annotation.step_id.clone(), annotation.chunk.clone()),
            annotation.status,
        );
    }
    statuses
}

fn last_status(record: &TrackingRecord, key: &StepKey) -> Option<StepStatus> {
    record
        .annotations
        .iter()
        .rev()
        .find(|a| a.step_id == key.0 && a.chunk == key.1)
        .map(|a| a.status)
}

fn last_unpaused_status(record: &TrackingRecord, key: &StepKey) -> Option<StepStatus> {
    record
        .annotations
        .iter()
        .rev()
        .filter(|a| a.step_id == key.0 && a.chunk == key.1)
        .map(|a| a.status)
        .find(|status| *status != StepStatus::Paused)
}

/// A step is started once any of its attempts moved past `queued`;
/// plan-acceptance and re-queue annotations do not count.
fn step_started(statuses: &BTreeMap<StepKey, StepStatus>, step_id: &str) -> bool {
    statuses
        .iter()
        .any(|((id, _), status)| id.as_str() == step_id && *status != StepStatus::Queued)
}

/// A dependency is satisfied when the step reached terminal success, either
/// as a whole or through every one of its declared chunks.
fn dependency_satisfied(
    statuses: &BTreeMap<StepKey, StepStatus>,
    steps: &[MigrationStep],
    dep_id: &str,
) -> bool {
    if statuses
        .get(&(dep_id.to_string(), None))
        .copied()
        .is_some_and(StepStatus::is_terminal_success)
    {
        return true;
    }
    let Some(dep) = steps.iter().find(|s| s.id == dep_id) else {
        return false;
    };
    !dep.chunks.is_empty()
        && dep.chunks.iter().all(|chunk| {
            statuses
                .get(&(dep_id.to_string(), Some(chunk.clone())))
                .copied()
                .is_some_and(StepStatus::is_terminal_success)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_fixtures::plan_with_steps;
    use crate::state::dispatch::ChannelDispatcher;
    use crate::state::labels;
    use crate::state::store::InMemoryTrackingStore;
    use serde_json::json;

    fn tracker() -> (Arc<InMemoryTrackingStore>, ProgressTracker<InMemoryTrackingStore>) {
        let store = Arc::new(InMemoryTrackingStore::new());
        let tracker = ProgressTracker::new(Arc::clone(&store));
        (store, tracker)
    }

    fn meta(entries: &[(&str, serde_json::Value)]) -> ProgressMetadata {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn running_then_completed_keeps_one_label_two_annotations() {
        let (store, tracker) = tracker();
        let id = store.create_record("p1");

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress(
                "p1",
                "1",
                None,
                StepStatus::Completed,
                &meta(&[("pr", json!("https://example.com/pr/9")), ("ok", json!(true))]),
            )
            .await
            .unwrap();

        let record = store.record(id).await.unwrap();
        let status_labels: Vec<_> = record
            .labels
            .iter()
            .filter(|l| labels::is_status_label(l))
            .collect();
        assert_eq!(status_labels, vec!["hachiko:status:completed"]);
        assert!(record.labels.contains(&"hachiko:plan:p1".to_string()));
        assert_eq!(record.annotations.len(), 2);
        assert_eq!(record.annotations[0].status, StepStatus::Running);
        assert!(record.annotations[1].body.contains("ok: Yes"));
        assert!(record.annotations[1]
            .body
            .contains("[https://example.com/pr/9](https://example.com/pr/9)"));
    }

    #[tokio::test]
    async fn missing_record_is_reported_not_raised() {
        let (_store, tracker) = tracker();
        let outcome = tracker
            .update_progress("ghost", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NoOpenRecord);
    }

    #[tokio::test]
    async fn lowest_record_id_wins_when_several_are_open() {
        let (store, tracker) = tracker();
        let first = store.create_record("p1");
        let second = store.create_record("p1");

        let outcome = tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied { record_id: first });
        assert!(store.record(second).await.unwrap().annotations.is_empty());
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected_in_place() {
        let (store, tracker) = tracker();
        store.create_record("p1");

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress("p1", "1", None, StepStatus::Completed, &meta(&[]))
            .await
            .unwrap();

        let outcome = tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::RejectedTransition {
                from: StepStatus::Completed,
                to: StepStatus::Running,
            }
        );
    }

    #[tokio::test]
    async fn requeue_is_the_explicit_escape_hatch() {
        let (store, tracker) = tracker();
        let id = store.create_record("p1");

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress("p1", "1", None, StepStatus::Failed, &meta(&[]))
            .await
            .unwrap();

        let outcome = tracker.requeue("p1", "1", None).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied { record_id: id });

        let statuses = tracker.step_statuses("p1").await.unwrap();
        assert_eq!(statuses[&("1".to_string(), None)], StepStatus::Queued);
    }

    #[tokio::test]
    async fn paused_steps_resume_to_their_prior_state() {
        let (store, tracker) = tracker();
        store.create_record("p1");

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress("p1", "1", None, StepStatus::Paused, &meta(&[]))
            .await
            .unwrap();

        // Resuming to a different non-terminal state is rejected.
        let outcome = tracker
            .update_progress("p1", "1", None, StepStatus::Queued, &meta(&[]))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UpdateOutcome::RejectedTransition {
                from: StepStatus::Paused,
                ..
            }
        ));

        let outcome = tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn external_labels_survive_updates() {
        let (store, tracker) = tracker();
        let id = store.create_record("p1");
        store
            .set_labels(
                id,
                vec![
                    "triage".to_string(),
                    "hachiko:status:queued".to_string(),
                ],
            )
            .await
            .unwrap();

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();

        let record = store.record(id).await.unwrap();
        assert!(record.labels.contains(&"triage".to_string()));
        assert!(record.labels.contains(&"hachiko:plan:p1".to_string()));
        let status_labels: Vec<_> = record
            .labels
            .iter()
            .filter(|l| labels::is_status_label(l))
            .collect();
        assert_eq!(status_labels, vec!["hachiko:status:running"]);
    }

    #[tokio::test]
    async fn concurrent_updates_for_one_plan_lose_nothing() {
        let (store, tracker) = tracker();
        let id = store.create_record("p1");
        let tracker = Arc::new(tracker);

        let a = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .update_progress("p1", "1", None, StepStatus::Running, &ProgressMetadata::new())
                    .await
            })
        };
        let b = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .update_progress("p1", "2", None, StepStatus::Running, &ProgressMetadata::new())
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let record = store.record(id).await.unwrap();
        assert_eq!(record.annotations.len(), 2);
        let status_labels: Vec<_> = record
            .labels
            .iter()
            .filter(|l| labels::is_status_label(l))
            .collect();
        assert_eq!(status_labels.len(), 1);
    }

    #[tokio::test]
    async fn next_step_waits_for_terminal_success() {
        let (store, tracker) = tracker();
        store.create_record("p1");
        let plan = plan_with_steps(&[("1", &[]), ("2", &["1"]), ("3", &["2"])]);
        let (dispatcher, mut receiver) = ChannelDispatcher::new(4);

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        let payload = tracker
            .emit_next_step(&plan, "1", None, &dispatcher)
            .await
            .unwrap();
        assert!(payload.is_none(), "running step must not trigger dispatch");

        tracker
            .update_progress("p1", "1", None, StepStatus::Completed, &meta(&[]))
            .await
            .unwrap();
        let payload = tracker
            .emit_next_step(&plan, "1", None, &dispatcher)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.step_id, "2");
        assert_eq!(receiver.recv().await.unwrap().step_id, "2");
    }

    #[tokio::test]
    async fn failed_dependency_blocks_dispatch() {
        let (store, tracker) = tracker();
        store.create_record("p1");
        let plan = plan_with_steps(&[("1", &[]), ("2", &["1"])]);
        let (dispatcher, _receiver) = ChannelDispatcher::new(4);

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress("p1", "1", None, StepStatus::Failed, &meta(&[]))
            .await
            .unwrap();

        let payload = tracker
            .emit_next_step(&plan, "1", None, &dispatcher)
            .await
            .unwrap();
        assert!(payload.is_none());
    }

    #[tokio::test]
    async fn skipped_counts_as_satisfied() {
        let (store, tracker) = tracker();
        store.create_record("p1");
        let plan = plan_with_steps(&[("1", &[]), ("2", &["1"])]);
        let (dispatcher, _receiver) = ChannelDispatcher::new(4);

        tracker
            .update_progress("p1", "1", None, StepStatus::Running, &meta(&[]))
            .await
            .unwrap();
        tracker
            .update_progress("p1", "1", None, StepStatus::Skipped, &meta(&[]))
            .await
            .unwrap();

        let payload = tracker
            .emit_next_step(&plan, "1", None, &dispatcher)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.step_id, "2");
    }
}
