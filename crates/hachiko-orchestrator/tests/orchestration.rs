//! End-to-end orchestration flow against the mock backend.

use hachiko_agents::{Agent, MockAdapter, MockAgentConfig, PolicyConfig, PolicyEngine};
use hachiko_core::branch::branch_name;
use hachiko_core::state::{ChannelDispatcher, InMemoryTrackingStore, TrackingStore};
use hachiko_core::types::{DispatchPayload, StepStatus};
use hachiko_orchestrator::{Orchestrator, OrchestratorConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const PLAN: &str = r#"---
id: react-18
title: Upgrade to React 18
prompt_config: prompts/react.yaml
steps:
  - id: "1"
    description: Update dependencies
    files:
      - package.json
  - id: "2"
    dependencies: ["1"]
    files:
      - src/App.tsx
---
# Upgrade notes

Follow the migration guide.

## Step 2

Convert render calls to createRoot.
"#;

const CYCLIC_PLAN: &str = r#"---
id: broken
steps:
  - id: "a"
    dependencies: ["b"]
  - id: "b"
    dependencies: ["a"]
---
"#;

struct Harness {
    repo: TempDir,
    store: Arc<InMemoryTrackingStore>,
    receiver: mpsc::Receiver<DispatchPayload>,
    orchestrator: Orchestrator<InMemoryTrackingStore, ChannelDispatcher>,
}

fn harness(mock: MockAgentConfig, policy: PolicyConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let repo = TempDir::new().unwrap();
    std::fs::create_dir_all(repo.path().join(".hachiko/migrations")).unwrap();
    std::fs::write(repo.path().join(".hachiko/migrations/react.md"), PLAN).unwrap();
    std::fs::write(repo.path().join("package.json"), "{}\n").unwrap();

    let store = Arc::new(InMemoryTrackingStore::new());
    store.create_record("react-18");

    let (dispatcher, receiver) = ChannelDispatcher::new(8);
    let agent = Agent::Mock(MockAdapter::new(
        mock.with_execution_time(Duration::from_millis(1)),
        PolicyEngine::new(policy).unwrap(),
    ));
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::new(repo.path()),
        Arc::clone(&store),
        dispatcher,
        agent,
    );

    Harness {
        repo,
        store,
        receiver,
        orchestrator,
    }
}

#[tokio::test]
async fn completed_step_records_status_and_dispatches_next() {
    let mut h = harness(
        MockAgentConfig::new()
            .with_success_rate(1.0)
            .with_modify_files(true),
        PolicyConfig::new(),
    );

    let (plans, problems) = h.orchestrator.load_plans();
    assert!(problems.is_empty(), "{problems:?}");
    let plan = plans.iter().find(|p| p.id == "react-18").unwrap();

    let report = h.orchestrator.run_step(plan, "1", None).await.unwrap();
    assert_eq!(report.status, StepStatus::Completed);
    assert_eq!(report.result.modified_files, vec!["package.json"]);

    // The state machine selected step 2 and handed it to the dispatcher.
    let dispatched = report.dispatched.unwrap();
    assert_eq!(dispatched.step_id, "2");
    assert_eq!(dispatched.prompt_config.as_deref(), Some("prompts/react.yaml"));
    assert_eq!(h.receiver.recv().await.unwrap().step_id, "2");

    // The tracking record carries one current status label and the full
    // running -> completed history.
    let record = &h.store.open_records("react-18").await.unwrap()[0];
    assert!(record
        .labels
        .contains(&"hachiko:status:completed".to_string()));
    assert!(!record.labels.contains(&"hachiko:status:running".to_string()));
    assert_eq!(record.annotations.len(), 2);
    assert_eq!(record.annotations[0].status, StepStatus::Running);
    assert_eq!(record.annotations[1].status, StepStatus::Completed);
    assert!(record.annotations[1].body.contains("success: Yes"));
}

#[tokio::test]
async fn failed_step_does_not_dispatch() {
    let mut h = harness(
        MockAgentConfig::new().with_success_rate(0.0),
        PolicyConfig::new(),
    );

    let (plans, _) = h.orchestrator.load_plans();
    let plan = plans.iter().find(|p| p.id == "react-18").unwrap();

    let report = h.orchestrator.run_step(plan, "1", None).await.unwrap();
    assert_eq!(report.status, StepStatus::Failed);
    assert!(report.dispatched.is_none());
    assert!(h.receiver.try_recv().is_err());

    let record = &h.store.open_records("react-18").await.unwrap()[0];
    assert!(record.labels.contains(&"hachiko:status:failed".to_string()));
    assert!(record.annotations[1].body.contains("success: No"));
}

#[tokio::test]
async fn policy_violations_fail_the_step_before_mutation() {
    let mut h = harness(
        MockAgentConfig::new()
            .with_success_rate(1.0)
            .with_modify_files(true),
        PolicyConfig::new().deny("package.json"),
    );

    let (plans, _) = h.orchestrator.load_plans();
    let plan = plans.iter().find(|p| p.id == "react-18").unwrap();

    let report = h.orchestrator.run_step(plan, "1", None).await.unwrap();
    assert_eq!(report.status, StepStatus::Failed);
    assert_eq!(report.result.exit_code, 1);
    assert!(report
        .result
        .error
        .as_deref()
        .unwrap()
        .contains("package.json"));
    assert!(report.dispatched.is_none());

    let contents = std::fs::read_to_string(h.repo.path().join("package.json")).unwrap();
    assert_eq!(contents, "{}\n", "denied file must not be touched");
}

#[tokio::test]
async fn branch_events_resolve_to_their_step() {
    let mut h = harness(
        MockAgentConfig::new().with_success_rate(1.0),
        PolicyConfig::new(),
    );

    let branch = branch_name("react-18", "1", None).unwrap();
    let report = h
        .orchestrator
        .handle_branch_event(&branch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.plan_id, "react-18");
    assert_eq!(report.step_id, "1");
    assert_eq!(report.status, StepStatus::Completed);
    assert_eq!(h.receiver.recv().await.unwrap().step_id, "2");

    // Foreign branches are ignored.
    assert!(h
        .orchestrator
        .handle_branch_event("feature/unrelated")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn invalid_plans_are_skipped_not_fatal() {
    let h = harness(
        MockAgentConfig::new().with_success_rate(1.0),
        PolicyConfig::new(),
    );
    std::fs::write(
        h.repo.path().join(".hachiko/migrations/broken.md"),
        CYCLIC_PLAN,
    )
    .unwrap();

    let (plans, problems) = h.orchestrator.load_plans();
    assert!(plans.iter().any(|p| p.id == "react-18"));
    assert!(plans.iter().all(|p| p.id != "broken"));
    assert!(problems.iter().any(|p| p.contains("cycle")));
}

#[tokio::test]
async fn unknown_steps_are_contained_failures() {
    let h = harness(
        MockAgentConfig::new().with_success_rate(1.0),
        PolicyConfig::new(),
    );
    let (plans, _) = h.orchestrator.load_plans();
    let plan = plans.iter().find(|p| p.id == "react-18").unwrap();

    let report = h.orchestrator.run_step(plan, "99", None).await.unwrap();
    assert_eq!(report.status, StepStatus::Failed);
    assert!(report.result.error.as_deref().unwrap().contains("no step '99'"));

    // Nothing was recorded for the phantom step.
    let record = &h.store.open_records("react-18").await.unwrap()[0];
    assert!(record.annotations.is_empty());
}
