use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use graphmill::checkpoint::MemoryCheckpointStore;
use graphmill::event::{EventBus, EventKind, MemorySink};
use graphmill::executor::{CancelToken, ExecutionConfig, Executor, ExecutorError, RunStatus};
use graphmill::graph::{GraphBuilder, COMPLETED_NODE, START};
use graphmill::graphs::default_registry;
use graphmill::node::{StepContext, StepError, StepNode, StepOutcome};
use graphmill::registry::{Registry, WorkflowCapabilities, WorkflowDescriptor};
use graphmill::state::WorkflowState;

mod common;
use common::{default_executor, hotel_initial, steps_of};

#[tokio::test]
async fn hotel_happy_path_pauses_twice_then_completes() {
    let executor = default_executor();
    let bus = EventBus::default();

    let paused = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    assert_eq!(paused.status, RunStatus::Paused);
    assert!(paused.interrupted);
    assert!(paused.final_state.pending_approval);
    let token = paused.interrupt.as_ref().unwrap();
    assert_eq!(token.operation, "check_in_guest");
    assert!(token.preview.contains("Room: 101"));

    let tid = paused.thread_id.clone();
    let paused_again = executor
        .resume(&tid, json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    assert_eq!(paused_again.status, RunStatus::Paused);
    assert_eq!(
        paused_again.interrupt.as_ref().unwrap().operation,
        "generate_invoice"
    );

    let done = executor
        .resume(&tid, json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert!(!done.interrupted);
    assert_eq!(
        steps_of(&done.final_state),
        vec!["check_in", "create_folio", "add_charges", "check_out", "generate_invoice"]
    );
    assert_eq!(done.final_state.current_step, "completed");
    assert!(!done.final_state.pending_approval);
    assert_eq!(done.final_state.fields["invoice_id"], json!("INV-RES-1"));
}

#[tokio::test]
async fn hotel_rejection_routes_to_rejected() {
    let executor = default_executor();
    let bus = EventBus::default();

    let paused = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    let rejected = executor
        .resume(&paused.thread_id, json!("reject"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();

    assert_eq!(rejected.status, RunStatus::Rejected);
    assert_eq!(rejected.final_state.current_step, "rejected");
    assert_eq!(rejected.final_state.errors[0].step, "check_in");
    assert!(steps_of(&rejected.final_state).is_empty());
    assert!(!rejected.final_state.pending_approval);
}

#[tokio::test]
async fn missing_required_fields_fail_before_any_event() {
    let executor = default_executor();
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());

    let err = executor
        .execute(
            "hotel_o2c",
            common::object(json!({"reservation_id": "X", "guest_name": "J"})),
            ExecutionConfig::default(),
            &bus,
        )
        .await
        .unwrap_err();

    let message = err.to_string();
    for field in ["room_number", "check_in_date", "check_out_date"] {
        assert!(message.contains(field), "{message} should name {field}");
    }
    assert!(sink.snapshot().is_empty());
}

#[tokio::test]
async fn unknown_graph_is_reported_without_events() {
    let executor = default_executor();
    let bus = EventBus::default();
    let err = executor
        .execute("ghost", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Registry(_)));
}

#[tokio::test]
async fn event_order_is_strict_within_a_run() {
    let executor = default_executor();
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());

    let paused = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    let kinds: Vec<EventKind> = sink.snapshot().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::WorkflowStart, EventKind::ApprovalRequired, EventKind::WorkflowPaused]
    );

    sink.clear();
    executor
        .resume(&paused.thread_id, json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    let events = sink.snapshot();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::StepComplete,
            EventKind::StepComplete,
            EventKind::StepComplete,
            EventKind::StepComplete,
            EventKind::ApprovalRequired,
            EventKind::WorkflowPaused,
        ]
    );
    // step_complete for a node precedes dispatch of its successor.
    let steps: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::StepComplete)
        .filter_map(|e| e.step.as_deref())
        .collect();
    assert_eq!(steps, vec!["check_in", "create_folio", "add_charges", "check_out"]);

    sink.clear();
    let done = executor
        .resume(&paused.thread_id, json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    let events = sink.snapshot();
    assert_eq!(events.last().unwrap().kind, EventKind::WorkflowComplete);
    // The final event's state equals the returned final state.
    assert_eq!(
        events.last().unwrap().state.as_ref().unwrap(),
        &done.final_state.to_value()
    );
    let progress = events.last().unwrap().progress.unwrap();
    assert_eq!(progress.percentage, 100);
}

#[tokio::test]
async fn resume_is_consistent_across_identical_drives() {
    let run = |decisions: Vec<&'static str>| async move {
        let executor = default_executor();
        let bus = EventBus::default();
        let config = || ExecutionConfig {
            thread_id: Some("fixed-thread".to_string()),
            ..Default::default()
        };
        let mut result = executor
            .execute("hotel_o2c", hotel_initial(), config(), &bus)
            .await
            .unwrap();
        for decision in decisions {
            assert_eq!(result.status, RunStatus::Paused);
            result = executor
                .resume("fixed-thread", json!(decision), config(), &bus)
                .await
                .unwrap();
        }
        result.final_state
    };

    let first = run(vec!["approve", "approve"]).await;
    let second = run(vec!["approve", "approve"]).await;
    assert_eq!(first, second);

    let rejected_first = run(vec!["approve", "reject"]).await;
    let rejected_second = run(vec!["approve", "reject"]).await;
    assert_eq!(rejected_first, rejected_second);
    assert_ne!(first, rejected_first);
}

#[tokio::test]
async fn resume_preconditions_are_enforced() {
    let executor = default_executor();
    let bus = EventBus::default();

    let err = executor
        .resume("nope", json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::UnknownThread { .. }));

    // Run to completion, then try to resume the finished thread.
    let paused = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    executor
        .resume(&paused.thread_id, json!("reject"), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    let err = executor
        .resume(&paused.thread_id, json!("approve"), ExecutionConfig::default(), &bus)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::NotSuspended { .. }));
}

struct SpinStep;

#[async_trait::async_trait]
impl StepNode for SpinStep {
    async fn run(
        &self,
        _state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::advance())
    }
}

fn looping_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        WorkflowDescriptor {
            name: "spin_forever".into(),
            industry: "test".into(),
            description: "self-loop for bound checks".into(),
            tags: vec![],
            initial_state_schema: vec![],
            estimated_steps: 5,
            capabilities: WorkflowCapabilities::default(),
        },
        Arc::new(|| {
            GraphBuilder::new("spin_forever")
                .add_step("spin", SpinStep)
                .add_edge(START, "spin")
                .add_edge("spin", "spin")
                .compile()
        }),
    );
    registry
}

#[tokio::test]
async fn recursion_limit_bounds_dispatches_and_rejects() {
    let executor = Executor::new(
        Arc::new(looping_registry()),
        Arc::new(MemoryCheckpointStore::default()),
    );
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    let config = ExecutionConfig {
        recursion_limit: 5,
        ..Default::default()
    };

    let result = executor
        .execute("spin_forever", serde_json::Map::new(), config, &bus)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Rejected);
    assert_eq!(result.error.as_deref(), Some("recursion-limit-exceeded"));
    assert_eq!(result.final_state.current_step, "rejected");
    assert!(result.final_state.steps_completed.len() <= 5);
    assert_eq!(
        result.final_state.errors.last().unwrap().reason,
        "recursion-limit-exceeded"
    );

    let events = sink.snapshot();
    assert_eq!(events.last().unwrap().kind, EventKind::WorkflowError);
}

struct SlowGate;

#[async_trait::async_trait]
impl StepNode for SlowGate {
    async fn run(
        &self,
        _state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(StepOutcome::advance())
    }
}

fn slow_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        WorkflowDescriptor {
            name: "slow".into(),
            industry: "test".into(),
            description: "sleeps inside its only step".into(),
            tags: vec![],
            initial_state_schema: vec![],
            estimated_steps: 1,
            capabilities: WorkflowCapabilities::default(),
        },
        Arc::new(|| {
            GraphBuilder::new("slow")
                .add_step("nap", SlowGate)
                .add_edge(START, "nap")
                .add_edge("nap", COMPLETED_NODE)
                .compile()
        }),
    );
    registry
}

#[tokio::test(flavor = "multi_thread")]
async fn second_execute_on_active_thread_conflicts() {
    let executor = Arc::new(Executor::new(
        Arc::new(slow_registry()),
        Arc::new(MemoryCheckpointStore::default()),
    ));
    let config = ExecutionConfig {
        thread_id: Some("dup".to_string()),
        ..Default::default()
    };

    let background = {
        let executor = Arc::clone(&executor);
        let config = config.clone();
        tokio::spawn(async move {
            let bus = EventBus::default();
            executor
                .execute("slow", serde_json::Map::new(), config, &bus)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let bus = EventBus::default();
    let err = executor
        .execute("slow", serde_json::Map::new(), config, &bus)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Conflict { .. }));

    let first = background.await.unwrap().unwrap();
    assert_eq!(first.status, RunStatus::Completed);
}

#[tokio::test]
async fn cancellation_is_observed_at_the_node_boundary() {
    let executor = default_executor();
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());

    let cancel = CancelToken::new();
    cancel.cancel();
    let config = ExecutionConfig {
        cancel: Some(cancel),
        ..Default::default()
    };

    let result = executor
        .execute("hotel_o2c", hotel_initial(), config, &bus)
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Rejected);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert_eq!(result.final_state.current_step, "rejected");

    let kinds: Vec<EventKind> = sink.snapshot().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::WorkflowStart, EventKind::WorkflowError, EventKind::WorkflowRejected]
    );
}

#[tokio::test]
async fn suspension_checkpoint_carries_the_token() {
    use graphmill::checkpoint::CheckpointStore;
    let store = Arc::new(MemoryCheckpointStore::default());
    let executor = Executor::new(
        Arc::new(default_registry()),
        Arc::clone(&store) as Arc<dyn CheckpointStore>,
    );
    let bus = EventBus::default();

    let paused = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();

    let latest = store.get_latest(&paused.thread_id).await.unwrap().unwrap();
    let suspension = latest.metadata.suspension.unwrap();
    assert_eq!(suspension.operation, "check_in_guest");
    assert_eq!(latest.metadata.next_node, "check_in_guest");
    assert!(latest.state.pending_approval);

    // Pre-dispatch plus suspension checkpoint, oldest first.
    let all = store.list(&paused.thread_id).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].metadata.suspension.is_none());
    assert!(all[0].checkpoint_id < all[1].checkpoint_id);
}
