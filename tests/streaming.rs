use serde_json::{json, Value};

use graphmill::event::{sse_frame, EventBus, EventKind, Progress, ProgressEvent};
use graphmill::executor::ExecutionConfig;

mod common;
use common::{default_executor, hotel_initial};

#[test]
fn frame_is_event_line_data_line_blank() {
    let event = ProgressEvent::step_complete(
        "hotel_o2c",
        "create_folio",
        json!({"current_step": "add_charges"}),
        Progress::from_counts(2, Some(5)),
    );
    let frame = sse_frame(&event);
    let mut lines = frame.lines();

    assert_eq!(lines.next(), Some("event: step_complete"));
    let data = lines.next().unwrap();
    assert!(data.starts_with("data: "));
    assert_eq!(lines.next(), Some(""));
    assert!(lines.next().is_none());

    // The data line is single-line JSON with the documented fields.
    let payload: Value = serde_json::from_str(&data["data: ".len()..]).unwrap();
    assert_eq!(payload["type"], "step_complete");
    assert_eq!(payload["graph_name"], "hotel_o2c");
    assert_eq!(payload["step"], "create_folio");
    assert_eq!(payload["progress"]["current_step"], 2);
    assert_eq!(payload["progress"]["total_steps"], 5);
    assert_eq!(payload["progress"]["percentage"], 40);
    assert!(payload["timestamp"].as_i64().unwrap() > 1_600_000_000_000);
}

#[test]
fn error_frame_carries_the_message() {
    let frame = sse_frame(&ProgressEvent::workflow_error("hotel_o2c", "checkpoint-failed"));
    assert!(frame.starts_with("event: workflow_error\n"));
    assert!(frame.contains("\"error\":\"checkpoint-failed\""));
}

#[tokio::test]
async fn subscribed_channel_sees_the_run_in_order_until_pause() {
    let executor = default_executor();
    let bus = EventBus::with_sinks(vec![]);
    let rx = bus.subscribe();

    executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    drop(bus);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![EventKind::WorkflowStart, EventKind::ApprovalRequired, EventKind::WorkflowPaused]
    );
}

#[tokio::test]
async fn paused_frame_agrees_with_pending_state() {
    let executor = default_executor();
    let bus = EventBus::with_sinks(vec![]);
    let rx = bus.subscribe();

    let result = executor
        .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
        .await
        .unwrap();
    drop(bus);

    let events: Vec<_> = rx.drain().collect();
    let paused = events
        .iter()
        .find(|e| e.kind == EventKind::WorkflowPaused)
        .unwrap();
    assert_eq!(paused.state.as_ref().unwrap(), &result.final_state.to_value());
    assert_eq!(paused.state.as_ref().unwrap()["pending_approval"], json!(true));

    let approval = events
        .iter()
        .find(|e| e.kind == EventKind::ApprovalRequired)
        .unwrap();
    let token = approval.token.as_ref().unwrap();
    assert_eq!(token.operation, "check_in_guest");
    assert_eq!(token.risk_level, graphmill::node::RiskLevel::Medium);
}
