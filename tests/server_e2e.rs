use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use graphmill::checkpoint::MemoryCheckpointStore;
use graphmill::config::ServiceConfig;
use graphmill::executor::Executor;
use graphmill::graphs::default_registry;
use graphmill::server::{router, ServiceState};

async fn spawn_server() -> String {
    let registry = Arc::new(default_registry());
    let store = Arc::new(MemoryCheckpointStore::default());
    let executor = Arc::new(Executor::new(registry, store));
    let state = Arc::new(ServiceState {
        executor,
        config: ServiceConfig::default(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(state)).await {
            eprintln!("test server error: {err:?}");
        }
    });
    format!("http://{addr}")
}

fn hotel_request(stream: bool) -> Value {
    json!({
        "graph_name": "hotel_o2c",
        "initial_state": {
            "reservation_id": "RES-1",
            "guest_name": "J",
            "room_number": "101",
            "check_in_date": "2025-10-01",
            "check_out_date": "2025-10-02",
        },
        "stream": stream,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn health_and_listing_endpoints() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(&base)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["workflows"]["total_workflows"], 5);

    let listing: Value = client
        .get(format!("{base}/workflows?industry=hotel"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["total"], 1);
    assert!(listing["workflows"]["hotel_o2c"]["initial_state_schema"]["room_number"]
        .as_str()
        .is_some());
    assert_eq!(listing["by_industry"]["hotel"], 1);

    let descriptor: Value = client
        .get(format!("{base}/workflows/retail_fulfillment"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(descriptor["industry"], "retail");

    let missing = client
        .get(format!("{base}/workflows/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_and_resume_json_mode() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let paused: Value = client
        .post(format!("{base}/execute"))
        .json(&hotel_request(false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paused["status"], "paused");
    let thread_id = paused["thread_id"].as_str().unwrap().to_string();
    assert_eq!(paused["interrupt_data"]["operation"], "check_in_guest");
    assert_eq!(paused["final_state"]["pending_approval"], json!(true));

    let paused_again: Value = client
        .post(format!("{base}/resume"))
        .json(&json!({"thread_id": thread_id, "decision": "approve", "stream": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paused_again["status"], "paused");
    assert_eq!(paused_again["interrupt_data"]["operation"], "generate_invoice");

    let done: Value = client
        .post(format!("{base}/resume"))
        .json(&json!({"thread_id": thread_id, "decision": "approve", "stream": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "completed");
    assert_eq!(
        done["final_state"]["steps_completed"],
        json!(["check_in", "create_folio", "add_charges", "check_out", "generate_invoice"])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejection_via_resume() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let paused: Value = client
        .post(format!("{base}/execute"))
        .json(&hotel_request(false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = paused["thread_id"].as_str().unwrap();

    let rejected: Value = client
        .post(format!("{base}/resume"))
        .json(&json!({"thread_id": thread_id, "decision": "reject", "stream": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["final_state"]["current_step"], "rejected");
    assert_eq!(rejected["final_state"]["errors"][0]["step"], "check_in");
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_failures_are_4xx_with_field_names() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/execute"))
        .json(&json!({
            "graph_name": "hotel_o2c",
            "initial_state": {"reservation_id": "X", "guest_name": "J"},
            "stream": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    for field in ["room_number", "check_in_date", "check_out_date"] {
        assert!(detail.contains(field), "{detail} should name {field}");
    }

    let unknown = client
        .post(format!("{base}/execute"))
        .json(&json!({"graph_name": "ghost", "initial_state": {}, "stream": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let missing_thread = client
        .post(format!("{base}/resume"))
        .json(&json!({"thread_id": "nope", "decision": "approve", "stream": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_thread.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_request_fields_are_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let mut request = hotel_request(false);
    request["surprise"] = json!(true);
    let response = client
        .post(format!("{base}/execute"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_execute_frames_until_paused() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/execute"))
        .json(&hotel_request(true))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );

    // The stream closes once the run pauses, so the full body is readable.
    let body = response.text().await.unwrap();
    let frames: Vec<&str> = body.split("\n\n").filter(|f| !f.is_empty()).collect();
    assert_eq!(frames.len(), 3);
    assert!(frames[0].starts_with("event: workflow_start\ndata: {"));
    assert!(frames[1].starts_with("event: approval_required\ndata: {"));
    assert!(frames[2].starts_with("event: workflow_paused\ndata: {"));

    // Resume the paused run over the streaming surface as well.
    let data_line = frames[2].lines().nth(1).unwrap();
    let payload: Value = serde_json::from_str(&data_line["data: ".len()..]).unwrap();
    let thread_id = payload["state"]["metadata"]["run_id"].as_str().unwrap();

    let resume_body = client
        .post(format!("{base}/resume"))
        .json(&json!({"thread_id": thread_id, "decision": "reject"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(resume_body.contains("event: step_complete"));
    assert!(resume_body.contains("event: workflow_rejected"));
}
