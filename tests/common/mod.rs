#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Map, Value};

use graphmill::checkpoint::MemoryCheckpointStore;
use graphmill::executor::Executor;
use graphmill::graphs::default_registry;

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn hotel_initial() -> Map<String, Value> {
    object(json!({
        "reservation_id": "RES-1",
        "guest_name": "J",
        "room_number": "101",
        "check_in_date": "2025-10-01",
        "check_out_date": "2025-10-02",
    }))
}

/// Retail order totaling $750 that trips the low-stock gate at the sales
/// order (MONITOR-24 leaves fewer than ten units) but clears payment
/// without a second suspension.
pub fn retail_small_order() -> Map<String, Value> {
    object(json!({
        "customer_name": "TechCorp Solutions",
        "customer_id": "CUST-001",
        "order_items": [
            {"item_code": "MONITOR-24", "item_name": "24-inch Monitor", "qty": 3, "rate": 200.0},
            {"item_code": "MOUSE-WIRELESS", "item_name": "Wireless Mouse", "qty": 6, "rate": 25.0},
        ],
        "delivery_date": "2025-11-01",
        "warehouse": "Main Warehouse",
    }))
}

pub fn default_executor() -> Executor {
    Executor::new(
        Arc::new(default_registry()),
        Arc::new(MemoryCheckpointStore::default()),
    )
}

pub fn steps_of(state: &graphmill::state::WorkflowState) -> Vec<&str> {
    state.steps_completed.iter().map(String::as_str).collect()
}
