use serde_json::{json, Map, Value};

use graphmill::graphs::default_registry;
use graphmill::registry::ValidationError;

mod common;
use common::object;

#[test]
fn lists_in_registration_order_and_filters_by_industry() {
    let registry = default_registry();

    let all = registry.list(None, None, None);
    let names: Vec<&str> = all.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "hotel_o2c",
            "hospital_admissions",
            "manufacturing_production",
            "retail_fulfillment",
            "education_admissions",
        ]
    );

    let hotel = registry.list(Some("hotel"), None, None);
    assert_eq!(hotel.len(), 1);
    assert_eq!(hotel[0].name, "hotel_o2c");

    assert!(registry.list(Some("aviation"), None, None).is_empty());
}

#[test]
fn filters_by_tags_and_capability_predicate() {
    let registry = default_registry();

    let financial = registry.list(None, Some(&["financial"]), None);
    assert_eq!(financial.len(), 1);
    assert_eq!(financial[0].name, "hotel_o2c");

    // Tag match is ANY, not ALL.
    let mixed = registry.list(None, Some(&["financial", "quality"]), None);
    assert_eq!(mixed.len(), 2);

    let interrupting = registry.list(None, None, Some(&|caps| caps.supports_interrupts));
    assert_eq!(interrupting.len(), 5);
    let parallel = registry.list(None, None, Some(&|caps| caps.supports_parallel));
    assert!(parallel.is_empty());
}

#[test]
fn capability_and_tag_rollups() {
    let registry = default_registry();
    assert_eq!(
        registry.find_by_capability("folio_management"),
        vec!["hotel_o2c"]
    );
    assert!(registry.all_tags().contains(&"clinical".to_string()));
    assert_eq!(
        registry.industries(),
        vec!["education", "hospital", "hotel", "manufacturing", "retail"]
    );

    let stats = registry.stats();
    assert_eq!(stats.total_workflows, 5);
    assert_eq!(stats.by_industry.get("hotel"), Some(&1));
    assert_eq!(stats.standard_capabilities.requires_approval, 5);
}

#[test]
fn load_caches_the_compiled_graph() {
    let registry = default_registry();
    assert_eq!(registry.stats().loaded_graphs, 0);

    let first = registry.load("hotel_o2c").unwrap();
    let second = registry.load("hotel_o2c").unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(registry.stats().loaded_graphs, 1);
    assert_eq!(first.entry(), "check_in_guest");
}

#[test]
fn load_reports_unknown_graph_with_available_names() {
    let registry = default_registry();
    let err = registry.load("ghost").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown workflow graph: ghost"));
    assert!(message.contains("hotel_o2c"));
}

#[test]
fn validate_names_every_missing_required_field() {
    let registry = default_registry();
    let mut state = object(json!({"reservation_id": "X", "guest_name": "J"}));
    let err = registry.validate("hotel_o2c", &mut state).unwrap_err();
    match err {
        ValidationError::MissingFields { fields } => {
            assert_eq!(fields, vec!["room_number", "check_in_date", "check_out_date"]);
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
}

#[test]
fn validate_autofills_base_fields_without_failing() {
    let registry = default_registry();
    let mut state = object(json!({
        "reservation_id": "RES-1",
        "guest_name": "J",
        "room_number": "101",
        "check_in_date": "2025-10-01",
        "check_out_date": "2025-10-02",
    }));
    registry.validate("hotel_o2c", &mut state).unwrap();

    assert_eq!(state["current_step"], "start");
    assert_eq!(state["steps_completed"], json!([]));
    assert_eq!(state["errors"], json!([]));
    assert_eq!(state["pending_approval"], json!(false));
    assert_eq!(state["approval_decision"], Value::Null);
}

#[test]
fn validate_reports_type_mismatch() {
    let registry = default_registry();
    let mut state = object(json!({
        "item_code": "WIDGET",
        "item_name": "Widget",
        "qty_to_produce": "ten",
        "production_date": "2025-10-01",
        "warehouse": "WH-1",
    }));
    let err = registry
        .validate("manufacturing_production", &mut state)
        .unwrap_err();
    match err {
        ValidationError::TypeMismatch { field, expected, got } => {
            assert_eq!(field, "qty_to_produce");
            assert_eq!(expected, "float");
            assert_eq!(got, "string");
        }
        other => panic!("expected type mismatch, got {other:?}"),
    }
}

#[test]
fn optional_fields_may_be_omitted() {
    let registry = default_registry();
    let mut state: Map<String, Value> = object(json!({
        "patient_name": "P",
        "admission_date": "2025-10-01",
        "primary_diagnosis": "pneumonia",
    }));
    registry.validate("hospital_admissions", &mut state).unwrap();
}
