//! Retail order fulfillment: inventory → sales order → pick list →
//! delivery note → payment.
//!
//! Sales orders need approval when stock will run low or the order value
//! crosses the large-order threshold; payments under the auto-approval
//! threshold clear without a second gate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::{GraphBuilder, GraphError, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE, START};
use crate::node::{RiskLevel, StepContext, StepError, StepNode, StepOutcome};
use crate::registry::{FieldSpec, WorkflowCapabilities, WorkflowDescriptor};
use crate::state::{ApprovalDecision, StateUpdate, WorkflowErrorRecord, WorkflowState};
use crate::steps::{request_approval, ApprovalSpec, GateOutcome};

const LARGE_ORDER_THRESHOLD: f64 = 5_000.0;
const PAYMENT_AUTO_APPROVE_LIMIT: f64 = 1_000.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct OrderItem {
    item_code: String,
    #[serde(default)]
    item_name: String,
    qty: f64,
    #[serde(default)]
    rate: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RetailFulfillmentFields {
    customer_name: String,
    customer_id: String,
    order_items: Vec<OrderItem>,
    delivery_date: String,
    warehouse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sales_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pick_list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivery_note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payment_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_availability: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    low_stock_items: Option<Vec<Value>>,
    #[serde(default)]
    order_total: f64,
}

/// Stock lookup stand-in for the warehouse backend.
fn available_stock(item_code: &str) -> f64 {
    match item_code {
        "LAPTOP-DELL-I5" => 25.0,
        "MOUSE-WIRELESS" => 150.0,
        "KEYBOARD-MECH" => 45.0,
        "MONITOR-24" => 12.0,
        "HDMI-CABLE" => 200.0,
        _ => 100.0,
    }
}

struct CheckInventory;

#[async_trait]
impl StepNode for CheckInventory {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: RetailFulfillmentFields = state.decode_fields()?;
        let mut availability = Map::new();
        let mut low_stock = Vec::new();

        for item in &fields.order_items {
            let available = available_stock(&item.item_code);
            let required = item.qty;
            availability.insert(
                item.item_code.clone(),
                json!({
                    "available": available,
                    "required": required,
                    "sufficient": available >= required,
                }),
            );
            let remaining = available - required;
            if remaining < required * 0.2 || remaining < 10.0 {
                low_stock.push(json!({
                    "item_code": item.item_code,
                    "item_name": item.item_name,
                    "required": required,
                    "available": available,
                    "remaining_after": remaining,
                }));
            }
        }
        tracing::debug!(
            items = fields.order_items.len(),
            warehouse = %fields.warehouse,
            low_stock = low_stock.len(),
            "inventory checked"
        );

        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("stock_availability", Value::Object(availability))
                .with_field("low_stock_items", json!(low_stock)),
        ))
    }
}

struct CreateSalesOrder;

#[async_trait]
impl StepNode for CreateSalesOrder {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: RetailFulfillmentFields = state.decode_fields()?;
        let order_total: f64 = fields
            .order_items
            .iter()
            .map(|item| item.qty * item.rate)
            .sum();
        let low_stock = fields.low_stock_items.clone().unwrap_or_default();
        let has_low_stock = !low_stock.is_empty();
        let is_large_order = order_total > LARGE_ORDER_THRESHOLD;
        let sales_order_id = format!("SO-{}-001", fields.customer_id);

        let approved_update = || {
            StateUpdate::new()
                .with_field("sales_order_id", json!(sales_order_id))
                .with_field("order_total", json!(order_total))
        };

        if !has_low_stock && !is_large_order {
            return Ok(StepOutcome::goto("create_pick_list", approved_update()));
        }

        let mut warnings = Vec::new();
        if has_low_stock {
            warnings.push(format!(
                "{} items will have low stock after fulfillment",
                low_stock.len()
            ));
        }
        if is_large_order {
            warnings.push(format!(
                "Large order: ${order_total:.2} (threshold: ${LARGE_ORDER_THRESHOLD:.0})"
            ));
        }

        let spec = ApprovalSpec {
            operation: "create_sales_order".into(),
            operation_type: "retail_order".into(),
            risk_level: if is_large_order {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
            details: json!({
                "customer_name": fields.customer_name,
                "customer_id": fields.customer_id,
                "order_total": order_total,
                "total_items": fields.order_items.len(),
                "low_stock_items": low_stock,
                "warnings": warnings,
            }),
            preview: format!(
                "Sales Order Review:\n\nCustomer: {} ({})\nDelivery Date: {}\nOrder Total: ${order_total:.2}\n\n{}",
                fields.customer_name,
                fields.customer_id,
                fields.delivery_date,
                warnings.join("\n"),
            ),
            action: "Order requires approval - review inventory impact or order value".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "create_pick_list",
                approved_update().with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "create_sales_order",
                        "Sales order rejected due to inventory concerns or order value",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct CreatePickList;

#[async_trait]
impl StepNode for CreatePickList {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: RetailFulfillmentFields = state.decode_fields()?;
        let sales_order_id = fields.sales_order_id.ok_or(StepError::MissingField {
            what: "sales_order_id",
        })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("pick_list_id", json!(format!("PL-{sales_order_id}"))),
        ))
    }
}

struct CreateDeliveryNote;

#[async_trait]
impl StepNode for CreateDeliveryNote {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: RetailFulfillmentFields = state.decode_fields()?;
        let sales_order_id = fields.sales_order_id.ok_or(StepError::MissingField {
            what: "sales_order_id",
        })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("delivery_note_id", json!(format!("DN-{sales_order_id}"))),
        ))
    }
}

struct CreatePaymentEntry;

#[async_trait]
impl StepNode for CreatePaymentEntry {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: RetailFulfillmentFields = state.decode_fields()?;
        let sales_order_id = fields.sales_order_id.ok_or(StepError::MissingField {
            what: "sales_order_id",
        })?;
        let order_total = fields.order_total;
        let payment_entry_id = format!("PE-{sales_order_id}");

        // Small payments clear without a gate.
        if order_total < PAYMENT_AUTO_APPROVE_LIMIT && !ctx.has_decision() {
            return Ok(StepOutcome::goto(
                COMPLETED_NODE,
                StateUpdate::new().with_field("payment_entry_id", json!(payment_entry_id)),
            ));
        }

        let spec = ApprovalSpec {
            operation: "create_payment_entry".into(),
            operation_type: "retail_payment".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "customer_name": fields.customer_name,
                "customer_id": fields.customer_id,
                "sales_order_id": sales_order_id,
                "delivery_note_id": fields.delivery_note_id,
                "amount": order_total,
                "payment_method": "Credit Card",
            }),
            preview: format!(
                "Payment Entry:\n\nCustomer: {}\nSales Order: {sales_order_id}\nAmount: ${order_total:.2}\nPayment Method: Credit Card\n\nLarge payment - requires approval",
                fields.customer_name,
            ),
            action: "Please approve payment processing".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                COMPLETED_NODE,
                StateUpdate::new()
                    .with_field("payment_entry_id", json!(payment_entry_id))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "create_payment",
                        "Payment processing rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

pub fn create_graph() -> Result<WorkflowGraph, GraphError> {
    GraphBuilder::new("retail_fulfillment")
        .add_step("check_inventory", CheckInventory)
        .add_step("create_sales_order", CreateSalesOrder)
        .add_step("create_pick_list", CreatePickList)
        .add_step("create_delivery_note", CreateDeliveryNote)
        .add_step_labeled("create_payment_entry", "create_payment", CreatePaymentEntry)
        .add_edge(START, "check_inventory")
        .add_edge("check_inventory", "create_sales_order")
        .add_routes("create_sales_order", ["create_pick_list", REJECTED_NODE])
        .add_edge("create_pick_list", "create_delivery_note")
        .add_edge("create_delivery_note", "create_payment_entry")
        .add_routes("create_payment_entry", [COMPLETED_NODE, REJECTED_NODE])
        .compile()
}

pub fn descriptor() -> WorkflowDescriptor {
    WorkflowDescriptor {
        name: "retail_fulfillment".into(),
        industry: "retail".into(),
        description:
            "Retail Order Fulfillment: Inventory check → Sales order → Pick list → Delivery → Payment"
                .into(),
        tags: vec!["retail".into(), "fulfillment".into(), "inventory".into()],
        initial_state_schema: vec![
            ("customer_name".into(), FieldSpec::required("str")),
            ("customer_id".into(), FieldSpec::required("str")),
            ("order_items".into(), FieldSpec::required("list[dict]")),
            ("delivery_date".into(), FieldSpec::required("str")),
            ("warehouse".into(), FieldSpec::required("str")),
        ],
        estimated_steps: 5,
        capabilities: WorkflowCapabilities::default().with_custom([
            "inventory_validation",
            "pick_list_generation",
            "delivery_tracking",
        ]),
    }
}
