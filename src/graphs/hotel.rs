//! Hotel Order-to-Cash: check-in → folio → charges → check-out → invoice.
//!
//! Check-in and invoice generation are approval-gated; the middle steps are
//! automatic document creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::graph::{GraphBuilder, GraphError, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE, START};
use crate::node::{RiskLevel, StepContext, StepError, StepNode, StepOutcome};
use crate::registry::{FieldSpec, WorkflowCapabilities, WorkflowDescriptor};
use crate::state::{ApprovalDecision, StateUpdate, WorkflowErrorRecord, WorkflowState};
use crate::steps::{request_approval, ApprovalSpec, GateOutcome};

const ROOM_RATE: f64 = 150.0;
const TAX_RATE: f64 = 0.10;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct HotelO2CFields {
    reservation_id: String,
    guest_name: String,
    room_number: String,
    check_in_date: String,
    check_out_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folio_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invoice_id: Option<String>,
}

struct CheckInGuest;

#[async_trait]
impl StepNode for CheckInGuest {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HotelO2CFields = state.decode_fields()?;
        let spec = ApprovalSpec {
            operation: "check_in_guest".into(),
            operation_type: "hotel_check_in".into(),
            risk_level: RiskLevel::Medium,
            details: json!({
                "guest_name": fields.guest_name,
                "room_number": fields.room_number,
                "check_in_date": fields.check_in_date,
                "check_out_date": fields.check_out_date,
                "reservation_id": fields.reservation_id,
            }),
            preview: format!(
                "Check-in Details:\n- Guest: {}\n- Room: {}\n- Check-in: {}\n- Check-out: {}",
                fields.guest_name, fields.room_number, fields.check_in_date, fields.check_out_date
            ),
            action: "Please approve guest check-in".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "create_folio",
                StateUpdate::new().with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new("check_in", "User rejected check-in"))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct CreateFolio;

#[async_trait]
impl StepNode for CreateFolio {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HotelO2CFields = state.decode_fields()?;
        let folio_id = format!("FO-{}", fields.reservation_id);
        tracing::debug!(%folio_id, "creating guest folio");
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("folio_id", json!(folio_id)),
        ))
    }
}

struct AddCharges;

#[async_trait]
impl StepNode for AddCharges {
    async fn run(
        &self,
        _state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let nights = 1.0;
        let total = ROOM_RATE * nights;
        let grand_total = total + total * TAX_RATE;
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("folio_total", json!(grand_total)),
        ))
    }
}

struct CheckOutGuest;

#[async_trait]
impl StepNode for CheckOutGuest {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HotelO2CFields = state.decode_fields()?;
        tracing::debug!(guest = %fields.guest_name, "checking out guest");
        Ok(StepOutcome::advance())
    }
}

struct GenerateInvoice;

#[async_trait]
impl StepNode for GenerateInvoice {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HotelO2CFields = state.decode_fields()?;
        let tax = ROOM_RATE * TAX_RATE;
        let grand_total = ROOM_RATE + tax;
        let spec = ApprovalSpec {
            operation: "generate_invoice".into(),
            operation_type: "hotel_invoice".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "guest_name": fields.guest_name,
                "folio_id": fields.folio_id,
                "room_number": fields.room_number,
                "room_rate": ROOM_RATE,
                "tax": tax,
                "grand_total": grand_total,
            }),
            preview: format!(
                "Invoice Details:\n- Guest: {}\n- Folio: {}\n- Room Rate: ${ROOM_RATE:.2}\n- Tax: ${tax:.2}\n- Grand Total: ${grand_total:.2}",
                fields.guest_name,
                fields.folio_id.as_deref().unwrap_or("-"),
            ),
            action: "Please approve invoice generation".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => {
                let invoice_id = format!("INV-{}", fields.reservation_id);
                Ok(StepOutcome::goto(
                    COMPLETED_NODE,
                    StateUpdate::new()
                        .with_field("invoice_id", json!(invoice_id))
                        .with_decision(ApprovalDecision::Approved),
                ))
            }
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "generate_invoice",
                        "User rejected invoice",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

pub fn create_graph() -> Result<WorkflowGraph, GraphError> {
    GraphBuilder::new("hotel_o2c")
        .add_step_labeled("check_in_guest", "check_in", CheckInGuest)
        .add_step("create_folio", CreateFolio)
        .add_step("add_charges", AddCharges)
        .add_step_labeled("check_out_guest", "check_out", CheckOutGuest)
        .add_step("generate_invoice", GenerateInvoice)
        .add_edge(START, "check_in_guest")
        .add_routes("check_in_guest", ["create_folio", REJECTED_NODE])
        .add_edge("create_folio", "add_charges")
        .add_edge("add_charges", "check_out_guest")
        .add_edge("check_out_guest", "generate_invoice")
        .add_routes("generate_invoice", [COMPLETED_NODE, REJECTED_NODE])
        .compile()
}

pub fn descriptor() -> WorkflowDescriptor {
    WorkflowDescriptor {
        name: "hotel_o2c".into(),
        industry: "hotel".into(),
        description: "Hotel Order-to-Cash: Check-in → Folio → Check-out → Invoice".into(),
        tags: vec!["financial".into(), "hospitality".into(), "order-to-cash".into()],
        initial_state_schema: vec![
            ("reservation_id".into(), FieldSpec::required("str")),
            ("guest_name".into(), FieldSpec::required("str")),
            ("room_number".into(), FieldSpec::required("str")),
            ("check_in_date".into(), FieldSpec::required("str")),
            ("check_out_date".into(), FieldSpec::required("str")),
        ],
        estimated_steps: 5,
        capabilities: WorkflowCapabilities::default()
            .with_custom(["folio_management", "charge_tracking"]),
    }
}
