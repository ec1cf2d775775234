//! Manufacturing production: material check → work order → material
//! request → stock entry → quality inspection.
//!
//! A material request is only raised (and gated) when the BOM explosion
//! finds a shortage; quality inspection always requires sign-off.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::graph::{GraphBuilder, GraphError, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE, START};
use crate::node::{RiskLevel, StepContext, StepError, StepNode, StepOutcome};
use crate::registry::{FieldSpec, WorkflowCapabilities, WorkflowDescriptor};
use crate::state::{ApprovalDecision, StateUpdate, WorkflowErrorRecord, WorkflowState};
use crate::steps::{request_approval, ApprovalSpec, GateOutcome};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ManufacturingFields {
    item_code: String,
    item_name: String,
    qty_to_produce: f64,
    production_date: String,
    warehouse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    work_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    material_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quality_inspection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required_materials: Option<Vec<Value>>,
    #[serde(default)]
    material_shortage: bool,
}

/// BOM explosion stand-in: each unit consumes two components, one of which
/// is short above ten units.
fn bom_materials(item_code: &str, qty: f64) -> Vec<Value> {
    vec![
        json!({
            "item_code": format!("{item_code}-FRAME"),
            "required": qty,
            "available": 500.0,
            "shortage": false,
        }),
        json!({
            "item_code": format!("{item_code}-CORE"),
            "required": qty * 2.0,
            "available": 20.0,
            "shortage": qty * 2.0 > 20.0,
        }),
    ]
}

struct CheckMaterialAvailability;

#[async_trait]
impl StepNode for CheckMaterialAvailability {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: ManufacturingFields = state.decode_fields()?;
        let materials = bom_materials(&fields.item_code, fields.qty_to_produce);
        let shortage = materials
            .iter()
            .any(|m| m["shortage"].as_bool().unwrap_or(false));
        tracing::debug!(item = %fields.item_code, shortage, "material availability checked");
        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("required_materials", json!(materials))
                .with_field("material_shortage", json!(shortage)),
        ))
    }
}

struct CreateWorkOrder;

#[async_trait]
impl StepNode for CreateWorkOrder {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: ManufacturingFields = state.decode_fields()?;
        let work_order_id = format!("WO-{}-001", fields.item_code);
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("work_order_id", json!(work_order_id)),
        ))
    }
}

struct CreateMaterialRequest;

#[async_trait]
impl StepNode for CreateMaterialRequest {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: ManufacturingFields = state.decode_fields()?;

        // Sufficient stock: no request to raise, no gate. The completed
        // step records the skip so the trail distinguishes it from an
        // approved request.
        if !fields.material_shortage && !ctx.has_decision() {
            return Ok(StepOutcome::goto_as(
                "create_stock_entry",
                "skip_material_request",
                StateUpdate::new(),
            ));
        }

        let work_order_id = fields
            .work_order_id
            .clone()
            .ok_or(StepError::MissingField { what: "work_order_id" })?;
        let spec = ApprovalSpec {
            operation: "create_material_request".into(),
            operation_type: "material_request".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "item_code": fields.item_code,
                "item_name": fields.item_name,
                "qty_to_produce": fields.qty_to_produce,
                "work_order_id": work_order_id,
                "required_materials": fields.required_materials,
            }),
            preview: format!(
                "Material Request:\n\nItem: {} ({})\nQuantity: {}\nWork Order: {work_order_id}\n\nShortage detected - purchase required",
                fields.item_name, fields.item_code, fields.qty_to_produce,
            ),
            action: "Material shortage - approve purchase request".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "create_stock_entry",
                StateUpdate::new()
                    .with_field("material_request_id", json!(format!("MR-{work_order_id}")))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "create_material_request",
                        "Material request rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct CreateStockEntry;

#[async_trait]
impl StepNode for CreateStockEntry {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: ManufacturingFields = state.decode_fields()?;
        let work_order_id = fields
            .work_order_id
            .ok_or(StepError::MissingField { what: "work_order_id" })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("stock_entry_id", json!(format!("SE-{work_order_id}"))),
        ))
    }
}

struct CreateQualityInspection;

#[async_trait]
impl StepNode for CreateQualityInspection {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: ManufacturingFields = state.decode_fields()?;
        let work_order_id = fields
            .work_order_id
            .clone()
            .ok_or(StepError::MissingField { what: "work_order_id" })?;
        let spec = ApprovalSpec {
            operation: "create_quality_inspection".into(),
            operation_type: "quality_inspection".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "item_code": fields.item_code,
                "item_name": fields.item_name,
                "qty_inspected": fields.qty_to_produce,
                "work_order_id": work_order_id,
                "stock_entry_id": fields.stock_entry_id,
            }),
            preview: format!(
                "Quality Inspection:\n\nItem: {} ({})\nQuantity: {}\nWork Order: {work_order_id}",
                fields.item_name, fields.item_code, fields.qty_to_produce,
            ),
            action: "Approve quality inspection sign-off".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                COMPLETED_NODE,
                StateUpdate::new()
                    .with_field("quality_inspection_id", json!(format!("QI-{work_order_id}")))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "create_quality_inspection",
                        "Quality inspection rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

pub fn create_graph() -> Result<WorkflowGraph, GraphError> {
    GraphBuilder::new("manufacturing_production")
        .add_step("check_materials", CheckMaterialAvailability)
        .add_step("create_work_order", CreateWorkOrder)
        .add_step("create_material_request", CreateMaterialRequest)
        .add_step("create_stock_entry", CreateStockEntry)
        .add_step("create_quality_inspection", CreateQualityInspection)
        .add_edge(START, "check_materials")
        .add_edge("check_materials", "create_work_order")
        .add_edge("create_work_order", "create_material_request")
        .add_routes("create_material_request", ["create_stock_entry", REJECTED_NODE])
        .add_edge("create_stock_entry", "create_quality_inspection")
        .add_routes("create_quality_inspection", [COMPLETED_NODE, REJECTED_NODE])
        .compile()
}

pub fn descriptor() -> WorkflowDescriptor {
    WorkflowDescriptor {
        name: "manufacturing_production".into(),
        industry: "manufacturing".into(),
        description: "Manufacturing Production: Material check → Work order → Material request → Stock entry → Quality inspection".into(),
        tags: vec!["production".into(), "inventory".into(), "quality".into()],
        initial_state_schema: vec![
            ("item_code".into(), FieldSpec::required("str")),
            ("item_name".into(), FieldSpec::required("str")),
            ("qty_to_produce".into(), FieldSpec::required("float")),
            ("production_date".into(), FieldSpec::required("str")),
            ("warehouse".into(), FieldSpec::required("str")),
        ],
        estimated_steps: 5,
        capabilities: WorkflowCapabilities::default().with_custom([
            "bom_explosion",
            "material_request",
            "quality_inspection",
        ]),
    }
}
