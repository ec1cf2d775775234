//! Hospital admissions: patient record → admission → clinical orders →
//! encounter → billing.
//!
//! The clinical order set is the safety-critical gate; invoice generation
//! carries a second, financial gate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::graph::{GraphBuilder, GraphError, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE, START};
use crate::node::{RiskLevel, StepContext, StepError, StepNode, StepOutcome};
use crate::registry::{FieldSpec, WorkflowCapabilities, WorkflowDescriptor};
use crate::state::{ApprovalDecision, Severity, StateUpdate, WorkflowErrorRecord, WorkflowState};
use crate::steps::{request_approval, ApprovalSpec, GateOutcome};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct HospitalAdmissionsFields {
    patient_name: String,
    admission_date: String,
    primary_diagnosis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clinical_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    appointment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encounter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invoice_id: Option<String>,
}

struct ProtocolOrders {
    labs: Vec<&'static str>,
    meds: Vec<&'static str>,
    procedures: Vec<&'static str>,
}

impl ProtocolOrders {
    fn total(&self) -> usize {
        self.labs.len() + self.meds.len() + self.procedures.len()
    }
}

/// Protocol definition stand-in for the clinical database.
fn protocol_orders(protocol: &str) -> ProtocolOrders {
    match protocol {
        "sepsis_protocol" => ProtocolOrders {
            labs: vec![
                "CBC with differential",
                "Blood cultures x2 (aerobic + anaerobic)",
                "Lactate level",
                "Comprehensive metabolic panel",
            ],
            meds: vec![
                "Ceftriaxone 2g IV q24h",
                "Azithromycin 500mg IV daily",
                "Normal saline 30mL/kg IV bolus",
            ],
            procedures: vec!["Continuous vital signs monitoring", "Central line placement"],
        },
        "pneumonia_protocol" => ProtocolOrders {
            labs: vec!["CBC with differential", "Blood cultures", "Chest X-ray"],
            meds: vec!["Azithromycin 500mg IV daily", "Ceftriaxone 1g IV q24h"],
            procedures: vec!["Oxygen therapy", "Pulse oximetry monitoring"],
        },
        _ => ProtocolOrders {
            labs: vec!["CBC", "Basic metabolic panel"],
            meds: vec!["As needed per condition"],
            procedures: vec!["Vital signs q4h"],
        },
    }
}

struct CreatePatientRecord;

#[async_trait]
impl StepNode for CreatePatientRecord {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HospitalAdmissionsFields = state.decode_fields()?;
        let patient_id = format!("PAT-{}", fields.patient_name.len() * 7 + 1000);
        tracing::debug!(%patient_id, "creating patient record");
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("patient_id", json!(patient_id)),
        ))
    }
}

struct ScheduleAdmission;

#[async_trait]
impl StepNode for ScheduleAdmission {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HospitalAdmissionsFields = state.decode_fields()?;
        let patient_id = fields
            .patient_id
            .ok_or(StepError::MissingField { what: "patient_id" })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("appointment_id", json!(format!("APT-{patient_id}"))),
        ))
    }
}

struct CreateOrderSet;

#[async_trait]
impl StepNode for CreateOrderSet {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HospitalAdmissionsFields = state.decode_fields()?;
        let patient_id = fields
            .patient_id
            .clone()
            .ok_or(StepError::MissingField { what: "patient_id" })?;
        let protocol = fields
            .clinical_protocol
            .clone()
            .unwrap_or_else(|| "standard_admission".to_string());
        let orders = protocol_orders(&protocol);

        let spec = ApprovalSpec {
            operation: "create_order_set".into(),
            operation_type: "clinical_orders".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "patient_id": patient_id,
                "patient_name": fields.patient_name,
                "primary_diagnosis": fields.primary_diagnosis,
                "protocol": protocol,
                "labs": orders.labs,
                "meds": orders.meds,
                "procedures": orders.procedures,
                "total_orders": orders.total(),
            }),
            preview: format!(
                "Clinical Order Set:\n\nPatient: {} ({patient_id})\nDiagnosis: {}\nProtocol: {protocol}\n\nLab Tests:\n{}\nMedications:\n{}\nProcedures:\n{}\nTotal Orders: {}",
                fields.patient_name,
                fields.primary_diagnosis,
                bullet_list(&orders.labs),
                bullet_list(&orders.meds),
                bullet_list(&orders.procedures),
                orders.total(),
            ),
            action: "CRITICAL: Clinical orders require approval for patient safety".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "create_encounter",
                StateUpdate::new()
                    .with_field("order_set_id", json!(format!("OS-{patient_id}-001")))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(
                        WorkflowErrorRecord::new(
                            "create_orders",
                            "Clinical orders rejected by physician",
                        )
                        .with_severity(Severity::Critical),
                    )
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct CreateEncounter;

#[async_trait]
impl StepNode for CreateEncounter {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HospitalAdmissionsFields = state.decode_fields()?;
        let patient_id = fields
            .patient_id
            .ok_or(StepError::MissingField { what: "patient_id" })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new().with_field("encounter_id", json!(format!("ENC-{patient_id}"))),
        ))
    }
}

struct GenerateInvoice;

const ADMISSION_FEE: f64 = 500.0;
const LAB_CHARGES: f64 = 350.0;
const MEDICATION_CHARGES: f64 = 250.0;
const PROCEDURE_CHARGES: f64 = 400.0;

#[async_trait]
impl StepNode for GenerateInvoice {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: HospitalAdmissionsFields = state.decode_fields()?;
        let patient_id = fields
            .patient_id
            .clone()
            .ok_or(StepError::MissingField { what: "patient_id" })?;

        let subtotal = ADMISSION_FEE + LAB_CHARGES + MEDICATION_CHARGES + PROCEDURE_CHARGES;
        // Hospital services are tax-exempt here.
        let tax = subtotal * 0.0;
        let grand_total = subtotal + tax;

        let spec = ApprovalSpec {
            operation: "generate_invoice".into(),
            operation_type: "hospital_billing".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "patient_id": patient_id,
                "patient_name": fields.patient_name,
                "encounter_id": fields.encounter_id,
                "primary_diagnosis": fields.primary_diagnosis,
                "admission_fee": ADMISSION_FEE,
                "lab_charges": LAB_CHARGES,
                "medication_charges": MEDICATION_CHARGES,
                "procedure_charges": PROCEDURE_CHARGES,
                "subtotal": subtotal,
                "tax": tax,
                "grand_total": grand_total,
            }),
            preview: format!(
                "Invoice Details:\n\nPatient: {} ({patient_id})\nEncounter: {}\nDiagnosis: {}\n\nCharges:\n  - Admission Fee: ${ADMISSION_FEE:>10.2}\n  - Lab Tests: ${LAB_CHARGES:>10.2}\n  - Medications: ${MEDICATION_CHARGES:>10.2}\n  - Procedures: ${PROCEDURE_CHARGES:>10.2}\n  Subtotal: ${subtotal:>10.2}\n  Tax: ${tax:>10.2}\n  Grand Total: ${grand_total:>10.2}",
                fields.patient_name,
                fields.encounter_id.as_deref().unwrap_or("-"),
                fields.primary_diagnosis,
            ),
            action: "Please approve invoice generation".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                COMPLETED_NODE,
                StateUpdate::new()
                    .with_field("invoice_id", json!(format!("INV-{patient_id}-001")))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "generate_invoice",
                        "Invoice rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}\n"))
        .collect()
}

pub fn create_graph() -> Result<WorkflowGraph, GraphError> {
    GraphBuilder::new("hospital_admissions")
        .add_step_labeled("create_patient", "create_patient", CreatePatientRecord)
        .add_step("schedule_admission", ScheduleAdmission)
        .add_step_labeled("create_order_set", "create_orders", CreateOrderSet)
        .add_step("create_encounter", CreateEncounter)
        .add_step("generate_invoice", GenerateInvoice)
        .add_edge(START, "create_patient")
        .add_edge("create_patient", "schedule_admission")
        .add_edge("schedule_admission", "create_order_set")
        .add_routes("create_order_set", ["create_encounter", REJECTED_NODE])
        .add_edge("create_encounter", "generate_invoice")
        .add_routes("generate_invoice", [COMPLETED_NODE, REJECTED_NODE])
        .compile()
}

pub fn descriptor() -> WorkflowDescriptor {
    WorkflowDescriptor {
        name: "hospital_admissions".into(),
        industry: "hospital".into(),
        description: "Patient admission: Record → Orders → Encounter → Billing".into(),
        tags: vec!["clinical".into(), "healthcare".into(), "billing".into()],
        initial_state_schema: vec![
            ("patient_name".into(), FieldSpec::required("str")),
            ("admission_date".into(), FieldSpec::required("str")),
            ("primary_diagnosis".into(), FieldSpec::required("str")),
            ("clinical_protocol".into(), FieldSpec::optional("str")),
        ],
        estimated_steps: 6,
        capabilities: WorkflowCapabilities::default().with_custom([
            "clinical_orders",
            "protocol_application",
            "encounter_billing",
        ]),
    }
}
