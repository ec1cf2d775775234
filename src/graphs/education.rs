//! Education admissions: application review → interview → assessment →
//! admission decision → enrollment.
//!
//! Interview scheduling and the final admission decision are gated; the
//! decision gate presents a weighted score breakdown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::graph::{GraphBuilder, GraphError, WorkflowGraph, COMPLETED_NODE, REJECTED_NODE, START};
use crate::node::{RiskLevel, StepContext, StepError, StepNode, StepOutcome};
use crate::registry::{FieldSpec, WorkflowCapabilities, WorkflowDescriptor};
use crate::state::{ApprovalDecision, StateUpdate, WorkflowErrorRecord, WorkflowState};
use crate::steps::{request_approval, ApprovalSpec, GateOutcome};

const MINIMUM_GPA: f64 = 2.5;
const ADMISSION_THRESHOLD: f64 = 70.0;
const MOCK_INTERVIEW_SCORE: f64 = 7.5;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct EducationAdmissionsFields {
    applicant_name: String,
    applicant_email: String,
    program_name: String,
    application_date: String,
    academic_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interview_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student_enrollment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interview_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assessment_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_score: Option<f64>,
}

fn assessment_score(academic: f64, interview: f64) -> f64 {
    (academic / 4.0) * 50.0 + (interview / 10.0) * 50.0
}

fn recommendation(final_score: f64) -> &'static str {
    if final_score >= 85.0 {
        "Strong candidate - recommended for admission"
    } else if final_score >= 70.0 {
        "Good candidate - meets admission criteria"
    } else if final_score >= 60.0 {
        "Borderline candidate - review required"
    } else {
        "Below admission criteria"
    }
}

struct ReviewApplication;

#[async_trait]
impl StepNode for ReviewApplication {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: EducationAdmissionsFields = state.decode_fields()?;
        let meets_minimum = fields.academic_score >= MINIMUM_GPA;
        let application_id = format!("APP-{}", fields.program_name.len() * 13 + 100);
        tracing::debug!(
            applicant = %fields.applicant_name,
            score = fields.academic_score,
            meets_minimum,
            "application reviewed"
        );
        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("application_id", json!(application_id))
                .with_field("application_status", json!(if meets_minimum { "under_review" } else { "below_minimum" })),
        ))
    }
}

struct ScheduleInterview;

#[async_trait]
impl StepNode for ScheduleInterview {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: EducationAdmissionsFields = state.decode_fields()?;
        let application_id = fields
            .application_id
            .clone()
            .ok_or(StepError::MissingField { what: "application_id" })?;
        let strength = if fields.academic_score >= 3.5 {
            "Strong"
        } else if fields.academic_score >= 3.0 {
            "Good"
        } else {
            "Fair"
        };
        let spec = ApprovalSpec {
            operation: "schedule_interview".into(),
            operation_type: "admission_interview".into(),
            risk_level: RiskLevel::Medium,
            details: json!({
                "applicant_name": fields.applicant_name,
                "applicant_email": fields.applicant_email,
                "program_name": fields.program_name,
                "academic_score": fields.academic_score,
                "application_id": application_id,
            }),
            preview: format!(
                "Interview Scheduling:\n\nApplicant: {}\nProgram: {}\nAcademic Score: {:.2}/4.0\nApplication Strength: {strength}",
                fields.applicant_name, fields.program_name, fields.academic_score,
            ),
            action: "Approve interview scheduling".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "conduct_assessment",
                StateUpdate::new()
                    .with_field("interview_id", json!(format!("INT-{application_id}")))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_error(WorkflowErrorRecord::new(
                        "schedule_interview",
                        "Interview scheduling rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct ConductAssessment;

#[async_trait]
impl StepNode for ConductAssessment {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: EducationAdmissionsFields = state.decode_fields()?;
        let interview_score = MOCK_INTERVIEW_SCORE;
        let assessment = assessment_score(fields.academic_score, interview_score);
        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("interview_score", json!(interview_score))
                .with_field("assessment_score", json!(assessment)),
        ))
    }
}

struct MakeAdmissionDecision;

#[async_trait]
impl StepNode for MakeAdmissionDecision {
    async fn run(
        &self,
        state: &WorkflowState,
        mut ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: EducationAdmissionsFields = state.decode_fields()?;
        let application_id = fields
            .application_id
            .clone()
            .ok_or(StepError::MissingField { what: "application_id" })?;
        let interview_score = fields.interview_score.unwrap_or(0.0);
        let assessment = fields.assessment_score.unwrap_or(0.0);

        // Weighted sum on the raw scales: GPA carries 25 points per grade
        // point, interview 3 per point, assessment 45%. The total is not
        // clamped to 100.
        let academic_weighted = fields.academic_score * 25.0;
        let interview_weighted = interview_score * 3.0;
        let assessment_weighted = assessment * 0.45;
        let final_score = academic_weighted + interview_weighted + assessment_weighted;
        let recommended = final_score >= ADMISSION_THRESHOLD;

        let spec = ApprovalSpec {
            operation: "make_admission_decision".into(),
            operation_type: "education_admission".into(),
            risk_level: RiskLevel::High,
            details: json!({
                "application_id": application_id,
                "applicant_name": fields.applicant_name,
                "program_name": fields.program_name,
                "academic_score": fields.academic_score,
                "interview_score": interview_score,
                "assessment_score": assessment,
                "final_score": final_score,
                "recommendation": recommendation(final_score),
                "admission_recommended": recommended,
                "recommended_action": if recommended { "ADMIT" } else { "REJECT" },
            }),
            preview: format!(
                "Admission Decision Review:\n\nApplicant: {}\nProgram: {}\n\nScore Breakdown:\n  - Academic (GPA): {:.2}/4.0 → {academic_weighted:.1}/25\n  - Interview: {:.1}/10 → {interview_weighted:.1}/30\n  - Assessment: {:.1}/100 → {assessment_weighted:.1}/45\n  Final Score: {final_score:.1}/100\n\n{}",
                fields.applicant_name,
                fields.program_name,
                fields.academic_score,
                interview_score,
                assessment,
                recommendation(final_score),
            ),
            action: "CRITICAL: Admission decision requires approval".into(),
            reason: None,
        };
        match request_approval(&mut ctx, spec, None).await {
            GateOutcome::Suspended(token) => Ok(StepOutcome::suspend(token)),
            GateOutcome::Decided(result) if result.approved => Ok(StepOutcome::goto(
                "enroll_student",
                StateUpdate::new()
                    .with_field(
                        "admission_decision_id",
                        json!(format!("ADM-{application_id}")),
                    )
                    .with_field("final_score", json!(final_score))
                    .with_field("admission_recommended", json!(recommended))
                    .with_decision(ApprovalDecision::Approved),
            )),
            GateOutcome::Decided(_) => Ok(StepOutcome::goto(
                REJECTED_NODE,
                StateUpdate::new()
                    .with_field("final_score", json!(final_score))
                    .with_error(WorkflowErrorRecord::new(
                        "make_admission_decision",
                        "Admission decision rejected",
                    ))
                    .with_decision(ApprovalDecision::Rejected),
            )),
        }
    }
}

struct EnrollStudent;

#[async_trait]
impl StepNode for EnrollStudent {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: StepContext,
    ) -> Result<StepOutcome, StepError> {
        let fields: EducationAdmissionsFields = state.decode_fields()?;
        let application_id = fields
            .application_id
            .ok_or(StepError::MissingField { what: "application_id" })?;
        Ok(StepOutcome::advance_with(
            StateUpdate::new()
                .with_field("student_enrollment_id", json!(format!("ENR-{application_id}"))),
        ))
    }
}

pub fn create_graph() -> Result<WorkflowGraph, GraphError> {
    GraphBuilder::new("education_admissions")
        .add_step("review_application", ReviewApplication)
        .add_step("schedule_interview", ScheduleInterview)
        .add_step("conduct_assessment", ConductAssessment)
        .add_step("make_admission_decision", MakeAdmissionDecision)
        .add_step("enroll_student", EnrollStudent)
        .add_edge(START, "review_application")
        .add_edge("review_application", "schedule_interview")
        .add_routes("schedule_interview", ["conduct_assessment", REJECTED_NODE])
        .add_edge("conduct_assessment", "make_admission_decision")
        .add_routes("make_admission_decision", ["enroll_student", REJECTED_NODE])
        .add_edge("enroll_student", COMPLETED_NODE)
        .compile()
}

pub fn descriptor() -> WorkflowDescriptor {
    WorkflowDescriptor {
        name: "education_admissions".into(),
        industry: "education".into(),
        description: "Education Admissions: Application review → Interview scheduling → Assessment → Admission decision → Enrollment".into(),
        tags: vec!["education".into(), "admissions".into(), "academic".into()],
        initial_state_schema: vec![
            ("applicant_name".into(), FieldSpec::required("str")),
            ("applicant_email".into(), FieldSpec::required("str")),
            ("program_name".into(), FieldSpec::required("str")),
            ("application_date".into(), FieldSpec::required("str")),
            ("academic_score".into(), FieldSpec::required("float")),
        ],
        estimated_steps: 5,
        capabilities: WorkflowCapabilities::default().with_custom([
            "interview_scheduling",
            "assessment_tracking",
            "enrollment_automation",
        ]),
    }
}
