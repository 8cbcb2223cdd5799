//! Wire types for the NWD APIs.
//!
//! Identifiers travel as canonical UUID strings and timestamps as RFC 3339 strings; parsing
//! into core types happens in the transport.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned for every non-2xx response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub kind: String,
    pub message: String,
}

// Curricula

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CompetencyDto {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ModuleDto {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub required: bool,
    pub competencies: Vec<CompetencyDto>,
}

/// Used for registration (ids optional) and in responses (ids always set).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CurriculumDto {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub revision: u32,
    pub modules: Vec<ModuleDto>,
}

// Enrollments and progress

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollReq {
    pub person: String,
    pub curriculum: String,
    pub gear_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentRes {
    pub id: String,
    pub person: String,
    pub curriculum: String,
    pub gear_type: String,
    pub enrolled_at: String,
    pub terminated_at: Option<String>,
    pub completed_ever: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentListRes {
    pub enrollments: Vec<EnrollmentRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordProgressReq {
    pub competency: String,
    pub value: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentIdsReq {
    pub enrollments: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ModuleProgressRes {
    pub module: String,
    pub title: String,
    pub required: bool,
    pub completed: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressRes {
    pub enrollment: String,
    pub modules: Vec<ModuleProgressRes>,
    pub completed: usize,
    pub total: usize,
    pub required_completed: usize,
    pub required_total: usize,
    pub has_completed_module: bool,
}

// Assessment requests

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRequestReq {
    /// `intern` or `extern`.
    #[serde(rename = "type")]
    pub request_type: String,
    pub candidate: String,
    pub task_units: Vec<String>,
    /// Defaults to the server's configured location.
    #[serde(default)]
    pub location: Option<String>,
}

/// One selected request, optionally with the version the caller last saw.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestTargetReq {
    pub id: String,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestTargetsReq {
    pub requests: Vec<RequestTargetReq>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StartTimeReq {
    pub requests: Vec<RequestTargetReq>,
    pub start_time: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LearningCoachReq {
    pub requests: Vec<RequestTargetReq>,
    pub coach: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CoachResponseReq {
    pub requests: Vec<RequestTargetReq>,
    pub granted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AssessorReq {
    pub requests: Vec<RequestTargetReq>,
    pub assessor: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskUnitAssessorReq {
    #[serde(default)]
    pub version: Option<u64>,
    pub assessor: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LearningCoachRes {
    pub coach: String,
    pub status: String,
    pub status_changed_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskUnitRes {
    pub task_unit: String,
    pub assessor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestRes {
    pub id: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub candidate: String,
    pub status: String,
    pub status_changed_at: String,
    pub start_time: Option<String>,
    pub learning_coach: Option<LearningCoachRes>,
    pub task_units: Vec<TaskUnitRes>,
    pub location: String,
    pub created_at: String,
    pub version: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestListRes {
    pub requests: Vec<RequestRes>,
}

// Certificates

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueReq {
    pub enrollments: Vec<String>,
    #[serde(default)]
    pub visible_from: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawReq {
    pub certificates: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawRes {
    pub withdrawn: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CertificateRes {
    pub id: String,
    pub handle: String,
    pub enrollment: String,
    pub person: String,
    pub curriculum: String,
    pub gear_type: String,
    pub issued_at: String,
    pub visible_from: Option<String>,
    pub verification_code: String,
    pub completed_competencies: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CertificateListRes {
    pub certificates: Vec<CertificateRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyRes {
    pub valid: bool,
    pub certificate: Option<CertificateRes>,
}

// Import

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ImportRowReq {
    pub person: String,
    pub task_unit: String,
    #[serde(default)]
    pub curriculum: Option<String>,
    #[serde(default)]
    pub granted_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportReq {
    pub rows: Vec<ImportRowReq>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RowErrorRes {
    pub row: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportReportRes {
    pub succeeded: usize,
    pub failed: Vec<RowErrorRes>,
}
