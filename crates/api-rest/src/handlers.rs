//! HTTP handlers. Each one parses the wire types, calls the certification service with the
//! acting person and maps the result back.

use crate::auth::ActingPerson;
use crate::convert;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;
use api_shared::{dto, HealthService};
use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
};
use nwd_core::{
    AssessmentRequest, CertificateId, CoreResult, CurriculumId, EnrollmentId, GearTypeId,
    NewRequest, PersonId, RequestId, RequestRef, RequestStatus, RequestType, TaskUnitId,
};
use nwd_types::NonEmptyText;
use serde::Deserialize;
use utoipa::IntoParams;

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

fn request_list(result: CoreResult<Vec<AssessmentRequest>>) -> ApiResult<dto::RequestListRes> {
    Ok(Json(convert::request_list(&result?)))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = dto::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks. Needs no API key.
pub(crate) async fn health() -> Json<dto::HealthRes> {
    Json(HealthService::check_health())
}

// Curricula, enrollments and progress

#[utoipa::path(
    post,
    path = "/curricula",
    request_body = dto::CurriculumDto,
    responses(
        (status = 201, description = "Curriculum revision registered", body = dto::CurriculumDto),
        (status = 400, description = "Invalid curriculum", body = dto::ErrorRes),
        (status = 403, description = "Requires system_admin", body = dto::ErrorRes)
    )
)]
/// Registers a curriculum revision. Ids left out of the body are generated.
pub(crate) async fn register_curriculum(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::CurriculumDto>,
) -> Created<dto::CurriculumDto> {
    let curriculum = convert::curriculum(req)?;
    let registered = state.service.register_curriculum(&actor, curriculum)?;
    Ok((StatusCode::CREATED, Json(convert::curriculum_dto(&registered))))
}

#[utoipa::path(
    post,
    path = "/enrollments",
    request_body = dto::EnrollReq,
    responses(
        (status = 201, description = "Enrollment created", body = dto::EnrollmentRes),
        (status = 400, description = "Bad request", body = dto::ErrorRes),
        (status = 404, description = "Unknown curriculum", body = dto::ErrorRes)
    )
)]
pub(crate) async fn enroll(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::EnrollReq>,
) -> Created<dto::EnrollmentRes> {
    let enrollment = state.service.enroll(
        &actor,
        PersonId::parse(&req.person)?,
        CurriculumId::parse(&req.curriculum)?,
        GearTypeId::parse(&req.gear_type)?,
    )?;
    Ok((StatusCode::CREATED, Json(convert::enrollment_res(&enrollment))))
}

#[utoipa::path(
    get,
    path = "/enrollments/{id}/progress",
    params(("id" = String, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Per-module progress", body = dto::ProgressRes),
        (status = 404, description = "Unknown enrollment", body = dto::ErrorRes)
    )
)]
pub(crate) async fn progress(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<dto::ProgressRes> {
    let summary = state.service.progress_summary(EnrollmentId::parse(&id)?)?;
    Ok(Json(convert::progress_res(&summary)))
}

#[utoipa::path(
    post,
    path = "/enrollments/{id}/progress",
    params(("id" = String, Path, description = "Enrollment id")),
    request_body = dto::RecordProgressReq,
    responses(
        (status = 200, description = "Progress recorded", body = dto::EnrollmentRes),
        (status = 400, description = "Out of range or decreasing", body = dto::ErrorRes),
        (status = 409, description = "Enrollment terminated", body = dto::ErrorRes)
    )
)]
pub(crate) async fn record_progress(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    AxumPath(id): AxumPath<String>,
    ApiJson(req): ApiJson<dto::RecordProgressReq>,
) -> ApiResult<dto::EnrollmentRes> {
    let enrollment = state.service.record_progress(
        &actor,
        EnrollmentId::parse(&id)?,
        req.competency.parse()?,
        req.value,
    )?;
    Ok(Json(convert::enrollment_res(&enrollment)))
}

#[utoipa::path(
    post,
    path = "/enrollments/complete-core",
    request_body = dto::EnrollmentIdsReq,
    responses(
        (status = 200, description = "Required modules completed", body = dto::EnrollmentListRes),
        (status = 409, description = "Not all enrollments are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn complete_core(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::EnrollmentIdsReq>,
) -> ApiResult<dto::EnrollmentListRes> {
    let ids: Vec<EnrollmentId> = convert::parse_ids(&req.enrollments)?;
    let updated = state.service.complete_core_competencies(&actor, &ids)?;
    Ok(Json(convert::enrollment_list(&updated)))
}

#[utoipa::path(
    post,
    path = "/enrollments/terminate",
    request_body = dto::EnrollmentIdsReq,
    responses(
        (status = 200, description = "Enrollments terminated", body = dto::EnrollmentListRes),
        (status = 409, description = "Not all enrollments are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn terminate_enrollments(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::EnrollmentIdsReq>,
) -> ApiResult<dto::EnrollmentListRes> {
    let ids: Vec<EnrollmentId> = convert::parse_ids(&req.enrollments)?;
    let updated = state.service.terminate_enrollments(&actor, &ids)?;
    Ok(Json(convert::enrollment_list(&updated)))
}

// Assessment requests

#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct ListRequestsQuery {
    /// Only requests in this status, e.g. `concept`.
    status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/requests",
    request_body = dto::CreateRequestReq,
    responses(
        (status = 201, description = "Request created in concept", body = dto::RequestRes),
        (status = 400, description = "Bad request", body = dto::ErrorRes)
    )
)]
pub(crate) async fn create_request(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::CreateRequestReq>,
) -> Created<dto::RequestRes> {
    let location = req
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .map(NonEmptyText::new)
        .transpose()
        .map_err(nwd_core::CoreError::from)?;
    let new = NewRequest {
        request_type: req.request_type.parse::<RequestType>()?,
        candidate: PersonId::parse(&req.candidate)?,
        task_units: convert::parse_ids::<TaskUnitId>(&req.task_units)?,
        location,
    };
    let request = state.service.create_request(&actor, new)?;
    Ok((StatusCode::CREATED, Json(convert::request_res(&request))))
}

#[utoipa::path(
    get,
    path = "/requests",
    params(ListRequestsQuery),
    responses(
        (status = 200, description = "Requests, oldest first", body = dto::RequestListRes),
        (status = 400, description = "Unknown status", body = dto::ErrorRes)
    )
)]
pub(crate) async fn list_requests(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListRequestsQuery>,
) -> ApiResult<dto::RequestListRes> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RequestStatus>)
        .transpose()?;
    request_list(state.service.requests(status))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "The request", body = dto::RequestRes),
        (status = 404, description = "Unknown request", body = dto::ErrorRes)
    )
)]
pub(crate) async fn get_request(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<dto::RequestRes> {
    let request = state.service.request(RequestId::parse(&id)?)?;
    Ok(Json(convert::request_res(&request)))
}

#[utoipa::path(
    post,
    path = "/requests/submit",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Submitted requests", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible, or a version conflict", body = dto::ErrorRes)
    )
)]
pub(crate) async fn submit_requests(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.submit_requests(&actor, &convert::targets(&req.requests)?))
}

#[utoipa::path(
    post,
    path = "/requests/cancel",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Cancelled requests", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn cancel_requests(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.cancel_requests(&actor, &convert::targets(&req.requests)?))
}

#[utoipa::path(
    post,
    path = "/requests/start-time",
    request_body = dto::StartTimeReq,
    responses(
        (status = 200, description = "Start time set", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn update_start_time(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::StartTimeReq>,
) -> ApiResult<dto::RequestListRes> {
    let start_time = convert::parse_time(&req.start_time, "start_time")?;
    request_list(state.service.update_start_time(
        &actor,
        &convert::targets(&req.requests)?,
        start_time,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/learning-coach",
    request_body = dto::LearningCoachReq,
    responses(
        (status = 200, description = "Learning coach assigned", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn assign_learning_coach(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::LearningCoachReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.assign_learning_coach(
        &actor,
        &convert::targets(&req.requests)?,
        PersonId::parse(&req.coach)?,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/learning-coach/grant",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Permission granted on behalf of the coach", body = dto::RequestListRes),
        (status = 403, description = "Requires location_admin", body = dto::ErrorRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn grant_learning_coach_permission(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(
        state
            .service
            .grant_learning_coach_permission(&actor, &convert::targets(&req.requests)?),
    )
}

#[utoipa::path(
    post,
    path = "/requests/learning-coach/respond",
    request_body = dto::CoachResponseReq,
    responses(
        (status = 200, description = "Coach response recorded", body = dto::RequestListRes),
        (status = 403, description = "Not the assigned coach", body = dto::ErrorRes)
    )
)]
pub(crate) async fn respond_as_learning_coach(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::CoachResponseReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.respond_as_learning_coach(
        &actor,
        &convert::targets(&req.requests)?,
        req.granted,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/assessor",
    request_body = dto::AssessorReq,
    responses(
        (status = 200, description = "Assessor assigned to every task unit", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn assign_assessor(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::AssessorReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.assign_assessor(
        &actor,
        &convert::targets(&req.requests)?,
        PersonId::parse(&req.assessor)?,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/task-units/{task_unit}/assessor",
    params(
        ("id" = String, Path, description = "Request id"),
        ("task_unit" = String, Path, description = "Task unit id")
    ),
    request_body = dto::TaskUnitAssessorReq,
    responses(
        (status = 200, description = "Assessor assigned", body = dto::RequestRes),
        (status = 409, description = "Request not eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn assign_task_unit_assessor(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    AxumPath((id, task_unit)): AxumPath<(String, String)>,
    ApiJson(req): ApiJson<dto::TaskUnitAssessorReq>,
) -> ApiResult<dto::RequestRes> {
    let target = RequestRef {
        id: RequestId::parse(&id)?,
        version: req.version,
    };
    let request = state.service.assign_task_unit_assessor(
        &actor,
        target,
        TaskUnitId::parse(&task_unit)?,
        PersonId::parse(&req.assessor)?,
    )?;
    Ok(Json(convert::request_res(&request)))
}

#[utoipa::path(
    post,
    path = "/requests/start",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Assessments started", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn start_assessments(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.start_assessments(&actor, &convert::targets(&req.requests)?))
}

#[utoipa::path(
    post,
    path = "/requests/complete",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Assessments completed", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn complete_assessments(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(
        state
            .service
            .complete_assessments(&actor, &convert::targets(&req.requests)?),
    )
}

#[utoipa::path(
    post,
    path = "/requests/abort",
    request_body = dto::RequestTargetsReq,
    responses(
        (status = 200, description = "Requests aborted", body = dto::RequestListRes),
        (status = 409, description = "Not all requests are eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn abort_requests(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::RequestTargetsReq>,
) -> ApiResult<dto::RequestListRes> {
    request_list(state.service.abort_requests(&actor, &convert::targets(&req.requests)?))
}

// Certificates

#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct VerifyQuery {
    /// Verification code printed on the diploma.
    code: String,
}

#[utoipa::path(
    post,
    path = "/certificates/issue",
    request_body = dto::IssueReq,
    responses(
        (status = 200, description = "Certificates issued", body = dto::CertificateListRes),
        (status = 400, description = "Invalid visibility moment", body = dto::ErrorRes),
        (status = 409, description = "Already certified or not eligible", body = dto::ErrorRes)
    )
)]
pub(crate) async fn issue_certificates(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::IssueReq>,
) -> ApiResult<dto::CertificateListRes> {
    let ids: Vec<EnrollmentId> = convert::parse_ids(&req.enrollments)?;
    let visible_from = req
        .visible_from
        .as_deref()
        .map(|raw| convert::parse_time(raw, "visible_from"))
        .transpose()?;
    let issued = state
        .service
        .issue_certificates(&actor, &ids, visible_from)?;
    Ok(Json(convert::certificate_list(&issued)))
}

#[utoipa::path(
    post,
    path = "/certificates/withdraw",
    request_body = dto::WithdrawReq,
    responses(
        (status = 200, description = "Certificates withdrawn", body = dto::WithdrawRes),
        (status = 404, description = "Unknown certificate", body = dto::ErrorRes),
        (status = 422, description = "Withdrawal window expired", body = dto::ErrorRes)
    )
)]
pub(crate) async fn withdraw_certificates(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::WithdrawReq>,
) -> ApiResult<dto::WithdrawRes> {
    let ids: Vec<CertificateId> = convert::parse_ids(&req.certificates)?;
    state.service.withdraw_certificates(&actor, &ids)?;
    Ok(Json(dto::WithdrawRes {
        withdrawn: ids.len(),
    }))
}

#[utoipa::path(
    get,
    path = "/certificates/verify/{handle}",
    params(("handle" = String, Path, description = "Certificate handle"), VerifyQuery),
    responses(
        (status = 200, description = "Verification result", body = dto::VerifyRes)
    )
)]
/// Public verification; ignores the student-facing visibility moment.
pub(crate) async fn verify_certificate(
    State(state): State<AppState>,
    AxumPath(handle): AxumPath<String>,
    ApiQuery(query): ApiQuery<VerifyQuery>,
) -> ApiResult<dto::VerifyRes> {
    let certificate = state.service.verify_certificate(&handle, &query.code)?;
    Ok(Json(dto::VerifyRes {
        valid: certificate.is_some(),
        certificate: certificate.as_ref().map(convert::certificate_res),
    }))
}

#[utoipa::path(
    get,
    path = "/persons/{id}/certificates",
    params(("id" = String, Path, description = "Person id")),
    responses(
        (status = 200, description = "Certificates visible to the person", body = dto::CertificateListRes)
    )
)]
pub(crate) async fn visible_certificates(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<dto::CertificateListRes> {
    let certificates = state.service.visible_certificates(PersonId::parse(&id)?)?;
    Ok(Json(convert::certificate_list(&certificates)))
}

// Import

#[utoipa::path(
    post,
    path = "/qualifications/import",
    request_body = dto::ImportReq,
    responses(
        (status = 200, description = "Per-row import report", body = dto::ImportReportRes),
        (status = 403, description = "Requires location_admin", body = dto::ErrorRes)
    )
)]
/// Imports qualifications row by row; a bad row never rejects the others.
pub(crate) async fn import_qualifications(
    State(state): State<AppState>,
    ActingPerson(actor): ActingPerson,
    ApiJson(req): ApiJson<dto::ImportReq>,
) -> ApiResult<dto::ImportReportRes> {
    let rows = convert::import_rows(req.rows);
    let report = state.service.import_qualifications(&actor, &rows)?;
    Ok(Json(convert::import_report_res(report)))
}
