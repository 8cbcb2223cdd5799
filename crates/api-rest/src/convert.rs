//! Conversions between wire types and core types.

use crate::error::ApiError;
use api_shared::dto;
use chrono::{DateTime, SecondsFormat, Utc};
use nwd_core::{
    AssessmentRequest, Certificate, Competency, CompetencyId, CoreError, Curriculum, CurriculumId,
    Enrollment, ImportReport, ImportRow, Module, ModuleId, ProgressSummary, RequestId, RequestRef,
};
use nwd_types::NonEmptyText;
use std::str::FromStr;

pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_time(raw: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidInput(format!("{field} '{raw}': {e}")).into())
}

pub(crate) fn parse_ids<T>(raw: &[String]) -> Result<Vec<T>, ApiError>
where
    T: FromStr<Err = CoreError>,
{
    raw.iter()
        .map(|s| s.parse::<T>().map_err(ApiError::from))
        .collect()
}

pub(crate) fn targets(raw: &[dto::RequestTargetReq]) -> Result<Vec<RequestRef>, ApiError> {
    raw.iter()
        .map(|t| -> Result<RequestRef, ApiError> {
            let id = RequestId::parse(&t.id)?;
            Ok(RequestRef {
                id,
                version: t.version,
            })
        })
        .collect()
}

fn text(raw: &str) -> Result<NonEmptyText, ApiError> {
    NonEmptyText::new(raw).map_err(|e| CoreError::from(e).into())
}

fn id_or_new<T>(raw: Option<&str>, new: fn() -> T) -> Result<T, ApiError>
where
    T: FromStr<Err = CoreError>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(s.parse::<T>()?),
        None => Ok(new()),
    }
}

/// Builds a core curriculum, generating ids the caller left out.
pub(crate) fn curriculum(req: dto::CurriculumDto) -> Result<Curriculum, ApiError> {
    let modules = req
        .modules
        .into_iter()
        .map(|m| -> Result<Module, ApiError> {
            let competencies = m
                .competencies
                .into_iter()
                .map(|c| -> Result<Competency, ApiError> {
                    Ok(Competency {
                        id: id_or_new(c.id.as_deref(), CompetencyId::new)?,
                        title: text(&c.title)?,
                    })
                })
                .collect::<Result<Vec<_>, ApiError>>()?;
            Ok(Module {
                id: id_or_new(m.id.as_deref(), ModuleId::new)?,
                title: text(&m.title)?,
                required: m.required,
                competencies,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Curriculum {
        id: id_or_new(req.id.as_deref(), CurriculumId::new)?,
        title: text(&req.title)?,
        revision: req.revision,
        modules,
    })
}

pub(crate) fn curriculum_dto(c: &Curriculum) -> dto::CurriculumDto {
    dto::CurriculumDto {
        id: Some(c.id.to_string()),
        title: c.title.as_str().to_string(),
        revision: c.revision,
        modules: c
            .modules
            .iter()
            .map(|m| dto::ModuleDto {
                id: Some(m.id.to_string()),
                title: m.title.as_str().to_string(),
                required: m.required,
                competencies: m
                    .competencies
                    .iter()
                    .map(|c| dto::CompetencyDto {
                        id: Some(c.id.to_string()),
                        title: c.title.as_str().to_string(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub(crate) fn enrollment_res(e: &Enrollment) -> dto::EnrollmentRes {
    dto::EnrollmentRes {
        id: e.id.to_string(),
        person: e.person.to_string(),
        curriculum: e.curriculum.to_string(),
        gear_type: e.gear_type.to_string(),
        enrolled_at: timestamp(e.enrolled_at),
        terminated_at: e.terminated_at.map(timestamp),
        completed_ever: e.completed_ever.iter().map(ToString::to_string).collect(),
    }
}

pub(crate) fn enrollment_list(enrollments: &[Enrollment]) -> dto::EnrollmentListRes {
    dto::EnrollmentListRes {
        enrollments: enrollments.iter().map(enrollment_res).collect(),
    }
}

pub(crate) fn progress_res(s: &ProgressSummary) -> dto::ProgressRes {
    dto::ProgressRes {
        enrollment: s.enrollment.to_string(),
        modules: s
            .modules
            .iter()
            .map(|m| dto::ModuleProgressRes {
                module: m.module.to_string(),
                title: m.title.clone(),
                required: m.required,
                completed: m.completed,
                total: m.total,
            })
            .collect(),
        completed: s.completed,
        total: s.total,
        required_completed: s.required_completed,
        required_total: s.required_total,
        has_completed_module: s.has_completed_module(),
    }
}

pub(crate) fn request_res(r: &AssessmentRequest) -> dto::RequestRes {
    dto::RequestRes {
        id: r.id.to_string(),
        handle: r.handle.clone(),
        request_type: r.request_type.to_string(),
        candidate: r.candidate.to_string(),
        status: r.status.to_string(),
        status_changed_at: timestamp(r.status_changed_at),
        start_time: r.start_time.map(timestamp),
        learning_coach: r.learning_coach.as_ref().map(|c| dto::LearningCoachRes {
            coach: c.coach.to_string(),
            status: c.status.to_string(),
            status_changed_at: timestamp(c.status_changed_at),
        }),
        task_units: r
            .task_units
            .iter()
            .map(|t| dto::TaskUnitRes {
                task_unit: t.task_unit.to_string(),
                assessor: t.assessor.map(|a| a.to_string()),
            })
            .collect(),
        location: r.location.as_str().to_string(),
        created_at: timestamp(r.created_at),
        version: r.version,
    }
}

pub(crate) fn request_list(requests: &[AssessmentRequest]) -> dto::RequestListRes {
    dto::RequestListRes {
        requests: requests.iter().map(request_res).collect(),
    }
}

pub(crate) fn certificate_res(c: &Certificate) -> dto::CertificateRes {
    dto::CertificateRes {
        id: c.id.to_string(),
        handle: c.handle.clone(),
        enrollment: c.enrollment.to_string(),
        person: c.person.to_string(),
        curriculum: c.curriculum.to_string(),
        gear_type: c.gear_type.to_string(),
        issued_at: timestamp(c.issued_at),
        visible_from: c.visible_from.map(timestamp),
        verification_code: c.verification_code.clone(),
        completed_competencies: c
            .completed_competencies
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

pub(crate) fn certificate_list(certificates: &[Certificate]) -> dto::CertificateListRes {
    dto::CertificateListRes {
        certificates: certificates.iter().map(certificate_res).collect(),
    }
}

pub(crate) fn import_rows(rows: Vec<dto::ImportRowReq>) -> Vec<ImportRow> {
    rows.into_iter()
        .map(|r| ImportRow {
            person: r.person,
            task_unit: r.task_unit,
            curriculum: r.curriculum,
            granted_at: r.granted_at,
        })
        .collect()
}

pub(crate) fn import_report_res(report: ImportReport) -> dto::ImportReportRes {
    dto::ImportReportRes {
        succeeded: report.succeeded,
        failed: report
            .failed
            .into_iter()
            .map(|e| dto::RowErrorRes {
                row: e.row,
                reason: e.reason,
            })
            .collect(),
    }
}
