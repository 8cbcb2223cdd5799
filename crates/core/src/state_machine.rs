//! Assessment request lifecycle.
//!
//! ```text
//! concept ──submit──▶ wacht_op_voorwaarden ──(preconditions hold)──▶ gereed_voor_beoordeling
//!    │                        │                                              │
//!    │                        │                                       start assessment
//!    │                        │                                              ▼
//!    │                        │                                       in_beoordeling ──complete──▶ afgerond
//!    └────────────┬───────────┴──────────────────────────────────────────────┘
//!                 ├── cancel ─▶ ingetrokken   (not from in_beoordeling)
//!                 └── abort  ─▶ afgebroken
//! ```
//!
//! Submit goes straight to `gereed_voor_beoordeling` when the readiness preconditions already
//! hold. A request waiting on preconditions advances by itself as soon as a mutation makes them
//! hold.

use crate::actor::{Actor, Privilege};
use crate::bulk::distinct;
use crate::error::{CoreError, CoreResult};
use crate::guards::Operation;
use crate::handle;
use crate::ids::{PersonId, RequestId, TaskUnitId};
use crate::request::{
    AssessmentRequest, CoachStatus, LearningCoachAssignment, RequestRef, RequestStatus,
    RequestType, TaskUnitAssignment,
};
use crate::service::CertificationService;
use crate::store::{Change, ChangeSet};
use crate::versioned_files::{CommitAction, CommitDomain};
use chrono::{DateTime, Utc};
use nwd_types::NonEmptyText;

/// A mutation of one request, applied identically to every target of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestMutation {
    Submit,
    Cancel,
    UpdateStartTime(DateTime<Utc>),
    AssignLearningCoach(PersonId),
    GrantLearningCoachPermission,
    RespondAsLearningCoach { granted: bool },
    AssignAssessor(PersonId),
    AssignTaskUnitAssessor {
        task_unit: TaskUnitId,
        assessor: PersonId,
    },
    StartAssessment,
    CompleteAssessment,
    Abort,
}

impl RequestMutation {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Submit => Operation::Submit,
            Self::Cancel => Operation::Cancel,
            Self::UpdateStartTime(_) => Operation::UpdateStartTime,
            Self::AssignLearningCoach(_) => Operation::AssignLearningCoach,
            Self::GrantLearningCoachPermission => Operation::GrantLearningCoachPermission,
            Self::RespondAsLearningCoach { .. } => Operation::RespondAsLearningCoach,
            Self::AssignAssessor(_) => Operation::AssignAssessor,
            Self::AssignTaskUnitAssessor { .. } => Operation::AssignTaskUnitAssessor,
            Self::StartAssessment => Operation::StartAssessment,
            Self::CompleteAssessment => Operation::CompleteAssessment,
            Self::Abort => Operation::Abort,
        }
    }

    /// Caller-privilege check, independent of the state guard.
    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        requests: &[AssessmentRequest],
    ) -> CoreResult<()> {
        let operation = self.operation();
        match self {
            Self::RespondAsLearningCoach { .. } => {
                let all_own = requests.iter().all(|r| {
                    r.learning_coach
                        .as_ref()
                        .is_some_and(|c| c.coach == actor.person)
                });
                if all_own {
                    Ok(())
                } else {
                    Err(CoreError::PermissionDenied(
                        "only the assigned learning coach may respond".into(),
                    ))
                }
            }
            Self::StartAssessment | Self::CompleteAssessment | Self::Abort => {
                if actor.has(Privilege::LocationAdmin)
                    || requests.iter().all(|r| r.is_assessor(actor.person))
                {
                    Ok(())
                } else {
                    Err(CoreError::PermissionDenied(format!(
                        "{operation} requires location_admin privilege or an assessor assignment"
                    )))
                }
            }
            _ => actor.require(Privilege::LocationAdmin, operation.as_str()),
        }
    }

    /// Applies the mutation. Guards must already have passed.
    pub fn apply(&self, request: &mut AssessmentRequest, now: DateTime<Utc>) {
        match self {
            Self::Submit => request.set_status(RequestStatus::WachtOpVoorwaarden, now),
            Self::Cancel => request.set_status(RequestStatus::Ingetrokken, now),
            Self::UpdateStartTime(start) => request.start_time = Some(*start),
            Self::AssignLearningCoach(coach) => {
                request.learning_coach = Some(LearningCoachAssignment {
                    coach: *coach,
                    status: CoachStatus::Gevraagd,
                    status_changed_at: now,
                });
            }
            Self::GrantLearningCoachPermission => {
                set_coach_status(request, CoachStatus::Gegeven, now)
            }
            Self::RespondAsLearningCoach { granted } => {
                let status = if *granted {
                    CoachStatus::Gegeven
                } else {
                    CoachStatus::Geweigerd
                };
                set_coach_status(request, status, now);
            }
            Self::AssignAssessor(assessor) => {
                for unit in &mut request.task_units {
                    unit.assessor = Some(*assessor);
                }
            }
            Self::AssignTaskUnitAssessor {
                task_unit,
                assessor,
            } => {
                if let Some(unit) = request
                    .task_units
                    .iter_mut()
                    .find(|u| u.task_unit == *task_unit)
                {
                    unit.assessor = Some(*assessor);
                }
            }
            Self::StartAssessment => request.set_status(RequestStatus::InBeoordeling, now),
            Self::CompleteAssessment => request.set_status(RequestStatus::Afgerond, now),
            Self::Abort => request.set_status(RequestStatus::Afgebroken, now),
        }

        if request.status == RequestStatus::WachtOpVoorwaarden && request.preconditions_met() {
            request.set_status(RequestStatus::GereedVoorBeoordeling, now);
        }
    }
}

fn set_coach_status(request: &mut AssessmentRequest, status: CoachStatus, now: DateTime<Utc>) {
    if let Some(coach) = request.learning_coach.as_mut() {
        coach.status = status;
        coach.status_changed_at = now;
    }
}

/// Input for [`CertificationService::create_request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub candidate: PersonId,
    pub task_units: Vec<TaskUnitId>,
    /// Defaults to the configured location.
    pub location: Option<NonEmptyText>,
}

impl CertificationService {
    /// Creates a request in `concept`.
    pub fn create_request(
        &self,
        actor: &Actor,
        new: NewRequest,
    ) -> CoreResult<AssessmentRequest> {
        actor.require(Privilege::LocationAdmin, "creating assessment requests")?;
        distinct(&new.task_units, "task unit")?;

        let now = self.now();
        let request = AssessmentRequest {
            id: RequestId::new(),
            handle: handle::request_handle(&mut rand::thread_rng()),
            request_type: new.request_type,
            candidate: new.candidate,
            status: RequestStatus::Concept,
            status_changed_at: now,
            start_time: None,
            learning_coach: None,
            task_units: new
                .task_units
                .into_iter()
                .map(|task_unit| TaskUnitAssignment {
                    task_unit,
                    assessor: None,
                })
                .collect(),
            location: new.location.unwrap_or_else(|| self.cfg.location().clone()),
            created_at: now,
            version: 1,
        };

        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Request,
            CommitAction::Create,
            format!("create {} request", request.request_type),
        );
        set.push(Change::PutRequest {
            request: request.clone(),
            previous_version: 0,
        });
        self.store.commit(set)?;

        tracing::info!(
            request = %request.id,
            handle = %request.handle,
            "assessment request created"
        );
        Ok(request)
    }

    pub fn request(&self, id: RequestId) -> CoreResult<AssessmentRequest> {
        self.load_request(id)
    }

    /// All requests, optionally filtered by status, oldest first.
    pub fn requests(&self, status: Option<RequestStatus>) -> CoreResult<Vec<AssessmentRequest>> {
        Ok(self
            .store
            .requests()?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect())
    }

    pub fn submit_requests(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::Submit)
    }

    pub fn cancel_requests(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::Cancel)
    }

    pub fn update_start_time(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
        start_time: DateTime<Utc>,
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::UpdateStartTime(start_time))
    }

    pub fn start_assessments(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::StartAssessment)
    }

    /// Completes assessments and grants the candidate a qualification for every task unit
    /// they do not hold yet, in the same commit.
    pub fn complete_assessments(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::CompleteAssessment)
    }

    pub fn abort_requests(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::Abort)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::service::fixtures::Harness;

    pub(crate) fn create(
        h: &Harness,
        request_type: RequestType,
        task_units: usize,
    ) -> AssessmentRequest {
        h.svc
            .create_request(
                &h.admin,
                NewRequest {
                    request_type,
                    candidate: PersonId::new(),
                    task_units: (0..task_units).map(|_| TaskUnitId::new()).collect(),
                    location: None,
                },
            )
            .unwrap()
    }

    pub(crate) fn refs(requests: &[&AssessmentRequest]) -> Vec<RequestRef> {
        requests.iter().map(|r| RequestRef::from(r.id)).collect()
    }
}
