//! Guard tables for assessment-request operations.
//!
//! Every mutation entry point and every presentation-layer preview goes through these pure
//! functions, so the allowed-status table lives in exactly one place.
//!
//! Evaluation order for a batch:
//!
//! 1. No selected request may be in a terminal status (checked for the whole batch first).
//! 2. Each request must be in an allowed source status for the operation.
//! 3. Operation-specific preconditions (request type, coach sub-status, start time).
//!
//! Privilege checks are deliberately not part of this module; they are evaluated separately by
//! the caller.

use crate::ids::{RequestId, TaskUnitId};
use crate::request::{AssessmentRequest, CoachStatus, RequestStatus, RequestType};
use serde::Serialize;
use std::fmt;

use RequestStatus::{Concept, GereedVoorBeoordeling, InBeoordeling, WachtOpVoorwaarden};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Submit,
    UpdateStartTime,
    AssignLearningCoach,
    AssignAssessor,
    AssignTaskUnitAssessor,
    GrantLearningCoachPermission,
    RespondAsLearningCoach,
    Cancel,
    StartAssessment,
    CompleteAssessment,
    Abort,
}

const NON_TERMINAL: &[RequestStatus] = &[
    Concept,
    WachtOpVoorwaarden,
    GereedVoorBeoordeling,
    InBeoordeling,
];

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::UpdateStartTime => "update start time",
            Self::AssignLearningCoach => "assign learning coach",
            Self::AssignAssessor => "assign assessor",
            Self::AssignTaskUnitAssessor => "assign task unit assessor",
            Self::GrantLearningCoachPermission => "grant learning coach permission",
            Self::RespondAsLearningCoach => "respond as learning coach",
            Self::Cancel => "cancel",
            Self::StartAssessment => "start assessment",
            Self::CompleteAssessment => "complete assessment",
            Self::Abort => "abort",
        }
    }

    /// Source statuses from which the operation may be invoked.
    pub fn allowed_statuses(self) -> &'static [RequestStatus] {
        match self {
            Self::Submit => &[Concept],
            Self::AssignLearningCoach | Self::RespondAsLearningCoach => {
                &[Concept, WachtOpVoorwaarden]
            }
            Self::GrantLearningCoachPermission => &[WachtOpVoorwaarden],
            Self::Cancel => &[Concept, WachtOpVoorwaarden, GereedVoorBeoordeling],
            Self::StartAssessment => &[GereedVoorBeoordeling],
            Self::CompleteAssessment => &[InBeoordeling],
            Self::UpdateStartTime
            | Self::AssignAssessor
            | Self::AssignTaskUnitAssessor
            | Self::Abort => NON_TERMINAL,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The precondition class a request failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardViolation {
    TerminalStatus,
    StatusNotAllowed { status: RequestStatus },
    NotIntern,
    NoLearningCoach,
    LearningCoachNotRequested { status: CoachStatus },
    StartTimeMissing,
    UnknownTaskUnit { task_unit: TaskUnitId },
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminalStatus => {
                f.write_str("none of the selected requests may already be in a final status")
            }
            Self::StatusNotAllowed { status } => {
                write!(f, "the operation is not allowed in status {status}")
            }
            Self::NotIntern => f.write_str("assessors can only be assigned to intern requests"),
            Self::NoLearningCoach => f.write_str("no learning coach is assigned"),
            Self::LearningCoachNotRequested { status } => write!(
                f,
                "the learning coach permission must be requested (currently {status})"
            ),
            Self::StartTimeMissing => f.write_str("a start time must be set"),
            Self::UnknownTaskUnit { task_unit } => {
                write!(f, "task unit {task_unit} does not belong to the request")
            }
        }
    }
}

/// A rejected operation: which precondition failed and for which requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("not all selected requests are eligible to {operation}: {violation}")]
pub struct GuardError {
    pub operation: Operation,
    pub violation: GuardViolation,
    pub requests: Vec<RequestId>,
}

/// Evaluates the guard for one request.
pub fn check(operation: Operation, request: &AssessmentRequest) -> Result<(), GuardViolation> {
    if request.status.is_terminal() {
        return Err(GuardViolation::TerminalStatus);
    }
    if !operation.allowed_statuses().contains(&request.status) {
        return Err(GuardViolation::StatusNotAllowed {
            status: request.status,
        });
    }

    match operation {
        Operation::AssignAssessor | Operation::AssignTaskUnitAssessor
            if request.request_type != RequestType::Intern =>
        {
            Err(GuardViolation::NotIntern)
        }
        Operation::GrantLearningCoachPermission | Operation::RespondAsLearningCoach => {
            match request.coach_status() {
                None => Err(GuardViolation::NoLearningCoach),
                Some(CoachStatus::Gevraagd) => Ok(()),
                Some(status) => Err(GuardViolation::LearningCoachNotRequested { status }),
            }
        }
        Operation::StartAssessment if request.start_time.is_none() => {
            Err(GuardViolation::StartTimeMissing)
        }
        _ => Ok(()),
    }
}

/// Narrower check for per-task-unit operations.
pub fn check_task_unit(
    request: &AssessmentRequest,
    task_unit: TaskUnitId,
) -> Result<(), GuardViolation> {
    if request.has_task_unit(task_unit) {
        Ok(())
    } else {
        Err(GuardViolation::UnknownTaskUnit { task_unit })
    }
}

/// Evaluates the guard for a whole batch; any failure rejects the batch.
///
/// The terminal-status check runs over every request before any per-operation guard, so the
/// error for a batch that mixes terminal and otherwise-ineligible requests always names the
/// terminal ones.
pub fn check_batch<'a, I>(operation: Operation, requests: I) -> Result<(), GuardError>
where
    I: IntoIterator<Item = &'a AssessmentRequest>,
    I::IntoIter: Clone,
{
    let requests = requests.into_iter();

    let terminal: Vec<RequestId> = requests
        .clone()
        .filter(|r| r.status.is_terminal())
        .map(|r| r.id)
        .collect();
    if !terminal.is_empty() {
        return Err(reject(operation, GuardViolation::TerminalStatus, terminal));
    }

    let mut first: Option<GuardViolation> = None;
    let mut failing = Vec::new();
    for request in requests {
        if let Err(violation) = check(operation, request) {
            match &first {
                None => {
                    first = Some(violation);
                    failing.push(request.id);
                }
                Some(seen) if *seen == violation => failing.push(request.id),
                Some(_) => {}
            }
        }
    }

    match first {
        Some(violation) => Err(reject(operation, violation, failing)),
        None => Ok(()),
    }
}

/// Read-only eligibility preview for presentation layers; identical to [`check_batch`].
pub fn preview(operation: Operation, requests: &[AssessmentRequest]) -> Result<(), GuardError> {
    check_batch(operation, requests.iter())
}

fn reject(operation: Operation, violation: GuardViolation, requests: Vec<RequestId>) -> GuardError {
    tracing::debug!(%operation, %violation, count = requests.len(), "guard rejected batch");
    GuardError {
        operation,
        violation,
        requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PersonId;
    use crate::request::fixtures::request;
    use crate::request::LearningCoachAssignment;
    use chrono::Utc;

    const ALL_OPERATIONS: [Operation; 11] = [
        Operation::Submit,
        Operation::UpdateStartTime,
        Operation::AssignLearningCoach,
        Operation::AssignAssessor,
        Operation::AssignTaskUnitAssessor,
        Operation::GrantLearningCoachPermission,
        Operation::RespondAsLearningCoach,
        Operation::Cancel,
        Operation::StartAssessment,
        Operation::CompleteAssessment,
        Operation::Abort,
    ];

    fn in_status(status: RequestStatus) -> AssessmentRequest {
        let mut r = request(RequestType::Intern, 1);
        r.status = status;
        r
    }

    #[test]
    fn terminal_requests_reject_every_operation() {
        for status in RequestStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            let r = in_status(status);
            for op in ALL_OPERATIONS {
                assert_eq!(check(op, &r), Err(GuardViolation::TerminalStatus), "{op} in {status}");
            }
        }
    }

    #[test]
    fn allowed_status_table() {
        let allowed = |op, status| {
            !matches!(
                check(op, &in_status(status)),
                Err(GuardViolation::StatusNotAllowed { .. }) | Err(GuardViolation::TerminalStatus)
            )
        };

        assert!(allowed(Operation::Submit, Concept));
        assert!(!allowed(Operation::Submit, WachtOpVoorwaarden));
        assert!(allowed(Operation::AssignLearningCoach, WachtOpVoorwaarden));
        assert!(!allowed(Operation::AssignLearningCoach, GereedVoorBeoordeling));
        assert!(allowed(Operation::Cancel, GereedVoorBeoordeling));
        assert!(!allowed(Operation::Cancel, InBeoordeling));
        assert!(allowed(Operation::UpdateStartTime, InBeoordeling));
        assert!(allowed(Operation::Abort, InBeoordeling));
        assert!(!allowed(Operation::GrantLearningCoachPermission, Concept));
    }

    #[test]
    fn assessor_requires_intern() {
        let mut r = request(RequestType::Extern, 1);
        assert_eq!(check(Operation::AssignAssessor, &r), Err(GuardViolation::NotIntern));
        r.request_type = RequestType::Intern;
        assert_eq!(check(Operation::AssignAssessor, &r), Ok(()));
    }

    #[test]
    fn grant_requires_requested_coach() {
        let mut r = in_status(WachtOpVoorwaarden);
        assert_eq!(
            check(Operation::GrantLearningCoachPermission, &r),
            Err(GuardViolation::NoLearningCoach)
        );

        r.learning_coach = Some(LearningCoachAssignment {
            coach: PersonId::new(),
            status: CoachStatus::Geweigerd,
            status_changed_at: Utc::now(),
        });
        assert_eq!(
            check(Operation::GrantLearningCoachPermission, &r),
            Err(GuardViolation::LearningCoachNotRequested {
                status: CoachStatus::Geweigerd
            })
        );

        r.learning_coach.as_mut().unwrap().status = CoachStatus::Gevraagd;
        assert_eq!(check(Operation::GrantLearningCoachPermission, &r), Ok(()));
    }

    #[test]
    fn start_requires_start_time() {
        let mut r = in_status(GereedVoorBeoordeling);
        assert_eq!(
            check(Operation::StartAssessment, &r),
            Err(GuardViolation::StartTimeMissing)
        );
        r.start_time = Some(Utc::now());
        assert_eq!(check(Operation::StartAssessment, &r), Ok(()));
    }

    #[test]
    fn batch_reports_terminal_requests_first() {
        let extern_request = request(RequestType::Extern, 1);
        let done = in_status(RequestStatus::Afgerond);

        let err = check_batch(Operation::AssignAssessor, [&extern_request, &done]).unwrap_err();
        assert_eq!(err.violation, GuardViolation::TerminalStatus);
        assert_eq!(err.requests, vec![done.id]);
        assert!(err.to_string().contains("final status"));
    }

    #[test]
    fn batch_collects_requests_failing_the_same_precondition() {
        let a = request(RequestType::Extern, 1);
        let b = request(RequestType::Intern, 1);
        let c = request(RequestType::Extern, 1);

        let err = preview(Operation::AssignAssessor, &[a.clone(), b, c.clone()]).unwrap_err();
        assert_eq!(err.violation, GuardViolation::NotIntern);
        assert_eq!(err.requests, vec![a.id, c.id]);
    }

    #[test]
    fn task_unit_must_belong_to_request() {
        let r = request(RequestType::Intern, 2);
        assert!(check_task_unit(&r, r.task_units[1].task_unit).is_ok());
        assert!(matches!(
            check_task_unit(&r, TaskUnitId::new()),
            Err(GuardViolation::UnknownTaskUnit { .. })
        ));
    }
}
