//! Learning-coach and assessor assignment.
//!
//! Both are sub-resources of a request with their own sub-state. Assigning a coach always asks
//! for fresh consent (`gevraagd`). A location administrator may grant that consent on the coach's
//! behalf; the privilege check and the state guard for that shortcut are evaluated separately
//! and both must pass.

use crate::actor::{Actor, Privilege};
use crate::error::CoreResult;
use crate::ids::{PersonId, TaskUnitId};
use crate::request::{AssessmentRequest, RequestRef};
use crate::service::CertificationService;
use crate::state_machine::RequestMutation;

impl CertificationService {
    /// Assigns (or replaces) the learning coach; the coach's sub-status resets to `gevraagd`.
    pub fn assign_learning_coach(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
        coach: PersonId,
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::AssignLearningCoach(coach))
    }

    /// Grants the learning coach's permission on their behalf (`gevraagd` → `gegeven`).
    pub fn grant_learning_coach_permission(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
    ) -> CoreResult<Vec<AssessmentRequest>> {
        actor.require(
            Privilege::LocationAdmin,
            "granting learning coach permission on behalf of the coach",
        )?;
        self.apply_to_requests(actor, targets, RequestMutation::GrantLearningCoachPermission)
    }

    /// The assigned coach gives or declines consent.
    pub fn respond_as_learning_coach(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
        granted: bool,
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(
            actor,
            targets,
            RequestMutation::RespondAsLearningCoach { granted },
        )
    }

    /// Replaces the assessor on every task unit of every target. All targets must be `intern`.
    pub fn assign_assessor(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
        assessor: PersonId,
    ) -> CoreResult<Vec<AssessmentRequest>> {
        self.apply_to_requests(actor, targets, RequestMutation::AssignAssessor(assessor))
    }

    /// Assigns the assessor of one task unit of one request.
    pub fn assign_task_unit_assessor(
        &self,
        actor: &Actor,
        target: RequestRef,
        task_unit: TaskUnitId,
        assessor: PersonId,
    ) -> CoreResult<AssessmentRequest> {
        let mut updated = self.apply_to_requests(
            actor,
            &[target],
            RequestMutation::AssignTaskUnitAssessor {
                task_unit,
                assessor,
            },
        )?;
        Ok(updated.remove(0))
    }
}
