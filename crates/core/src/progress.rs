//! Progress aggregation over the competency graph, plus the operations that feed it.

use crate::actor::{Actor, Privilege};
use crate::bulk::distinct;
use crate::constants::COMPLETED_PROGRESS;
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult, EnrollmentIneligibility};
use crate::ids::{CompetencyId, CurriculumId, EnrollmentId, GearTypeId, ModuleId, PersonId};
use crate::service::CertificationService;
use crate::store::{Change, ChangeSet};
use crate::versioned_files::{CommitAction, CommitDomain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub module: ModuleId,
    pub title: String,
    pub required: bool,
    pub completed: usize,
    pub total: usize,
}

impl ModuleProgress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub enrollment: EnrollmentId,
    pub modules: Vec<ModuleProgress>,
    pub completed: usize,
    pub total: usize,
    pub required_completed: usize,
    pub required_total: usize,
}

impl ProgressSummary {
    pub fn from_modules(enrollment: EnrollmentId, modules: Vec<ModuleProgress>) -> Self {
        let sum = |required_only: bool| {
            modules
                .iter()
                .filter(|m| !required_only || m.required)
                .fold((0, 0), |(c, t), m| (c + m.completed, t + m.total))
        };
        let (completed, total) = sum(false);
        let (required_completed, required_total) = sum(true);
        Self {
            enrollment,
            modules,
            completed,
            total,
            required_completed,
            required_total,
        }
    }

    /// The issuance gate: at least one module fully completed.
    pub fn has_completed_module(&self) -> bool {
        self.modules.iter().any(ModuleProgress::is_complete)
    }
}

/// Per-module completion in curriculum order. Pure.
pub fn aggregate(curriculum: &Curriculum, enrollment: &Enrollment) -> Vec<ModuleProgress> {
    curriculum
        .modules
        .iter()
        .map(|module| ModuleProgress {
            module: module.id,
            title: module.title.as_str().to_string(),
            required: module.required,
            completed: module
                .competencies
                .iter()
                .filter(|c| enrollment.is_completed(c.id))
                .count(),
            total: module.competencies.len(),
        })
        .collect()
}

/// Competencies of `curriculum` the enrollment has completed.
pub(crate) fn completed_competencies(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
) -> BTreeSet<CompetencyId> {
    curriculum
        .modules
        .iter()
        .flat_map(|m| m.competencies.iter().map(|c| c.id))
        .filter(|c| enrollment.is_completed(*c))
        .collect()
}

impl CertificationService {
    pub fn compute_progress(&self, enrollment: EnrollmentId) -> CoreResult<Vec<ModuleProgress>> {
        let enrollment = self.load_enrollment(enrollment)?;
        let curriculum = self.load_curriculum(enrollment.curriculum)?;
        Ok(aggregate(&curriculum, &enrollment))
    }

    pub fn progress_summary(&self, enrollment: EnrollmentId) -> CoreResult<ProgressSummary> {
        Ok(ProgressSummary::from_modules(
            enrollment,
            self.compute_progress(enrollment)?,
        ))
    }

    /// Stores a curriculum revision. A curriculum id can only move to a higher revision.
    pub fn register_curriculum(
        &self,
        actor: &Actor,
        curriculum: Curriculum,
    ) -> CoreResult<Curriculum> {
        actor.require(Privilege::SystemAdmin, "registering curricula")?;
        curriculum.validate()?;

        let action = match self.store.curriculum(curriculum.id)? {
            Some(existing) if existing.revision >= curriculum.revision => {
                return Err(CoreError::InvalidInput(format!(
                    "curriculum {} is already at revision {}",
                    curriculum.id, existing.revision
                )));
            }
            Some(_) => CommitAction::Update,
            None => CommitAction::Create,
        };

        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Curriculum,
            action,
            format!("register revision {}", curriculum.revision),
        );
        set.push(Change::PutCurriculum(curriculum.clone()));
        self.store.commit(set)?;

        tracing::info!(
            curriculum = %curriculum.id,
            revision = curriculum.revision,
            "curriculum registered"
        );
        Ok(curriculum)
    }

    /// Enrolls `person`, seeding the completed-ever set from certificates issued on earlier
    /// enrollments of the same person, curriculum and gear type.
    pub fn enroll(
        &self,
        actor: &Actor,
        person: PersonId,
        curriculum: CurriculumId,
        gear_type: GearTypeId,
    ) -> CoreResult<Enrollment> {
        actor.require(Privilege::LocationAdmin, "enrolling students")?;
        let curriculum = self.load_curriculum(curriculum)?;

        if self
            .store
            .enrollments_for(person, curriculum.id, gear_type)?
            .iter()
            .any(Enrollment::is_active)
        {
            return Err(CoreError::InvalidInput(format!(
                "person {person} already has an active enrollment for this curriculum and gear type"
            )));
        }

        let completed_ever: BTreeSet<CompetencyId> = self
            .store
            .certificates_for_person(person)?
            .into_iter()
            .filter(|c| c.curriculum == curriculum.id && c.gear_type == gear_type)
            .flat_map(|c| c.completed_competencies)
            .filter(|c| curriculum.contains_competency(*c))
            .collect();

        let enrollment = Enrollment::new(
            person,
            curriculum.id,
            gear_type,
            completed_ever,
            self.now(),
        );
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Enrollment,
            CommitAction::Create,
            "enroll",
        );
        set.push(Change::PutEnrollment(enrollment.clone()));
        self.store.commit(set)?;

        tracing::info!(
            enrollment = %enrollment.id,
            carried_over = enrollment.completed_ever.len(),
            "enrollment created"
        );
        Ok(enrollment)
    }

    /// Records progress for one competency. Progress never decreases through this operation.
    pub fn record_progress(
        &self,
        actor: &Actor,
        enrollment: EnrollmentId,
        competency: CompetencyId,
        value: u8,
    ) -> CoreResult<Enrollment> {
        actor.require(Privilege::Member, "recording progress")?;
        if value > COMPLETED_PROGRESS {
            return Err(CoreError::InvalidInput(format!(
                "progress must be between 0 and {COMPLETED_PROGRESS}, got {value}"
            )));
        }

        let mut enrollment = self.load_enrollment(enrollment)?;
        if !enrollment.is_active() {
            return Err(CoreError::EnrollmentNotEligible {
                enrollments: vec![enrollment.id],
                reason: EnrollmentIneligibility::Terminated,
            });
        }
        let curriculum = self.load_curriculum(enrollment.curriculum)?;
        if !curriculum.contains_competency(competency) {
            return Err(CoreError::InvalidInput(format!(
                "competency {competency} is not part of curriculum {}",
                curriculum.id
            )));
        }
        let current = enrollment.progress_of(competency);
        if value < current {
            return Err(CoreError::InvalidInput(format!(
                "progress cannot decrease (currently {current}, got {value})"
            )));
        }

        enrollment.set_progress(competency, value, self.now());
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Enrollment,
            CommitAction::Update,
            "record progress",
        );
        set.push(Change::PutEnrollment(enrollment.clone()));
        self.store.commit(set)?;
        Ok(enrollment)
    }

    /// Sets every competency of every required module to completed, for all enrollments or none.
    pub fn complete_core_competencies(
        &self,
        actor: &Actor,
        enrollments: &[EnrollmentId],
    ) -> CoreResult<Vec<Enrollment>> {
        actor.require(Privilege::LocationAdmin, "completing core competencies")?;
        distinct(enrollments, "enrollment")?;

        let mut loaded = Vec::with_capacity(enrollments.len());
        for id in enrollments {
            let enrollment = self.load_enrollment(*id)?;
            let curriculum = self.load_curriculum(enrollment.curriculum)?;
            loaded.push((enrollment, curriculum));
        }
        let terminated: Vec<EnrollmentId> = loaded
            .iter()
            .filter(|(e, _)| !e.is_active())
            .map(|(e, _)| e.id)
            .collect();
        if !terminated.is_empty() {
            return Err(CoreError::EnrollmentNotEligible {
                enrollments: terminated,
                reason: EnrollmentIneligibility::Terminated,
            });
        }

        let now = self.now();
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Enrollment,
            CommitAction::Update,
            format!("complete core competencies ({} enrollments)", loaded.len()),
        );
        let mut updated = Vec::with_capacity(loaded.len());
        for (mut enrollment, curriculum) in loaded {
            for competency in curriculum.core_competencies() {
                enrollment.set_progress(competency, COMPLETED_PROGRESS, now);
            }
            set.push(Change::PutEnrollment(enrollment.clone()));
            updated.push(enrollment);
        }
        self.store.commit(set)?;

        tracing::info!(count = updated.len(), "core competencies completed");
        Ok(updated)
    }

    /// Soft-terminates enrollments (the student left the curriculum), all or none.
    pub fn terminate_enrollments(
        &self,
        actor: &Actor,
        enrollments: &[EnrollmentId],
    ) -> CoreResult<Vec<Enrollment>> {
        actor.require(Privilege::LocationAdmin, "terminating enrollments")?;
        distinct(enrollments, "enrollment")?;

        let loaded = enrollments
            .iter()
            .map(|id| self.load_enrollment(*id))
            .collect::<CoreResult<Vec<_>>>()?;
        let terminated: Vec<EnrollmentId> =
            loaded.iter().filter(|e| !e.is_active()).map(|e| e.id).collect();
        if !terminated.is_empty() {
            return Err(CoreError::EnrollmentNotEligible {
                enrollments: terminated,
                reason: EnrollmentIneligibility::Terminated,
            });
        }

        let now = self.now();
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Enrollment,
            CommitAction::Update,
            format!("terminate {} enrollments", loaded.len()),
        );
        let updated: Vec<Enrollment> = loaded
            .into_iter()
            .map(|mut e| {
                e.terminated_at = Some(now);
                e
            })
            .collect();
        for e in &updated {
            set.push(Change::PutEnrollment(e.clone()));
        }
        self.store.commit(set)?;
        Ok(updated)
    }
}
