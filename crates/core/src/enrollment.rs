//! Enrollments (student curricula) and their raw progress records.

use crate::constants::COMPLETED_PROGRESS;
use crate::ids::{CompetencyId, CurriculumId, EnrollmentId, GearTypeId, PersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Progress of one competency within one enrollment, in `[0, 100]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyProgress {
    pub competency: CompetencyId,
    pub value: u8,
    pub updated_at: DateTime<Utc>,
}

/// A person's binding to one curriculum and gear type.
///
/// `completed_ever` holds competencies completed on an earlier, certified enrollment of the same
/// person, curriculum and gear type. Membership never changes after enrollment, so progress
/// recorded later cannot make those competencies incomplete again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub person: PersonId,
    pub curriculum: CurriculumId,
    pub gear_type: GearTypeId,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: Vec<CompetencyProgress>,
    #[serde(default)]
    pub completed_ever: BTreeSet<CompetencyId>,
}

impl Enrollment {
    pub fn new(
        person: PersonId,
        curriculum: CurriculumId,
        gear_type: GearTypeId,
        completed_ever: BTreeSet<CompetencyId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::new(),
            person,
            curriculum,
            gear_type,
            enrolled_at: now,
            terminated_at: None,
            progress: Vec::new(),
            completed_ever,
        }
    }

    pub fn is_active(&self) -> bool {
        self.terminated_at.is_none()
    }

    /// Whether this enrollment is for the same person, curriculum and gear type as `other`.
    pub fn same_track(&self, other: &Enrollment) -> bool {
        self.person == other.person
            && self.curriculum == other.curriculum
            && self.gear_type == other.gear_type
    }

    /// Recorded progress for `competency`; zero when nothing was recorded.
    pub fn progress_of(&self, competency: CompetencyId) -> u8 {
        self.progress
            .iter()
            .find(|p| p.competency == competency)
            .map(|p| p.value)
            .unwrap_or(0)
    }

    pub fn is_completed(&self, competency: CompetencyId) -> bool {
        self.completed_ever.contains(&competency)
            || self.progress_of(competency) >= COMPLETED_PROGRESS
    }

    /// Upserts the progress row for `competency`. Bounds and monotonicity are the caller's job.
    pub(crate) fn set_progress(&mut self, competency: CompetencyId, value: u8, now: DateTime<Utc>) {
        match self.progress.iter_mut().find(|p| p.competency == competency) {
            Some(row) => {
                row.value = value;
                row.updated_at = now;
            }
            None => self.progress.push(CompetencyProgress {
                competency,
                value,
                updated_at: now,
            }),
        }
    }
}
