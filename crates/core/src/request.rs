//! Assessment requests (PvB aanvragen) and their nested assignments.

use crate::ids::{PersonId, RequestId, TaskUnitId};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use nwd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Assessed by the location's own assessors.
    Intern,
    /// Assessed externally; assessors cannot be assigned by the location.
    Extern,
}

impl RequestType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intern => "intern",
            Self::Extern => "extern",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "intern" => Ok(Self::Intern),
            "extern" => Ok(Self::Extern),
            other => Err(CoreError::InvalidInput(format!(
                "unknown request type '{other}' (expected intern or extern)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Concept,
    WachtOpVoorwaarden,
    GereedVoorBeoordeling,
    InBeoordeling,
    Afgerond,
    Ingetrokken,
    Afgebroken,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::Concept,
        Self::WachtOpVoorwaarden,
        Self::GereedVoorBeoordeling,
        Self::InBeoordeling,
        Self::Afgerond,
        Self::Ingetrokken,
        Self::Afgebroken,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::WachtOpVoorwaarden => "wacht_op_voorwaarden",
            Self::GereedVoorBeoordeling => "gereed_voor_beoordeling",
            Self::InBeoordeling => "in_beoordeling",
            Self::Afgerond => "afgerond",
            Self::Ingetrokken => "ingetrokken",
            Self::Afgebroken => "afgebroken",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Afgerond | Self::Ingetrokken | Self::Afgebroken)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown request status '{s}'")))
    }
}

/// Sub-status of a learning coach's consent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachStatus {
    Gevraagd,
    Gegeven,
    Geweigerd,
}

impl CoachStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gevraagd => "gevraagd",
            Self::Gegeven => "gegeven",
            Self::Geweigerd => "geweigerd",
        }
    }
}

impl fmt::Display for CoachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningCoachAssignment {
    pub coach: PersonId,
    pub status: CoachStatus,
    pub status_changed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUnitAssignment {
    pub task_unit: TaskUnitId,
    #[serde(default)]
    pub assessor: Option<PersonId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub id: RequestId,
    /// Human-readable reference, e.g. `PVB-7KQ2MX9A`.
    pub handle: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub candidate: PersonId,
    pub status: RequestStatus,
    pub status_changed_at: DateTime<Utc>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub learning_coach: Option<LearningCoachAssignment>,
    pub task_units: Vec<TaskUnitAssignment>,
    pub location: NonEmptyText,
    pub created_at: DateTime<Utc>,
    /// Bumped on every committed mutation.
    pub version: u64,
}

impl AssessmentRequest {
    pub fn coach_status(&self) -> Option<CoachStatus> {
        self.learning_coach.as_ref().map(|c| c.status)
    }

    pub fn has_task_unit(&self, task_unit: TaskUnitId) -> bool {
        self.task_units.iter().any(|t| t.task_unit == task_unit)
    }

    pub fn is_assessor(&self, person: PersonId) -> bool {
        self.task_units.iter().any(|t| t.assessor == Some(person))
    }

    /// Readiness for assessment: coach consent given, start time set and, for `intern`
    /// requests, an assessor on every task unit.
    pub fn preconditions_met(&self) -> bool {
        let coach_ok = self.coach_status() == Some(CoachStatus::Gegeven);
        let assessors_ok = match self.request_type {
            RequestType::Intern => self.task_units.iter().all(|t| t.assessor.is_some()),
            RequestType::Extern => true,
        };
        coach_ok && self.start_time.is_some() && assessors_ok
    }

    pub(crate) fn set_status(&mut self, status: RequestStatus, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.status_changed_at = now;
        }
    }
}

/// A mutation target: the request plus, optionally, the version the caller last saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub id: RequestId,
    #[serde(default)]
    pub version: Option<u64>,
}

impl RequestRef {
    pub fn at_version(id: RequestId, version: u64) -> Self {
        Self {
            id,
            version: Some(version),
        }
    }
}

impl From<RequestId> for RequestRef {
    fn from(id: RequestId) -> Self {
        Self { id, version: None }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::request;
    use super::*;

    #[test]
    fn status_serialises_snake_case() {
        let yaml = serde_yaml::to_string(&RequestStatus::GereedVoorBeoordeling).unwrap();
        assert_eq!(yaml.trim(), "gereed_voor_beoordeling");
    }

    #[test]
    fn parses_wire_names() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("klaar".parse::<RequestStatus>().is_err());
        assert_eq!(" extern ".parse::<RequestType>().unwrap(), RequestType::Extern);
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                RequestStatus::Afgerond,
                RequestStatus::Ingetrokken,
                RequestStatus::Afgebroken
            ]
        );
    }

    #[test]
    fn intern_preconditions_need_every_assessor() {
        let mut r = request(RequestType::Intern, 2);
        r.start_time = Some(Utc::now());
        r.learning_coach = Some(LearningCoachAssignment {
            coach: PersonId::new(),
            status: CoachStatus::Gegeven,
            status_changed_at: Utc::now(),
        });
        assert!(!r.preconditions_met());

        let assessor = PersonId::new();
        for t in &mut r.task_units {
            t.assessor = Some(assessor);
        }
        assert!(r.preconditions_met());
    }

    #[test]
    fn extern_preconditions_ignore_assessors() {
        let mut r = request(RequestType::Extern, 2);
        r.start_time = Some(Utc::now());
        r.learning_coach = Some(LearningCoachAssignment {
            coach: PersonId::new(),
            status: CoachStatus::Gevraagd,
            status_changed_at: Utc::now(),
        });
        assert!(!r.preconditions_met());
        r.learning_coach.as_mut().unwrap().status = CoachStatus::Gegeven;
        assert!(r.preconditions_met());
    }
}
