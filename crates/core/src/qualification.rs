//! Qualifications: a person's recorded mastery of a task unit.
//!
//! Created either by completing an assessment request or by bulk import of historical records.

use crate::ids::{CurriculumId, PersonId, QualificationId, RequestId, TaskUnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationSource {
    Import,
    Assessment,
}

/// Unique per (person, task unit).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub id: QualificationId,
    pub person: PersonId,
    pub task_unit: TaskUnitId,
    #[serde(default)]
    pub curriculum: Option<CurriculumId>,
    pub granted_at: DateTime<Utc>,
    pub source: QualificationSource,
    #[serde(default)]
    pub request: Option<RequestId>,
}

/// One row of an import file, unvalidated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub person: String,
    pub task_unit: String,
    #[serde(default)]
    pub curriculum: Option<String>,
    #[serde(default)]
    pub granted_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Zero-based index into the submitted rows.
    pub row: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub succeeded: usize,
    pub failed: Vec<RowError>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    /// Folds a later chunk's report into this one, shifting its row indexes by `offset`.
    pub fn merge(&mut self, other: ImportReport, offset: usize) {
        self.succeeded += other.succeeded;
        self.failed
            .extend(other.failed.into_iter().map(|mut e| {
                e.row += offset;
                e
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_offsets_row_indexes() {
        let mut report = ImportReport {
            succeeded: 2,
            failed: vec![RowError {
                row: 1,
                reason: "bad".into(),
            }],
        };
        report.merge(
            ImportReport {
                succeeded: 1,
                failed: vec![RowError {
                    row: 0,
                    reason: "worse".into(),
                }],
            },
            3,
        );
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed[1].row, 3);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn import_rows_deserialise_from_yaml() {
        let yaml = "- person: 550e8400e29b41d4a716446655440000\n  task_unit: 00112233445566778899aabbccddeeff\n";
        let rows: Vec<ImportRow> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].granted_at.is_none());
    }
}
