//! Bulk operation coordinator.
//!
//! Two failure policies live here on purpose, as two separate code paths:
//!
//! - **Mutations** ([`CertificationService::apply_to_requests`]): load every target, evaluate the
//!   guard for the whole batch, and either reject the batch wholesale or commit every target in
//!   one store commit.
//! - **Import** ([`CertificationService::import_qualifications`]): every row is validated and
//!   committed on its own; failures are collected per row and successful rows stay committed.

use crate::actor::{Actor, Privilege};
use crate::error::{CoreError, CoreResult};
use crate::guards::{self, GuardError};
use crate::ids::{CurriculumId, PersonId, QualificationId, TaskUnitId};
use crate::qualification::{ImportReport, ImportRow, Qualification, QualificationSource, RowError};
use crate::request::{AssessmentRequest, RequestRef};
use crate::service::CertificationService;
use crate::state_machine::RequestMutation;
use crate::store::{Change, ChangeSet};
use crate::versioned_files::{CommitAction, CommitDomain};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

/// Rejects an empty target set or one that names the same target twice.
pub(crate) fn distinct<T>(targets: &[T], label: &str) -> CoreResult<()>
where
    T: Eq + Hash + Display,
{
    if targets.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "select at least one {label}"
        )));
    }
    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        if !seen.insert(target) {
            return Err(CoreError::InvalidInput(format!(
                "{label} {target} is selected more than once"
            )));
        }
    }
    Ok(())
}

impl CertificationService {
    /// Applies `mutation` to every target or to none.
    ///
    /// Order: shape validation, load, privilege, optional version check, guard, apply,
    /// single commit. The store re-checks versions under its lock, so a concurrent writer that
    /// slipped in between load and commit surfaces as [`CoreError::VersionConflict`].
    pub(crate) fn apply_to_requests(
        &self,
        actor: &Actor,
        targets: &[RequestRef],
        mutation: RequestMutation,
    ) -> CoreResult<Vec<AssessmentRequest>> {
        let ids: Vec<_> = targets.iter().map(|t| t.id).collect();
        distinct(&ids, "request")?;
        let operation = mutation.operation();

        let mut loaded = Vec::with_capacity(targets.len());
        for target in targets {
            loaded.push(self.load_request(target.id)?);
        }

        mutation.authorize(actor, &loaded)?;
        for (target, request) in targets.iter().zip(&loaded) {
            if let Some(expected) = target.version {
                if expected != request.version {
                    return Err(CoreError::VersionConflict {
                        request: request.id,
                        expected,
                        found: request.version,
                    });
                }
            }
        }
        guards::check_batch(operation, loaded.iter())?;
        if let RequestMutation::AssignTaskUnitAssessor { task_unit, .. } = &mutation {
            for request in &loaded {
                guards::check_task_unit(request, *task_unit).map_err(|violation| {
                    GuardError {
                        operation,
                        violation,
                        requests: vec![request.id],
                    }
                })?;
            }
        }

        let now = self.now();
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Request,
            CommitAction::Update,
            format!("{operation} ({} requests)", loaded.len()),
        );
        let mut granted = HashSet::new();
        let mut updated = Vec::with_capacity(loaded.len());

        for mut request in loaded {
            let previous_version = request.version;
            mutation.apply(&mut request, now);
            request.version = previous_version + 1;

            if matches!(mutation, RequestMutation::CompleteAssessment) {
                for change in self.assessment_qualifications(&request, now, &mut granted)? {
                    set.push(change);
                }
            }

            set.push(Change::PutRequest {
                request: request.clone(),
                previous_version,
            });
            updated.push(request);
        }

        self.store.commit(set)?;
        tracing::info!(
            %operation,
            actor = %actor.person,
            count = updated.len(),
            "request batch committed"
        );
        Ok(updated)
    }

    /// Qualifications earned by completing `request`, skipping ones the candidate already holds.
    fn assessment_qualifications(
        &self,
        request: &AssessmentRequest,
        now: DateTime<Utc>,
        granted: &mut HashSet<(PersonId, TaskUnitId)>,
    ) -> CoreResult<Vec<Change>> {
        let mut changes = Vec::new();
        for unit in &request.task_units {
            let key = (request.candidate, unit.task_unit);
            if granted.contains(&key)
                || self
                    .store
                    .qualification_for(request.candidate, unit.task_unit)?
                    .is_some()
            {
                continue;
            }
            granted.insert(key);
            changes.push(Change::InsertQualification(Qualification {
                id: QualificationId::new(),
                person: request.candidate,
                task_unit: unit.task_unit,
                curriculum: None,
                granted_at: now,
                source: QualificationSource::Assessment,
                request: Some(request.id),
            }));
        }
        Ok(changes)
    }

    /// Imports historical qualifications row by row.
    ///
    /// Unlike every other bulk operation this never rejects the whole batch for a bad row: each
    /// row is committed on its own and failures are reported with their index and reason.
    pub fn import_qualifications(
        &self,
        actor: &Actor,
        rows: &[ImportRow],
    ) -> CoreResult<ImportReport> {
        actor.require(Privilege::LocationAdmin, "importing qualifications")?;

        let mut report = ImportReport::default();
        for (index, row) in rows.iter().enumerate() {
            match self.import_row(actor, row) {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    if err.kind() == crate::error::ErrorKind::Infrastructure {
                        tracing::error!(row = index, error = %err, "import row failed");
                    } else {
                        tracing::warn!(row = index, error = %err, "import row rejected");
                    }
                    report.failed.push(RowError {
                        row: index,
                        reason: err.user_message(),
                    });
                }
            }
        }

        tracing::info!(
            actor = %actor.person,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "qualification import finished"
        );
        Ok(report)
    }

    fn import_row(&self, actor: &Actor, row: &ImportRow) -> CoreResult<()> {
        let person = PersonId::parse(&row.person)?;
        let task_unit = TaskUnitId::parse(&row.task_unit)?;
        let curriculum = row
            .curriculum
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(CurriculumId::parse)
            .transpose()?;

        let now = self.now();
        let granted_at = match row.granted_at.as_deref().map(str::trim) {
            None | Some("") => now,
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| CoreError::InvalidInput(format!("granted_at '{raw}': {e}")))?,
        };
        if granted_at > now {
            return Err(CoreError::InvalidInput(
                "granted_at must not be in the future".into(),
            ));
        }
        if let Some(curriculum) = curriculum {
            self.load_curriculum(curriculum)?;
        }

        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Qualification,
            CommitAction::Create,
            "import qualification",
        );
        set.push(Change::InsertQualification(Qualification {
            id: QualificationId::new(),
            person,
            task_unit,
            curriculum,
            granted_at,
            source: QualificationSource::Import,
            request: None,
        }));
        self.store.commit(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{harness, member};

    #[test]
    fn distinct_rejects_empty_and_duplicates() {
        let a = PersonId::new();
        assert!(matches!(
            distinct::<PersonId>(&[], "person"),
            Err(CoreError::InvalidInput(msg)) if msg.contains("at least one")
        ));
        assert!(matches!(
            distinct(&[a, a], "person"),
            Err(CoreError::InvalidInput(msg)) if msg.contains("more than once")
        ));
        assert!(distinct(&[a, PersonId::new()], "person").is_ok());
    }

    #[test]
    fn import_keeps_good_rows_and_reports_bad_ones() {
        let h = harness();
        let person = PersonId::new();
        let task_unit = TaskUnitId::new();
        let row = |p: String, t: String| ImportRow {
            person: p,
            task_unit: t,
            ..ImportRow::default()
        };

        let rows = vec![
            row(person.to_string(), task_unit.to_string()),
            row("not-a-person".into(), TaskUnitId::new().to_string()),
            row(person.to_string(), task_unit.to_string()),
            ImportRow {
                granted_at: Some("2999-01-01T00:00:00Z".into()),
                ..row(PersonId::new().to_string(), TaskUnitId::new().to_string())
            },
            row(person.to_string(), TaskUnitId::new().to_string()),
        ];

        let report = h.svc.import_qualifications(&h.admin, &rows).unwrap();
        assert_eq!(report.succeeded, 2);
        let failed_rows: Vec<usize> = report.failed.iter().map(|e| e.row).collect();
        assert_eq!(failed_rows, vec![1, 2, 3]);
        assert!(report.failed[0].reason.contains("person id"));
        assert!(report.failed[1].reason.contains("already holds"));
        assert_eq!(h.svc.store.qualifications_for(person).unwrap().len(), 2);
    }

    #[test]
    fn import_requires_location_admin() {
        let h = harness();
        let err = h
            .svc
            .import_qualifications(&member("Instructeur"), &[])
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn import_parses_explicit_grant_time() {
        let h = harness();
        let person = PersonId::new();
        let rows = vec![ImportRow {
            person: person.to_string(),
            task_unit: TaskUnitId::new().to_string(),
            curriculum: None,
            granted_at: Some("2019-07-12T14:00:00+02:00".into()),
        }];
        let report = h.svc.import_qualifications(&h.admin, &rows).unwrap();
        assert_eq!(report.succeeded, 1);
        let q = &h.svc.store.qualifications_for(person).unwrap()[0];
        assert_eq!(q.granted_at.to_rfc3339(), "2019-07-12T12:00:00+00:00");
        assert_eq!(q.source, QualificationSource::Import);
    }
}
