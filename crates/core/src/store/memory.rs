//! In-process store.
//!
//! A commit validates against the current tables, applies the change set to a clone and swaps
//! the clone in, all under the write lock. Readers never observe a half-applied commit.

use super::{check_constraints, Change, ChangeSet, Snapshot, Store};
use crate::certificate::Certificate;
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult};
use crate::ids::{
    CertificateId, CurriculumId, EnrollmentId, GearTypeId, PersonId, QualificationId, RequestId,
    TaskUnitId,
};
use crate::qualification::Qualification;
use crate::request::AssessmentRequest;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    curricula: HashMap<CurriculumId, Curriculum>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    requests: HashMap<RequestId, AssessmentRequest>,
    certificates: HashMap<CertificateId, Certificate>,
    /// Handles of withdrawn certificates; never handed out again.
    retired_handles: HashSet<String>,
    qualifications: HashMap<QualificationId, Qualification>,
}

impl Tables {
    fn apply(&mut self, change: Change) -> CoreResult<()> {
        match change {
            Change::PutCurriculum(c) => {
                self.curricula.insert(c.id, c);
            }
            Change::PutEnrollment(e) => {
                self.enrollments.insert(e.id, e);
            }
            Change::PutRequest { request, .. } => {
                self.requests.insert(request.id, request);
            }
            Change::InsertCertificate(c) => {
                self.certificates.insert(c.id, c);
            }
            Change::DeleteCertificate(id) => {
                let removed = self
                    .certificates
                    .remove(&id)
                    .ok_or_else(|| CoreError::not_found("certificate", id))?;
                self.retired_handles.insert(removed.handle);
            }
            Change::InsertQualification(q) => {
                self.qualifications.insert(q.id, q);
            }
        }
        Ok(())
    }
}

impl Snapshot for Tables {
    fn request_version(&self, id: RequestId) -> CoreResult<Option<u64>> {
        Ok(self.requests.get(&id).map(|r| r.version))
    }

    fn handle_taken(&self, handle: &str) -> CoreResult<bool> {
        Ok(self.retired_handles.contains(handle)
            || self.certificates.values().any(|c| c.handle == handle))
    }

    fn enrollment_certified(&self, enrollment: EnrollmentId) -> CoreResult<bool> {
        Ok(self
            .certificates
            .values()
            .any(|c| c.enrollment == enrollment))
    }

    fn certificate_exists(&self, id: CertificateId) -> CoreResult<bool> {
        Ok(self.certificates.contains_key(&id))
    }

    fn qualification_held(&self, person: PersonId, task_unit: TaskUnitId) -> CoreResult<bool> {
        Ok(self
            .qualifications
            .values()
            .any(|q| q.person == person && q.task_unit == task_unit))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| CoreError::LockPoisoned)
    }
}

impl Store for MemoryStore {
    fn curriculum(&self, id: CurriculumId) -> CoreResult<Option<Curriculum>> {
        Ok(self.read()?.curricula.get(&id).cloned())
    }

    fn enrollment(&self, id: EnrollmentId) -> CoreResult<Option<Enrollment>> {
        Ok(self.read()?.enrollments.get(&id).cloned())
    }

    fn enrollments_for(
        &self,
        person: PersonId,
        curriculum: CurriculumId,
        gear_type: GearTypeId,
    ) -> CoreResult<Vec<Enrollment>> {
        let mut found: Vec<Enrollment> = self
            .read()?
            .enrollments
            .values()
            .filter(|e| {
                e.person == person && e.curriculum == curriculum && e.gear_type == gear_type
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.enrolled_at);
        Ok(found)
    }

    fn request(&self, id: RequestId) -> CoreResult<Option<AssessmentRequest>> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    fn requests(&self) -> CoreResult<Vec<AssessmentRequest>> {
        let mut all: Vec<AssessmentRequest> = self.read()?.requests.values().cloned().collect();
        all.sort_by_key(|r| (r.created_at, r.id));
        Ok(all)
    }

    fn certificate(&self, id: CertificateId) -> CoreResult<Option<Certificate>> {
        Ok(self.read()?.certificates.get(&id).cloned())
    }

    fn certificate_by_handle(&self, handle: &str) -> CoreResult<Option<Certificate>> {
        Ok(self
            .read()?
            .certificates
            .values()
            .find(|c| c.handle == handle)
            .cloned())
    }

    fn certificate_for_enrollment(
        &self,
        enrollment: EnrollmentId,
    ) -> CoreResult<Option<Certificate>> {
        Ok(self
            .read()?
            .certificates
            .values()
            .find(|c| c.enrollment == enrollment)
            .cloned())
    }

    fn certificates_for_person(&self, person: PersonId) -> CoreResult<Vec<Certificate>> {
        let mut found: Vec<Certificate> = self
            .read()?
            .certificates
            .values()
            .filter(|c| c.person == person)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.issued_at);
        Ok(found)
    }

    fn qualification_for(
        &self,
        person: PersonId,
        task_unit: TaskUnitId,
    ) -> CoreResult<Option<Qualification>> {
        Ok(self
            .read()?
            .qualifications
            .values()
            .find(|q| q.person == person && q.task_unit == task_unit)
            .cloned())
    }

    fn qualifications_for(&self, person: PersonId) -> CoreResult<Vec<Qualification>> {
        let mut found: Vec<Qualification> = self
            .read()?
            .qualifications
            .values()
            .filter(|q| q.person == person)
            .cloned()
            .collect();
        found.sort_by_key(|q| q.granted_at);
        Ok(found)
    }

    fn commit(&self, set: ChangeSet) -> CoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| CoreError::LockPoisoned)?;
        check_constraints(&*tables, &set.changes)?;

        let mut next = tables.clone();
        for change in set.changes {
            next.apply(change)?;
        }
        *tables = next;

        tracing::debug!(
            domain = %set.domain,
            action = %set.action,
            summary = %set.summary,
            "memory store commit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn request_versions_are_compare_and_swap() {
        contract::request_versions_are_compare_and_swap(&MemoryStore::new());
    }

    #[test]
    fn certificate_uniqueness_is_enforced() {
        contract::certificate_uniqueness_is_enforced(&MemoryStore::new());
    }

    #[test]
    fn failed_commit_applies_nothing() {
        contract::failed_commit_applies_nothing(&MemoryStore::new());
    }

    #[test]
    fn qualifications_are_unique() {
        contract::qualifications_are_unique(&MemoryStore::new());
    }

    #[test]
    fn deleting_unknown_certificate_is_not_found() {
        contract::deleting_unknown_certificate_is_not_found(&MemoryStore::new());
    }
}
