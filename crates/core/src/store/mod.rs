//! Record storage.
//!
//! The core talks to storage only through [`Store`]. Every mutating operation builds one
//! [`ChangeSet`] and hands it to [`Store::commit`], which must apply all of it or none of it.
//! Stores re-check request versions and uniqueness constraints under their commit lock, so two
//! concurrent operations cannot both succeed against the same stale state.

mod git;
mod memory;

pub use git::GitStore;
pub use memory::MemoryStore;

use crate::actor::Actor;
use crate::certificate::Certificate;
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult};
use crate::ids::{
    CertificateId, CurriculumId, EnrollmentId, GearTypeId, PersonId, RequestId, TaskUnitId,
};
use crate::qualification::Qualification;
use crate::request::AssessmentRequest;
use crate::versioned_files::{CommitAction, CommitAuthor, CommitDomain};
use std::collections::HashSet;

/// One record-level change inside a [`ChangeSet`].
#[derive(Clone, Debug)]
pub enum Change {
    PutCurriculum(Curriculum),
    PutEnrollment(Enrollment),
    /// Compare-and-swap on the request version. `previous_version == 0` means the request must
    /// not exist yet.
    PutRequest {
        request: AssessmentRequest,
        previous_version: u64,
    },
    /// Insert only; the handle and the enrollment must not already carry a certificate.
    InsertCertificate(Certificate),
    DeleteCertificate(CertificateId),
    /// Insert only; unique per (person, task unit).
    InsertQualification(Qualification),
}

/// Everything one operation writes, committed atomically.
#[derive(Clone, Debug)]
pub struct ChangeSet {
    pub author: CommitAuthor,
    pub domain: CommitDomain,
    pub action: CommitAction,
    pub summary: String,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(
        actor: &Actor,
        domain: CommitDomain,
        action: CommitAction,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            author: CommitAuthor::from(actor),
            domain,
            action,
            summary: summary.into(),
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

pub trait Store: Send + Sync {
    fn curriculum(&self, id: CurriculumId) -> CoreResult<Option<Curriculum>>;

    fn enrollment(&self, id: EnrollmentId) -> CoreResult<Option<Enrollment>>;

    fn enrollments_for(
        &self,
        person: PersonId,
        curriculum: CurriculumId,
        gear_type: GearTypeId,
    ) -> CoreResult<Vec<Enrollment>>;

    fn request(&self, id: RequestId) -> CoreResult<Option<AssessmentRequest>>;

    fn requests(&self) -> CoreResult<Vec<AssessmentRequest>>;

    fn certificate(&self, id: CertificateId) -> CoreResult<Option<Certificate>>;

    fn certificate_by_handle(&self, handle: &str) -> CoreResult<Option<Certificate>>;

    fn certificate_for_enrollment(&self, enrollment: EnrollmentId)
        -> CoreResult<Option<Certificate>>;

    fn certificates_for_person(&self, person: PersonId) -> CoreResult<Vec<Certificate>>;

    fn qualification_for(
        &self,
        person: PersonId,
        task_unit: TaskUnitId,
    ) -> CoreResult<Option<Qualification>>;

    fn qualifications_for(&self, person: PersonId) -> CoreResult<Vec<Qualification>>;

    /// Applies the whole change set or nothing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::VersionConflict`] if a request changed since it was read.
    /// - [`CoreError::DuplicateHandle`], [`CoreError::AlreadyCertified`] or
    ///   [`CoreError::DuplicateQualification`] on uniqueness violations.
    /// - [`CoreError::NotFound`] when deleting a certificate that does not exist.
    /// - Infrastructure errors from the backing storage.
    fn commit(&self, changes: ChangeSet) -> CoreResult<()>;
}

/// The committed state a store checks constraints against, read under its commit lock.
pub(crate) trait Snapshot {
    fn request_version(&self, id: RequestId) -> CoreResult<Option<u64>>;
    /// True for handles in use and for handles of withdrawn certificates.
    fn handle_taken(&self, handle: &str) -> CoreResult<bool>;
    fn enrollment_certified(&self, enrollment: EnrollmentId) -> CoreResult<bool>;
    fn certificate_exists(&self, id: CertificateId) -> CoreResult<bool>;
    fn qualification_held(&self, person: PersonId, task_unit: TaskUnitId) -> CoreResult<bool>;
}

/// Validates a change set against committed state and against itself.
pub(crate) fn check_constraints(snapshot: &dyn Snapshot, changes: &[Change]) -> CoreResult<()> {
    let mut handles = HashSet::new();
    let mut certified = HashSet::new();
    let mut qualifications = HashSet::new();
    let mut requests = HashSet::new();

    for change in changes {
        if let Change::DeleteCertificate(id) = change {
            if !snapshot.certificate_exists(*id)? {
                return Err(CoreError::not_found("certificate", id));
            }
        }
    }

    for change in changes {
        match change {
            Change::PutRequest {
                request,
                previous_version,
            } => {
                if !requests.insert(request.id) {
                    return Err(CoreError::InvalidInput(format!(
                        "request {} appears twice in one commit",
                        request.id
                    )));
                }
                let found = snapshot.request_version(request.id)?.unwrap_or(0);
                if found != *previous_version {
                    return Err(CoreError::VersionConflict {
                        request: request.id,
                        expected: *previous_version,
                        found,
                    });
                }
            }
            Change::InsertCertificate(cert) => {
                if snapshot.handle_taken(&cert.handle)? || !handles.insert(cert.handle.clone()) {
                    return Err(CoreError::DuplicateHandle(cert.handle.clone()));
                }
                if snapshot.enrollment_certified(cert.enrollment)?
                    || !certified.insert(cert.enrollment)
                {
                    return Err(CoreError::AlreadyCertified {
                        enrollments: vec![cert.enrollment],
                    });
                }
            }
            Change::InsertQualification(q) => {
                if snapshot.qualification_held(q.person, q.task_unit)?
                    || !qualifications.insert((q.person, q.task_unit))
                {
                    return Err(CoreError::DuplicateQualification {
                        person: q.person,
                        task_unit: q.task_unit,
                    });
                }
            }
            Change::PutCurriculum(_)
            | Change::PutEnrollment(_)
            | Change::DeleteCertificate(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every [`Store`] implementation must share.

    use super::*;
    use crate::actor::Privilege;
    use crate::certificate::verification_code;
    use crate::qualification::QualificationSource;
    use crate::request::fixtures::request;
    use crate::request::RequestType;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn actor() -> Actor {
        Actor::new(PersonId::new(), "Beheerder", Privilege::LocationAdmin).unwrap()
    }

    fn change_set(changes: Vec<Change>) -> ChangeSet {
        let mut set = ChangeSet::new(&actor(), CommitDomain::Request, CommitAction::Update, "test");
        set.changes = changes;
        set
    }

    fn certificate(enrollment: EnrollmentId, handle: &str) -> Certificate {
        let id = CertificateId::new();
        let person = PersonId::new();
        let issued_at = Utc::now();
        Certificate {
            id,
            handle: handle.into(),
            enrollment,
            person,
            curriculum: CurriculumId::new(),
            gear_type: GearTypeId::new(),
            issued_at,
            visible_from: None,
            verification_code: verification_code(id, handle, enrollment, person, issued_at),
            completed_competencies: BTreeSet::new(),
        }
    }

    pub(crate) fn request_versions_are_compare_and_swap(store: &dyn Store) {
        let mut r = request(RequestType::Intern, 1);
        store
            .commit(change_set(vec![Change::PutRequest {
                request: r.clone(),
                previous_version: 0,
            }]))
            .unwrap();

        // A second create with the same id conflicts.
        let err = store
            .commit(change_set(vec![Change::PutRequest {
                request: r.clone(),
                previous_version: 0,
            }]))
            .unwrap_err();
        assert!(matches!(err, CoreError::VersionConflict { expected: 0, found: 1, .. }));

        r.version = 2;
        store
            .commit(change_set(vec![Change::PutRequest {
                request: r.clone(),
                previous_version: 1,
            }]))
            .unwrap();
        assert_eq!(store.request(r.id).unwrap().unwrap().version, 2);
    }

    pub(crate) fn certificate_uniqueness_is_enforced(store: &dyn Store) {
        let enrollment = EnrollmentId::new();
        let first = certificate(enrollment, "AAAAAAAAAA");
        store
            .commit(change_set(vec![Change::InsertCertificate(first.clone())]))
            .unwrap();

        let same_handle = certificate(EnrollmentId::new(), "AAAAAAAAAA");
        let err = store
            .commit(change_set(vec![Change::InsertCertificate(same_handle)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateHandle(h) if h == "AAAAAAAAAA"));

        let same_enrollment = certificate(enrollment, "BBBBBBBBBB");
        let err = store
            .commit(change_set(vec![Change::InsertCertificate(same_enrollment)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyCertified { .. }));

        assert_eq!(
            store.certificate_by_handle("AAAAAAAAAA").unwrap(),
            Some(first.clone())
        );
        assert_eq!(
            store.certificate_for_enrollment(enrollment).unwrap(),
            Some(first.clone())
        );

        // Withdrawal frees the enrollment but never the handle.
        store
            .commit(change_set(vec![Change::DeleteCertificate(first.id)]))
            .unwrap();
        assert!(store.certificate(first.id).unwrap().is_none());
        assert!(store.certificate_by_handle("AAAAAAAAAA").unwrap().is_none());

        let reuse = certificate(EnrollmentId::new(), "AAAAAAAAAA");
        assert!(matches!(
            store.commit(change_set(vec![Change::InsertCertificate(reuse)])),
            Err(CoreError::DuplicateHandle(_))
        ));
        store
            .commit(change_set(vec![Change::InsertCertificate(certificate(
                enrollment,
                "CCCCCCCCCC",
            ))]))
            .unwrap();
    }

    pub(crate) fn failed_commit_applies_nothing(store: &dyn Store) {
        let fresh = request(RequestType::Extern, 1);
        let stale = request(RequestType::Extern, 1);

        let err = store
            .commit(change_set(vec![
                Change::PutRequest {
                    request: fresh.clone(),
                    previous_version: 0,
                },
                Change::PutRequest {
                    request: stale,
                    previous_version: 4,
                },
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::VersionConflict { .. }));
        assert!(store.request(fresh.id).unwrap().is_none());
    }

    pub(crate) fn qualifications_are_unique(store: &dyn Store) {
        let person = PersonId::new();
        let task_unit = TaskUnitId::new();
        let q = Qualification {
            id: crate::ids::QualificationId::new(),
            person,
            task_unit,
            curriculum: None,
            granted_at: Utc::now(),
            source: QualificationSource::Import,
            request: None,
        };
        store
            .commit(change_set(vec![Change::InsertQualification(q.clone())]))
            .unwrap();
        let mut again = q.clone();
        again.id = crate::ids::QualificationId::new();
        assert!(matches!(
            store.commit(change_set(vec![Change::InsertQualification(again)])),
            Err(CoreError::DuplicateQualification { .. })
        ));
        assert_eq!(store.qualification_for(person, task_unit).unwrap(), Some(q));
        assert_eq!(store.qualifications_for(person).unwrap().len(), 1);
    }

    pub(crate) fn deleting_unknown_certificate_is_not_found(store: &dyn Store) {
        let err = store
            .commit(change_set(vec![Change::DeleteCertificate(CertificateId::new())]))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "certificate", .. }));
    }
}
