//! Certificate issuance, withdrawal and verification.
//!
//! An enrollment carries at most one certificate and a certificate handle is never handed out
//! twice, not even after withdrawal. Both rules are enforced by the store at commit time; this
//! module only decides eligibility and retries on handle collisions.

use crate::actor::{Actor, Privilege};
use crate::bulk::distinct;
use crate::certificate::{verification_code, Certificate};
use crate::constants::HANDLE_ATTEMPTS;
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult, EnrollmentIneligibility};
use crate::handle;
use crate::ids::{CertificateId, EnrollmentId, PersonId};
use crate::progress::{aggregate, completed_competencies, ProgressSummary};
use crate::service::CertificationService;
use crate::store::{Change, ChangeSet};
use crate::versioned_files::{CommitAction, CommitDomain};
use chrono::{DateTime, Utc};
use rand::Rng;

impl CertificationService {
    /// Issues one certificate per enrollment, for all of them or none.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadyCertified`] if any enrollment already has a certificate.
    /// - [`CoreError::EnrollmentNotEligible`] if any enrollment is terminated or has no fully
    ///   completed module.
    /// - [`CoreError::InvalidInput`] if `visible_from` is in the past or beyond the visibility cap.
    /// - [`CoreError::DuplicateHandle`] if every handle attempt collided.
    pub fn issue_certificates(
        &self,
        actor: &Actor,
        enrollments: &[EnrollmentId],
        visible_from: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<Certificate>> {
        self.issue_with_rng(actor, enrollments, visible_from, &mut rand::thread_rng())
    }

    pub(crate) fn issue_with_rng<R: Rng + ?Sized>(
        &self,
        actor: &Actor,
        enrollments: &[EnrollmentId],
        visible_from: Option<DateTime<Utc>>,
        rng: &mut R,
    ) -> CoreResult<Vec<Certificate>> {
        actor.require(Privilege::LocationAdmin, "issuing certificates")?;
        distinct(enrollments, "enrollment")?;

        let now = self.now();
        if let Some(from) = visible_from {
            let latest = now + self.cfg.max_visibility_delay();
            if from < now {
                return Err(CoreError::InvalidInput(
                    "visible_from must not be in the past".into(),
                ));
            }
            if from > latest {
                return Err(CoreError::InvalidInput(format!(
                    "visible_from must be at most {} hours after issuance",
                    self.cfg.max_visibility_delay().num_hours()
                )));
            }
        }

        let eligible = self.eligible_for_issuance(enrollments)?;

        let mut attempt = 1;
        loop {
            let (set, certificates) =
                self.issuance_change_set(actor, &eligible, visible_from, now, rng);
            match self.store.commit(set) {
                Ok(()) => {
                    tracing::info!(
                        actor = %actor.person,
                        count = certificates.len(),
                        "certificates issued"
                    );
                    return Ok(certificates);
                }
                Err(CoreError::DuplicateHandle(handle)) if attempt < HANDLE_ATTEMPTS => {
                    tracing::warn!(%handle, attempt, "certificate handle collision, regenerating");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Loads every enrollment and applies the issuance preconditions to the whole batch.
    fn eligible_for_issuance(
        &self,
        ids: &[EnrollmentId],
    ) -> CoreResult<Vec<(Enrollment, Curriculum)>> {
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            let enrollment = self.load_enrollment(*id)?;
            let curriculum = self.load_curriculum(enrollment.curriculum)?;
            loaded.push((enrollment, curriculum));
        }

        let mut certified = Vec::new();
        for (enrollment, _) in &loaded {
            if self.store.certificate_for_enrollment(enrollment.id)?.is_some() {
                certified.push(enrollment.id);
            }
        }
        if !certified.is_empty() {
            return Err(CoreError::AlreadyCertified {
                enrollments: certified,
            });
        }

        let reject = |reason: EnrollmentIneligibility,
                      pred: &dyn Fn(&Enrollment, &Curriculum) -> bool| {
            let failing: Vec<EnrollmentId> = loaded
                .iter()
                .filter(|(e, c)| pred(e, c))
                .map(|(e, _)| e.id)
                .collect();
            if failing.is_empty() {
                Ok(())
            } else {
                tracing::debug!(?reason, count = failing.len(), "issuance rejected");
                Err(CoreError::EnrollmentNotEligible {
                    enrollments: failing,
                    reason,
                })
            }
        };
        reject(EnrollmentIneligibility::Terminated, &|e, _| !e.is_active())?;
        reject(EnrollmentIneligibility::NoCompletedModule, &|e, c| {
            !ProgressSummary::from_modules(e.id, aggregate(c, e)).has_completed_module()
        })?;

        Ok(loaded)
    }

    fn issuance_change_set<R: Rng + ?Sized>(
        &self,
        actor: &Actor,
        eligible: &[(Enrollment, Curriculum)],
        visible_from: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> (ChangeSet, Vec<Certificate>) {
        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Certificate,
            CommitAction::Create,
            format!("issue {} certificates", eligible.len()),
        );
        let mut certificates = Vec::with_capacity(eligible.len());

        for (enrollment, curriculum) in eligible {
            let id = CertificateId::new();
            let handle = handle::certificate_handle(rng, self.cfg.handle_length());
            let certificate = Certificate {
                id,
                verification_code: verification_code(
                    id,
                    &handle,
                    enrollment.id,
                    enrollment.person,
                    now,
                ),
                handle,
                enrollment: enrollment.id,
                person: enrollment.person,
                curriculum: enrollment.curriculum,
                gear_type: enrollment.gear_type,
                issued_at: now,
                visible_from,
                completed_competencies: completed_competencies(curriculum, enrollment),
            };

            let mut terminated = enrollment.clone();
            terminated.terminated_at = Some(now);
            set.push(Change::InsertCertificate(certificate.clone()));
            set.push(Change::PutEnrollment(terminated));
            certificates.push(certificate);
        }
        (set, certificates)
    }

    /// Hard-deletes certificates still inside the withdrawal window and re-activates their
    /// enrollments. All or none.
    pub fn withdraw_certificates(
        &self,
        actor: &Actor,
        certificates: &[CertificateId],
    ) -> CoreResult<()> {
        actor.require(Privilege::LocationAdmin, "withdrawing certificates")?;
        distinct(certificates, "certificate")?;

        let now = self.now();
        let window = self.cfg.withdrawal_window();
        let mut loaded = Vec::with_capacity(certificates.len());
        for id in certificates {
            let certificate = self.certificate(*id)?;
            if now - certificate.issued_at > window {
                return Err(CoreError::WithdrawalWindowExpired {
                    certificate: certificate.id,
                    issued_at: certificate.issued_at,
                    window_hours: window.num_hours(),
                });
            }
            loaded.push(certificate);
        }

        let mut set = ChangeSet::new(
            actor,
            CommitDomain::Certificate,
            CommitAction::Delete,
            format!("withdraw {} certificates", loaded.len()),
        );
        let mut reopened: Vec<Enrollment> = Vec::with_capacity(loaded.len());
        for certificate in &loaded {
            let mut enrollment = self.load_enrollment(certificate.enrollment)?;
            let reopened_elsewhere = self
                .store
                .enrollments_for(enrollment.person, enrollment.curriculum, enrollment.gear_type)?
                .iter()
                .any(|other| other.id != enrollment.id && other.is_active())
                || reopened.iter().any(|other| other.same_track(&enrollment));
            if reopened_elsewhere {
                return Err(CoreError::InvalidInput(format!(
                    "enrollment {} cannot be re-activated: the person has another active enrollment on this track",
                    enrollment.id
                )));
            }
            enrollment.terminated_at = None;
            set.push(Change::DeleteCertificate(certificate.id));
            set.push(Change::PutEnrollment(enrollment.clone()));
            reopened.push(enrollment);
        }
        self.store.commit(set)?;

        tracing::info!(actor = %actor.person, count = loaded.len(), "certificates withdrawn");
        Ok(())
    }

    pub fn certificate(&self, id: CertificateId) -> CoreResult<Certificate> {
        self.store
            .certificate(id)?
            .ok_or_else(|| CoreError::not_found("certificate", id))
    }

    /// Public verification. Ignores `visible_from`; an unknown handle and a wrong code both
    /// yield `None`.
    pub fn verify_certificate(&self, handle: &str, code: &str) -> CoreResult<Option<Certificate>> {
        let handle = handle::normalise(handle);
        if !handle::is_well_formed(&handle, self.cfg.handle_length()) {
            return Ok(None);
        }
        Ok(self
            .store
            .certificate_by_handle(&handle)?
            .filter(|c| c.matches_code(code)))
    }

    /// The person's certificates whose visibility moment has passed.
    pub fn visible_certificates(&self, person: PersonId) -> CoreResult<Vec<Certificate>> {
        let now = self.now();
        let mut visible: Vec<Certificate> = self
            .store
            .certificates_for_person(person)?
            .into_iter()
            .filter(|c| c.is_visible_at(now))
            .collect();
        visible.sort_by_key(|c| c.issued_at);
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::fixtures::{complete_module, enrolled};
    use crate::service::fixtures::{harness, Harness};
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// An enrollment with its second required module completed, ready for issuance.
    fn ready(h: &Harness) -> (Curriculum, Enrollment) {
        let (curriculum, enrollment) = enrolled(h);
        complete_module(h, &curriculum, enrollment.id, 1);
        (curriculum, enrollment)
    }

    #[test]
    fn issuance_terminates_enrollment_and_snapshots_progress() {
        let h = harness();
        let (curriculum, enrollment) = ready(&h);

        let issued = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap();
        let certificate = &issued[0];
        assert_eq!(certificate.handle.len(), 10);
        assert_eq!(certificate.completed_competencies.len(), 2);
        assert!(curriculum.modules[1]
            .competencies
            .iter()
            .all(|c| certificate.completed_competencies.contains(&c.id)));
        assert!(!h.svc.load_enrollment(enrollment.id).unwrap().is_active());
    }

    #[test]
    fn no_completed_module_blocks_issuance() {
        let h = harness();
        let (_, enrollment) = enrolled(&h);
        let err = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::EnrollmentNotEligible {
                reason: EnrollmentIneligibility::NoCompletedModule,
                ..
            }
        ));
    }

    #[test]
    fn issuing_twice_yields_already_certified() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        h.svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap();

        let err = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyCertified { .. }));
        assert_eq!(
            h.svc
                .store
                .certificates_for_person(enrollment.person)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn one_ineligible_enrollment_rejects_the_batch() {
        let h = harness();
        let (_, good) = ready(&h);
        let (_, bad) = enrolled(&h);
        let err = h
            .svc
            .issue_certificates(&h.admin, &[good.id, bad.id], None)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::EnrollmentNotEligible { ref enrollments, .. } if enrollments == &vec![bad.id]
        ));
        assert!(h.svc.store.certificate_for_enrollment(good.id).unwrap().is_none());
    }

    #[test]
    fn visibility_delay_is_capped() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        let now = h.svc.now();

        for bad in [now - Duration::seconds(1), now + Duration::hours(72) + Duration::seconds(1)] {
            let err = h
                .svc
                .issue_certificates(&h.admin, &[enrollment.id], Some(bad))
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)));
        }
        h.svc
            .issue_certificates(&h.admin, &[enrollment.id], Some(now + Duration::hours(72)))
            .unwrap();
    }

    #[test]
    fn hidden_certificate_still_verifies() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        let visible_from = h.svc.now() + Duration::hours(48);
        let certificate = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], Some(visible_from))
            .unwrap()
            .remove(0);

        assert!(h.svc.visible_certificates(enrollment.person).unwrap().is_empty());
        let verified = h
            .svc
            .verify_certificate(&certificate.handle.to_lowercase(), &certificate.verification_code)
            .unwrap();
        assert_eq!(verified, Some(certificate.clone()));
        assert_eq!(
            h.svc.verify_certificate(&certificate.handle, "deadbeef").unwrap(),
            None
        );
        assert_eq!(h.svc.verify_certificate("../../etc", "x").unwrap(), None);

        h.clock.advance(Duration::hours(48));
        assert_eq!(h.svc.visible_certificates(enrollment.person).unwrap().len(), 1);
    }

    #[test]
    fn withdrawal_window_is_inclusive() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        let certificate = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap()
            .remove(0);

        h.clock.advance(Duration::hours(23) + Duration::minutes(59));
        h.svc
            .withdraw_certificates(&h.admin, &[certificate.id])
            .unwrap();
        assert!(h.svc.load_enrollment(enrollment.id).unwrap().is_active());
        assert!(matches!(
            h.svc.certificate(certificate.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn batch_withdrawal_reopens_at_most_one_enrollment_per_track() {
        let h = harness();
        let (curriculum, first) = ready(&h);
        let a = h
            .svc
            .issue_certificates(&h.admin, &[first.id], None)
            .unwrap()
            .remove(0);
        let second = h
            .svc
            .enroll(&h.admin, first.person, curriculum.id, first.gear_type)
            .unwrap();
        let b = h
            .svc
            .issue_certificates(&h.admin, &[second.id], None)
            .unwrap()
            .remove(0);

        let err = h
            .svc
            .withdraw_certificates(&h.admin, &[a.id, b.id])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(h.svc.certificate(a.id).is_ok());
        assert!(h.svc.certificate(b.id).is_ok());
        let active = h
            .svc
            .store
            .enrollments_for(first.person, curriculum.id, first.gear_type)
            .unwrap()
            .iter()
            .filter(|e| e.is_active())
            .count();
        assert_eq!(active, 0);

        h.svc.withdraw_certificates(&h.admin, &[b.id]).unwrap();
        assert!(h.svc.load_enrollment(second.id).unwrap().is_active());
    }

    #[test]
    fn withdrawal_after_window_fails() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        let certificate = h
            .svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap()
            .remove(0);

        h.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let err = h
            .svc
            .withdraw_certificates(&h.admin, &[certificate.id])
            .unwrap_err();
        assert!(matches!(err, CoreError::WithdrawalWindowExpired { .. }));
        assert!(err.user_message().contains("secretariat"));
        assert!(h.svc.certificate(certificate.id).is_ok());
    }

    #[test]
    fn handle_collision_regenerates() {
        let h = harness();
        let (_, first) = ready(&h);
        let (_, second) = ready(&h);

        let a = h
            .svc
            .issue_with_rng(&h.admin, &[first.id], None, &mut StdRng::seed_from_u64(11))
            .unwrap()
            .remove(0);
        let b = h
            .svc
            .issue_with_rng(&h.admin, &[second.id], None, &mut StdRng::seed_from_u64(11))
            .unwrap()
            .remove(0);
        assert_ne!(a.handle, b.handle);
    }

    #[test]
    fn withdrawn_handle_is_not_reissued() {
        let h = harness();
        let (_, enrollment) = ready(&h);
        let first = h
            .svc
            .issue_with_rng(&h.admin, &[enrollment.id], None, &mut StdRng::seed_from_u64(3))
            .unwrap()
            .remove(0);
        h.svc.withdraw_certificates(&h.admin, &[first.id]).unwrap();

        let second = h
            .svc
            .issue_with_rng(&h.admin, &[enrollment.id], None, &mut StdRng::seed_from_u64(3))
            .unwrap()
            .remove(0);
        assert_ne!(first.handle, second.handle);
        assert_eq!(
            h.svc
                .verify_certificate(&first.handle, &first.verification_code)
                .unwrap(),
            None
        );
    }

    #[test]
    fn completed_ever_survives_reenrollment() {
        let h = harness();
        let (curriculum, enrollment) = ready(&h);
        h.svc
            .issue_certificates(&h.admin, &[enrollment.id], None)
            .unwrap();

        let again = h
            .svc
            .enroll(&h.admin, enrollment.person, curriculum.id, enrollment.gear_type)
            .unwrap();
        let summary = h.svc.progress_summary(again.id).unwrap();
        assert_eq!(summary.required_completed, 2);
        assert!(summary.modules[1].is_complete());
    }
}
