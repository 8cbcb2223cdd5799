//! Git-backed store.
//!
//! Every record is a YAML file in one Git repository rooted at the configured data directory.
//! Each [`ChangeSet`] becomes exactly one commit; a failed commit restores every file it
//! touched.
//!
//! ## Layout
//!
//! ```text
//! nwd_data/
//!   curricula/<s1>/<s2>/<id>.yaml
//!   enrollments/<s1>/<s2>/<id>.yaml
//!   requests/<s1>/<s2>/<id>.yaml
//!   certificates/<s1>/<s2>/<id>.yaml
//!   qualifications/<s1>/<s2>/<id>.yaml
//!   indexes/
//!     certificate-handles/<HANDLE>.yaml          # kept after withdrawal
//!     enrollment-certificates/<enrollment>.yaml
//!     qualifications/<person>-<task_unit>.yaml
//! ```
//!
//! The index files carry the uniqueness constraints: a handle file is never removed, so handles
//! of withdrawn certificates stay reserved.

use super::{check_constraints, Change, ChangeSet, Snapshot, Store};
use crate::certificate::Certificate;
use crate::config::CoreConfig;
use crate::constants::{
    CERTIFICATES_DIR_NAME, CURRICULA_DIR_NAME, ENROLLMENTS_DIR_NAME, INDEXES_DIR_NAME,
    QUALIFICATIONS_DIR_NAME, RECORD_EXTENSION, REQUESTS_DIR_NAME,
};
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult};
use crate::ids::{
    CertificateId, CurriculumId, EnrollmentId, GearTypeId, PersonId, QualificationId, RequestId,
    TaskUnitId,
};
use crate::qualification::Qualification;
use crate::request::AssessmentRequest;
use crate::versioned_files::{CommitMessage, FileChange, VersionedFileService};
use nwd_uuid::ShardableUuid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

const HANDLE_INDEX_DIR: &str = "certificate-handles";
const ENROLLMENT_INDEX_DIR: &str = "enrollment-certificates";
const QUALIFICATION_INDEX_DIR: &str = "qualifications";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HandleIndexEntry {
    certificate: CertificateId,
    #[serde(default)]
    withdrawn: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EnrollmentIndexEntry {
    certificate: CertificateId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct QualificationIndexEntry {
    qualification: QualificationId,
}

pub struct GitStore {
    cfg: Arc<CoreConfig>,
    /// Readers share, commits are exclusive; files are never read mid-commit.
    gate: RwLock<()>,
    repo: Mutex<VersionedFileService>,
}

impl GitStore {
    /// Opens the repository under `cfg.data_dir()`, creating it on first use.
    pub fn open(cfg: Arc<CoreConfig>) -> CoreResult<Self> {
        let repo = VersionedFileService::open_or_init(cfg.data_dir())?;
        tracing::info!(data_dir = %cfg.data_dir().display(), "opened git record store");
        Ok(Self {
            cfg,
            gate: RwLock::new(()),
            repo: Mutex::new(repo),
        })
    }

    /// Subject lines of the store's history, newest first.
    pub fn history(&self) -> CoreResult<Vec<String>> {
        let repo = self.repo.lock().map_err(|_| CoreError::LockPoisoned)?;
        repo.commit_subjects()
    }

    fn root(&self) -> &Path {
        self.cfg.data_dir()
    }

    // ------------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------------

    fn record_path(dir: &str, id: &ShardableUuid) -> PathBuf {
        id.sharded_file(Path::new(dir), RECORD_EXTENSION)
    }

    fn handle_index_path(handle: &str) -> PathBuf {
        Path::new(INDEXES_DIR_NAME)
            .join(HANDLE_INDEX_DIR)
            .join(format!("{handle}.{RECORD_EXTENSION}"))
    }

    fn enrollment_index_path(enrollment: EnrollmentId) -> PathBuf {
        Path::new(INDEXES_DIR_NAME)
            .join(ENROLLMENT_INDEX_DIR)
            .join(format!("{enrollment}.{RECORD_EXTENSION}"))
    }

    fn qualification_index_path(person: PersonId, task_unit: TaskUnitId) -> PathBuf {
        Path::new(INDEXES_DIR_NAME)
            .join(QUALIFICATION_INDEX_DIR)
            .join(format!("{person}-{task_unit}.{RECORD_EXTENSION}"))
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    fn read_raw(&self, relative: &Path) -> CoreResult<Option<String>> {
        let full = self.root().join(relative);
        if !full.is_file() {
            return Ok(None);
        }
        std::fs::read_to_string(&full)
            .map(Some)
            .map_err(CoreError::FileRead)
    }

    /// Reads and strictly parses one record, reporting the failing field path on mismatch.
    fn read_record<T: DeserializeOwned>(&self, relative: &Path) -> CoreResult<Option<T>> {
        let Some(text) = self.read_raw(relative)? else {
            return Ok(None);
        };
        parse_record(relative, &text).map(Some)
    }

    fn list_records<T: DeserializeOwned>(&self, dir: &str) -> CoreResult<Vec<T>> {
        let mut files = Vec::new();
        collect_record_files(&self.root().join(dir), &mut files)?;
        files.sort();

        let mut records = Vec::with_capacity(files.len());
        for full in files {
            let text = std::fs::read_to_string(&full).map_err(CoreError::FileRead)?;
            let relative = full.strip_prefix(self.root()).unwrap_or(&full);
            records.push(parse_record(relative, &text)?);
        }
        Ok(records)
    }

    fn read_certificate(&self, id: CertificateId) -> CoreResult<Option<Certificate>> {
        self.read_record(&Self::record_path(CERTIFICATES_DIR_NAME, id.shardable()))
    }

    fn read_handle_index(&self, handle: &str) -> CoreResult<Option<HandleIndexEntry>> {
        if handle.is_empty() || !handle.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Ok(None);
        }
        self.read_record(&Self::handle_index_path(handle))
    }

    fn read_shared(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, ()>> {
        self.gate.read().map_err(|_| CoreError::LockPoisoned)
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    fn stage<T: Serialize>(
        &self,
        files: &mut BTreeMap<PathBuf, FileChange>,
        relative: PathBuf,
        record: Option<&T>,
    ) -> CoreResult<()> {
        let content = record
            .map(|r| serde_yaml::to_string(r).map_err(CoreError::YamlSerialization))
            .transpose()?;
        match files.get_mut(&relative) {
            Some(existing) => existing.content = content,
            None => {
                let old_content = self.read_raw(&relative)?;
                files.insert(
                    relative.clone(),
                    FileChange {
                        relative_path: relative,
                        content,
                        old_content,
                    },
                );
            }
        }
        Ok(())
    }

    fn file_changes(&self, changes: &[Change]) -> CoreResult<Vec<FileChange>> {
        let mut files: BTreeMap<PathBuf, FileChange> = BTreeMap::new();

        for change in changes {
            match change {
                Change::PutCurriculum(c) => self.stage(
                    &mut files,
                    Self::record_path(CURRICULA_DIR_NAME, c.id.shardable()),
                    Some(c),
                )?,
                Change::PutEnrollment(e) => self.stage(
                    &mut files,
                    Self::record_path(ENROLLMENTS_DIR_NAME, e.id.shardable()),
                    Some(e),
                )?,
                Change::PutRequest { request, .. } => self.stage(
                    &mut files,
                    Self::record_path(REQUESTS_DIR_NAME, request.id.shardable()),
                    Some(request),
                )?,
                Change::InsertCertificate(c) => {
                    self.stage(
                        &mut files,
                        Self::record_path(CERTIFICATES_DIR_NAME, c.id.shardable()),
                        Some(c),
                    )?;
                    self.stage(
                        &mut files,
                        Self::handle_index_path(&c.handle),
                        Some(&HandleIndexEntry {
                            certificate: c.id,
                            withdrawn: false,
                        }),
                    )?;
                    self.stage(
                        &mut files,
                        Self::enrollment_index_path(c.enrollment),
                        Some(&EnrollmentIndexEntry { certificate: c.id }),
                    )?;
                }
                Change::DeleteCertificate(id) => {
                    let cert = self
                        .read_certificate(*id)?
                        .ok_or_else(|| CoreError::not_found("certificate", id))?;
                    self.stage::<Certificate>(
                        &mut files,
                        Self::record_path(CERTIFICATES_DIR_NAME, id.shardable()),
                        None,
                    )?;
                    self.stage(
                        &mut files,
                        Self::handle_index_path(&cert.handle),
                        Some(&HandleIndexEntry {
                            certificate: cert.id,
                            withdrawn: true,
                        }),
                    )?;
                    self.stage::<EnrollmentIndexEntry>(
                        &mut files,
                        Self::enrollment_index_path(cert.enrollment),
                        None,
                    )?;
                }
                Change::InsertQualification(q) => {
                    self.stage(
                        &mut files,
                        Self::record_path(QUALIFICATIONS_DIR_NAME, q.id.shardable()),
                        Some(q),
                    )?;
                    self.stage(
                        &mut files,
                        Self::qualification_index_path(q.person, q.task_unit),
                        Some(&QualificationIndexEntry {
                            qualification: q.id,
                        }),
                    )?;
                }
            }
        }

        Ok(files.into_values().collect())
    }
}

fn parse_record<T: DeserializeOwned>(relative: &Path, text: &str) -> CoreResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let field = err.path().to_string();
        let field = if field.is_empty() || field == "." {
            "<root>".to_string()
        } else {
            field
        };
        CoreError::RecordSchema {
            path: relative.to_path_buf(),
            field,
            message: err.into_inner().to_string(),
        }
    })
}

fn collect_record_files(dir: &Path, out: &mut Vec<PathBuf>) -> CoreResult<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(CoreError::FileRead)? {
        let path = entry.map_err(CoreError::FileRead)?.path();
        if path.is_dir() {
            collect_record_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

impl Snapshot for GitStore {
    fn request_version(&self, id: RequestId) -> CoreResult<Option<u64>> {
        Ok(self
            .read_record::<AssessmentRequest>(&Self::record_path(
                REQUESTS_DIR_NAME,
                id.shardable(),
            ))?
            .map(|r| r.version))
    }

    fn handle_taken(&self, handle: &str) -> CoreResult<bool> {
        Ok(self.root().join(Self::handle_index_path(handle)).is_file())
    }

    fn enrollment_certified(&self, enrollment: EnrollmentId) -> CoreResult<bool> {
        Ok(self
            .root()
            .join(Self::enrollment_index_path(enrollment))
            .is_file())
    }

    fn certificate_exists(&self, id: CertificateId) -> CoreResult<bool> {
        Ok(self
            .root()
            .join(Self::record_path(CERTIFICATES_DIR_NAME, id.shardable()))
            .is_file())
    }

    fn qualification_held(&self, person: PersonId, task_unit: TaskUnitId) -> CoreResult<bool> {
        Ok(self
            .root()
            .join(Self::qualification_index_path(person, task_unit))
            .is_file())
    }
}

impl Store for GitStore {
    fn curriculum(&self, id: CurriculumId) -> CoreResult<Option<Curriculum>> {
        let _gate = self.read_shared()?;
        self.read_record(&Self::record_path(CURRICULA_DIR_NAME, id.shardable()))
    }

    fn enrollment(&self, id: EnrollmentId) -> CoreResult<Option<Enrollment>> {
        let _gate = self.read_shared()?;
        self.read_record(&Self::record_path(ENROLLMENTS_DIR_NAME, id.shardable()))
    }

    fn enrollments_for(
        &self,
        person: PersonId,
        curriculum: CurriculumId,
        gear_type: GearTypeId,
    ) -> CoreResult<Vec<Enrollment>> {
        let _gate = self.read_shared()?;
        let mut found: Vec<Enrollment> = self
            .list_records::<Enrollment>(ENROLLMENTS_DIR_NAME)?
            .into_iter()
            .filter(|e| {
                e.person == person && e.curriculum == curriculum && e.gear_type == gear_type
            })
            .collect();
        found.sort_by_key(|e| e.enrolled_at);
        Ok(found)
    }

    fn request(&self, id: RequestId) -> CoreResult<Option<AssessmentRequest>> {
        let _gate = self.read_shared()?;
        self.read_record(&Self::record_path(REQUESTS_DIR_NAME, id.shardable()))
    }

    fn requests(&self) -> CoreResult<Vec<AssessmentRequest>> {
        let _gate = self.read_shared()?;
        let mut all = self.list_records::<AssessmentRequest>(REQUESTS_DIR_NAME)?;
        all.sort_by_key(|r| (r.created_at, r.id));
        Ok(all)
    }

    fn certificate(&self, id: CertificateId) -> CoreResult<Option<Certificate>> {
        let _gate = self.read_shared()?;
        self.read_certificate(id)
    }

    fn certificate_by_handle(&self, handle: &str) -> CoreResult<Option<Certificate>> {
        let _gate = self.read_shared()?;
        match self.read_handle_index(handle)? {
            Some(entry) if !entry.withdrawn => self.read_certificate(entry.certificate),
            _ => Ok(None),
        }
    }

    fn certificate_for_enrollment(
        &self,
        enrollment: EnrollmentId,
    ) -> CoreResult<Option<Certificate>> {
        let _gate = self.read_shared()?;
        match self.read_record::<EnrollmentIndexEntry>(&Self::enrollment_index_path(enrollment))? {
            Some(entry) => self.read_certificate(entry.certificate),
            None => Ok(None),
        }
    }

    fn certificates_for_person(&self, person: PersonId) -> CoreResult<Vec<Certificate>> {
        let _gate = self.read_shared()?;
        let mut found: Vec<Certificate> = self
            .list_records::<Certificate>(CERTIFICATES_DIR_NAME)?
            .into_iter()
            .filter(|c| c.person == person)
            .collect();
        found.sort_by_key(|c| c.issued_at);
        Ok(found)
    }

    fn qualification_for(
        &self,
        person: PersonId,
        task_unit: TaskUnitId,
    ) -> CoreResult<Option<Qualification>> {
        let _gate = self.read_shared()?;
        match self.read_record::<QualificationIndexEntry>(&Self::qualification_index_path(
            person, task_unit,
        ))? {
            Some(entry) => self.read_record(&Self::record_path(
                QUALIFICATIONS_DIR_NAME,
                entry.qualification.shardable(),
            )),
            None => Ok(None),
        }
    }

    fn qualifications_for(&self, person: PersonId) -> CoreResult<Vec<Qualification>> {
        let _gate = self.read_shared()?;
        let mut found: Vec<Qualification> = self
            .list_records::<Qualification>(QUALIFICATIONS_DIR_NAME)?
            .into_iter()
            .filter(|q| q.person == person)
            .collect();
        found.sort_by_key(|q| q.granted_at);
        Ok(found)
    }

    fn commit(&self, set: ChangeSet) -> CoreResult<()> {
        let _gate = self.gate.write().map_err(|_| CoreError::LockPoisoned)?;
        let repo = self.repo.lock().map_err(|_| CoreError::LockPoisoned)?;

        check_constraints(self, &set.changes)?;
        let files = self.file_changes(&set.changes)?;
        if files.is_empty() {
            return Ok(());
        }

        let message =
            CommitMessage::new(set.domain, set.action, &set.summary, self.cfg.location().clone())?;
        let oid = repo.write_and_commit_files(&set.author, &message, &files)?;

        tracing::debug!(
            commit = %oid,
            files = files.len(),
            summary = %set.summary,
            "git store commit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, GitStore) {
        let dir = TempDir::new().unwrap();
        let cfg = CoreConfig::new(dir.path().join("nwd_data"), "Sneek").unwrap();
        let store = GitStore::open(Arc::new(cfg)).unwrap();
        (dir, store)
    }

    #[test]
    fn request_versions_are_compare_and_swap() {
        let (_dir, store) = store();
        contract::request_versions_are_compare_and_swap(&store);
    }

    #[test]
    fn certificate_uniqueness_is_enforced() {
        let (_dir, store) = store();
        contract::certificate_uniqueness_is_enforced(&store);
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let (_dir, store) = store();
        contract::failed_commit_applies_nothing(&store);
    }

    #[test]
    fn qualifications_are_unique() {
        let (_dir, store) = store();
        contract::qualifications_are_unique(&store);
    }

    #[test]
    fn deleting_unknown_certificate_is_not_found() {
        let (_dir, store) = store();
        contract::deleting_unknown_certificate_is_not_found(&store);
    }

    #[test]
    fn every_change_set_is_one_commit() {
        let (_dir, store) = store();
        contract::certificate_uniqueness_is_enforced(&store);

        let history = store.history().unwrap();
        // Insert, delete, insert; the three rejected commits leave no trace.
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|s| s.starts_with("request:update: test")));
    }

    #[test]
    fn schema_mismatch_names_the_field() {
        let (_dir, store) = store();
        let id = RequestId::new();
        let relative = GitStore::record_path(REQUESTS_DIR_NAME, id.shardable());
        let full = store.root().join(&relative);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, "id: nope\n").unwrap();

        let err = store.request(id).unwrap_err();
        match err {
            CoreError::RecordSchema { field, .. } => assert_eq!(field, "id"),
            other => panic!("expected RecordSchema, got {other:?}"),
        }
    }

    #[test]
    fn unsafe_handles_are_not_looked_up() {
        let (_dir, store) = store();
        assert!(store.certificate_by_handle("../../etc").unwrap().is_none());
    }
}
