//! The certification service: the single entry point transports call into.
//!
//! Operations are spread over the component modules (`progress`, `state_machine`,
//! `assignment`, `issuance`, `bulk`), each adding an `impl CertificationService` block.

use crate::clock::{Clock, SystemClock};
use crate::config::{CoreConfig, StoreKind};
use crate::curriculum::Curriculum;
use crate::enrollment::Enrollment;
use crate::error::{CoreError, CoreResult};
use crate::ids::{CurriculumId, EnrollmentId, RequestId};
use crate::request::AssessmentRequest;
use crate::store::{GitStore, MemoryStore, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct CertificationService {
    pub(crate) cfg: Arc<CoreConfig>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CertificationService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn Store>) -> Self {
        Self {
            cfg,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Builds the service over the store selected by `kind`.
    pub fn open(cfg: Arc<CoreConfig>, kind: StoreKind) -> CoreResult<Self> {
        let store: Arc<dyn Store> = match kind {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Git => Arc::new(GitStore::open(cfg.clone())?),
        };
        Ok(Self::new(cfg, store))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn load_curriculum(&self, id: CurriculumId) -> CoreResult<Curriculum> {
        self.store
            .curriculum(id)?
            .ok_or_else(|| CoreError::not_found("curriculum", id))
    }

    pub(crate) fn load_enrollment(&self, id: EnrollmentId) -> CoreResult<Enrollment> {
        self.store
            .enrollment(id)?
            .ok_or_else(|| CoreError::not_found("enrollment", id))
    }

    pub(crate) fn load_request(&self, id: RequestId) -> CoreResult<AssessmentRequest> {
        self.store
            .request(id)?
            .ok_or_else(|| CoreError::not_found("request", id))
    }
}

impl std::fmt::Debug for CertificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificationService")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}
