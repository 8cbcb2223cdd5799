//! # NWD Core
//!
//! Core business logic for the NWD sailing-instruction certification engine.
//!
//! This crate contains the domain and its storage:
//! - Curricula, enrollments and competency progress aggregation
//! - The assessment request (PvB) state machine, its guards and assignments
//! - Certificate issuance, withdrawal and public verification
//! - Bulk coordination and row-by-row qualification import
//! - Record storage in memory or as YAML files in a git repository
//!
//! **No API concerns**: authentication, HTTP servers and DTOs belong in `api-rest` or
//! `api-shared`. Callers hand in an already-resolved [`Actor`].

pub mod actor;
pub mod assignment;
pub mod bulk;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod constants;
pub mod curriculum;
pub mod enrollment;
pub mod error;
pub mod guards;
pub mod handle;
pub mod ids;
pub mod issuance;
pub mod progress;
pub mod qualification;
pub mod request;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod versioned_files;

pub use actor::{Actor, Privilege};
pub use certificate::Certificate;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{store_kind_from_env_value, CoreConfig, StoreKind};
pub use curriculum::{Competency, Curriculum, Module};
pub use enrollment::{CompetencyProgress, Enrollment};
pub use error::{CoreError, CoreResult, EnrollmentIneligibility, ErrorKind};
pub use guards::{GuardError, GuardViolation, Operation};
pub use ids::{
    CertificateId, CompetencyId, CurriculumId, EnrollmentId, GearTypeId, ModuleId, PersonId,
    QualificationId, RequestId, TaskUnitId,
};
pub use progress::{ModuleProgress, ProgressSummary};
pub use qualification::{ImportReport, ImportRow, Qualification, QualificationSource, RowError};
pub use request::{
    AssessmentRequest, CoachStatus, LearningCoachAssignment, RequestRef, RequestStatus,
    RequestType, TaskUnitAssignment,
};
pub use service::CertificationService;
pub use state_machine::NewRequest;
pub use store::{GitStore, MemoryStore, Store};
