//! Candidate portal, reviewer workflow and intake directory.
//!
//! Candidates sign in with their enrollment number, submit one PDF per document kind
//! while the intake window is open, and follow the review outcome by mail. Staff review
//! documents within the reach of their permission set.

pub mod access;
pub mod cpf;
pub mod domain;
pub mod memory;
pub mod notifier;
pub mod provisioning;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod settings;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod tests;

pub use access::{Permission, PermissionSet, StaffContext, StaffRole, StaffUser};
pub use cpf::Cpf;
pub use domain::{
    Campus, CampusId, Candidate, CandidateId, Course, CourseId, DocumentId, DocumentKind,
    DocumentRecord, DocumentStatus, Modality, NewCandidate, Secretariat, SecretariatId, Sex,
    StaffUserId,
};
pub use memory::MemoryRepository;
pub use notifier::{MailError, Mailer, Notifier, OutgoingMail};
pub use repository::{AdmissionsRepository, RepositoryError};
pub use router::admissions_router;
pub use service::{AdmissionsError, AdmissionsService, Clock, ServiceSettings, SystemClock};
pub use session::{Principal, SessionManager};
pub use storage::{DocumentStore, FsDocumentStore, StorageError};
