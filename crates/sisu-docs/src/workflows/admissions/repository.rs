use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::{StaffRole, StaffUser};
use super::cpf::Cpf;
use super::domain::{
    Campus, CampusId, Candidate, CandidateId, Course, CourseId, DocumentId, DocumentKind,
    DocumentRecord, DocumentRequirement, DocumentStatus, NewCandidate, NewCourse,
    NewSecretariat, Secretariat, SecretariatId, StaffUserId,
};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is still referenced: {0}")]
    InUse(&'static str),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CandidateFilter {
    pub campus_id: Option<CampusId>,
    pub course_id: Option<CourseId>,
    /// Matches name, email, CPF or enrollment number.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentFilter {
    pub candidate_id: Option<CandidateId>,
    pub course_id: Option<CourseId>,
    pub campus_id: Option<CampusId>,
    pub status: Option<DocumentStatus>,
    pub kind: Option<String>,
}

/// File metadata recorded when a candidate submits a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub kind: DocumentKind,
    pub name: String,
    pub file_name: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Staff decision on one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub reviewed_by: Option<StaffUserId>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStaffRecord {
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    pub secretariat_id: Option<SecretariatId>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionsStats {
    pub campuses: u64,
    pub courses: u64,
    pub secretariats: u64,
    pub candidates: u64,
    pub documents: u64,
    pub documents_awaiting: u64,
    pub documents_approved: u64,
    pub documents_rejected: u64,
    pub documents_not_sent: u64,
}

/// Counts for one reporting period, used by the daily report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub submitted: u64,
    pub approved: u64,
    pub rejected: u64,
    pub awaiting_total: u64,
    pub candidates_total: u64,
}

impl DailyActivity {
    pub fn is_quiet(&self) -> bool {
        self.submitted == 0 && self.approved == 0 && self.rejected == 0
    }
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn list_campuses(&self) -> RepositoryResult<Vec<Campus>>;
    async fn fetch_campus(&self, id: CampusId) -> RepositoryResult<Option<Campus>>;
    async fn find_campus_by_name(&self, name: &str) -> RepositoryResult<Option<Campus>>;
    async fn insert_campus(&self, name: &str) -> RepositoryResult<Campus>;
    async fn rename_campus(&self, id: CampusId, name: &str) -> RepositoryResult<Campus>;
    async fn delete_campus(&self, id: CampusId) -> RepositoryResult<()>;

    async fn list_courses(&self, campus_id: Option<CampusId>) -> RepositoryResult<Vec<Course>>;
    async fn fetch_course(&self, id: CourseId) -> RepositoryResult<Option<Course>>;
    async fn find_course(&self, name: &str, campus_id: CampusId)
        -> RepositoryResult<Option<Course>>;
    async fn insert_course(&self, course: NewCourse) -> RepositoryResult<Course>;
    async fn update_course(&self, course: Course) -> RepositoryResult<Course>;
    async fn delete_course(&self, id: CourseId) -> RepositoryResult<()>;

    async fn list_secretariats(&self) -> RepositoryResult<Vec<Secretariat>>;
    async fn fetch_secretariat(&self, id: SecretariatId) -> RepositoryResult<Option<Secretariat>>;
    async fn secretariat_for(
        &self,
        course_id: CourseId,
        campus_id: CampusId,
    ) -> RepositoryResult<Option<Secretariat>>;
    async fn insert_secretariat(&self, secretariat: NewSecretariat)
        -> RepositoryResult<Secretariat>;
    async fn update_secretariat(&self, secretariat: Secretariat) -> RepositoryResult<Secretariat>;
    async fn delete_secretariat(&self, id: SecretariatId) -> RepositoryResult<()>;
}

#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// Inserts the candidate and its document rows in one transaction.
    async fn create_candidate(
        &self,
        candidate: NewCandidate,
        documents: &[DocumentRequirement],
        registered_at: DateTime<Utc>,
    ) -> RepositoryResult<Candidate>;
    async fn fetch_candidate(&self, id: CandidateId) -> RepositoryResult<Option<Candidate>>;
    async fn find_by_enrollment_or_cpf(
        &self,
        enrollment: &str,
        cpf: &Cpf,
    ) -> RepositoryResult<Option<Candidate>>;
    /// `identifier` is compared against email, CPF and the CPF digits of the input.
    async fn find_for_login(
        &self,
        identifier: &str,
        enrollment: &str,
    ) -> RepositoryResult<Option<Candidate>>;
    async fn list_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Candidate>>;
    /// Candidates with at least one Not sent or Rejected document.
    async fn candidates_with_outstanding_documents(
        &self,
    ) -> RepositoryResult<Vec<(Candidate, u64)>>;
    /// Removes every candidate with its documents; returns the candidate count.
    async fn clear_candidates(&self) -> RepositoryResult<u64>;
    async fn statistics(&self) -> RepositoryResult<AdmissionsStats>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn documents_for(&self, candidate_id: CandidateId) -> RepositoryResult<Vec<DocumentRecord>>;
    async fn fetch_document(&self, id: DocumentId) -> RepositoryResult<Option<DocumentRecord>>;
    async fn list_documents(&self, filter: &DocumentFilter)
        -> RepositoryResult<Vec<DocumentRecord>>;
    /// Adds rows for kinds the candidate does not have yet; returns how many were created.
    async fn insert_missing_documents(
        &self,
        candidate_id: CandidateId,
        documents: &[DocumentRequirement],
    ) -> RepositoryResult<usize>;
    /// Upserts the row for `upload.kind` as Awaiting Validation.
    async fn record_upload(
        &self,
        candidate_id: CandidateId,
        upload: UploadRecord,
    ) -> RepositoryResult<DocumentRecord>;
    /// Clears file metadata and returns the row to Not sent.
    async fn reset_document(
        &self,
        id: DocumentId,
        changed_at: DateTime<Utc>,
    ) -> RepositoryResult<DocumentRecord>;
    async fn set_document_status(
        &self,
        id: DocumentId,
        change: StatusChange,
    ) -> RepositoryResult<DocumentRecord>;
    async fn delete_documents_of_kinds(&self, keys: &[&str]) -> RepositoryResult<u64>;
    async fn stored_file_names(&self) -> RepositoryResult<Vec<String>>;
    /// Activity with timestamps in `[from, until)`.
    async fn activity_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RepositoryResult<DailyActivity>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load_settings(&self) -> RepositoryResult<BTreeMap<String, String>>;
    async fn store_settings(&self, values: &BTreeMap<String, String>) -> RepositoryResult<()>;
}

#[async_trait]
pub trait StaffRepository: Send + Sync {
    async fn insert_staff(&self, staff: NewStaffRecord) -> RepositoryResult<StaffUser>;
    async fn find_staff_by_email(&self, email: &str) -> RepositoryResult<Option<StaffUser>>;
    async fn find_staff_by_id(&self, id: StaffUserId) -> RepositoryResult<Option<StaffUser>>;
    async fn list_staff(&self) -> RepositoryResult<Vec<StaffUser>>;
    async fn delete_staff(&self, id: StaffUserId) -> RepositoryResult<()>;
}

/// Every storage port the admissions workflow needs.
pub trait AdmissionsRepository:
    DirectoryRepository
    + CandidateRepository
    + DocumentRepository
    + SettingsRepository
    + StaffRepository
{
}

impl<T> AdmissionsRepository for T where
    T: DirectoryRepository
        + CandidateRepository
        + DocumentRepository
        + SettingsRepository
        + StaffRepository
{
}
