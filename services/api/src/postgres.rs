//! Postgres implementation of the admissions storage ports.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sisu_docs::config::DatabaseConfig;
use sisu_docs::error::AppError;
use sisu_docs::workflows::admissions::access::{StaffRole, StaffUser};
use sisu_docs::workflows::admissions::cpf::{digits_only, Cpf};
use sisu_docs::workflows::admissions::domain::{
    Campus, CampusId, Candidate, CandidateId, Course, CourseId, DocumentId, DocumentKind,
    DocumentRecord, DocumentRequirement, DocumentStatus, NewCandidate, NewCourse,
    NewSecretariat, Secretariat, SecretariatId, Sex, StaffUserId,
};
use sisu_docs::workflows::admissions::repository::{
    AdmissionsStats, CandidateFilter, CandidateRepository, DailyActivity, DirectoryRepository,
    DocumentFilter, DocumentRepository, NewStaffRecord, RepositoryError, RepositoryResult,
    SettingsRepository, StaffRepository, StatusChange, UploadRecord,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

const CANDIDATE_COLUMNS: &str = "id, enrollment, name, email, cpf, birth_date, sex, \
    phone_primary, phone_secondary, state, municipality, campus_id, course_id, shift, \
    education, modality, registered_at";

const DOCUMENT_COLUMNS: &str = "id, candidate_id, kind, name, required, file_name, original_name, \
    file_path, file_size, status, submitted_at, status_changed_at, notes, reviewed_by";

const STAFF_COLUMNS: &str = "id, name, email, role, secretariat_id, password_hash, created_at";

#[derive(Clone)]
pub(crate) struct PgAdmissionsRepository {
    pool: PgPool,
}

impl PgAdmissionsRepository {
    pub(crate) async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(|err| AppError::Database(err.to_string()))?;
        Ok(Self { pool })
    }

    pub(crate) async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| AppError::Database(err.to_string()))
    }
}

fn repository_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}

fn corrupt(what: &str, value: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("stored {what} '{value}' is not recognized"))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[derive(FromRow)]
struct CampusRow {
    id: i64,
    name: String,
}

impl CampusRow {
    fn to_domain(self) -> Campus {
        Campus {
            id: CampusId(self.id),
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct CourseRow {
    id: i64,
    name: String,
    campus_id: i64,
}

impl CourseRow {
    fn to_domain(self) -> Course {
        Course {
            id: CourseId(self.id),
            name: self.name,
            campus_id: CampusId(self.campus_id),
        }
    }
}

#[derive(FromRow)]
struct SecretariatRow {
    id: i64,
    name: String,
    email: String,
    course_id: i64,
    campus_id: i64,
}

impl SecretariatRow {
    fn to_domain(self) -> Secretariat {
        Secretariat {
            id: SecretariatId(self.id),
            name: self.name,
            email: self.email,
            course_id: CourseId(self.course_id),
            campus_id: CampusId(self.campus_id),
        }
    }
}

#[derive(FromRow)]
struct CandidateRow {
    id: i64,
    enrollment: String,
    name: String,
    email: String,
    cpf: String,
    birth_date: Option<NaiveDate>,
    sex: Option<String>,
    phone_primary: Option<String>,
    phone_secondary: Option<String>,
    state: Option<String>,
    municipality: Option<String>,
    campus_id: i64,
    course_id: i64,
    shift: Option<String>,
    education: Option<String>,
    modality: Option<String>,
    registered_at: DateTime<Utc>,
}

impl CandidateRow {
    fn to_domain(self) -> Candidate {
        Candidate {
            id: CandidateId(self.id),
            enrollment: self.enrollment,
            name: self.name,
            email: self.email,
            cpf: Cpf::from_trusted(self.cpf),
            birth_date: self.birth_date,
            sex: self.sex.as_deref().and_then(Sex::from_code),
            phone_primary: self.phone_primary,
            phone_secondary: self.phone_secondary,
            state: self.state,
            municipality: self.municipality,
            campus_id: CampusId(self.campus_id),
            course_id: CourseId(self.course_id),
            shift: self.shift,
            education: self.education,
            modality: self.modality,
            registered_at: self.registered_at,
        }
    }
}

#[derive(FromRow)]
struct OutstandingRow {
    #[sqlx(flatten)]
    candidate: CandidateRow,
    outstanding: i64,
}

#[derive(FromRow)]
struct DocumentRow {
    id: i64,
    candidate_id: i64,
    kind: String,
    name: String,
    required: bool,
    file_name: Option<String>,
    original_name: Option<String>,
    file_path: Option<String>,
    file_size: Option<i64>,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
    status_changed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    reviewed_by: Option<i64>,
}

impl DocumentRow {
    fn to_domain(self) -> RepositoryResult<DocumentRecord> {
        let status =
            DocumentStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status))?;
        Ok(DocumentRecord {
            id: DocumentId(self.id),
            candidate_id: CandidateId(self.candidate_id),
            kind: DocumentKind::from_key(&self.kind),
            name: self.name,
            required: self.required,
            file_name: self.file_name,
            original_name: self.original_name,
            file_path: self.file_path,
            file_size: self.file_size,
            status,
            submitted_at: self.submitted_at,
            status_changed_at: self.status_changed_at,
            notes: self.notes,
            reviewed_by: self.reviewed_by.map(StaffUserId),
        })
    }
}

fn documents(rows: Vec<DocumentRow>) -> RepositoryResult<Vec<DocumentRecord>> {
    rows.into_iter().map(DocumentRow::to_domain).collect()
}

#[derive(FromRow)]
struct StaffRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    secretariat_id: Option<i64>,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl StaffRow {
    fn to_domain(self) -> RepositoryResult<StaffUser> {
        let role = StaffRole::from_key(&self.role).ok_or_else(|| corrupt("role", &self.role))?;
        Ok(StaffUser {
            id: StaffUserId(self.id),
            name: self.name,
            email: self.email,
            role,
            secretariat_id: self.secretariat_id.map(SecretariatId),
            password_hash: self.password_hash,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct StatsRow {
    campuses: i64,
    courses: i64,
    secretariats: i64,
    candidates: i64,
    documents: i64,
    documents_awaiting: i64,
    documents_approved: i64,
    documents_rejected: i64,
    documents_not_sent: i64,
}

#[derive(FromRow)]
struct ActivityRow {
    submitted: i64,
    approved: i64,
    rejected: i64,
    awaiting_total: i64,
    candidates_total: i64,
}

impl PgAdmissionsRepository {
    async fn referenced(&self, sql: &str, id: i64) -> RepositoryResult<bool> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(repository_error)
    }
}

#[async_trait]
impl DirectoryRepository for PgAdmissionsRepository {
    async fn list_campuses(&self) -> RepositoryResult<Vec<Campus>> {
        let rows = sqlx::query_as::<_, CampusRow>("SELECT id, name FROM campuses ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(rows.into_iter().map(CampusRow::to_domain).collect())
    }

    async fn fetch_campus(&self, id: CampusId) -> RepositoryResult<Option<Campus>> {
        let row = sqlx::query_as::<_, CampusRow>("SELECT id, name FROM campuses WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(row.map(CampusRow::to_domain))
    }

    async fn find_campus_by_name(&self, name: &str) -> RepositoryResult<Option<Campus>> {
        let row = sqlx::query_as::<_, CampusRow>("SELECT id, name FROM campuses WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(row.map(CampusRow::to_domain))
    }

    async fn insert_campus(&self, name: &str) -> RepositoryResult<Campus> {
        let row = sqlx::query_as::<_, CampusRow>(
            "INSERT INTO campuses (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.to_domain())
    }

    async fn rename_campus(&self, id: CampusId, name: &str) -> RepositoryResult<Campus> {
        let row = sqlx::query_as::<_, CampusRow>(
            "UPDATE campuses SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        row.map(CampusRow::to_domain).ok_or(RepositoryError::NotFound)
    }

    async fn delete_campus(&self, id: CampusId) -> RepositoryResult<()> {
        if self
            .referenced("SELECT EXISTS (SELECT 1 FROM courses WHERE campus_id = $1)", id.0)
            .await?
        {
            return Err(RepositoryError::InUse("campus has courses"));
        }
        let result = sqlx::query("DELETE FROM campuses WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(repository_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_courses(&self, campus_id: Option<CampusId>) -> RepositoryResult<Vec<Course>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            "SELECT id, name, campus_id FROM courses \
             WHERE ($1::BIGINT IS NULL OR campus_id = $1) ORDER BY name",
        )
        .bind(campus_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(rows.into_iter().map(CourseRow::to_domain).collect())
    }

    async fn fetch_course(&self, id: CourseId) -> RepositoryResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, name, campus_id FROM courses WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.map(CourseRow::to_domain))
    }

    async fn find_course(
        &self,
        name: &str,
        campus_id: CampusId,
    ) -> RepositoryResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, name, campus_id FROM courses WHERE name = $1 AND campus_id = $2",
        )
        .bind(name)
        .bind(campus_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.map(CourseRow::to_domain))
    }

    async fn insert_course(&self, course: NewCourse) -> RepositoryResult<Course> {
        let row = sqlx::query_as::<_, CourseRow>(
            "INSERT INTO courses (name, campus_id) VALUES ($1, $2) RETURNING id, name, campus_id",
        )
        .bind(&course.name)
        .bind(course.campus_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.to_domain())
    }

    async fn update_course(&self, course: Course) -> RepositoryResult<Course> {
        let row = sqlx::query_as::<_, CourseRow>(
            "UPDATE courses SET name = $2, campus_id = $3 WHERE id = $1 \
             RETURNING id, name, campus_id",
        )
        .bind(course.id.0)
        .bind(&course.name)
        .bind(course.campus_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        row.map(CourseRow::to_domain).ok_or(RepositoryError::NotFound)
    }

    async fn delete_course(&self, id: CourseId) -> RepositoryResult<()> {
        if self
            .referenced("SELECT EXISTS (SELECT 1 FROM candidates WHERE course_id = $1)", id.0)
            .await?
        {
            return Err(RepositoryError::InUse("course has candidates"));
        }
        if self
            .referenced("SELECT EXISTS (SELECT 1 FROM secretariats WHERE course_id = $1)", id.0)
            .await?
        {
            return Err(RepositoryError::InUse("course has secretariats"));
        }
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(repository_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_secretariats(&self) -> RepositoryResult<Vec<Secretariat>> {
        let rows = sqlx::query_as::<_, SecretariatRow>(
            "SELECT id, name, email, course_id, campus_id FROM secretariats ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(rows.into_iter().map(SecretariatRow::to_domain).collect())
    }

    async fn fetch_secretariat(
        &self,
        id: SecretariatId,
    ) -> RepositoryResult<Option<Secretariat>> {
        let row = sqlx::query_as::<_, SecretariatRow>(
            "SELECT id, name, email, course_id, campus_id FROM secretariats WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.map(SecretariatRow::to_domain))
    }

    async fn secretariat_for(
        &self,
        course_id: CourseId,
        campus_id: CampusId,
    ) -> RepositoryResult<Option<Secretariat>> {
        let row = sqlx::query_as::<_, SecretariatRow>(
            "SELECT id, name, email, course_id, campus_id FROM secretariats \
             WHERE course_id = $1 AND campus_id = $2 ORDER BY id LIMIT 1",
        )
        .bind(course_id.0)
        .bind(campus_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.map(SecretariatRow::to_domain))
    }

    async fn insert_secretariat(
        &self,
        secretariat: NewSecretariat,
    ) -> RepositoryResult<Secretariat> {
        let row = sqlx::query_as::<_, SecretariatRow>(
            "INSERT INTO secretariats (name, email, course_id, campus_id) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, email, course_id, campus_id",
        )
        .bind(&secretariat.name)
        .bind(&secretariat.email)
        .bind(secretariat.course_id.0)
        .bind(secretariat.campus_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(repository_error)?;
        Ok(row.to_domain())
    }

    async fn update_secretariat(&self, secretariat: Secretariat) -> RepositoryResult<Secretariat> {
        let row = sqlx::query_as::<_, SecretariatRow>(
            "UPDATE secretariats SET name = $2, email = $3, course_id = $4, campus_id = $5 \
             WHERE id = $1 RETURNING id, name, email, course_id, campus_id",
        )
        .bind(secretariat.id.0)
        .bind(&secretariat.name)
        .bind(&secretariat.email)
        .bind(secretariat.course_id.0)
        .bind(secretariat.campus_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(repository_error)?;
        row.map(SecretariatRow::to_domain)
            .ok_or(RepositoryError::NotFound)
    }

    async fn delete_secretariat(&self, id: SecretariatId) -> RepositoryResult<()> {
        if self
            .referenced(
                "SELECT EXISTS (SELECT 1 FROM staff_users WHERE secretariat_id = $1)",
                id.0,
            )
            .await?
        {
            return Err(RepositoryError::InUse("secretariat has staff users"));
        }
        let result = sqlx::query("DELETE FROM secretariats WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(repository_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CandidateRepository for PgAdmissionsRepository {
    async fn create_candidate(
        &self,
        candidate: NewCandidate,
        documents: &[DocumentRequirement],
        registered_at: DateTime<Utc>,
    ) -> RepositoryResult<Candidate> {
        let mut tx = self.pool.begin().await.map_err(repository_error)?;

        let insert = format!(
            "INSERT INTO candidates (enrollment, name, email, cpf, birth_date, sex, \
             phone_primary, phone_secondary, state, municipality, campus_id, course_id, shift, \
             education, modality, registered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {CANDIDATE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CandidateRow>(&insert)
            .bind(&candidate.enrollment)
            .bind(&candidate.name)
            .bind(&candidate.email)
            .bind(candidate.cpf.as_str())
            .bind(candidate.birth_date)
            .bind(candidate.sex.map(Sex::code))
            .bind(&candidate.phone_primary)
            .bind(&candidate.phone_secondary)
            .bind(&candidate.state)
            .bind(&candidate.municipality)
            .bind(candidate.campus_id.0)
            .bind(candidate.course_id.0)
            .bind(&candidate.shift)
            .bind(&candidate.education)
            .bind(&candidate.modality)
            .bind(registered_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(repository_error)?;

        for requirement in documents {
            sqlx::query(
                "INSERT INTO documents (candidate_id, kind, name, required, status) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (candidate_id, kind) DO NOTHING",
            )
            .bind(row.id)
            .bind(requirement.kind.key())
            .bind(&requirement.name)
            .bind(requirement.required)
            .bind(DocumentStatus::NotSent.label())
            .execute(&mut *tx)
            .await
            .map_err(repository_error)?;
        }

        tx.commit().await.map_err(repository_error)?;
        Ok(row.to_domain())
    }

    async fn fetch_candidate(&self, id: CandidateId) -> RepositoryResult<Option<Candidate>> {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1");
        let row = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(row.map(CandidateRow::to_domain))
    }

    async fn find_by_enrollment_or_cpf(
        &self,
        enrollment: &str,
        cpf: &Cpf,
    ) -> RepositoryResult<Option<Candidate>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE enrollment = $1 OR cpf = $2 \
             ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(enrollment)
            .bind(cpf.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(row.map(CandidateRow::to_domain))
    }

    async fn find_for_login(
        &self,
        identifier: &str,
        enrollment: &str,
    ) -> RepositoryResult<Option<Candidate>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE enrollment = $1 \
             AND (LOWER(email) = LOWER($2) OR cpf = $2 OR ($3 <> '' AND cpf = $3)) \
             ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(enrollment)
            .bind(identifier)
            .bind(digits_only(identifier))
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(row.map(CandidateRow::to_domain))
    }

    async fn list_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Candidate>> {
        let pattern = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates \
             WHERE ($1::BIGINT IS NULL OR campus_id = $1) \
             AND ($2::BIGINT IS NULL OR course_id = $2) \
             AND ($3::TEXT IS NULL OR LOWER(name) LIKE $3 OR LOWER(email) LIKE $3 \
                  OR cpf LIKE $3 OR LOWER(enrollment) LIKE $3) \
             ORDER BY name"
        );
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(filter.campus_id.map(|id| id.0))
            .bind(filter.course_id.map(|id| id.0))
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(rows.into_iter().map(CandidateRow::to_domain).collect())
    }

    async fn candidates_with_outstanding_documents(
        &self,
    ) -> RepositoryResult<Vec<(Candidate, u64)>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, outstanding FROM candidates \
             JOIN (SELECT candidate_id, COUNT(*) AS outstanding FROM documents \
                   WHERE status = $1 OR status = $2 GROUP BY candidate_id) pending \
             ON pending.candidate_id = candidates.id \
             ORDER BY name"
        );
        let rows = sqlx::query_as::<_, OutstandingRow>(&sql)
            .bind(DocumentStatus::NotSent.label())
            .bind(DocumentStatus::Rejected.label())
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.candidate.to_domain(), count(row.outstanding)))
            .collect())
    }

    async fn clear_candidates(&self) -> RepositoryResult<u64> {
        let mut tx = self.pool.begin().await.map_err(repository_error)?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await
            .map_err(repository_error)?;
        let removed = sqlx::query("DELETE FROM candidates")
            .execute(&mut *tx)
            .await
            .map_err(repository_error)?
            .rows_affected();
        tx.commit().await.map_err(repository_error)?;
        Ok(removed)
    }

    async fn statistics(&self) -> RepositoryResult<AdmissionsStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT \
               (SELECT COUNT(*) FROM campuses) AS campuses, \
               (SELECT COUNT(*) FROM courses) AS courses, \
               (SELECT COUNT(*) FROM secretariats) AS secretariats, \
               (SELECT COUNT(*) FROM candidates) AS candidates, \
               COUNT(*) AS documents, \
               COUNT(*) FILTER (WHERE status = $1) AS documents_awaiting, \
               COUNT(*) FILTER (WHERE status = $2) AS documents_approved, \
               COUNT(*) FILTER (WHERE status = $3) AS documents_rejected, \
               COUNT(*) FILTER (WHERE status = $4) AS documents_not_sent \
             FROM documents",
        )
        .bind(DocumentStatus::AwaitingValidation.label())
        .bind(DocumentStatus::Approved.label())
        .bind(DocumentStatus::Rejected.label())
        .bind(DocumentStatus::NotSent.label())
        .fetch_one(&self.pool)
        .await
        .map_err(repository_error)?;

        Ok(AdmissionsStats {
            campuses: count(row.campuses),
            courses: count(row.courses),
            secretariats: count(row.secretariats),
            candidates: count(row.candidates),
            documents: count(row.documents),
            documents_awaiting: count(row.documents_awaiting),
            documents_approved: count(row.documents_approved),
            documents_rejected: count(row.documents_rejected),
            documents_not_sent: count(row.documents_not_sent),
        })
    }
}

#[async_trait]
impl DocumentRepository for PgAdmissionsRepository {
    async fn documents_for(
        &self,
        candidate_id: CandidateId,
    ) -> RepositoryResult<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE candidate_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(candidate_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        documents(rows)
    }

    async fn fetch_document(&self, id: DocumentId) -> RepositoryResult<Option<DocumentRecord>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        row.map(DocumentRow::to_domain).transpose()
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> RepositoryResult<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE ($1::BIGINT IS NULL OR candidate_id = $1) \
             AND ($2::TEXT IS NULL OR status = $2) \
             AND ($3::TEXT IS NULL OR kind = $3) \
             AND (($4::BIGINT IS NULL AND $5::BIGINT IS NULL) OR candidate_id IN \
                  (SELECT id FROM candidates \
                   WHERE ($4::BIGINT IS NULL OR course_id = $4) \
                   AND ($5::BIGINT IS NULL OR campus_id = $5))) \
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(filter.candidate_id.map(|id| id.0))
            .bind(filter.status.map(DocumentStatus::label))
            .bind(filter.kind.as_deref())
            .bind(filter.course_id.map(|id| id.0))
            .bind(filter.campus_id.map(|id| id.0))
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        documents(rows)
    }

    async fn insert_missing_documents(
        &self,
        candidate_id: CandidateId,
        documents: &[DocumentRequirement],
    ) -> RepositoryResult<usize> {
        let mut tx = self.pool.begin().await.map_err(repository_error)?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM candidates WHERE id = $1)")
                .bind(candidate_id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(repository_error)?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        let mut created = 0;
        for requirement in documents {
            let result = sqlx::query(
                "INSERT INTO documents (candidate_id, kind, name, required, status) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (candidate_id, kind) DO NOTHING",
            )
            .bind(candidate_id.0)
            .bind(requirement.kind.key())
            .bind(&requirement.name)
            .bind(requirement.required)
            .bind(DocumentStatus::NotSent.label())
            .execute(&mut *tx)
            .await
            .map_err(repository_error)?;
            created += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(repository_error)?;
        Ok(created)
    }

    async fn record_upload(
        &self,
        candidate_id: CandidateId,
        upload: UploadRecord,
    ) -> RepositoryResult<DocumentRecord> {
        let sql = format!(
            "INSERT INTO documents (candidate_id, kind, name, required, file_name, original_name, \
             file_path, file_size, status, submitted_at, status_changed_at, notes, reviewed_by) \
             VALUES ($1, $2, $3, FALSE, $4, $9, $5, $6, $7, $8, $8, NULL, NULL) \
             ON CONFLICT (candidate_id, kind) DO UPDATE SET \
               file_name = EXCLUDED.file_name, \
               original_name = EXCLUDED.original_name, \
               file_path = EXCLUDED.file_path, \
               file_size = EXCLUDED.file_size, \
               status = EXCLUDED.status, \
               submitted_at = EXCLUDED.submitted_at, \
               status_changed_at = EXCLUDED.status_changed_at, \
               notes = NULL, \
               reviewed_by = NULL \
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(candidate_id.0)
            .bind(upload.kind.key())
            .bind(&upload.name)
            .bind(&upload.file_name)
            .bind(&upload.file_path)
            .bind(upload.file_size)
            .bind(DocumentStatus::AwaitingValidation.label())
            .bind(upload.submitted_at)
            .bind(&upload.original_name)
            .fetch_one(&self.pool)
            .await
            .map_err(repository_error)?;
        row.to_domain()
    }

    async fn reset_document(
        &self,
        id: DocumentId,
        changed_at: DateTime<Utc>,
    ) -> RepositoryResult<DocumentRecord> {
        let sql = format!(
            "UPDATE documents SET file_name = NULL, original_name = NULL, file_path = NULL, \
             file_size = NULL, status = $2, submitted_at = NULL, status_changed_at = $3, \
             notes = NULL, reviewed_by = NULL \
             WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id.0)
            .bind(DocumentStatus::NotSent.label())
            .bind(changed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        row.ok_or(RepositoryError::NotFound)?.to_domain()
    }

    async fn set_document_status(
        &self,
        id: DocumentId,
        change: StatusChange,
    ) -> RepositoryResult<DocumentRecord> {
        let sql = format!(
            "UPDATE documents SET status = $2, notes = $3, reviewed_by = $4, \
             status_changed_at = $5 WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id.0)
            .bind(change.status.label())
            .bind(&change.notes)
            .bind(change.reviewed_by.map(|id| id.0))
            .bind(change.changed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        row.ok_or(RepositoryError::NotFound)?.to_domain()
    }

    async fn delete_documents_of_kinds(&self, keys: &[&str]) -> RepositoryResult<u64> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        let result = sqlx::query("DELETE FROM documents WHERE kind = ANY($1)")
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(result.rows_affected())
    }

    async fn stored_file_names(&self) -> RepositoryResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT file_name FROM documents WHERE file_name IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(repository_error)
    }

    async fn activity_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RepositoryResult<DailyActivity> {
        let row = sqlx::query_as::<_, ActivityRow>(
            "SELECT \
               COUNT(*) FILTER (WHERE submitted_at >= $1 AND submitted_at < $2) AS submitted, \
               COUNT(*) FILTER (WHERE status = $3 \
                 AND status_changed_at >= $1 AND status_changed_at < $2) AS approved, \
               COUNT(*) FILTER (WHERE status = $4 \
                 AND status_changed_at >= $1 AND status_changed_at < $2) AS rejected, \
               COUNT(*) FILTER (WHERE status = $5) AS awaiting_total, \
               (SELECT COUNT(*) FROM candidates) AS candidates_total \
             FROM documents",
        )
        .bind(from)
        .bind(until)
        .bind(DocumentStatus::Approved.label())
        .bind(DocumentStatus::Rejected.label())
        .bind(DocumentStatus::AwaitingValidation.label())
        .fetch_one(&self.pool)
        .await
        .map_err(repository_error)?;

        Ok(DailyActivity {
            submitted: count(row.submitted),
            approved: count(row.approved),
            rejected: count(row.rejected),
            awaiting_total: count(row.awaiting_total),
            candidates_total: count(row.candidates_total),
        })
    }
}

#[async_trait]
impl SettingsRepository for PgAdmissionsRepository {
    async fn load_settings(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn store_settings(&self, values: &BTreeMap<String, String>) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(repository_error)?;
        for (key, value) in values {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES ($1, $2) \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(repository_error)?;
        }
        tx.commit().await.map_err(repository_error)
    }
}

#[async_trait]
impl StaffRepository for PgAdmissionsRepository {
    async fn insert_staff(&self, staff: NewStaffRecord) -> RepositoryResult<StaffUser> {
        let sql = format!(
            "INSERT INTO staff_users (name, email, role, secretariat_id, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {STAFF_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StaffRow>(&sql)
            .bind(&staff.name)
            .bind(&staff.email)
            .bind(staff.role.key())
            .bind(staff.secretariat_id.map(|id| id.0))
            .bind(&staff.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(repository_error)?;
        row.to_domain()
    }

    async fn find_staff_by_email(&self, email: &str) -> RepositoryResult<Option<StaffUser>> {
        let sql = format!("SELECT {STAFF_COLUMNS} FROM staff_users WHERE LOWER(email) = LOWER($1)");
        let row = sqlx::query_as::<_, StaffRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        row.map(StaffRow::to_domain).transpose()
    }

    async fn find_staff_by_id(&self, id: StaffUserId) -> RepositoryResult<Option<StaffUser>> {
        let sql = format!("SELECT {STAFF_COLUMNS} FROM staff_users WHERE id = $1");
        let row = sqlx::query_as::<_, StaffRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(repository_error)?;
        row.map(StaffRow::to_domain).transpose()
    }

    async fn list_staff(&self) -> RepositoryResult<Vec<StaffUser>> {
        let sql = format!("SELECT {STAFF_COLUMNS} FROM staff_users ORDER BY name");
        let rows = sqlx::query_as::<_, StaffRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(repository_error)?;
        rows.into_iter().map(StaffRow::to_domain).collect()
    }

    async fn delete_staff(&self, id: StaffUserId) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM staff_users WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(repository_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
