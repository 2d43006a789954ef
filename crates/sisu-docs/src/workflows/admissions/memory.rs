//! In-process repository used by tests and when no database is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::access::StaffUser;
use super::cpf::{digits_only, Cpf};
use super::domain::{
    Campus, CampusId, Candidate, CandidateId, Course, CourseId, DocumentId, DocumentRecord,
    DocumentRequirement, DocumentStatus, NewCandidate, NewCourse, NewSecretariat, Secretariat,
    SecretariatId, StaffUserId,
};
use super::repository::{
    AdmissionsStats, CandidateFilter, CandidateRepository, DailyActivity, DirectoryRepository,
    DocumentFilter, DocumentRepository, NewStaffRecord, RepositoryError, RepositoryResult,
    SettingsRepository, StaffRepository, StatusChange, UploadRecord,
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    campuses: BTreeMap<CampusId, Campus>,
    courses: BTreeMap<CourseId, Course>,
    secretariats: BTreeMap<SecretariatId, Secretariat>,
    candidates: BTreeMap<CandidateId, Candidate>,
    documents: BTreeMap<DocumentId, DocumentRecord>,
    settings: BTreeMap<String, String>,
    staff: BTreeMap<StaffUserId, StaffUser>,
}

impl MemoryState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_document(
        &mut self,
        candidate_id: CandidateId,
        requirement: &DocumentRequirement,
    ) -> DocumentRecord {
        let id = DocumentId(self.allocate());
        let record = DocumentRecord {
            id,
            candidate_id,
            kind: requirement.kind.clone(),
            name: requirement.name.clone(),
            required: requirement.required,
            file_name: None,
            original_name: None,
            file_path: None,
            file_size: None,
            status: DocumentStatus::NotSent,
            submitted_at: None,
            status_changed_at: None,
            notes: None,
            reviewed_by: None,
        };
        self.documents.insert(id, record.clone());
        record
    }
}

#[derive(Default, Clone)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn within(value: Option<DateTime<Utc>>, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    value.map(|at| at >= from && at < until).unwrap_or(false)
}

#[async_trait]
impl DirectoryRepository for MemoryRepository {
    async fn list_campuses(&self) -> RepositoryResult<Vec<Campus>> {
        let state = self.state.lock().await;
        let mut campuses: Vec<Campus> = state.campuses.values().cloned().collect();
        campuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(campuses)
    }

    async fn fetch_campus(&self, id: CampusId) -> RepositoryResult<Option<Campus>> {
        Ok(self.state.lock().await.campuses.get(&id).cloned())
    }

    async fn find_campus_by_name(&self, name: &str) -> RepositoryResult<Option<Campus>> {
        let state = self.state.lock().await;
        Ok(state.campuses.values().find(|c| c.name == name).cloned())
    }

    async fn insert_campus(&self, name: &str) -> RepositoryResult<Campus> {
        let mut state = self.state.lock().await;
        if state.campuses.values().any(|c| c.name == name) {
            return Err(RepositoryError::Conflict);
        }
        let campus = Campus {
            id: CampusId(state.allocate()),
            name: name.to_string(),
        };
        state.campuses.insert(campus.id, campus.clone());
        Ok(campus)
    }

    async fn rename_campus(&self, id: CampusId, name: &str) -> RepositoryResult<Campus> {
        let mut state = self.state.lock().await;
        if state.campuses.values().any(|c| c.name == name && c.id != id) {
            return Err(RepositoryError::Conflict);
        }
        let campus = state.campuses.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        campus.name = name.to_string();
        Ok(campus.clone())
    }

    async fn delete_campus(&self, id: CampusId) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if state.courses.values().any(|c| c.campus_id == id) {
            return Err(RepositoryError::InUse("campus has courses"));
        }
        state
            .campuses
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_courses(&self, campus_id: Option<CampusId>) -> RepositoryResult<Vec<Course>> {
        let state = self.state.lock().await;
        let mut courses: Vec<Course> = state
            .courses
            .values()
            .filter(|c| campus_id.map_or(true, |id| c.campus_id == id))
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courses)
    }

    async fn fetch_course(&self, id: CourseId) -> RepositoryResult<Option<Course>> {
        Ok(self.state.lock().await.courses.get(&id).cloned())
    }

    async fn find_course(
        &self,
        name: &str,
        campus_id: CampusId,
    ) -> RepositoryResult<Option<Course>> {
        let state = self.state.lock().await;
        Ok(state
            .courses
            .values()
            .find(|c| c.name == name && c.campus_id == campus_id)
            .cloned())
    }

    async fn insert_course(&self, course: NewCourse) -> RepositoryResult<Course> {
        let mut state = self.state.lock().await;
        if !state.campuses.contains_key(&course.campus_id) {
            return Err(RepositoryError::NotFound);
        }
        let course = Course {
            id: CourseId(state.allocate()),
            name: course.name,
            campus_id: course.campus_id,
        };
        state.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, course: Course) -> RepositoryResult<Course> {
        let mut state = self.state.lock().await;
        if !state.campuses.contains_key(&course.campus_id) {
            return Err(RepositoryError::NotFound);
        }
        let stored = state
            .courses
            .get_mut(&course.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = course.clone();
        Ok(course)
    }

    async fn delete_course(&self, id: CourseId) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if state.candidates.values().any(|c| c.course_id == id) {
            return Err(RepositoryError::InUse("course has candidates"));
        }
        if state.secretariats.values().any(|s| s.course_id == id) {
            return Err(RepositoryError::InUse("course has secretariats"));
        }
        state
            .courses
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_secretariats(&self) -> RepositoryResult<Vec<Secretariat>> {
        let state = self.state.lock().await;
        let mut secretariats: Vec<Secretariat> = state.secretariats.values().cloned().collect();
        secretariats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(secretariats)
    }

    async fn fetch_secretariat(
        &self,
        id: SecretariatId,
    ) -> RepositoryResult<Option<Secretariat>> {
        Ok(self.state.lock().await.secretariats.get(&id).cloned())
    }

    async fn secretariat_for(
        &self,
        course_id: CourseId,
        campus_id: CampusId,
    ) -> RepositoryResult<Option<Secretariat>> {
        let state = self.state.lock().await;
        Ok(state
            .secretariats
            .values()
            .find(|s| s.course_id == course_id && s.campus_id == campus_id)
            .cloned())
    }

    async fn insert_secretariat(
        &self,
        secretariat: NewSecretariat,
    ) -> RepositoryResult<Secretariat> {
        let mut state = self.state.lock().await;
        if !state.courses.contains_key(&secretariat.course_id)
            || !state.campuses.contains_key(&secretariat.campus_id)
        {
            return Err(RepositoryError::NotFound);
        }
        let secretariat = Secretariat {
            id: SecretariatId(state.allocate()),
            name: secretariat.name,
            email: secretariat.email,
            course_id: secretariat.course_id,
            campus_id: secretariat.campus_id,
        };
        state
            .secretariats
            .insert(secretariat.id, secretariat.clone());
        Ok(secretariat)
    }

    async fn update_secretariat(&self, secretariat: Secretariat) -> RepositoryResult<Secretariat> {
        let mut state = self.state.lock().await;
        let stored = state
            .secretariats
            .get_mut(&secretariat.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = secretariat.clone();
        Ok(secretariat)
    }

    async fn delete_secretariat(&self, id: SecretariatId) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if state.staff.values().any(|s| s.secretariat_id == Some(id)) {
            return Err(RepositoryError::InUse("secretariat has staff users"));
        }
        state
            .secretariats
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl CandidateRepository for MemoryRepository {
    async fn create_candidate(
        &self,
        candidate: NewCandidate,
        documents: &[DocumentRequirement],
        registered_at: DateTime<Utc>,
    ) -> RepositoryResult<Candidate> {
        let mut state = self.state.lock().await;
        if state
            .candidates
            .values()
            .any(|c| c.enrollment == candidate.enrollment || c.cpf == candidate.cpf)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = CandidateId(state.allocate());
        let stored = Candidate {
            id,
            enrollment: candidate.enrollment,
            name: candidate.name,
            email: candidate.email,
            cpf: candidate.cpf,
            birth_date: candidate.birth_date,
            sex: candidate.sex,
            phone_primary: candidate.phone_primary,
            phone_secondary: candidate.phone_secondary,
            state: candidate.state,
            municipality: candidate.municipality,
            campus_id: candidate.campus_id,
            course_id: candidate.course_id,
            shift: candidate.shift,
            education: candidate.education,
            modality: candidate.modality,
            registered_at,
        };
        state.candidates.insert(id, stored.clone());
        for requirement in documents {
            state.new_document(id, requirement);
        }
        Ok(stored)
    }

    async fn fetch_candidate(&self, id: CandidateId) -> RepositoryResult<Option<Candidate>> {
        Ok(self.state.lock().await.candidates.get(&id).cloned())
    }

    async fn find_by_enrollment_or_cpf(
        &self,
        enrollment: &str,
        cpf: &Cpf,
    ) -> RepositoryResult<Option<Candidate>> {
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .values()
            .find(|c| c.enrollment == enrollment || &c.cpf == cpf)
            .cloned())
    }

    async fn find_for_login(
        &self,
        identifier: &str,
        enrollment: &str,
    ) -> RepositoryResult<Option<Candidate>> {
        let digits = digits_only(identifier);
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .values()
            .find(|c| {
                c.enrollment == enrollment
                    && (c.email.eq_ignore_ascii_case(identifier)
                        || c.cpf.as_str() == identifier
                        || (!digits.is_empty() && c.cpf.as_str() == digits))
            })
            .cloned())
    }

    async fn list_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Candidate>> {
        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let state = self.state.lock().await;
        let mut candidates: Vec<Candidate> = state
            .candidates
            .values()
            .filter(|c| filter.campus_id.map_or(true, |id| c.campus_id == id))
            .filter(|c| filter.course_id.map_or(true, |id| c.course_id == id))
            .filter(|c| match &needle {
                Some(needle) => [
                    c.name.to_lowercase(),
                    c.email.to_lowercase(),
                    c.cpf.as_str().to_string(),
                    c.enrollment.to_lowercase(),
                ]
                .iter()
                .any(|field| field.contains(needle.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates)
    }

    async fn candidates_with_outstanding_documents(
        &self,
    ) -> RepositoryResult<Vec<(Candidate, u64)>> {
        let state = self.state.lock().await;
        let mut outstanding: HashMap<CandidateId, u64> = HashMap::new();
        for document in state.documents.values() {
            if document.status.is_outstanding() {
                *outstanding.entry(document.candidate_id).or_default() += 1;
            }
        }
        Ok(state
            .candidates
            .values()
            .filter_map(|c| outstanding.get(&c.id).map(|count| (c.clone(), *count)))
            .collect())
    }

    async fn clear_candidates(&self) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let removed = state.candidates.len() as u64;
        state.documents.clear();
        state.candidates.clear();
        Ok(removed)
    }

    async fn statistics(&self) -> RepositoryResult<AdmissionsStats> {
        let state = self.state.lock().await;
        let count = |status: DocumentStatus| {
            state
                .documents
                .values()
                .filter(|d| d.status == status)
                .count() as u64
        };
        Ok(AdmissionsStats {
            campuses: state.campuses.len() as u64,
            courses: state.courses.len() as u64,
            secretariats: state.secretariats.len() as u64,
            candidates: state.candidates.len() as u64,
            documents: state.documents.len() as u64,
            documents_awaiting: count(DocumentStatus::AwaitingValidation),
            documents_approved: count(DocumentStatus::Approved),
            documents_rejected: count(DocumentStatus::Rejected),
            documents_not_sent: count(DocumentStatus::NotSent),
        })
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn documents_for(
        &self,
        candidate_id: CandidateId,
    ) -> RepositoryResult<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    async fn fetch_document(&self, id: DocumentId) -> RepositoryResult<Option<DocumentRecord>> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> RepositoryResult<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .filter(|d| filter.candidate_id.map_or(true, |id| d.candidate_id == id))
            .filter(|d| filter.status.map_or(true, |status| d.status == status))
            .filter(|d| {
                filter
                    .kind
                    .as_deref()
                    .map_or(true, |kind| d.kind.key() == kind)
            })
            .filter(|d| {
                if filter.course_id.is_none() && filter.campus_id.is_none() {
                    return true;
                }
                state.candidates.get(&d.candidate_id).is_some_and(|c| {
                    filter.course_id.map_or(true, |id| c.course_id == id)
                        && filter.campus_id.map_or(true, |id| c.campus_id == id)
                })
            })
            .cloned()
            .collect())
    }

    async fn insert_missing_documents(
        &self,
        candidate_id: CandidateId,
        documents: &[DocumentRequirement],
    ) -> RepositoryResult<usize> {
        let mut state = self.state.lock().await;
        if !state.candidates.contains_key(&candidate_id) {
            return Err(RepositoryError::NotFound);
        }
        let mut created = 0;
        for requirement in documents {
            let exists = state
                .documents
                .values()
                .any(|d| d.candidate_id == candidate_id && d.kind == requirement.kind);
            if !exists {
                state.new_document(candidate_id, requirement);
                created += 1;
            }
        }
        Ok(created)
    }

    async fn record_upload(
        &self,
        candidate_id: CandidateId,
        upload: UploadRecord,
    ) -> RepositoryResult<DocumentRecord> {
        let mut state = self.state.lock().await;
        if !state.candidates.contains_key(&candidate_id) {
            return Err(RepositoryError::NotFound);
        }
        let existing = state
            .documents
            .values()
            .find(|d| d.candidate_id == candidate_id && d.kind == upload.kind)
            .map(|d| d.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let requirement = DocumentRequirement {
                    kind: upload.kind.clone(),
                    name: upload.name.clone(),
                    required: false,
                };
                state.new_document(candidate_id, &requirement).id
            }
        };

        let record = state
            .documents
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        record.file_name = Some(upload.file_name);
        record.original_name = Some(upload.original_name);
        record.file_path = Some(upload.file_path);
        record.file_size = Some(upload.file_size);
        record.status = DocumentStatus::AwaitingValidation;
        record.submitted_at = Some(upload.submitted_at);
        record.status_changed_at = Some(upload.submitted_at);
        record.notes = None;
        record.reviewed_by = None;
        Ok(record.clone())
    }

    async fn reset_document(
        &self,
        id: DocumentId,
        changed_at: DateTime<Utc>,
    ) -> RepositoryResult<DocumentRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .documents
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        record.file_name = None;
        record.original_name = None;
        record.file_path = None;
        record.file_size = None;
        record.status = DocumentStatus::NotSent;
        record.submitted_at = None;
        record.status_changed_at = Some(changed_at);
        record.notes = None;
        record.reviewed_by = None;
        Ok(record.clone())
    }

    async fn set_document_status(
        &self,
        id: DocumentId,
        change: StatusChange,
    ) -> RepositoryResult<DocumentRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .documents
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        record.status = change.status;
        record.notes = change.notes;
        record.reviewed_by = change.reviewed_by;
        record.status_changed_at = Some(change.changed_at);
        Ok(record.clone())
    }

    async fn delete_documents_of_kinds(&self, keys: &[&str]) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.documents.len();
        state.documents.retain(|_, d| !keys.contains(&d.kind.key()));
        Ok((before - state.documents.len()) as u64)
    }

    async fn stored_file_names(&self) -> RepositoryResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .filter_map(|d| d.file_name.clone())
            .collect())
    }

    async fn activity_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RepositoryResult<DailyActivity> {
        let state = self.state.lock().await;
        let mut activity = DailyActivity {
            candidates_total: state.candidates.len() as u64,
            ..DailyActivity::default()
        };
        for document in state.documents.values() {
            if within(document.submitted_at, from, until) {
                activity.submitted += 1;
            }
            if within(document.status_changed_at, from, until) {
                match document.status {
                    DocumentStatus::Approved => activity.approved += 1,
                    DocumentStatus::Rejected => activity.rejected += 1,
                    _ => {}
                }
            }
            if document.status == DocumentStatus::AwaitingValidation {
                activity.awaiting_total += 1;
            }
        }
        Ok(activity)
    }
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    async fn load_settings(&self) -> RepositoryResult<BTreeMap<String, String>> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn store_settings(&self, values: &BTreeMap<String, String>) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        for (key, value) in values {
            state.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl StaffRepository for MemoryRepository {
    async fn insert_staff(&self, staff: NewStaffRecord) -> RepositoryResult<StaffUser> {
        let mut state = self.state.lock().await;
        if state
            .staff
            .values()
            .any(|s| s.email.eq_ignore_ascii_case(&staff.email))
        {
            return Err(RepositoryError::Conflict);
        }
        if let Some(secretariat_id) = staff.secretariat_id {
            if !state.secretariats.contains_key(&secretariat_id) {
                return Err(RepositoryError::NotFound);
            }
        }
        let user = StaffUser {
            id: StaffUserId(state.allocate()),
            name: staff.name,
            email: staff.email,
            role: staff.role,
            secretariat_id: staff.secretariat_id,
            password_hash: staff.password_hash,
            created_at: Utc::now(),
        };
        state.staff.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_staff_by_email(&self, email: &str) -> RepositoryResult<Option<StaffUser>> {
        let state = self.state.lock().await;
        Ok(state
            .staff
            .values()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_staff_by_id(&self, id: StaffUserId) -> RepositoryResult<Option<StaffUser>> {
        Ok(self.state.lock().await.staff.get(&id).cloned())
    }

    async fn list_staff(&self) -> RepositoryResult<Vec<StaffUser>> {
        Ok(self.state.lock().await.staff.values().cloned().collect())
    }

    async fn delete_staff(&self, id: StaffUserId) -> RepositoryResult<()> {
        self.state
            .lock()
            .await
            .staff
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
