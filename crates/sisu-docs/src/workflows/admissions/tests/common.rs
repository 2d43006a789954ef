use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde_json::Value;

use crate::config::SiteConfig;
use crate::workflows::admissions::access::{StaffContext, StaffRole};
use crate::workflows::admissions::cpf::Cpf;
use crate::workflows::admissions::domain::{
    Candidate, DocumentRecord, Modality, NewCandidate, NewCourse, NewSecretariat, Secretariat,
    Sex, StaffUserId,
};
use crate::workflows::admissions::notifier::{MailError, Mailer, OutgoingMail};
use crate::workflows::admissions::provisioning::required_documents;
use crate::workflows::admissions::repository::{
    CandidateRepository, DirectoryRepository, DocumentRepository, SettingsRepository,
};
use crate::workflows::admissions::service::{AdmissionsService, Clock, ServiceSettings};
use crate::workflows::admissions::session::Principal;
use crate::workflows::admissions::settings::IntakeSettings;
use crate::workflows::admissions::storage::{
    staging_name, DocumentStore, StagedFile, StorageError, StoredFile,
};
use crate::workflows::admissions::upload::UploadedFile;
use crate::workflows::admissions::MemoryRepository;

pub(super) const ADMIN_EMAIL: &str = "admissoes@sisu.example";
pub(super) const SECRETARIAT_EMAIL: &str = "secretaria.civil@sisu.example";
pub(super) const CANDIDATE_EMAIL: &str = "ana.souza@example.com";

#[derive(Default)]
pub(super) struct MemoryDocumentStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub(super) fn names(&self) -> Vec<String> {
        self.files.lock().expect("store lock").keys().cloned().collect()
    }

    pub(super) fn insert(&self, name: &str, bytes: &[u8]) {
        self.files
            .lock()
            .expect("store lock")
            .insert(name.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<StagedFile, StorageError> {
        let staged_name = staging_name(file_name);
        self.insert(&staged_name, bytes);
        Ok(StagedFile {
            staged_name,
            file: StoredFile {
                file_name: file_name.to_string(),
                path: format!("memory/{file_name}"),
                size: bytes.len() as i64,
            },
        })
    }

    async fn commit(&self, staged: &StagedFile) -> Result<(), StorageError> {
        let mut files = self.files.lock().expect("store lock");
        let bytes = files
            .remove(&staged.staged_name)
            .ok_or_else(|| StorageError::NotFound(staged.staged_name.clone()))?;
        files.insert(staged.file.file_name.clone(), bytes);
        Ok(())
    }

    async fn read(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .lock()
            .expect("store lock")
            .get(file_name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(file_name.to_string()))
    }

    async fn remove(&self, file_name: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .expect("store lock")
            .remove(file_name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(file_name.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.names())
    }
}

#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().expect("mailer lock").clone()
    }

    pub(super) fn sent_to(&self, address: &str) -> Vec<OutgoingMail> {
        self.sent()
            .into_iter()
            .filter(|mail| mail.to == address)
            .collect()
    }

    pub(super) fn clear(&self) {
        self.sent.lock().expect("mailer lock").clear();
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().expect("mailer lock").push(mail);
        Ok(())
    }
}

pub(super) struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
        Err(MailError::Transport("smtp relay refused the connection".to_string()))
    }
}

pub(super) struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) type TestService = AdmissionsService<MemoryRepository, MemoryDocumentStore, MemoryMailer>;

pub(super) fn brasilia() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("valid offset")
}

/// 2025-02-10 12:00 on the intake wall clock.
pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 10, 15, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn service_settings() -> ServiceSettings {
    ServiceSettings {
        site: SiteConfig {
            name: "SiSU Docs".to_string(),
            portal_url: "https://docs.sisu.example/portal".to_string(),
            admin_url: "https://docs.sisu.example/admin".to_string(),
        },
        session_secret: "test-session-secret-with-enough-entropy".to_string(),
        session_ttl_hours: 8,
        secure_cookie: false,
        utc_offset: brasilia(),
    }
}

pub(super) struct Harness {
    pub service: Arc<TestService>,
    pub repository: MemoryRepository,
    pub store: Arc<MemoryDocumentStore>,
    pub mailer: Arc<MemoryMailer>,
}

/// Service on a fixed clock; session tokens it issues are already expired for the
/// router, so HTTP tests use [`live_harness`].
pub(super) fn harness() -> Harness {
    build(Some(fixed_now()))
}

pub(super) fn live_harness() -> Harness {
    build(None)
}

fn build(now: Option<DateTime<Utc>>) -> Harness {
    let repository = MemoryRepository::new();
    let store = Arc::new(MemoryDocumentStore::default());
    let mailer = Arc::new(MemoryMailer::default());
    let mut service = AdmissionsService::new(
        Arc::new(repository.clone()),
        Arc::clone(&store),
        Arc::clone(&mailer),
        service_settings(),
    );
    if let Some(now) = now {
        service = service.with_clock(Arc::new(FixedClock(now)));
    }
    Harness {
        service: Arc::new(service),
        repository,
        store,
        mailer,
    }
}

/// Opens the intake five days either side of `now` and enables notifications.
pub(super) async fn open_intake(repository: &MemoryRepository, now: DateTime<Utc>) {
    let local = now.with_timezone(&brasilia()).naive_local();
    let settings = IntakeSettings {
        system_active: true,
        intake_start: Some(local - Duration::days(5)),
        intake_end: Some(local + Duration::days(5)),
        admin_email: Some(ADMIN_EMAIL.to_string()),
        ..IntakeSettings::default()
    };
    repository
        .store_settings(&settings.to_store())
        .await
        .expect("settings stored");
}

pub(super) async fn update_settings(
    repository: &MemoryRepository,
    change: impl FnOnce(&mut IntakeSettings),
) {
    let store = repository.load_settings().await.expect("settings load");
    let mut settings = IntakeSettings::from_store(&store);
    change(&mut settings);
    repository
        .store_settings(&settings.to_store())
        .await
        .expect("settings stored");
}

pub(super) struct Seeded {
    pub candidate: Candidate,
    pub secretariat: Secretariat,
}

pub(super) async fn seed_candidate(repository: &MemoryRepository) -> Seeded {
    let campus = repository
        .insert_campus("Campus Central")
        .await
        .expect("campus");
    let course = repository
        .insert_course(NewCourse {
            name: "Engenharia Civil".to_string(),
            campus_id: campus.id,
        })
        .await
        .expect("course");
    let secretariat = repository
        .insert_secretariat(NewSecretariat {
            name: "Secretaria de Engenharia".to_string(),
            email: SECRETARIAT_EMAIL.to_string(),
            course_id: course.id,
            campus_id: campus.id,
        })
        .await
        .expect("secretariat");

    let candidate = repository
        .create_candidate(
            NewCandidate {
                enrollment: "251000123456".to_string(),
                name: "Ana Souza".to_string(),
                email: CANDIDATE_EMAIL.to_string(),
                cpf: Cpf::parse("529.982.247-25").expect("valid cpf"),
                birth_date: None,
                sex: Some(Sex::Female),
                phone_primary: None,
                phone_secondary: None,
                state: Some("BA".to_string()),
                municipality: Some("Salvador".to_string()),
                campus_id: campus.id,
                course_id: course.id,
                shift: Some("Integral".to_string()),
                education: None,
                modality: Some("AC - Ampla concorrência".to_string()),
            },
            &required_documents(Modality::NonQuota, Some(Sex::Female)),
            fixed_now(),
        )
        .await
        .expect("candidate");

    Seeded {
        candidate,
        secretariat,
    }
}

pub(super) async fn document_of(
    repository: &MemoryRepository,
    candidate: &Candidate,
    kind: &str,
) -> DocumentRecord {
    repository
        .documents_for(candidate.id)
        .await
        .expect("documents")
        .into_iter()
        .find(|document| document.kind.key() == kind)
        .expect("document row exists")
}

pub(super) fn pdf(name: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4 scanned document".to_vec(),
    }
}

pub(super) fn staff(role: StaffRole, secretariat: Option<&Secretariat>) -> StaffContext {
    StaffContext {
        user_id: StaffUserId(900),
        permissions: role.permissions(),
        secretariat_id: secretariat.map(|secretariat| secretariat.id),
    }
}

pub(super) fn bearer(service: &TestService, principal: Principal) -> String {
    let session = service
        .sessions()
        .issue(principal, service.now())
        .expect("session issued");
    format!("Bearer {}", session.token)
}

pub(super) const BOUNDARY: &str = "sisu-test-boundary";

/// Builds a `multipart/form-data` body from text fields and file parts.
#[derive(Default)]
pub(super) struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub(super) fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub(super) fn file(mut self, name: &str, file_name: &str, content_type: &str, body: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(body);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub(super) fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }

    pub(super) fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) const SISU_HEADER: &str = "NO_CAMPUS,NO_CURSO,DS_TURNO,DS_FORMACAO,CO_INSCRICAO_ENEM,\
NO_INSCRITO,NU_CPF_INSCRITO,DT_NASCIMENTO,TP_SEXO,SG_UF_INSCRITO,NO_MUNICIPIO,NU_FONE1,NU_FONE2,\
DS_EMAIL,MODALIDADE_ESCOLHIDA";
