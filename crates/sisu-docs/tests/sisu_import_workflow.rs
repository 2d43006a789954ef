use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, FixedOffset, Utc};
use sisu_docs::config::SiteConfig;
use sisu_docs::workflows::admissions::settings::SettingsUpdate;
use sisu_docs::workflows::admissions::upload::UploadedFile;
use sisu_docs::workflows::admissions::{
    AdmissionsService, DocumentStatus, FsDocumentStore, MailError, Mailer, MemoryRepository,
    OutgoingMail, ServiceSettings,
};
use sisu_docs::workflows::sisu_import::ImportOptions;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    fn subjects_for(&self, address: &str) -> Vec<String> {
        self.sent
            .lock()
            .expect("mailer lock")
            .iter()
            .filter(|mail| mail.to == address)
            .map(|mail| mail.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().expect("mailer lock").push(mail);
        Ok(())
    }
}

fn settings(offset: FixedOffset) -> ServiceSettings {
    ServiceSettings {
        site: SiteConfig {
            name: "SiSU Docs".to_string(),
            portal_url: "https://docs.sisu.example/portal".to_string(),
            admin_url: "https://docs.sisu.example/admin".to_string(),
        },
        session_secret: "integration-secret-of-reasonable-length".to_string(),
        session_ttl_hours: 4,
        secure_cookie: true,
        utc_offset: offset,
    }
}

const EXPORT: &str = "NO_CAMPUS,NO_CURSO,DS_TURNO,DS_FORMACAO,CO_INSCRICAO_ENEM,NO_INSCRITO,\
NU_CPF_INSCRITO,DT_NASCIMENTO,TP_SEXO,SG_UF_INSCRITO,NO_MUNICIPIO,NU_FONE1,NU_FONE2,DS_EMAIL,\
MODALIDADE_ESCOLHIDA\n\
Campus Sul,Enfermagem,Matutino,Bacharelado,253000111222,Davi Rocha,390.533.447-05,15/08/2006,M,RS,\
Pelotas,(53) 99999-0000,,davi@example.com,PCD - Pessoa com deficiência\n";

#[tokio::test]
async fn imported_candidate_completes_a_review_cycle() {
    let offset = FixedOffset::west_opt(3 * 3600).expect("valid offset");
    let root = std::env::temp_dir().join(format!(
        "sisu-docs-workflow-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let store = Arc::new(FsDocumentStore::open(&root).await.expect("store opens"));
    let mailer = Arc::new(RecordingMailer::default());
    let repository = MemoryRepository::new();
    let service = AdmissionsService::new(
        Arc::new(repository),
        Arc::clone(&store),
        Arc::clone(&mailer),
        settings(offset),
    );

    service
        .bootstrap_administrator("Coordenação SiSU", "coordenacao@sisu.example", "muito-secreta")
        .await
        .expect("administrator created");
    let admin = service
        .staff_login("coordenacao@sisu.example", "muito-secreta")
        .await
        .expect("staff login")
        .user
        .context();

    let local = Utc::now().with_timezone(&offset).naive_local();
    service
        .update_settings(
            &admin,
            SettingsUpdate {
                system_active: Some(true),
                intake_start: Some((local - Duration::days(1)).format("%Y-%m-%dT%H:%M").to_string()),
                intake_end: Some((local + Duration::days(7)).format("%Y-%m-%dT%H:%M").to_string()),
                email_notifications: Some(true),
                ..SettingsUpdate::default()
            },
        )
        .await
        .expect("intake opened");

    let report = service
        .import_candidates(
            &admin,
            EXPORT.as_bytes(),
            ImportOptions {
                clear_existing: false,
                send_welcome: true,
            },
        )
        .await
        .expect("import runs");
    assert_eq!(report.successful_imports, 1, "errors: {:?}", report.errors);
    assert_eq!(
        mailer.subjects_for("davi@example.com"),
        vec!["[SiSU Docs] Bem-vindo ao Sistema de Documentos SiSU".to_string()]
    );

    let login = service
        .login("39053344705", "253000111222")
        .await
        .expect("candidate login by bare CPF");
    let candidate_id = login.candidate.id;

    let dashboard = service.dashboard(candidate_id).await.expect("dashboard");
    assert!(dashboard.accepting_uploads);
    assert!(!dashboard
        .documents
        .iter()
        .any(|document| document.kind.key() == "quitacao_eleitoral"));
    assert!(dashboard
        .documents
        .iter()
        .any(|document| document.kind.key() == "reservista"));

    let uploaded = service
        .upload_document(
            candidate_id,
            "cpf",
            UploadedFile {
                file_name: "cpf.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
                bytes: b"%PDF-1.4 integration".to_vec(),
            },
        )
        .await
        .expect("upload accepted");
    let stored = uploaded.file_name.clone().expect("file name recorded");
    assert!(root.join(&stored).exists());

    let reviewed = service
        .set_document_status(&admin, uploaded.id, DocumentStatus::Approved, None)
        .await
        .expect("review recorded");
    assert_eq!(reviewed.status, DocumentStatus::Approved);
    assert!(reviewed.status_changed_at.is_some());
    assert!(reviewed.reviewed_by.is_some());

    let dashboard = service.dashboard(candidate_id).await.expect("dashboard");
    assert_eq!(dashboard.breakdown.approved, 1);

    tokio::fs::remove_dir_all(&root).await.expect("cleanup");
}
