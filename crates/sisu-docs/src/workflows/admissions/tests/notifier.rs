use std::sync::Arc;

use super::common::*;

use crate::workflows::admissions::domain::DocumentStatus;
use crate::workflows::admissions::notifier::Notifier;
use crate::workflows::admissions::repository::DirectoryRepository;
use crate::workflows::admissions::service::AdmissionsService;
use crate::workflows::admissions::MemoryRepository;

#[tokio::test]
async fn failing_transport_never_blocks_intake() {
    let repository = MemoryRepository::new();
    let store = Arc::new(MemoryDocumentStore::default());
    let service = AdmissionsService::new(
        Arc::new(repository.clone()),
        Arc::clone(&store),
        Arc::new(FailingMailer),
        service_settings(),
    )
    .with_clock(Arc::new(FixedClock(fixed_now())));
    let seeded = seed_candidate(&repository).await;
    open_intake(&repository, fixed_now()).await;

    let record = service
        .upload_document(seeded.candidate.id, "cpf", pdf("cpf.pdf"))
        .await
        .expect("upload succeeds without mail");

    assert_eq!(record.status, DocumentStatus::AwaitingValidation);
    assert_eq!(store.names().len(), 1);
}

#[tokio::test]
async fn disabled_notifications_send_nothing() {
    let h = harness();
    let seeded = seed_candidate(&h.repository).await;
    open_intake(&h.repository, fixed_now()).await;
    update_settings(&h.repository, |settings| settings.email_notifications = false).await;

    h.service
        .upload_document(seeded.candidate.id, "cpf", pdf("cpf.pdf"))
        .await
        .expect("upload");
    h.service.notifier().welcome(&seeded.candidate).await;
    let reminders = h.service.send_deadline_reminders(10).await.expect("reminders");

    assert_eq!(reminders, 0);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn welcome_lists_every_document_and_access_data() {
    let h = harness();
    let seeded = seed_candidate(&h.repository).await;

    h.service.notifier().welcome(&seeded.candidate).await;

    let mails = h.mailer.sent_to(CANDIDATE_EMAIL);
    assert_eq!(mails.len(), 1);
    assert_eq!(
        mails[0].subject,
        "[SiSU Docs] Bem-vindo ao Sistema de Documentos SiSU"
    );
    assert!(mails[0].body.contains("- Número de inscrição: 251000123456"));
    assert!(mails[0].body.contains("11. Declaração de Etnia"));
    assert!(mails[0].body.contains("Campus Central"));
}

#[tokio::test]
async fn summary_without_secretariat_only_reaches_the_candidate() {
    let repository = MemoryRepository::new();
    let mailer = Arc::new(MemoryMailer::default());
    let notifier = Notifier::new(
        Arc::new(repository.clone()),
        Arc::clone(&mailer),
        service_settings().site,
        brasilia(),
    );
    let seeded = seed_candidate(&repository).await;
    repository
        .delete_secretariat(seeded.secretariat.id)
        .await
        .expect("secretariat removed");

    notifier.all_documents_status(seeded.candidate.id).await;

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, CANDIDATE_EMAIL);
    assert!(sent[0].body.contains("- Não Enviados: 8 ⚠️"));
}

#[tokio::test]
async fn daily_report_needs_an_administrator_address() {
    let h = harness();
    let seeded = seed_candidate(&h.repository).await;
    open_intake(&h.repository, fixed_now()).await;
    h.service
        .upload_document(seeded.candidate.id, "cpf", pdf("cpf.pdf"))
        .await
        .expect("upload");
    update_settings(&h.repository, |settings| settings.admin_email = None).await;
    h.mailer.clear();

    assert!(!h.service.send_daily_report().await.expect("report"));
    assert!(h.mailer.sent().is_empty());
}
