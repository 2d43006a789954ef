//! Plaintext message bodies sent to candidates, secretariats and administrators.

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime};

use crate::workflows::admissions::domain::{
    DocumentKind, DocumentRecord, DocumentStatus, StatusBreakdown,
};
use crate::workflows::admissions::repository::DailyActivity;

const CANDIDATE_SIGNATURE: &str = "Atenciosamente,\nEquipe SiSU";
const SYSTEM_SIGNATURE: &str = "Atenciosamente,\nSistema SiSU";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailContent {
    pub subject: String,
    pub body: String,
}

/// Candidate fields shared by every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDetails {
    pub name: String,
    pub enrollment: String,
    pub email: String,
    pub course: String,
    pub campus: String,
}

impl CandidateDetails {
    fn enrollment_block(&self) -> String {
        format!(
            "Dados da inscrição:\n- Inscrição: {}\n- Curso: {}\n- Campus: {}",
            self.enrollment, self.course, self.campus
        )
    }
}

pub fn format_local(value: NaiveDateTime) -> String {
    value.format("%d/%m/%Y %H:%M").to_string()
}

/// Per-document message sent to the candidate. `NotSent` has no message.
pub fn status_change(
    candidate: &CandidateDetails,
    document_name: &str,
    status: DocumentStatus,
    notes: Option<&str>,
) -> Option<MailContent> {
    let notes = notes.map(str::trim).filter(|notes| !notes.is_empty());
    let block = candidate.enrollment_block();

    let (subject, body) = match status {
        DocumentStatus::Approved => {
            let notes_line = notes
                .map(|notes| format!("Observações: {notes}\n\n"))
                .unwrap_or_default();
            (
                format!("Documento aprovado - {document_name}"),
                format!(
                    "Olá {},\n\nSeu documento '{document_name}' foi APROVADO!\n\n{block}\n\n\
                     {notes_line}Parabéns! Continue acompanhando o status dos seus outros \
                     documentos.\n\n{CANDIDATE_SIGNATURE}",
                    candidate.name
                ),
            )
        }
        DocumentStatus::Rejected => (
            format!("Documento recusado - {document_name}"),
            format!(
                "Olá {},\n\nSeu documento '{document_name}' foi RECUSADO e precisa ser \
                 reenviado.\n\n{block}\n\nMotivo da recusa:\n{}\n\nPor favor, corrija o \
                 documento conforme as observações e envie novamente através do sistema.\n\n\
                 {CANDIDATE_SIGNATURE}",
                candidate.name,
                notes.unwrap_or("Não especificado")
            ),
        ),
        DocumentStatus::AwaitingValidation => (
            format!("Documento recebido - {document_name}"),
            format!(
                "Olá {},\n\nSeu documento '{document_name}' foi recebido com sucesso e está \
                 aguardando validação.\n\n{block}\n\nVocê receberá uma nova notificação quando \
                 o documento for validado.\n\n{CANDIDATE_SIGNATURE}",
                candidate.name
            ),
        ),
        DocumentStatus::NotSent => return None,
    };

    Some(MailContent { subject, body })
}

/// Sent to the secretariat and the administrator when a document awaits review.
pub fn validation_request(
    candidate: &CandidateDetails,
    document_name: &str,
    submitted_at: Option<NaiveDateTime>,
    review_link: &str,
) -> MailContent {
    let submitted = submitted_at.map(format_local).unwrap_or_default();
    MailContent {
        subject: format!("Novo documento para validação - {}", candidate.name),
        body: format!(
            "Um novo documento foi enviado e precisa de validação.\n\n\
             Candidato: {}\nInscrição: {}\nEmail: {}\nCurso: {}\nCampus: {}\n\
             Documento: {document_name}\nData de envio: {submitted}\n\n\
             Acesse o painel administrativo para validar o documento:\n{review_link}\n\n\
             {SYSTEM_SIGNATURE}",
            candidate.name, candidate.enrollment, candidate.email, candidate.course, candidate.campus
        ),
    }
}

/// Lines listing every document with its status marker and reviewer notes.
pub fn document_listing(documents: &[DocumentRecord]) -> String {
    let mut listing = String::from("\n");
    for document in documents {
        let _ = writeln!(
            listing,
            "{} {} - {}",
            document.status.marker(),
            document.display_name(),
            document.status.label()
        );
        if let Some(notes) = document.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = writeln!(listing, "   Observações: {notes}");
        }
        listing.push('\n');
    }
    listing
}

fn breakdown_block(breakdown: &StatusBreakdown) -> String {
    format!(
        "Resumo dos Documentos:\n- Total: {}\n- Aprovados: {} ✅\n- Aguardando Validação: {} ⏳\n\
         - Recusados: {} ❌\n- Não Enviados: {} ⚠️",
        breakdown.total,
        breakdown.approved,
        breakdown.awaiting,
        breakdown.rejected,
        breakdown.not_sent
    )
}

/// Consolidated status breakdown for the candidate.
pub fn candidate_summary(
    candidate: &CandidateDetails,
    documents: &[DocumentRecord],
    portal_link: &str,
) -> MailContent {
    let breakdown = StatusBreakdown::from_documents(documents);
    let attention = if breakdown.rejected > 0 {
        "\n⚠️ ATENÇÃO: Você possui documentos recusados que precisam ser reenviados!"
    } else {
        ""
    };

    MailContent {
        subject: "Atualização do Status dos seus Documentos - SiSU".to_string(),
        body: format!(
            "Olá {},\n\nSeus documentos foram avaliados. Confira abaixo o status atualizado:\n\n\
             {}\n\n{}\n\nDetalhamento:{}\n{attention}\n\n\
             Acesse o sistema para mais detalhes: {portal_link}\n\n{CANDIDATE_SIGNATURE}",
            candidate.name,
            candidate.enrollment_block(),
            breakdown_block(&breakdown),
            document_listing(documents)
        ),
    }
}

/// Consolidated status breakdown for the reviewing secretariat.
pub fn secretariat_summary(
    candidate: &CandidateDetails,
    documents: &[DocumentRecord],
    review_link: &str,
) -> MailContent {
    let breakdown = StatusBreakdown::from_documents(documents);
    MailContent {
        subject: format!("Documentos Atualizados - {}", candidate.name),
        body: format!(
            "Os documentos do candidato foram atualizados.\n\n\
             Candidato: {}\nInscrição: {}\nEmail: {}\nCurso: {}\nCampus: {}\n\n{}\n\n\
             Detalhamento:{}\n\nAcesse o painel administrativo: {review_link}\n\n{SYSTEM_SIGNATURE}",
            candidate.name,
            candidate.enrollment,
            candidate.email,
            candidate.course,
            candidate.campus,
            breakdown_block(&breakdown),
            document_listing(documents)
        ),
    }
}

pub fn welcome(candidate: &CandidateDetails, greeting: &str, portal_link: &str) -> MailContent {
    let mut checklist = String::new();
    for (index, kind) in DocumentKind::RECOGNIZED.iter().enumerate() {
        let _ = writeln!(checklist, "{}. {}", index + 1, kind.label());
    }

    MailContent {
        subject: "Bem-vindo ao Sistema de Documentos SiSU".to_string(),
        body: format!(
            "Olá {},\n\n{greeting}\n\nSeu cadastro foi incluído no sistema de recebimento de \
             documentos do SiSU.\n\nDados da sua inscrição:\n- Inscrição: {}\n- Curso: {}\n\
             - Campus: {}\n- Email: {}\n\nPara acessar o sistema e enviar seus documentos, \
             utilize:\n- Email ou CPF: {}\n- Número de inscrição: {}\n\nLink de acesso: \
             {portal_link}\n\nDocumentos necessários:\n{checklist}\nEm caso de dúvidas, entre \
             em contato com a secretaria do seu curso.\n\n{CANDIDATE_SIGNATURE}",
            candidate.name,
            candidate.enrollment,
            candidate.course,
            candidate.campus,
            candidate.email,
            candidate.email,
            candidate.enrollment
        ),
    }
}

pub fn deadline_reminder(
    candidate: &CandidateDetails,
    days_left: u32,
    deadline: NaiveDateTime,
    outstanding: u64,
    portal_link: &str,
) -> MailContent {
    MailContent {
        subject: format!("Lembrete: {days_left} dias para envio de documentos"),
        body: format!(
            "Olá {},\n\nEste é um lembrete de que você tem apenas {days_left} dias para enviar \
             seus documentos pendentes.\n\n{}\n\nPrazo final: {}\n\nVocê ainda possui \
             {outstanding} documento(s) pendente(s). Acesse o sistema para enviar:\n\
             {portal_link}\n\nNão perca o prazo!\n\n{CANDIDATE_SIGNATURE}",
            candidate.name,
            candidate.enrollment_block().replace("Dados da inscrição", "Dados da sua inscrição"),
            format_local(deadline)
        ),
    }
}

pub fn daily_report(day: NaiveDate, activity: &DailyActivity, admin_link: &str) -> MailContent {
    let day = day.format("%d/%m/%Y");
    MailContent {
        subject: format!("Relatório Diário SiSU - {day}"),
        body: format!(
            "Relatório de atividades do sistema SiSU para {day}:\n\n📊 ESTATÍSTICAS DO DIA:\n\
             - Documentos enviados: {}\n- Documentos aprovados: {}\n- Documentos recusados: {}\n\n\
             📋 SITUAÇÃO GERAL:\n- Documentos pendentes de validação: {}\n\
             - Total de candidatos: {}\n\nAcesse o painel administrativo: {admin_link}\n\n\
             {SYSTEM_SIGNATURE}",
            activity.submitted,
            activity.approved,
            activity.rejected,
            activity.awaiting_total,
            activity.candidates_total
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::admissions::domain::{CandidateId, DocumentId};

    fn details() -> CandidateDetails {
        CandidateDetails {
            name: "Ana Souza".to_string(),
            enrollment: "251000000001".to_string(),
            email: "ana@example.com".to_string(),
            course: "Engenharia Civil".to_string(),
            campus: "Campus Central".to_string(),
        }
    }

    fn document(kind: DocumentKind, status: DocumentStatus, notes: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            id: DocumentId(1),
            candidate_id: CandidateId(1),
            name: kind.label().to_string(),
            kind,
            required: true,
            file_name: None,
            original_name: None,
            file_path: None,
            file_size: None,
            status,
            submitted_at: None,
            status_changed_at: None,
            notes: notes.map(str::to_string),
            reviewed_by: None,
        }
    }

    #[test]
    fn rejection_without_notes_says_unspecified() {
        let mail = status_change(&details(), "CPF", DocumentStatus::Rejected, Some("  "))
            .expect("rejection mail");
        assert_eq!(mail.subject, "Documento recusado - CPF");
        assert!(mail.body.contains("Motivo da recusa:\nNão especificado"));
    }

    #[test]
    fn not_sent_has_no_message() {
        assert!(status_change(&details(), "CPF", DocumentStatus::NotSent, None).is_none());
    }

    #[test]
    fn summary_counts_and_flags_rejections() {
        let documents = vec![
            document(DocumentKind::Cpf, DocumentStatus::Approved, None),
            document(
                DocumentKind::IdentityDocument,
                DocumentStatus::Rejected,
                Some("Ilegível"),
            ),
            document(DocumentKind::HighSchoolDiploma, DocumentStatus::NotSent, None),
        ];
        let mail = candidate_summary(&details(), &documents, "https://portal");
        assert!(mail.body.contains("- Total: 3"));
        assert!(mail.body.contains("- Aprovados: 1 ✅"));
        assert!(mail.body.contains("- Recusados: 1 ❌"));
        assert!(mail.body.contains("❌ Documento Oficial de Identificação - Recusado"));
        assert!(mail.body.contains("   Observações: Ilegível"));
        assert!(mail.body.contains("ATENÇÃO"));
    }

    #[test]
    fn summary_without_rejections_omits_attention_line() {
        let documents = vec![document(DocumentKind::Cpf, DocumentStatus::Approved, None)];
        let mail = secretariat_summary(&details(), &documents, "https://admin");
        assert_eq!(mail.subject, "Documentos Atualizados - Ana Souza");
        assert!(!mail.body.contains("ATENÇÃO"));
    }

    #[test]
    fn welcome_lists_every_recognized_document() {
        let mail = welcome(&details(), "Bem-vindo!", "https://portal");
        assert!(mail.body.contains("1. Histórico Escolar do Ensino Fundamental"));
        assert!(mail
            .body
            .contains("11. Declaração de Etnia e Vínculo com Comunidade Indígena"));
    }
}
