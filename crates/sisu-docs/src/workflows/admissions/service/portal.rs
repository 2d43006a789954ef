use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::admissions::access::Permission;
use crate::workflows::admissions::domain::{
    Campus, Candidate, CandidateId, Course, DocumentId, DocumentKind, DocumentRecord,
    StatusBreakdown,
};
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::repository::{AdmissionsRepository, UploadRecord};
use crate::workflows::admissions::session::{IssuedSession, Principal};
use crate::workflows::admissions::settings::{IntakeSettings, WindowState};
use crate::workflows::admissions::storage::{document_file_name, DocumentStore, StorageError};
use crate::workflows::admissions::upload::{original_file_name, validate_upload, UploadedFile};

use super::{AdmissionsError, AdmissionsService};

#[derive(Debug, Clone, Serialize)]
pub struct CandidateLogin {
    pub candidate: Candidate,
    pub session: IssuedSession,
}

/// Everything the candidate portal renders after login.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateDashboard {
    pub candidate: Candidate,
    pub course: Option<Course>,
    pub campus: Option<Campus>,
    pub documents: Vec<DocumentRecord>,
    pub breakdown: StatusBreakdown,
    pub window: WindowState,
    pub accepting_uploads: bool,
    pub message: String,
    pub max_file_size: u64,
}

/// Result of a multi-file submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub uploaded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub documents: Vec<DocumentRecord>,
}

impl BatchOutcome {
    pub fn message(&self) -> String {
        let mut message = format!("{} documento(s) enviado(s) com sucesso!", self.uploaded);
        if self.failed > 0 {
            message.push_str(&format!(" {} documento(s) com erro.", self.failed));
        }
        message
    }
}

#[derive(Debug, Clone)]
pub struct DocumentDownload {
    pub file_name: String,
    pub content_type: mime::Mime,
    pub bytes: Vec<u8>,
}

impl<R, S, M> AdmissionsService<R, S, M>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    /// Authenticates by enrollment number plus email or CPF (formatted or not).
    pub async fn login(
        &self,
        identifier: &str,
        enrollment: &str,
    ) -> Result<CandidateLogin, AdmissionsError> {
        let identifier = identifier.trim();
        let enrollment = enrollment.trim();
        if identifier.is_empty() || enrollment.is_empty() {
            return Err(AdmissionsError::invalid("Por favor, preencha todos os campos."));
        }

        let candidate = self
            .repository
            .find_for_login(identifier, enrollment)
            .await?
            .ok_or(AdmissionsError::InvalidLogin)?;
        let session = self.sessions.issue(
            Principal::Candidate {
                candidate_id: candidate.id,
            },
            self.now(),
        )?;

        info!(candidate_id = %candidate.id, "candidate signed in");
        Ok(CandidateLogin { candidate, session })
    }

    pub async fn dashboard(
        &self,
        candidate_id: CandidateId,
    ) -> Result<CandidateDashboard, AdmissionsError> {
        let candidate = self.candidate(candidate_id).await?;
        let course = self.repository.fetch_course(candidate.course_id).await?;
        let campus = self.repository.fetch_campus(candidate.campus_id).await?;
        let documents = self.repository.documents_for(candidate_id).await?;
        let settings = self.intake_settings().await?;
        let window = settings.window().state_at(self.local_now());
        let accepting_uploads = window == WindowState::Open;
        let message = if accepting_uploads {
            settings.welcome_message.clone()
        } else {
            settings.inactive_message.clone()
        };

        Ok(CandidateDashboard {
            breakdown: StatusBreakdown::from_documents(&documents),
            candidate,
            course,
            campus,
            documents,
            window,
            accepting_uploads,
            message,
            max_file_size: settings.max_file_size,
        })
    }

    /// Stores one PDF and sends the consolidated status mail.
    pub async fn upload_document(
        &self,
        candidate_id: CandidateId,
        kind: &str,
        file: UploadedFile,
    ) -> Result<DocumentRecord, AdmissionsError> {
        let settings = self.require_open_window().await?;
        let candidate = self.candidate(candidate_id).await?;
        let record = self.store_upload(&candidate, &settings, kind, file).await?;
        self.notifier.all_documents_status(candidate_id).await;
        Ok(record)
    }

    /// Processes every `(kind, file)` pair independently; one consolidated mail follows
    /// when at least one file was accepted.
    pub async fn upload_batch(
        &self,
        candidate_id: CandidateId,
        files: Vec<(String, UploadedFile)>,
    ) -> Result<BatchOutcome, AdmissionsError> {
        let settings = self.require_open_window().await?;
        if files.is_empty() {
            return Err(AdmissionsError::NothingSelected);
        }
        let candidate = self.candidate(candidate_id).await?;

        let mut outcome = BatchOutcome::default();
        for (kind, file) in files {
            match self.store_upload(&candidate, &settings, &kind, file).await {
                Ok(record) => {
                    outcome.uploaded += 1;
                    outcome.documents.push(record);
                }
                Err(err) => {
                    outcome.failed += 1;
                    outcome.errors.push(format!("{kind}: {err}"));
                }
            }
        }

        if outcome.uploaded == 0 {
            return Err(AdmissionsError::NothingUploaded {
                errors: outcome.errors,
            });
        }

        self.notifier.all_documents_status(candidate_id).await;
        info!(
            %candidate_id,
            uploaded = outcome.uploaded,
            failed = outcome.failed,
            "batch upload processed"
        );
        Ok(outcome)
    }

    /// Withdraws a Not sent or Rejected document while the window is open.
    pub async fn remove_document(
        &self,
        candidate_id: CandidateId,
        document_id: DocumentId,
    ) -> Result<DocumentRecord, AdmissionsError> {
        self.require_open_window().await?;
        let document = self
            .repository
            .fetch_document(document_id)
            .await?
            .filter(|document| document.candidate_id == candidate_id)
            .ok_or(AdmissionsError::NotFound("document"))?;
        if !document.status.allows_removal() {
            return Err(AdmissionsError::DocumentLocked(document.status));
        }

        if let Some(file_name) = document.file_name.as_deref() {
            match self.store.remove(file_name).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        let reset = self.repository.reset_document(document_id, self.now()).await?;
        info!(%candidate_id, %document_id, "document withdrawn");
        Ok(reset)
    }

    /// Candidates may download their own files; staff need validation rights and scope.
    pub async fn download_document(
        &self,
        principal: &Principal,
        document_id: DocumentId,
    ) -> Result<DocumentDownload, AdmissionsError> {
        let document = self
            .repository
            .fetch_document(document_id)
            .await?
            .ok_or(AdmissionsError::NotFound("document"))?;

        match principal {
            Principal::Candidate { candidate_id } => {
                if *candidate_id != document.candidate_id {
                    return Err(AdmissionsError::NotFound("document"));
                }
            }
            Principal::Staff { staff } => {
                staff.require(Permission::ValidateDocuments)?;
                let candidate = self.candidate(document.candidate_id).await?;
                self.ensure_in_scope(staff, &candidate).await?;
            }
        }

        let file_name = document
            .file_name
            .ok_or(AdmissionsError::NotFound("file"))?;
        let bytes = match self.store.read(&file_name).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Err(AdmissionsError::NotFound("file")),
            Err(err) => return Err(err.into()),
        };
        let content_type = mime_guess::from_path(&file_name).first_or_octet_stream();

        Ok(DocumentDownload {
            file_name,
            content_type,
            bytes,
        })
    }

    pub(super) async fn candidate(
        &self,
        candidate_id: CandidateId,
    ) -> Result<Candidate, AdmissionsError> {
        self.repository
            .fetch_candidate(candidate_id)
            .await?
            .ok_or(AdmissionsError::NotFound("candidate"))
    }

    /// Stages the file, records it, then moves it over the stored name. A failed
    /// database write leaves the previous file in place.
    pub(crate) async fn store_upload(
        &self,
        candidate: &Candidate,
        settings: &IntakeSettings,
        kind: &str,
        file: UploadedFile,
    ) -> Result<DocumentRecord, AdmissionsError> {
        let kind = DocumentKind::recognized(kind)
            .ok_or_else(|| AdmissionsError::UnknownDocumentKind(kind.to_string()))?;
        validate_upload(&file, settings.max_file_size)?;

        let previous = self
            .repository
            .documents_for(candidate.id)
            .await?
            .into_iter()
            .find(|document| document.kind == kind)
            .and_then(|document| document.file_name);

        let file_name =
            document_file_name(&candidate.name, candidate.id, kind.label(), &candidate.enrollment);
        let staged = self.store.stage(&file_name, &file.bytes).await?;

        let upload = UploadRecord {
            name: kind.label().to_string(),
            kind,
            file_name: staged.file.file_name.clone(),
            original_name: original_file_name(&file.file_name),
            file_path: staged.file.path.clone(),
            file_size: staged.file.size,
            submitted_at: self.now(),
        };
        let record = match self.repository.record_upload(candidate.id, upload).await {
            Ok(record) => record,
            Err(err) => {
                if let Err(cleanup) = self.store.remove(&staged.staged_name).await {
                    warn!(file = %staged.staged_name, error = %cleanup, "staged file left behind");
                }
                return Err(err.into());
            }
        };
        self.store.commit(&staged).await?;
        let stored = staged.file;

        if let Some(previous) = previous.filter(|previous| *previous != stored.file_name) {
            if let Err(err) = self.store.remove(&previous).await {
                warn!(file = %previous, error = %err, "previous file not removed");
            }
        }

        info!(
            candidate_id = %candidate.id,
            document_id = %record.id,
            kind = %record.kind,
            size = stored.size,
            "document received"
        );
        Ok(record)
    }
}
