mod directory;
mod maintenance;
mod portal;
mod review;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::config::{AppConfig, SiteConfig};
use crate::workflows::sisu_import::ImportError;

pub use directory::{CandidateDetail, StaffLogin};
pub use maintenance::{CleanupReport, MAX_REMINDER_DAYS};
pub use portal::{BatchOutcome, CandidateDashboard, CandidateLogin, DocumentDownload};
pub use review::DocumentReview;

use super::access::{AccessError, StaffContext};
use super::domain::{Candidate, DocumentStatus};
use super::notifier::{Mailer, Notifier};
use super::repository::{AdmissionsRepository, RepositoryError};
use super::session::{SessionError, SessionManager};
use super::settings::{IntakeSettings, SettingsError, WindowState};
use super::storage::{DocumentStore, StorageError};
use super::upload::UploadRejection;

/// Source of the current instant; swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Runtime values the service needs from the application configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub site: SiteConfig,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub secure_cookie: bool,
    /// Offset used to read the wall-clock intake window settings.
    pub utc_offset: FixedOffset,
}

impl From<&AppConfig> for ServiceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            site: config.site.clone(),
            session_secret: config.session.secret.clone(),
            session_ttl_hours: config.session.ttl_hours,
            secure_cookie: config.session.secure_cookie,
            utc_offset: config.intake.utc_offset,
        }
    }
}

/// Facade over candidates, documents, reviewers and the intake directory.
pub struct AdmissionsService<R, S, M> {
    repository: Arc<R>,
    store: Arc<S>,
    notifier: Notifier<R, M>,
    sessions: SessionManager,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl<R, S, M> AdmissionsService<R, S, M>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    pub fn new(repository: Arc<R>, store: Arc<S>, mailer: Arc<M>, settings: ServiceSettings) -> Self {
        let notifier = Notifier::new(
            Arc::clone(&repository),
            mailer,
            settings.site,
            settings.utc_offset,
        );
        let sessions = SessionManager::new(
            &settings.session_secret,
            settings.session_ttl_hours,
            settings.secure_cookie,
        );

        Self {
            repository,
            store,
            notifier,
            sessions,
            clock: Arc::new(SystemClock),
            offset: settings.utc_offset,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn notifier(&self) -> &Notifier<R, M> {
        &self.notifier
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current instant on the intake wall clock.
    pub fn local_now(&self) -> NaiveDateTime {
        self.clock.now().with_timezone(&self.offset).naive_local()
    }

    async fn intake_settings(&self) -> Result<IntakeSettings, AdmissionsError> {
        let store = self.repository.load_settings().await?;
        Ok(IntakeSettings::from_store(&store))
    }

    async fn require_open_window(&self) -> Result<IntakeSettings, AdmissionsError> {
        let settings = self.intake_settings().await?;
        match settings.window().state_at(self.local_now()) {
            WindowState::Open => Ok(settings),
            state => Err(AdmissionsError::IntakeClosed(state)),
        }
    }

    /// Staff without candidate management rights only reach their secretariat's course.
    async fn ensure_in_scope(
        &self,
        staff: &StaffContext,
        candidate: &Candidate,
    ) -> Result<(), AdmissionsError> {
        if !staff.is_scoped() {
            return Ok(());
        }
        let secretariat_id = staff.secretariat_id.ok_or(AdmissionsError::OutOfScope)?;
        let secretariat = self
            .repository
            .fetch_secretariat(secretariat_id)
            .await?
            .ok_or(AdmissionsError::OutOfScope)?;
        if secretariat.course_id == candidate.course_id
            && secretariat.campus_id == candidate.campus_id
        {
            Ok(())
        } else {
            Err(AdmissionsError::OutOfScope)
        }
    }
}

/// Error raised by the admissions service. Messages of candidate-facing variants are
/// shown verbatim in the portal.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionsError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Upload(#[from] UploadRejection),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("Dados de acesso inválidos. Verifique seu e-mail/CPF e número de inscrição.")]
    InvalidLogin,
    #[error("O sistema não está recebendo documentos no momento.")]
    IntakeClosed(WindowState),
    #[error("Tipo de documento inválido.")]
    UnknownDocumentKind(String),
    #[error("Este documento não pode ser removido.")]
    DocumentLocked(DocumentStatus),
    #[error("Nenhum documento foi selecionado.")]
    NothingSelected,
    #[error("Nenhum documento foi enviado com sucesso.")]
    NothingUploaded { errors: Vec<String> },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("record is outside the reviewer's secretariat")]
    OutOfScope,
    #[error("{0}")]
    Invalid(String),
}

impl AdmissionsError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
