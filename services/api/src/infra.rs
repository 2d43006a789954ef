use metrics_exporter_prometheus::PrometheusHandle;
use sisu_docs::config::AppConfig;
use sisu_docs::error::AppError;
use sisu_docs::workflows::admissions::{
    AdmissionsService, FsDocumentStore, MemoryRepository, ServiceSettings,
    StaffContext, StaffRole, StaffUserId,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::mailer::AppMailer;
use crate::postgres::PgAdmissionsRepository;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Service<R> = AdmissionsService<R, FsDocumentStore, AppMailer>;

/// Admissions service bound to the storage selected by `DATABASE_URL`.
pub(crate) enum Backend {
    Memory(Arc<Service<MemoryRepository>>),
    Postgres(Arc<Service<PgAdmissionsRepository>>),
}

impl Backend {
    /// Connects storage and applies migrations when a database is configured.
    pub(crate) async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let store = Arc::new(FsDocumentStore::open(&config.storage.upload_dir).await?);
        let mailer = Arc::new(AppMailer::from_config(config.mail.clone()));
        if matches!(mailer.as_ref(), AppMailer::Log(_)) {
            warn!("SMTP_HOST not set; outgoing mail is only logged");
        }
        let settings = ServiceSettings::from(config);

        match &config.database.url {
            Some(url) => {
                let repository = PgAdmissionsRepository::connect(url, &config.database).await?;
                repository.run_migrations().await?;
                info!("postgres repository ready");
                Ok(Self::Postgres(Arc::new(AdmissionsService::new(
                    Arc::new(repository),
                    store,
                    mailer,
                    settings,
                ))))
            }
            None => {
                warn!("DATABASE_URL not set; candidates are kept in memory only");
                Ok(Self::Memory(Arc::new(AdmissionsService::new(
                    Arc::new(MemoryRepository::new()),
                    store,
                    mailer,
                    settings,
                ))))
            }
        }
    }
}

/// Full-permission context for tasks started from the command line.
pub(crate) fn operator_context() -> StaffContext {
    StaffContext {
        user_id: StaffUserId(0),
        permissions: StaffRole::Administrator.permissions(),
        secretariat_id: None,
    }
}
