//! Operator commands run once from the command line, usually from cron.

use crate::infra::{operator_context, Backend, Service};
use crate::postgres::PgAdmissionsRepository;
use clap::Args;
use sisu_docs::config::{AppConfig, ConfigError};
use sisu_docs::error::AppError;
use sisu_docs::workflows::admissions::service::MAX_REMINDER_DAYS;
use sisu_docs::workflows::admissions::AdmissionsRepository;
use sisu_docs::workflows::sisu_import::{ImportOptions, ImportReport};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// SiSU CSV export to read
    pub(crate) csv: PathBuf,
    /// Delete every candidate and document before importing
    #[arg(long)]
    pub(crate) clear_existing: bool,
    /// Send the welcome mail to each imported candidate
    #[arg(long)]
    pub(crate) welcome: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RemindArgs {
    /// Send reminders once the intake closes within this many days
    #[arg(
        long,
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_REMINDER_DAYS))
    )]
    pub(crate) days: u32,
}

#[derive(Args, Debug)]
pub(crate) struct CreateAdminArgs {
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) email: String,
    /// At least eight characters
    #[arg(long)]
    pub(crate) password: String,
}

#[derive(Debug)]
pub(crate) enum Task {
    Import(ImportArgs),
    Remind(RemindArgs),
    DailyReport,
    Cleanup,
    CreateAdmin(CreateAdminArgs),
}

pub(crate) async fn migrate(config: &AppConfig) -> Result<(), AppError> {
    let url = config
        .database
        .url
        .as_deref()
        .ok_or(ConfigError::MissingVar("DATABASE_URL"))?;
    let repository = PgAdmissionsRepository::connect(url, &config.database).await?;
    repository.run_migrations().await?;
    println!("Database schema is up to date");
    Ok(())
}

pub(crate) async fn run(config: &AppConfig, task: Task) -> Result<(), AppError> {
    match Backend::connect(config).await? {
        Backend::Memory(service) => {
            warn!("running without DATABASE_URL; changes are discarded on exit");
            task.run(&service).await
        }
        Backend::Postgres(service) => task.run(&service).await,
    }
}

impl Task {
    async fn run<R>(self, service: &Service<R>) -> Result<(), AppError>
    where
        R: AdmissionsRepository + 'static,
    {
        match self {
            Task::Import(args) => {
                let csv = tokio::fs::read(&args.csv).await?;
                let options = ImportOptions {
                    clear_existing: args.clear_existing,
                    send_welcome: args.welcome,
                };
                let report = service
                    .import_candidates(&operator_context(), &csv, options)
                    .await?;
                info!(
                    file = %args.csv.display(),
                    imported = report.successful_imports,
                    failed = report.failed_imports,
                    "candidate import finished"
                );
                print_import_report(&report);
            }
            Task::Remind(args) => {
                let sent = service.send_deadline_reminders(args.days).await?;
                println!("Sent {sent} deadline reminder(s)");
            }
            Task::DailyReport => {
                if service.send_daily_report().await? {
                    println!("Daily report sent");
                } else {
                    println!("Daily report skipped: no activity today or no administrator address");
                }
            }
            Task::Cleanup => {
                let report = service.run_cleanup().await?;
                println!(
                    "Removed {} obsolete document row(s) and {} orphaned file(s)",
                    report.obsolete_documents,
                    report.orphaned_files.len()
                );
                for file in &report.orphaned_files {
                    println!("  - {file}");
                }
            }
            Task::CreateAdmin(args) => {
                let user = service
                    .bootstrap_administrator(&args.name, &args.email, &args.password)
                    .await?;
                println!("Administrator {} created (id {})", user.email, user.id);
            }
        }
        Ok(())
    }
}

fn print_import_report(report: &ImportReport) {
    println!(
        "Imported {} of {} row(s); {} failed",
        report.successful_imports, report.total_rows, report.failed_imports
    );
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
}
