use crate::server;
use crate::tasks::{self, CreateAdminArgs, ImportArgs, RemindArgs, Task};
use clap::{Args, Parser, Subcommand};
use sisu_docs::config::AppConfig;
use sisu_docs::error::AppError;
use sisu_docs::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "SiSU Docs",
    about = "Run the SiSU admissions document intake service and its operator tasks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply pending database migrations and exit
    Migrate,
    /// Import candidates from a SiSU CSV export
    Import(ImportArgs),
    /// Mail candidates with outstanding documents when the deadline is near
    Remind(RemindArgs),
    /// Mail the daily activity summary to the administrator address
    DailyReport,
    /// Remove obsolete document rows and files no row references
    Cleanup,
    /// Create an administrator account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Migrate => tasks::migrate(&config).await,
        Command::Import(args) => tasks::run(&config, Task::Import(args)).await,
        Command::Remind(args) => tasks::run(&config, Task::Remind(args)).await,
        Command::DailyReport => tasks::run(&config, Task::DailyReport).await,
        Command::Cleanup => tasks::run(&config, Task::Cleanup).await,
        Command::CreateAdmin(args) => tasks::run(&config, Task::CreateAdmin(args)).await,
    }
}
