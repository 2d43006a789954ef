mod cli;
mod infra;
mod mailer;
mod postgres;
mod routes;
mod server;
mod tasks;

use sisu_docs::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
