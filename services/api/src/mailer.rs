use std::time::Duration;

use async_trait::async_trait;
use mail_send::mail_builder::MessageBuilder;
use mail_send::{Credentials, SmtpClientBuilder};
use sisu_docs::config::{MailConfig, SmtpEncryption};
use sisu_docs::workflows::admissions::{MailError, Mailer, OutgoingMail};
use tracing::info;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers mail through the configured SMTP relay, one connection per message.
pub(crate) struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub(crate) fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> SmtpClientBuilder<String> {
        let mut builder = SmtpClientBuilder::new(self.config.host.clone(), self.config.port)
            .implicit_tls(self.config.encryption == SmtpEncryption::Implicit)
            .timeout(SMTP_TIMEOUT);
        if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        builder
    }
}

fn transport(err: mail_send::Error) -> MailError {
    MailError::Transport(err.to_string())
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if !mail.to.contains('@') {
            return Err(MailError::InvalidRecipient(mail.to));
        }

        let message = MessageBuilder::new()
            .from((
                self.config.from_name.as_str(),
                self.config.from_address.as_str(),
            ))
            .to(mail.to.as_str())
            .subject(mail.subject.as_str())
            .text_body(mail.body.as_str());

        match self.config.encryption {
            SmtpEncryption::None => {
                self.client()
                    .connect_plain()
                    .await
                    .map_err(transport)?
                    .send(message)
                    .await
                    .map_err(transport)?;
            }
            SmtpEncryption::StartTls | SmtpEncryption::Implicit => {
                self.client()
                    .connect()
                    .await
                    .map_err(transport)?
                    .send(message)
                    .await
                    .map_err(transport)?;
            }
        }
        Ok(())
    }
}

/// Writes outgoing mail to the log when no SMTP relay is configured.
#[derive(Default)]
pub(crate) struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail delivery skipped; SMTP not configured");
        Ok(())
    }
}

/// Mail transport selected from configuration at startup.
pub(crate) enum AppMailer {
    Smtp(SmtpMailer),
    Log(LogMailer),
}

impl AppMailer {
    pub(crate) fn from_config(config: Option<MailConfig>) -> Self {
        match config {
            Some(config) => Self::Smtp(SmtpMailer::new(config)),
            None => Self::Log(LogMailer),
        }
    }
}

#[async_trait]
impl Mailer for AppMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        match self {
            Self::Smtp(mailer) => mailer.send(mail).await,
            Self::Log(mailer) => mailer.send(mail).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let mailer = AppMailer::from_config(None);
        let result = mailer
            .send(OutgoingMail {
                to: "candidato@example.com".to_string(),
                subject: "Teste".to_string(),
                body: "corpo".to_string(),
            })
            .await;
        assert!(result.is_ok());
        assert!(matches!(mailer, AppMailer::Log(_)));
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_malformed_recipients_before_connecting() {
        let mailer = SmtpMailer::new(MailConfig {
            host: "smtp.invalid".to_string(),
            port: 2525,
            username: None,
            password: None,
            encryption: SmtpEncryption::None,
            from_address: "sisu@example.edu.br".to_string(),
            from_name: "SiSU Docs".to_string(),
        });
        let result = mailer
            .send(OutgoingMail {
                to: "sem-arroba".to_string(),
                subject: "Teste".to_string(),
                body: "corpo".to_string(),
            })
            .await;
        assert!(matches!(result, Err(MailError::InvalidRecipient(to)) if to == "sem-arroba"));
    }
}
