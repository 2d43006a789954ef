//! Mail notifications for candidates, secretariats and administrators.
//!
//! Delivery failures are logged and swallowed so that a broken mail transport never
//! blocks document intake or review.

pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::SiteConfig;

use super::domain::{Candidate, CandidateId, DocumentRecord, DocumentStatus};
use super::repository::{AdmissionsRepository, RepositoryError, RepositoryResult};
use super::settings::IntakeSettings;
use templates::{CandidateDetails, MailContent};

/// A plaintext message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid recipient '{0}'")]
    InvalidRecipient(String),
    #[error("mail transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

pub struct Notifier<R, M> {
    repository: Arc<R>,
    mailer: Arc<M>,
    site: SiteConfig,
    offset: FixedOffset,
}

impl<R, M> Notifier<R, M>
where
    R: AdmissionsRepository + 'static,
    M: Mailer + 'static,
{
    pub fn new(repository: Arc<R>, mailer: Arc<M>, site: SiteConfig, offset: FixedOffset) -> Self {
        Self {
            repository,
            mailer,
            site,
            offset,
        }
    }

    /// Candidate mail for a single status change; awaiting documents also alert reviewers.
    pub async fn document_status_changed(&self, document: &DocumentRecord) {
        if let Err(err) = self.try_document_status_changed(document).await {
            warn!(document_id = %document.id, error = %err, "status notification skipped");
        }
    }

    async fn try_document_status_changed(&self, document: &DocumentRecord) -> RepositoryResult<()> {
        let settings = self.settings().await?;
        if !settings.email_notifications {
            return Ok(());
        }
        let Some(candidate) = self.repository.fetch_candidate(document.candidate_id).await? else {
            return Ok(());
        };
        let details = self.details(&candidate).await?;

        if let Some(content) = templates::status_change(
            &details,
            document.display_name(),
            document.status,
            document.notes.as_deref(),
        ) {
            self.deliver(&candidate.email, content).await;
        }

        if document.status == DocumentStatus::AwaitingValidation {
            let mut reviewers = Vec::new();
            if let Some(secretariat) = self
                .repository
                .secretariat_for(candidate.course_id, candidate.campus_id)
                .await?
            {
                reviewers.push(secretariat.email);
            }
            if let Some(admin) = settings.admin_email {
                reviewers.push(admin);
            }

            let submitted = document
                .submitted_at
                .map(|at| at.with_timezone(&self.offset).naive_local());
            for reviewer in reviewers {
                let content = templates::validation_request(
                    &details,
                    document.display_name(),
                    submitted,
                    &self.site.admin_url,
                );
                self.deliver(&reviewer, content).await;
            }
        }

        Ok(())
    }

    /// One consolidated breakdown to the candidate and the reviewing secretariat.
    pub async fn all_documents_status(&self, candidate_id: CandidateId) {
        if let Err(err) = self.try_all_documents_status(candidate_id).await {
            warn!(%candidate_id, error = %err, "consolidated notification skipped");
        }
    }

    async fn try_all_documents_status(&self, candidate_id: CandidateId) -> RepositoryResult<()> {
        if !self.settings().await?.email_notifications {
            return Ok(());
        }
        let Some(candidate) = self.repository.fetch_candidate(candidate_id).await? else {
            return Ok(());
        };
        let mut documents = self.repository.documents_for(candidate_id).await?;
        if documents.is_empty() {
            debug!(%candidate_id, "no documents to summarize");
            return Ok(());
        }
        documents.sort_by(|a, b| a.kind.key().cmp(b.kind.key()));

        let details = self.details(&candidate).await?;
        let summary = templates::candidate_summary(&details, &documents, &self.site.portal_url);
        self.deliver(&candidate.email, summary).await;

        if let Some(secretariat) = self
            .repository
            .secretariat_for(candidate.course_id, candidate.campus_id)
            .await?
        {
            let summary =
                templates::secretariat_summary(&details, &documents, &self.site.admin_url);
            self.deliver(&secretariat.email, summary).await;
        }

        Ok(())
    }

    pub async fn welcome(&self, candidate: &Candidate) {
        let result = async {
            let settings = self.settings().await?;
            if !settings.email_notifications {
                return Ok(());
            }
            let details = self.details(candidate).await?;
            let content =
                templates::welcome(&details, &settings.welcome_message, &self.site.portal_url);
            self.deliver(&candidate.email, content).await;
            Ok::<(), RepositoryError>(())
        }
        .await;

        if let Err(err) = result {
            warn!(candidate_id = %candidate.id, error = %err, "welcome mail skipped");
        }
    }

    /// Reminds candidates with outstanding documents once `now` is within `days` of the
    /// intake end. Returns the number of delivered reminders.
    pub async fn deadline_reminder(&self, days: u32, now: DateTime<Utc>) -> RepositoryResult<usize> {
        let settings = self.settings().await?;
        if !settings.email_notifications {
            return Ok(0);
        }
        let Some(deadline) = settings.intake_end else {
            debug!("no intake end configured; reminders skipped");
            return Ok(0);
        };

        let Some(opens) = Duration::try_days(i64::from(days))
            .and_then(|lead| deadline.checked_sub_signed(lead))
        else {
            warn!(days, "reminder period reaches outside the calendar");
            return Ok(0);
        };
        let local_now = now.with_timezone(&self.offset).naive_local();
        if local_now < opens || local_now > deadline {
            debug!(days, "outside reminder period");
            return Ok(0);
        }

        let mut delivered = 0;
        for (candidate, outstanding) in self.repository.candidates_with_outstanding_documents().await? {
            let details = self.details(&candidate).await?;
            let content = templates::deadline_reminder(
                &details,
                days,
                deadline,
                outstanding,
                &self.site.portal_url,
            );
            if self.deliver(&candidate.email, content).await {
                delivered += 1;
            }
        }

        info!(days, delivered, "deadline reminders dispatched");
        Ok(delivered)
    }

    /// Sends the activity report for `day` to the administrator. Quiet days send nothing.
    pub async fn daily_report(&self, day: NaiveDate) -> RepositoryResult<bool> {
        let settings = self.settings().await?;
        if !settings.email_notifications {
            return Ok(false);
        }
        let Some(admin) = settings.admin_email else {
            debug!("no administrator address configured; daily report skipped");
            return Ok(false);
        };

        let Some((from, until)) = day_bounds(day, self.offset) else {
            return Ok(false);
        };
        let activity = self.repository.activity_between(from, until).await?;
        if activity.is_quiet() {
            debug!(%day, "no activity; daily report skipped");
            return Ok(false);
        }

        let content = templates::daily_report(day, &activity, &self.site.admin_url);
        Ok(self.deliver(&admin, content).await)
    }

    async fn settings(&self) -> RepositoryResult<IntakeSettings> {
        let store = self.repository.load_settings().await?;
        Ok(IntakeSettings::from_store(&store))
    }

    async fn details(&self, candidate: &Candidate) -> RepositoryResult<CandidateDetails> {
        let course = self.repository.fetch_course(candidate.course_id).await?;
        let campus = self.repository.fetch_campus(candidate.campus_id).await?;
        Ok(CandidateDetails {
            name: candidate.name.clone(),
            enrollment: candidate.enrollment.clone(),
            email: candidate.email.clone(),
            course: course.map(|course| course.name).unwrap_or_default(),
            campus: campus.map(|campus| campus.name).unwrap_or_default(),
        })
    }

    async fn deliver(&self, to: &str, content: MailContent) -> bool {
        let to = to.trim();
        if to.is_empty() {
            return false;
        }
        let mail = OutgoingMail {
            to: to.to_string(),
            subject: format!("[{}] {}", self.site.name, content.subject),
            body: content.body,
        };
        let subject = mail.subject.clone();
        match self.mailer.send(mail).await {
            Ok(()) => {
                debug!(to, subject = %subject, "mail sent");
                true
            }
            Err(err) => {
                warn!(to, subject = %subject, error = %err, "mail delivery failed");
                false
            }
        }
    }
}

/// UTC bounds of a local calendar day.
fn day_bounds(day: NaiveDate, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = day
        .and_hms_opt(0, 0, 0)?
        .and_local_timezone(offset)
        .single()?
        .with_timezone(&Utc);
    Some((start, start + Duration::days(1)))
}
