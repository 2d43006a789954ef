use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::admissions::access::{Permission, StaffContext};
use crate::workflows::admissions::domain::DocumentKind;
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::repository::AdmissionsRepository;
use crate::workflows::admissions::storage::DocumentStore;

use super::{AdmissionsError, AdmissionsService};

/// Longest lead time, in days, for deadline reminders.
pub const MAX_REMINDER_DAYS: u32 = 365;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub obsolete_documents: u64,
    pub orphaned_files: Vec<String>,
}

impl<R, S, M> AdmissionsService<R, S, M>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    /// Deletes rows of document kinds that are no longer requested.
    pub async fn cleanup_obsolete_documents(&self) -> Result<u64, AdmissionsError> {
        let removed = self
            .repository
            .delete_documents_of_kinds(&DocumentKind::OBSOLETE_KEYS)
            .await?;
        if removed > 0 {
            info!(removed, "obsolete document rows deleted");
        }
        Ok(removed)
    }

    /// Removes stored files that no document row references.
    pub async fn cleanup_orphaned_files(&self) -> Result<Vec<String>, AdmissionsError> {
        let referenced: HashSet<String> = self
            .repository
            .stored_file_names()
            .await?
            .into_iter()
            .collect();

        let mut removed = Vec::new();
        for file_name in self.store.list().await? {
            if referenced.contains(&file_name) {
                continue;
            }
            match self.store.remove(&file_name).await {
                Ok(()) => removed.push(file_name),
                Err(err) => warn!(file = %file_name, error = %err, "orphaned file not removed"),
            }
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "orphaned files deleted");
        }
        Ok(removed)
    }

    /// Obsolete rows go first so their files are collected as orphans.
    pub async fn run_cleanup(&self) -> Result<CleanupReport, AdmissionsError> {
        let obsolete_documents = self.cleanup_obsolete_documents().await?;
        let orphaned_files = self.cleanup_orphaned_files().await?;
        Ok(CleanupReport {
            obsolete_documents,
            orphaned_files,
        })
    }

    pub async fn maintenance_cleanup(
        &self,
        staff: &StaffContext,
    ) -> Result<CleanupReport, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        self.run_cleanup().await
    }

    pub async fn send_deadline_reminders(&self, days: u32) -> Result<usize, AdmissionsError> {
        if !(1..=MAX_REMINDER_DAYS).contains(&days) {
            return Err(AdmissionsError::invalid(format!(
                "reminder period must be between 1 and {MAX_REMINDER_DAYS} days"
            )));
        }
        Ok(self.notifier.deadline_reminder(days, self.now()).await?)
    }

    /// Reports the current local day.
    pub async fn send_daily_report(&self) -> Result<bool, AdmissionsError> {
        let today = self.local_now().date();
        Ok(self.notifier.daily_report(today).await?)
    }
}
