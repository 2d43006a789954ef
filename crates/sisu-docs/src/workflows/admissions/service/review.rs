use serde::Deserialize;
use tracing::info;

use crate::workflows::admissions::access::{Permission, StaffContext};
use crate::workflows::admissions::domain::{
    CandidateId, DocumentId, DocumentRecord, DocumentStatus,
};
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::repository::{
    AdmissionsRepository, DocumentFilter, StatusChange,
};
use crate::workflows::admissions::storage::DocumentStore;

use super::{AdmissionsError, AdmissionsService};

/// One reviewer decision inside a bulk review.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentReview {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl<R, S, M> AdmissionsService<R, S, M>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    /// Persists one decision and mails the candidate about that document.
    pub async fn set_document_status(
        &self,
        reviewer: &StaffContext,
        document_id: DocumentId,
        status: DocumentStatus,
        notes: Option<String>,
    ) -> Result<DocumentRecord, AdmissionsError> {
        reviewer.require(Permission::ValidateDocuments)?;
        let document = self
            .repository
            .fetch_document(document_id)
            .await?
            .ok_or(AdmissionsError::NotFound("document"))?;
        let candidate = self.candidate(document.candidate_id).await?;
        self.ensure_in_scope(reviewer, &candidate).await?;

        let updated = self
            .repository
            .set_document_status(document_id, self.status_change(reviewer, status, notes))
            .await?;
        info!(
            %document_id,
            reviewer = %reviewer.user_id,
            status = status.api_name(),
            "document reviewed"
        );

        self.notifier.document_status_changed(&updated).await;
        Ok(updated)
    }

    /// Applies several decisions for one candidate and sends a single consolidated mail.
    pub async fn review_candidate_documents(
        &self,
        reviewer: &StaffContext,
        candidate_id: CandidateId,
        reviews: Vec<DocumentReview>,
    ) -> Result<Vec<DocumentRecord>, AdmissionsError> {
        reviewer.require(Permission::ValidateDocuments)?;
        if reviews.is_empty() {
            return Err(AdmissionsError::invalid("no document decisions supplied"));
        }
        let candidate = self.candidate(candidate_id).await?;
        self.ensure_in_scope(reviewer, &candidate).await?;

        let owned = self.repository.documents_for(candidate_id).await?;
        if let Some(stranger) = reviews
            .iter()
            .find(|review| !owned.iter().any(|document| document.id == review.document_id))
        {
            return Err(AdmissionsError::invalid(format!(
                "document {} does not belong to candidate {candidate_id}",
                stranger.document_id
            )));
        }

        let mut updated = Vec::with_capacity(reviews.len());
        for review in reviews {
            let change = self.status_change(reviewer, review.status, review.notes);
            updated.push(
                self.repository
                    .set_document_status(review.document_id, change)
                    .await?,
            );
        }
        info!(
            %candidate_id,
            reviewer = %reviewer.user_id,
            documents = updated.len(),
            "candidate documents reviewed"
        );

        self.notifier.all_documents_status(candidate_id).await;
        Ok(updated)
    }

    /// Secretaries only see documents of their secretariat's course and campus.
    pub async fn list_documents(
        &self,
        reviewer: &StaffContext,
        mut filter: DocumentFilter,
    ) -> Result<Vec<DocumentRecord>, AdmissionsError> {
        reviewer.require(Permission::ValidateDocuments)?;
        if reviewer.is_scoped() {
            let secretariat_id = reviewer.secretariat_id.ok_or(AdmissionsError::OutOfScope)?;
            let secretariat = self
                .repository
                .fetch_secretariat(secretariat_id)
                .await?
                .ok_or(AdmissionsError::OutOfScope)?;
            filter.course_id = Some(secretariat.course_id);
            filter.campus_id = Some(secretariat.campus_id);
        }
        Ok(self.repository.list_documents(&filter).await?)
    }

    fn status_change(
        &self,
        reviewer: &StaffContext,
        status: DocumentStatus,
        notes: Option<String>,
    ) -> StatusChange {
        StatusChange {
            status,
            notes: notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
            reviewed_by: Some(reviewer.user_id),
            changed_at: self.now(),
        }
    }
}
