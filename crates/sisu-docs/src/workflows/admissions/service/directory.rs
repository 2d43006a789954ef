use serde::Serialize;
use tracing::info;
use validator::ValidateEmail;

use crate::workflows::admissions::access::{
    hash_password, verify_password, AccessError, NewStaffUser, Permission, StaffContext,
    StaffRole, StaffUser,
};
use crate::workflows::admissions::domain::{
    Campus, CampusId, Candidate, CandidateId, Course, CourseId, DocumentRecord, NewCourse,
    NewSecretariat, Secretariat, SecretariatId, StaffUserId, StatusBreakdown,
};
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::provisioning::required_documents;
use crate::workflows::admissions::repository::{
    AdmissionsRepository, AdmissionsStats, CandidateFilter, NewStaffRecord,
};
use crate::workflows::admissions::session::{IssuedSession, Principal, SessionError};
use crate::workflows::admissions::settings::{IntakeSettings, SettingsUpdate};
use crate::workflows::admissions::storage::DocumentStore;
use crate::workflows::sisu_import::{ImportOptions, ImportReport, SisuImporter};

use super::{AdmissionsError, AdmissionsService};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateDetail {
    pub candidate: Candidate,
    pub course: Option<Course>,
    pub campus: Option<Campus>,
    pub documents: Vec<DocumentRecord>,
    pub breakdown: StatusBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffLogin {
    pub user: StaffUser,
    pub session: IssuedSession,
}

fn required_name(raw: &str, field: &str) -> Result<String, AdmissionsError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(AdmissionsError::invalid(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn valid_email(raw: &str) -> Result<String, AdmissionsError> {
    let trimmed = raw.trim();
    if trimmed.validate_email() {
        Ok(trimmed.to_string())
    } else {
        Err(AdmissionsError::invalid(format!(
            "'{trimmed}' is not a valid email address"
        )))
    }
}

impl<R, S, M> AdmissionsService<R, S, M>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    pub async fn list_campuses(&self, staff: &StaffContext) -> Result<Vec<Campus>, AdmissionsError> {
        staff.require(Permission::ValidateDocuments)?;
        Ok(self.repository.list_campuses().await?)
    }

    pub async fn create_campus(
        &self,
        staff: &StaffContext,
        name: &str,
    ) -> Result<Campus, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let name = required_name(name, "campus name")?;
        Ok(self.repository.insert_campus(&name).await?)
    }

    pub async fn rename_campus(
        &self,
        staff: &StaffContext,
        id: CampusId,
        name: &str,
    ) -> Result<Campus, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let name = required_name(name, "campus name")?;
        Ok(self.repository.rename_campus(id, &name).await?)
    }

    pub async fn delete_campus(&self, staff: &StaffContext, id: CampusId) -> Result<(), AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        Ok(self.repository.delete_campus(id).await?)
    }

    pub async fn list_courses(
        &self,
        staff: &StaffContext,
        campus_id: Option<CampusId>,
    ) -> Result<Vec<Course>, AdmissionsError> {
        staff.require(Permission::ValidateDocuments)?;
        Ok(self.repository.list_courses(campus_id).await?)
    }

    pub async fn create_course(
        &self,
        staff: &StaffContext,
        course: NewCourse,
    ) -> Result<Course, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let name = required_name(&course.name, "course name")?;
        self.repository
            .fetch_campus(course.campus_id)
            .await?
            .ok_or(AdmissionsError::NotFound("campus"))?;
        Ok(self
            .repository
            .insert_course(NewCourse {
                name,
                campus_id: course.campus_id,
            })
            .await?)
    }

    pub async fn update_course(
        &self,
        staff: &StaffContext,
        id: CourseId,
        course: NewCourse,
    ) -> Result<Course, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let name = required_name(&course.name, "course name")?;
        self.repository
            .fetch_campus(course.campus_id)
            .await?
            .ok_or(AdmissionsError::NotFound("campus"))?;
        Ok(self
            .repository
            .update_course(Course {
                id,
                name,
                campus_id: course.campus_id,
            })
            .await?)
    }

    pub async fn delete_course(&self, staff: &StaffContext, id: CourseId) -> Result<(), AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        Ok(self.repository.delete_course(id).await?)
    }

    pub async fn list_secretariats(
        &self,
        staff: &StaffContext,
    ) -> Result<Vec<Secretariat>, AdmissionsError> {
        staff.require(Permission::ValidateDocuments)?;
        Ok(self.repository.list_secretariats().await?)
    }

    pub async fn create_secretariat(
        &self,
        staff: &StaffContext,
        secretariat: NewSecretariat,
    ) -> Result<Secretariat, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let secretariat = self.checked_secretariat(secretariat).await?;
        Ok(self.repository.insert_secretariat(secretariat).await?)
    }

    pub async fn update_secretariat(
        &self,
        staff: &StaffContext,
        id: SecretariatId,
        secretariat: NewSecretariat,
    ) -> Result<Secretariat, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let checked = self.checked_secretariat(secretariat).await?;
        Ok(self
            .repository
            .update_secretariat(Secretariat {
                id,
                name: checked.name,
                email: checked.email,
                course_id: checked.course_id,
                campus_id: checked.campus_id,
            })
            .await?)
    }

    pub async fn delete_secretariat(
        &self,
        staff: &StaffContext,
        id: SecretariatId,
    ) -> Result<(), AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        Ok(self.repository.delete_secretariat(id).await?)
    }

    async fn checked_secretariat(
        &self,
        secretariat: NewSecretariat,
    ) -> Result<NewSecretariat, AdmissionsError> {
        let name = required_name(&secretariat.name, "secretariat name")?;
        let email = valid_email(&secretariat.email)?;
        let course = self
            .repository
            .fetch_course(secretariat.course_id)
            .await?
            .ok_or(AdmissionsError::NotFound("course"))?;
        if course.campus_id != secretariat.campus_id {
            return Err(AdmissionsError::invalid(
                "course is not offered at the selected campus",
            ));
        }
        Ok(NewSecretariat {
            name,
            email,
            course_id: secretariat.course_id,
            campus_id: secretariat.campus_id,
        })
    }

    /// Scoped reviewers always get their own course and campus, whatever the filter asks.
    pub async fn list_candidates(
        &self,
        staff: &StaffContext,
        mut filter: CandidateFilter,
    ) -> Result<Vec<Candidate>, AdmissionsError> {
        staff.require(Permission::ValidateDocuments)?;
        if staff.is_scoped() {
            let secretariat_id = staff.secretariat_id.ok_or(AdmissionsError::OutOfScope)?;
            let secretariat = self
                .repository
                .fetch_secretariat(secretariat_id)
                .await?
                .ok_or(AdmissionsError::OutOfScope)?;
            filter.course_id = Some(secretariat.course_id);
            filter.campus_id = Some(secretariat.campus_id);
        }
        Ok(self.repository.list_candidates(&filter).await?)
    }

    pub async fn candidate_detail(
        &self,
        staff: &StaffContext,
        candidate_id: CandidateId,
    ) -> Result<CandidateDetail, AdmissionsError> {
        staff.require(Permission::ValidateDocuments)?;
        let candidate = self.candidate(candidate_id).await?;
        self.ensure_in_scope(staff, &candidate).await?;

        let course = self.repository.fetch_course(candidate.course_id).await?;
        let campus = self.repository.fetch_campus(candidate.campus_id).await?;
        let documents = self.repository.documents_for(candidate_id).await?;
        Ok(CandidateDetail {
            breakdown: StatusBreakdown::from_documents(&documents),
            candidate,
            course,
            campus,
            documents,
        })
    }

    /// Creates rows for document kinds the candidate is missing; returns how many.
    pub async fn ensure_documents(
        &self,
        staff: &StaffContext,
        candidate_id: CandidateId,
    ) -> Result<usize, AdmissionsError> {
        staff.require(Permission::ManageCandidates)?;
        let candidate = self.candidate(candidate_id).await?;
        let requirements = required_documents(candidate.modality_kind(), candidate.sex);
        let created = self
            .repository
            .insert_missing_documents(candidate_id, &requirements)
            .await?;
        if created > 0 {
            info!(%candidate_id, created, "missing document rows created");
        }
        Ok(created)
    }

    pub async fn statistics(&self, staff: &StaffContext) -> Result<AdmissionsStats, AdmissionsError> {
        staff.require(Permission::ViewReports)?;
        Ok(self.repository.statistics().await?)
    }

    pub async fn settings(&self, staff: &StaffContext) -> Result<IntakeSettings, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        self.intake_settings().await
    }

    pub async fn update_settings(
        &self,
        staff: &StaffContext,
        update: SettingsUpdate,
    ) -> Result<IntakeSettings, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        let next = self.intake_settings().await?.apply(update)?;
        self.repository.store_settings(&next.to_store()).await?;
        info!(
            reviewer = %staff.user_id,
            active = next.system_active,
            "intake settings updated"
        );
        Ok(next)
    }

    pub async fn import_candidates(
        &self,
        staff: &StaffContext,
        csv: &[u8],
        options: ImportOptions,
    ) -> Result<ImportReport, AdmissionsError> {
        staff.require(Permission::ManageCandidates)?;
        let importer = SisuImporter::new(self.repository.as_ref(), &self.notifier, self.now());
        Ok(importer.import(csv, options).await?)
    }

    pub async fn staff_login(&self, email: &str, password: &str) -> Result<StaffLogin, AdmissionsError> {
        let user = self
            .repository
            .find_staff_by_email(email.trim())
            .await?
            .filter(|user| verify_password(&user.password_hash, password))
            .ok_or(AccessError::InvalidCredentials)?;
        let session = self.sessions.issue(
            Principal::Staff {
                staff: user.context(),
            },
            self.now(),
        )?;
        info!(staff_id = %user.id, role = user.role.key(), "staff signed in");
        Ok(StaffLogin { user, session })
    }

    /// Rebuilds a token's staff context from the stored account, so deleted or
    /// re-roled staff lose the rights their token still carries.
    pub async fn current_staff(&self, claimed: &StaffContext) -> Result<StaffContext, AdmissionsError> {
        let user = self
            .repository
            .find_staff_by_id(claimed.user_id)
            .await?
            .ok_or(SessionError::Revoked)?;
        Ok(user.context())
    }

    pub async fn list_staff(&self, staff: &StaffContext) -> Result<Vec<StaffUser>, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        Ok(self.repository.list_staff().await?)
    }

    pub async fn create_staff(
        &self,
        staff: &StaffContext,
        user: NewStaffUser,
    ) -> Result<StaffUser, AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        self.register_staff(user).await
    }

    pub async fn delete_staff(&self, staff: &StaffContext, id: StaffUserId) -> Result<(), AdmissionsError> {
        staff.require(Permission::ManageSystem)?;
        if staff.user_id == id {
            return Err(AdmissionsError::invalid("staff members cannot delete themselves"));
        }
        Ok(self.repository.delete_staff(id).await?)
    }

    /// Operator path used before any administrator exists.
    pub async fn bootstrap_administrator(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<StaffUser, AdmissionsError> {
        self.register_staff(NewStaffUser {
            name: name.to_string(),
            email: email.to_string(),
            role: StaffRole::Administrator,
            secretariat_id: None,
            password: password.to_string(),
        })
        .await
    }

    async fn register_staff(&self, user: NewStaffUser) -> Result<StaffUser, AdmissionsError> {
        let name = required_name(&user.name, "name")?;
        let email = valid_email(&user.email)?;
        if user.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AdmissionsError::invalid(format!(
                "password must have at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if user.role == StaffRole::Secretary && user.secretariat_id.is_none() {
            return Err(AdmissionsError::invalid(
                "secretaries must be assigned to a secretariat",
            ));
        }

        let created = self
            .repository
            .insert_staff(NewStaffRecord {
                name,
                email,
                role: user.role,
                secretariat_id: user.secretariat_id,
                password_hash: hash_password(&user.password)?,
            })
            .await?;
        info!(staff_id = %created.id, role = created.role.key(), "staff member created");
        Ok(created)
    }
}
