use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::{download_response, field_is, read_form, with_cookie, FormPart};
use crate::workflows::admissions::access::{AccessError, NewStaffUser, StaffContext};
use crate::workflows::admissions::domain::{
    CampusId, CandidateId, CourseId, DocumentId, DocumentStatus, NewCourse, NewSecretariat,
    SecretariatId, StaffUserId,
};
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::repository::{
    AdmissionsRepository, CandidateFilter, DocumentFilter, RepositoryError,
};
use crate::workflows::admissions::service::{AdmissionsError, AdmissionsService, DocumentReview};
use crate::workflows::admissions::session::Principal;
use crate::workflows::admissions::settings::SettingsUpdate;
use crate::workflows::admissions::storage::DocumentStore;
use crate::workflows::sisu_import::ImportOptions;

type SharedService<R, S, M> = Arc<AdmissionsService<R, S, M>>;

/// Staff endpoints for review, directory management and intake settings.
pub fn admin_router<R, S, M>(service: SharedService<R, S, M>) -> Router
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .route("/api/v1/admin/login", post(login_handler::<R, S, M>))
        .route(
            "/api/v1/admin/campuses",
            get(list_campuses_handler::<R, S, M>).post(create_campus_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/campuses/:campus_id",
            put(rename_campus_handler::<R, S, M>).delete(delete_campus_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/courses",
            get(list_courses_handler::<R, S, M>).post(create_course_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/courses/:course_id",
            put(update_course_handler::<R, S, M>).delete(delete_course_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/secretariats",
            get(list_secretariats_handler::<R, S, M>)
                .post(create_secretariat_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/secretariats/:secretariat_id",
            put(update_secretariat_handler::<R, S, M>)
                .delete(delete_secretariat_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/staff",
            get(list_staff_handler::<R, S, M>).post(create_staff_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/staff/:staff_id",
            delete(delete_staff_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/candidates",
            get(list_candidates_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/candidates/:candidate_id",
            get(candidate_detail_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/candidates/:candidate_id/documents/ensure",
            post(ensure_documents_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/candidates/:candidate_id/review",
            post(review_candidate_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/documents",
            get(list_documents_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/documents/:document_id/status",
            put(set_status_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/documents/:document_id/file",
            get(download_handler::<R, S, M>),
        )
        .route(
            "/api/v1/admin/settings",
            get(settings_handler::<R, S, M>).put(update_settings_handler::<R, S, M>),
        )
        .route("/api/v1/admin/stats", get(stats_handler::<R, S, M>))
        .route("/api/v1/admin/import", post(import_handler::<R, S, M>))
        .route(
            "/api/v1/admin/maintenance/cleanup",
            post(cleanup_handler::<R, S, M>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StaffLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CampusRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CourseQuery {
    pub campus_id: Option<CampusId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub status: DocumentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub reviews: Vec<DocumentReview>,
}

pub(crate) async fn login_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    axum::Json(request): axum::Json<StaffLoginRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    match service.staff_login(&request.email, &request.password).await {
        Ok(login) => {
            let cookie = service.sessions().cookie(&login.session);
            let payload = json!({
                "user": login.user,
                "permissions": login.user.role.permissions(),
                "token": login.session.token,
                "expires_at": login.session.expires_at,
            });
            with_cookie(
                (StatusCode::OK, axum::Json(payload)).into_response(),
                &cookie,
            )
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_campuses_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_campuses(&staff).await)
}

pub(crate) async fn create_campus_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CampusRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.create_campus(&staff, &request.name).await,
    )
}

pub(crate) async fn rename_campus_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(campus_id): Path<i64>,
    axum::Json(request): axum::Json<CampusRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .rename_campus(&staff, CampusId(campus_id), &request.name)
            .await,
    )
}

pub(crate) async fn delete_campus_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(campus_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    no_content(service.delete_campus(&staff, CampusId(campus_id)).await)
}

pub(crate) async fn list_courses_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Query(query): Query<CourseQuery>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.list_courses(&staff, query.campus_id).await,
    )
}

pub(crate) async fn create_course_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    axum::Json(course): axum::Json<NewCourse>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, service.create_course(&staff, course).await)
}

pub(crate) async fn update_course_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
    axum::Json(course): axum::Json<NewCourse>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .update_course(&staff, CourseId(course_id), course)
            .await,
    )
}

pub(crate) async fn delete_course_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    no_content(service.delete_course(&staff, CourseId(course_id)).await)
}

pub(crate) async fn list_secretariats_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_secretariats(&staff).await)
}

pub(crate) async fn create_secretariat_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    axum::Json(secretariat): axum::Json<NewSecretariat>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.create_secretariat(&staff, secretariat).await,
    )
}

pub(crate) async fn update_secretariat_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(secretariat_id): Path<i64>,
    axum::Json(secretariat): axum::Json<NewSecretariat>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .update_secretariat(&staff, SecretariatId(secretariat_id), secretariat)
            .await,
    )
}

pub(crate) async fn delete_secretariat_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(secretariat_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    no_content(
        service
            .delete_secretariat(&staff, SecretariatId(secretariat_id))
            .await,
    )
}

pub(crate) async fn list_staff_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_staff(&staff).await)
}

pub(crate) async fn create_staff_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    axum::Json(user): axum::Json<NewStaffUser>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, service.create_staff(&staff, user).await)
}

pub(crate) async fn delete_staff_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(staff_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    no_content(service.delete_staff(&staff, StaffUserId(staff_id)).await)
}

pub(crate) async fn list_candidates_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Query(filter): Query<CandidateFilter>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_candidates(&staff, filter).await)
}

pub(crate) async fn candidate_detail_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(candidate_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .candidate_detail(&staff, CandidateId(candidate_id))
            .await,
    )
}

pub(crate) async fn ensure_documents_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(candidate_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    match service
        .ensure_documents(&staff, CandidateId(candidate_id))
        .await
    {
        Ok(created) => (StatusCode::OK, axum::Json(json!({ "created": created }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_candidate_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(candidate_id): Path<i64>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .review_candidate_documents(&staff, CandidateId(candidate_id), request.reviews)
            .await,
    )
}

pub(crate) async fn list_documents_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Query(filter): Query<DocumentFilter>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_documents(&staff, filter).await)
}

pub(crate) async fn set_status_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(document_id): Path<i64>,
    axum::Json(request): axum::Json<StatusRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .set_document_status(&staff, DocumentId(document_id), request.status, request.notes)
            .await,
    )
}

pub(crate) async fn download_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(document_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    match service
        .download_document(&Principal::Staff { staff }, DocumentId(document_id))
        .await
    {
        Ok(download) => download_response(download),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn settings_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.settings(&staff).await)
}

pub(crate) async fn update_settings_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    axum::Json(update): axum::Json<SettingsUpdate>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.update_settings(&staff, update).await)
}

pub(crate) async fn stats_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.statistics(&staff).await)
}

/// Form flags arrive as `1`, `true` or `on`.
fn form_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "on" | "yes")
}

pub(crate) async fn import_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    let parts = match read_form(multipart).await {
        Ok(parts) => parts,
        Err(err) => return error_response(AdmissionsError::invalid(err.to_string())),
    };

    let mut csv = None;
    let mut options = ImportOptions::default();
    for part in parts {
        match part {
            FormPart::File { file, .. } if csv.is_none() => csv = Some(file.bytes),
            FormPart::Text { name, value } if field_is(&name, "clear_existing") => {
                options.clear_existing = form_flag(&value)
            }
            FormPart::Text { name, value } if field_is(&name, "send_welcome") => {
                options.send_welcome = form_flag(&value)
            }
            _ => {}
        }
    }
    let Some(csv) = csv.filter(|bytes| !bytes.is_empty()) else {
        return error_response(AdmissionsError::invalid("a CSV file is required"));
    };

    respond(
        StatusCode::OK,
        service.import_candidates(&staff, &csv, options).await,
    )
}

pub(crate) async fn cleanup_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let staff = match signed_in_staff(&service, &headers).await {
        Ok(staff) => staff,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.maintenance_cleanup(&staff).await)
}

async fn signed_in_staff<R, S, M>(
    service: &AdmissionsService<R, S, M>,
    headers: &HeaderMap,
) -> Result<StaffContext, Response>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    match service.sessions().principal_from_headers(headers) {
        Ok(Principal::Staff { staff }) => service
            .current_staff(&staff)
            .await
            .map_err(error_response),
        Ok(Principal::Candidate { .. }) => {
            let payload = json!({ "error": "staff session required" });
            Err((StatusCode::FORBIDDEN, axum::Json(payload)).into_response())
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response())
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, AdmissionsError>) -> Response {
    match result {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

fn no_content(result: Result<(), AdmissionsError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: AdmissionsError) -> Response {
    let status = match &err {
        AdmissionsError::Access(AccessError::InvalidCredentials)
        | AdmissionsError::Session(_)
        | AdmissionsError::InvalidLogin => StatusCode::UNAUTHORIZED,
        AdmissionsError::Access(AccessError::Denied(_)) | AdmissionsError::OutOfScope => {
            StatusCode::FORBIDDEN
        }
        AdmissionsError::Repository(RepositoryError::Conflict)
        | AdmissionsError::Repository(RepositoryError::InUse(_))
        | AdmissionsError::IntakeClosed(_)
        | AdmissionsError::DocumentLocked(_) => StatusCode::CONFLICT,
        AdmissionsError::Repository(RepositoryError::NotFound) | AdmissionsError::NotFound(_) => {
            StatusCode::NOT_FOUND
        }
        AdmissionsError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AdmissionsError::Invalid(_)
        | AdmissionsError::Settings(_)
        | AdmissionsError::Import(_)
        | AdmissionsError::UnknownDocumentKind(_)
        | AdmissionsError::NothingSelected => StatusCode::BAD_REQUEST,
        AdmissionsError::Upload(_) | AdmissionsError::NothingUploaded { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AdmissionsError::Access(AccessError::PasswordHash(_)) | AdmissionsError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(error = %err, "admin request failed");
    }

    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
