use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::{download_response, field_is, read_form, with_cookie, FormPart};
use crate::workflows::admissions::domain::{CandidateId, DocumentId};
use crate::workflows::admissions::notifier::Mailer;
use crate::workflows::admissions::repository::AdmissionsRepository;
use crate::workflows::admissions::service::{AdmissionsError, AdmissionsService};
use crate::workflows::admissions::session::Principal;
use crate::workflows::admissions::storage::DocumentStore;
use crate::workflows::admissions::upload::UploadedFile;

type SharedService<R, S, M> = Arc<AdmissionsService<R, S, M>>;

const SIGN_IN_REQUIRED: &str = "Você precisa estar logado.";
const INTERNAL_ERROR: &str = "Erro interno do servidor. Tente novamente.";

/// Candidate-facing endpoints. Every body uses the `{"success": .., "data"|"error": ..}`
/// envelope the portal pages expect.
pub fn portal_router<R, S, M>(service: SharedService<R, S, M>) -> Router
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .route("/api/v1/portal/login", post(login_handler::<R, S, M>))
        .route("/api/v1/portal/logout", post(logout_handler::<R, S, M>))
        .route("/api/v1/portal/me", get(dashboard_handler::<R, S, M>))
        .route("/api/v1/portal/uploads", post(batch_upload_handler::<R, S, M>))
        .route("/api/v1/portal/uploads/:kind", post(upload_handler::<R, S, M>))
        .route(
            "/api/v1/portal/documents/:document_id",
            delete(remove_handler::<R, S, M>),
        )
        .route(
            "/api/v1/portal/documents/:document_id/file",
            get(download_handler::<R, S, M>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateLoginRequest {
    #[serde(alias = "email_or_cpf")]
    pub identifier: String,
    #[serde(alias = "inscricao")]
    pub enrollment: String,
}

pub(crate) async fn login_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    axum::Json(request): axum::Json<CandidateLoginRequest>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    match service.login(&request.identifier, &request.enrollment).await {
        Ok(login) => {
            let cookie = service.sessions().cookie(&login.session);
            let data = json!({
                "message": "Login realizado com sucesso!",
                "candidate": login.candidate,
                "token": login.session.token,
                "expires_at": login.session.expires_at,
            });
            with_cookie(success(StatusCode::OK, data), &cookie)
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn logout_handler<R, S, M>(State(service): State<SharedService<R, S, M>>) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let response = success(StatusCode::OK, json!({ "message": "Sessão encerrada." }));
    with_cookie(response, &service.sessions().clearing_cookie())
}

pub(crate) async fn dashboard_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let candidate_id = match signed_in_candidate(&service, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.dashboard(candidate_id).await {
        Ok(dashboard) => success(StatusCode::OK, json!(dashboard)),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn upload_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let candidate_id = match signed_in_candidate(&service, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let parts = match read_form(multipart).await {
        Ok(parts) => parts,
        Err(err) => return failure(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let file = parts.into_iter().find_map(|part| match part {
        FormPart::File { name, file } if field_is(&name, "file") && !file.bytes.is_empty() => {
            Some(file)
        }
        _ => None,
    });
    let Some(file) = file else {
        return failure(StatusCode::BAD_REQUEST, "Nenhum arquivo foi enviado.");
    };

    match service.upload_document(candidate_id, &kind, file).await {
        Ok(document) => success(
            StatusCode::CREATED,
            json!({
                "message": "Documento enviado com sucesso!",
                "document": document,
            }),
        ),
        Err(err) => error_response(err),
    }
}

/// Pairs the n-th `files` part with the n-th `types` value; unpaired or empty file
/// inputs are skipped.
pub(crate) fn pair_batch(parts: Vec<FormPart>) -> Vec<(String, UploadedFile)> {
    let mut files = Vec::new();
    let mut kinds = Vec::new();
    for part in parts {
        match part {
            FormPart::File { name, file } if field_is(&name, "files") => files.push(file),
            FormPart::Text { name, value } if field_is(&name, "types") => {
                kinds.push(value.trim().to_string())
            }
            _ => {}
        }
    }

    files
        .into_iter()
        .zip(kinds)
        .filter(|(file, kind)| {
            !kind.is_empty() && !(file.file_name.is_empty() && file.bytes.is_empty())
        })
        .map(|(file, kind)| (kind, file))
        .collect()
}

pub(crate) async fn batch_upload_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let candidate_id = match signed_in_candidate(&service, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let parts = match read_form(multipart).await {
        Ok(parts) => parts,
        Err(err) => return failure(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    match service.upload_batch(candidate_id, pair_batch(parts)).await {
        Ok(outcome) => success(
            StatusCode::OK,
            json!({
                "message": outcome.message(),
                "uploaded": outcome.uploaded,
                "failed": outcome.failed,
                "errors": outcome.errors,
                "documents": outcome.documents,
            }),
        ),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn remove_handler<R, S, M>(
    State(service): State<SharedService<R, S, M>>,
    headers: HeaderMap,
    Path(document_id): Path<i64>,
) -> Response
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let candidate_id = match signed_in_candidate(&service, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service
        .remove_document(candidate_id, DocumentId(document_id))
        .await
    {
        Ok(document) => success(
            StatusCode::OK,
            json!({
                "message": "Documento removido com sucesso!",
                "document": document,
            }),
        ),
        Err(err) => error_response(err),
    }
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
    let candidate_id = match signed_in_candidate(&service, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let principal = Principal::Candidate { candidate_id };
    match service
        .download_document(&principal, DocumentId(document_id))
        .await
    {
        Ok(download) => download_response(download),
        Err(err) => error_response(err),
    }
}

fn signed_in_candidate<R, S, M>(
    service: &AdmissionsService<R, S, M>,
    headers: &HeaderMap,
) -> Result<CandidateId, Response>
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    match service.sessions().principal_from_headers(headers) {
        Ok(Principal::Candidate { candidate_id }) => Ok(candidate_id),
        Ok(Principal::Staff { .. }) | Err(_) => {
            Err(failure(StatusCode::UNAUTHORIZED, SIGN_IN_REQUIRED))
        }
    }
}

fn success(status: StatusCode, data: Value) -> Response {
    (status, axum::Json(json!({ "success": true, "data": data }))).into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "success": false, "error": message }))).into_response()
}

pub(crate) fn error_response(err: AdmissionsError) -> Response {
    match err {
        AdmissionsError::InvalidLogin => failure(StatusCode::UNAUTHORIZED, &err.to_string()),
        AdmissionsError::IntakeClosed(_) | AdmissionsError::DocumentLocked(_) => {
            failure(StatusCode::FORBIDDEN, &err.to_string())
        }
        AdmissionsError::Upload(_) => failure(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
        AdmissionsError::UnknownDocumentKind(_)
        | AdmissionsError::NothingSelected
        | AdmissionsError::Invalid(_) => failure(StatusCode::BAD_REQUEST, &err.to_string()),
        AdmissionsError::NothingUploaded { ref errors } => {
            let payload = json!({
                "success": false,
                "error": err.to_string(),
                "errors": errors,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        AdmissionsError::NotFound(entity) => failure(StatusCode::NOT_FOUND, not_found_message(entity)),
        other => {
            error!(error = %other, "portal request failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

fn not_found_message(entity: &str) -> &'static str {
    match entity {
        "candidate" => "Candidato não encontrado.",
        "file" => "Arquivo não encontrado.",
        _ => "Documento não encontrado.",
    }
}
