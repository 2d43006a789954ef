pub(crate) mod admin;
pub(crate) mod portal;

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use super::notifier::Mailer;
use super::repository::AdmissionsRepository;
use super::service::{AdmissionsService, DocumentDownload};
use super::storage::DocumentStore;
use super::upload::UploadedFile;

pub use admin::admin_router;
pub use portal::portal_router;

/// Candidate portal and staff API behind one body limit sized for PDF batches.
pub fn admissions_router<R, S, M>(
    service: Arc<AdmissionsService<R, S, M>>,
    body_limit: usize,
) -> Router
where
    R: AdmissionsRepository + 'static,
    S: DocumentStore + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .merge(portal_router(Arc::clone(&service)))
        .merge(admin_router(service))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// One multipart field, either an uploaded file or a plain text value.
pub(crate) enum FormPart {
    File { name: String, file: UploadedFile },
    Text { name: String, value: String },
}

pub(crate) async fn read_form(mut multipart: Multipart) -> Result<Vec<FormPart>, MultipartError> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                parts.push(FormPart::File {
                    name,
                    file: UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    },
                });
            }
            None => {
                let value = field.text().await?;
                parts.push(FormPart::Text { name, value });
            }
        }
    }
    Ok(parts)
}

/// Field names sent as `files[]` by browsers are matched as `files`.
pub(crate) fn field_is(name: &str, expected: &str) -> bool {
    name.strip_suffix("[]").unwrap_or(name) == expected
}

pub(crate) fn download_response(download: DocumentDownload) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    let mut response = (StatusCode::OK, download.bytes).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(download.content_type.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub(crate) fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}
