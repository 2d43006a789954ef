use super::common::*;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use crate::workflows::admissions::access::{NewStaffUser, StaffRole};
use crate::workflows::admissions::repository::RepositoryError;
use crate::workflows::admissions::router::{admin, portal, FormPart};
use crate::workflows::admissions::service::AdmissionsError;
use crate::workflows::admissions::session::Principal;
use crate::workflows::admissions::settings::WindowState;
use crate::workflows::admissions::upload::UploadedFile;
use crate::workflows::admissions::{admissions_router, MemoryRepository};

const BODY_LIMIT: usize = 2 * 1024 * 1024;

struct Portal {
    router: Router,
    harness: Harness,
    seeded: Seeded,
}

async fn portal() -> Portal {
    let harness = live_harness();
    let seeded = seed_candidate(&harness.repository).await;
    open_intake(&harness.repository, Utc::now()).await;
    let router = admissions_router(harness.service.clone(), BODY_LIMIT);
    Portal {
        router,
        harness,
        seeded,
    }
}

fn candidate_token(portal: &Portal) -> String {
    bearer(
        &portal.harness.service,
        Principal::Candidate {
            candidate_id: portal.seeded.candidate.id,
        },
    )
}

async fn admin_token(portal: &Portal) -> String {
    let admin = portal
        .harness
        .service
        .bootstrap_administrator("Coordenação", "coordenacao@sisu.example", "segredo-forte")
        .await
        .expect("administrator");
    bearer(
        &portal.harness.service,
        Principal::Staff {
            staff: admin.context(),
        },
    )
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("json")))
        .expect("request")
}

fn multipart_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, MultipartBody::content_type())
        .header(header::AUTHORIZATION, token)
        .body(Body::from(body))
        .expect("request")
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::empty()).expect("request")
}

#[tokio::test]
async fn portal_login_sets_session_cookie() {
    let portal = portal().await;

    let response = portal
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/portal/login",
            None,
            json!({ "email_or_cpf": "52998224725", "inscricao": "251000123456" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("cookie set")
        .to_string();
    assert!(cookie.starts_with("sisu_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));

    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["data"]["candidate"]["name"], json!("Ana Souza"));

    let session_cookie = cookie.split(';').next().expect("cookie pair").to_string();
    let dashboard = portal
        .router
        .oneshot(
            Request::get("/api/v1/portal/me")
                .header(header::COOKIE, session_cookie)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(dashboard.status(), StatusCode::OK);
    let payload = read_json_body(dashboard).await;
    assert_eq!(payload["data"]["documents"].as_array().map(Vec::len), Some(8));
    assert_eq!(payload["data"]["window"], json!("open"));
    assert_eq!(payload["data"]["accepting_uploads"], json!(true));
}

#[tokio::test]
async fn portal_login_failure_uses_error_envelope() {
    let portal = portal().await;

    let response = portal
        .router
        .oneshot(json_request(
            "POST",
            "/api/v1/portal/login",
            None,
            json!({ "identifier": CANDIDATE_EMAIL, "enrollment": "000" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], json!(false));
    assert_eq!(
        payload["error"],
        json!("Dados de acesso inválidos. Verifique seu e-mail/CPF e número de inscrição.")
    );
}

#[tokio::test]
async fn dashboard_requires_a_candidate_session() {
    let portal = portal().await;

    let anonymous = portal
        .router
        .clone()
        .oneshot(get("/api/v1/portal/me", None))
        .await
        .expect("route executes");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(anonymous).await;
    assert_eq!(payload["error"], json!("Você precisa estar logado."));

    let token = admin_token(&portal).await;
    let staff_session = portal
        .router
        .oneshot(get("/api/v1/portal/me", Some(&token)))
        .await
        .expect("route executes");
    assert_eq!(staff_session.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn single_upload_accepts_multipart_pdf() {
    let portal = portal().await;
    let token = candidate_token(&portal);
    let body = MultipartBody::default()
        .file("file", "cpf.pdf", "application/pdf", b"%PDF-1.4 cpf")
        .finish();

    let response = portal
        .router
        .oneshot(multipart_request("/api/v1/portal/uploads/cpf", &token, body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["data"]["document"]["status"], json!("awaiting_validation"));
    assert_eq!(payload["data"]["message"], json!("Documento enviado com sucesso!"));
    assert_eq!(portal.harness.store.names().len(), 1);
}

#[tokio::test]
async fn single_upload_without_file_is_rejected() {
    let portal = portal().await;
    let token = candidate_token(&portal);
    let body = MultipartBody::default().text("note", "sem arquivo").finish();

    let response = portal
        .router
        .oneshot(multipart_request("/api/v1/portal/uploads/cpf", &token, body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], json!("Nenhum arquivo foi enviado."));
}

#[tokio::test]
async fn batch_upload_pairs_files_with_types() {
    let portal = portal().await;
    let token = candidate_token(&portal);
    let body = MultipartBody::default()
        .file("files[]", "cpf.pdf", "application/pdf", b"%PDF-1.4 cpf")
        .file("files[]", "foto.png", "image/png", b"\x89PNG")
        .text("types[]", "cpf")
        .text("types[]", "documento_identificacao")
        .finish();

    let response = portal
        .router
        .oneshot(multipart_request("/api/v1/portal/uploads", &token, body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["data"]["uploaded"], json!(1));
    assert_eq!(payload["data"]["failed"], json!(1));
    assert_eq!(
        payload["data"]["errors"],
        json!(["documento_identificacao: Apenas arquivos PDF são permitidos."])
    );
    assert_eq!(portal.harness.mailer.sent_to(CANDIDATE_EMAIL).len(), 1);
}

#[tokio::test]
async fn batch_upload_lists_errors_when_nothing_is_accepted() {
    let portal = portal().await;
    let token = candidate_token(&portal);
    let body = MultipartBody::default()
        .file("files[]", "cpf.pdf", "application/pdf", b"%PDF-1.4 cpf")
        .text("types[]", "passaporte")
        .finish();

    let response = portal
        .router
        .oneshot(multipart_request("/api/v1/portal/uploads", &token, body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], json!(false));
    assert_eq!(payload["error"], json!("Nenhum documento foi enviado com sucesso."));
    assert_eq!(payload["errors"], json!(["passaporte: Tipo de documento inválido."]));
}

#[tokio::test]
async fn awaiting_documents_cannot_be_deleted() {
    let portal = portal().await;
    let token = candidate_token(&portal);
    let record = portal
        .harness
        .service
        .upload_document(portal.seeded.candidate.id, "cpf", pdf("cpf.pdf"))
        .await
        .expect("upload");

    let response = portal
        .router
        .oneshot(
            Request::delete(format!("/api/v1/portal/documents/{}", record.id))
                .header(header::AUTHORIZATION, &token)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], json!("Este documento não pode ser removido."));
}

#[tokio::test]
async fn admin_routes_require_a_staff_session() {
    let portal = portal().await;
    let candidate = candidate_token(&portal);

    let anonymous = portal
        .router
        .clone()
        .oneshot(get("/api/v1/admin/candidates", None))
        .await
        .expect("route executes");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let as_candidate = portal
        .router
        .clone()
        .oneshot(get("/api/v1/admin/candidates", Some(&candidate)))
        .await
        .expect("route executes");
    assert_eq!(as_candidate.status(), StatusCode::FORBIDDEN);

    let admin = admin_token(&portal).await;
    let listed = portal
        .router
        .oneshot(get("/api/v1/admin/candidates?search=ana", Some(&admin)))
        .await
        .expect("route executes");
    assert_eq!(listed.status(), StatusCode::OK);
    let payload = read_json_body(listed).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn staff_login_issues_a_token_for_admin_routes() {
    let portal = portal().await;
    portal
        .harness
        .service
        .bootstrap_administrator("Diretoria", "diretoria@sisu.example", "segredo-forte")
        .await
        .expect("administrator");

    let login = portal
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/admin/login",
            None,
            json!({ "email": "diretoria@sisu.example", "password": "segredo-forte" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(login.status(), StatusCode::OK);
    let payload = read_json_body(login).await;
    assert_eq!(payload["user"]["role"], json!("administrator"));
    assert!(payload["user"].get("password_hash").is_none());
    let token = format!("Bearer {}", payload["token"].as_str().expect("token"));

    let stats = portal
        .router
        .oneshot(get("/api/v1/admin/stats", Some(&token)))
        .await
        .expect("route executes");
    assert_eq!(stats.status(), StatusCode::OK);
    let payload = read_json_body(stats).await;
    assert_eq!(payload["candidates"], json!(1));
    assert_eq!(payload["documents_not_sent"], json!(8));
}

#[tokio::test]
async fn deleted_staff_tokens_stop_working() {
    let portal = portal().await;
    let service = &portal.harness.service;
    let admin = service
        .bootstrap_administrator("Coordenação", "coordenacao@sisu.example", "segredo-forte")
        .await
        .expect("administrator");
    let reviewer = service
        .create_staff(
            &admin.context(),
            NewStaffUser {
                name: "Bruno Lima".to_string(),
                email: "bruno@sisu.example".to_string(),
                role: StaffRole::Coordinator,
                secretariat_id: None,
                password: "revisor-forte".to_string(),
            },
        )
        .await
        .expect("reviewer");
    let token = bearer(
        service,
        Principal::Staff {
            staff: reviewer.context(),
        },
    );

    let before = portal
        .router
        .clone()
        .oneshot(get("/api/v1/admin/stats", Some(&token)))
        .await
        .expect("route executes");
    assert_eq!(before.status(), StatusCode::OK);

    service
        .delete_staff(&admin.context(), reviewer.id)
        .await
        .expect("reviewer removed");

    let after = portal
        .router
        .oneshot(get("/api/v1/admin/stats", Some(&token)))
        .await
        .expect("route executes");
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(after).await;
    assert_eq!(payload["error"], json!("session no longer valid"));
}

#[tokio::test]
async fn reviewer_status_update_and_download() {
    let portal = portal().await;
    let admin = admin_token(&portal).await;
    let record = portal
        .harness
        .service
        .upload_document(portal.seeded.candidate.id, "cpf", pdf("cpf.pdf"))
        .await
        .expect("upload");

    let updated = portal
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/admin/documents/{}/status", record.id),
            Some(&admin),
            json!({ "status": "rejected", "notes": "Ilegível" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(updated.status(), StatusCode::OK);
    let payload = read_json_body(updated).await;
    assert_eq!(payload["status"], json!("rejected"));
    assert_eq!(payload["notes"], json!("Ilegível"));

    let listed = portal
        .router
        .clone()
        .oneshot(get("/api/v1/admin/documents?status=rejected", Some(&admin)))
        .await
        .expect("route executes");
    let payload = read_json_body(listed).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));

    let download = portal
        .router
        .oneshot(get(
            &format!("/api/v1/admin/documents/{}/file", record.id),
            Some(&admin),
        ))
        .await
        .expect("route executes");
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(
        download.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/pdf")
    );
    let disposition = download
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .expect("disposition")
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"ANA_SOUZA_"));
}

#[tokio::test]
async fn import_route_reads_csv_and_flags() {
    let portal = portal().await;
    let admin = admin_token(&portal).await;
    let csv = format!(
        "{SISU_HEADER}\nCampus Norte,Direito,Noturno,Bacharelado,252000,Carla Dias,\
         111.444.777-35,,F,PE,Recife,,,carla@example.com,PPI - Pretos pardos e indígenas\n"
    );
    let body = MultipartBody::default()
        .file("csv_file", "sisu.csv", "text/csv", csv.as_bytes())
        .text("clear_existing", "1")
        .finish();

    let response = portal
        .router
        .oneshot(multipart_request("/api/v1/admin/import", &admin, body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["successful_imports"], json!(1));
    assert_eq!(
        payload["warnings"],
        json!(["Dados existentes foram limpos antes da importação."])
    );
}

#[tokio::test]
async fn settings_route_rejects_invalid_dates() {
    let portal = portal().await;
    let admin = admin_token(&portal).await;

    let response = portal
        .router
        .oneshot(json_request(
            "PUT",
            "/api/v1/admin/settings",
            Some(&admin),
            json!({ "intake_start": "amanhã" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_handler_clears_the_cookie() {
    let harness = live_harness();

    let response = portal::logout_handler::<MemoryRepository, MemoryDocumentStore, MemoryMailer>(
        State(harness.service.clone()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("cookie")
        .to_string();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn error_mapping_matches_each_surface() {
    let closed = portal::error_response(AdmissionsError::IntakeClosed(WindowState::NotStarted));
    assert_eq!(closed.status(), StatusCode::FORBIDDEN);
    let payload = read_json_body(closed).await;
    assert_eq!(
        payload["error"],
        json!("O sistema não está recebendo documentos no momento.")
    );

    let unavailable = portal::error_response(AdmissionsError::Repository(
        RepositoryError::Unavailable("pool closed".to_string()),
    ));
    assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(unavailable).await;
    assert_eq!(
        payload["error"],
        json!("Erro interno do servidor. Tente novamente.")
    );

    let no_candidate = portal::error_response(AdmissionsError::NotFound("candidate"));
    assert_eq!(no_candidate.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(no_candidate).await;
    assert_eq!(payload["error"], json!("Candidato não encontrado."));

    let no_document = portal::error_response(AdmissionsError::NotFound("document"));
    let payload = read_json_body(no_document).await;
    assert_eq!(payload["error"], json!("Documento não encontrado."));

    let in_use = admin::error_response(AdmissionsError::Repository(RepositoryError::InUse(
        "campus has courses",
    )));
    assert_eq!(in_use.status(), StatusCode::CONFLICT);

    let missing = admin::error_response(AdmissionsError::NotFound("candidate"));
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(missing).await;
    assert_eq!(payload["error"], json!("candidate not found"));
}

#[tokio::test]
async fn deleting_a_campus_in_use_conflicts() {
    let portal = portal().await;
    let admin = admin_token(&portal).await;
    let response = portal
        .router
        .oneshot(
            Request::delete(format!(
                "/api/v1/admin/campuses/{}",
                portal.seeded.candidate.campus_id
            ))
            .header(header::AUTHORIZATION, &admin)
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.starts_with("record is still referenced")));
}

#[test]
fn batch_pairs_skip_blank_inputs() {
    let file = |name: &str, bytes: &[u8]| FormPart::File {
        name: "files[]".to_string(),
        file: UploadedFile {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: bytes.to_vec(),
        },
    };
    let kind = |value: &str| FormPart::Text {
        name: "types[]".to_string(),
        value: value.to_string(),
    };

    let pairs = portal::pair_batch(vec![
        file("cpf.pdf", b"%PDF"),
        file("", b""),
        file("titulo.pdf", b"%PDF"),
        kind(" cpf "),
        kind("certidao"),
        kind(""),
    ]);

    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].0, "cpf");
    assert_eq!(pairs[0].1.file_name, "cpf.pdf");
}
