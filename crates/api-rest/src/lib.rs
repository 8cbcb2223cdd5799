//! # API REST
//!
//! REST API implementation for NWD.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation served as JSON
//! - REST-specific concerns (JSON serialization, CORS, API key and actor headers)
//!
//! Uses `api-shared` for wire types and `nwd-core` for every domain decision.

#![warn(rust_2018_idioms)]

mod auth;
mod convert;
mod error;
mod extract;
mod handlers;

pub use auth::ActingPerson;
pub use error::ApiError;

use api_shared::dto;
use axum::{
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use nwd_core::CertificationService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// Application state for the REST API server
///
/// Shared by all request handlers: the certification service and the expected API key.
#[derive(Clone)]
pub struct AppState {
    pub service: CertificationService,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(service: CertificationService, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::register_curriculum,
        handlers::enroll,
        handlers::progress,
        handlers::record_progress,
        handlers::complete_core,
        handlers::terminate_enrollments,
        handlers::create_request,
        handlers::list_requests,
        handlers::get_request,
        handlers::submit_requests,
        handlers::cancel_requests,
        handlers::update_start_time,
        handlers::assign_learning_coach,
        handlers::grant_learning_coach_permission,
        handlers::respond_as_learning_coach,
        handlers::assign_assessor,
        handlers::assign_task_unit_assessor,
        handlers::start_assessments,
        handlers::complete_assessments,
        handlers::abort_requests,
        handlers::issue_certificates,
        handlers::withdraw_certificates,
        handlers::verify_certificate,
        handlers::visible_certificates,
        handlers::import_qualifications,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::CompetencyDto,
        dto::ModuleDto,
        dto::CurriculumDto,
        dto::EnrollReq,
        dto::EnrollmentRes,
        dto::EnrollmentListRes,
        dto::RecordProgressReq,
        dto::EnrollmentIdsReq,
        dto::ModuleProgressRes,
        dto::ProgressRes,
        dto::CreateRequestReq,
        dto::RequestTargetReq,
        dto::RequestTargetsReq,
        dto::StartTimeReq,
        dto::LearningCoachReq,
        dto::CoachResponseReq,
        dto::AssessorReq,
        dto::TaskUnitAssessorReq,
        dto::LearningCoachRes,
        dto::TaskUnitRes,
        dto::RequestRes,
        dto::RequestListRes,
        dto::IssueReq,
        dto::WithdrawReq,
        dto::WithdrawRes,
        dto::CertificateRes,
        dto::CertificateListRes,
        dto::VerifyRes,
        dto::ImportRowReq,
        dto::ImportReq,
        dto::RowErrorRes,
        dto::ImportReportRes,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Builds the full router. `/health` and the OpenAPI document are open; every other route
/// requires the API key.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/curricula", post(handlers::register_curriculum))
        .route("/enrollments", post(handlers::enroll))
        .route(
            "/enrollments/:id/progress",
            get(handlers::progress).post(handlers::record_progress),
        )
        .route("/enrollments/complete-core", post(handlers::complete_core))
        .route("/enrollments/terminate", post(handlers::terminate_enrollments))
        .route(
            "/requests",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route("/requests/:id", get(handlers::get_request))
        .route("/requests/submit", post(handlers::submit_requests))
        .route("/requests/cancel", post(handlers::cancel_requests))
        .route("/requests/start-time", post(handlers::update_start_time))
        .route("/requests/learning-coach", post(handlers::assign_learning_coach))
        .route(
            "/requests/learning-coach/grant",
            post(handlers::grant_learning_coach_permission),
        )
        .route(
            "/requests/learning-coach/respond",
            post(handlers::respond_as_learning_coach),
        )
        .route("/requests/assessor", post(handlers::assign_assessor))
        .route(
            "/requests/:id/task-units/:task_unit/assessor",
            post(handlers::assign_task_unit_assessor),
        )
        .route("/requests/start", post(handlers::start_assessments))
        .route("/requests/complete", post(handlers::complete_assessments))
        .route("/requests/abort", post(handlers::abort_requests))
        .route("/certificates/issue", post(handlers::issue_certificates))
        .route("/certificates/withdraw", post(handlers::withdraw_certificates))
        .route(
            "/certificates/verify/:handle",
            get(handlers::verify_certificate),
        )
        .route(
            "/persons/:id/certificates",
            get(handlers::visible_certificates),
        )
        .route(
            "/qualifications/import",
            post(handlers::import_qualifications),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::auth::{
        ACTOR_ID_HEADER, ACTOR_NAME_HEADER, ACTOR_PRIVILEGE_HEADER, API_KEY_HEADER,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::{Duration, TimeZone, Utc};
    use http_body_util::BodyExt;
    use nwd_core::{CoreConfig, FixedClock, MemoryStore, PersonId};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    struct TestApp {
        app: Router,
        clock: Arc<FixedClock>,
        admin: PersonId,
        secretariat: PersonId,
    }

    fn app() -> TestApp {
        let cfg = Arc::new(CoreConfig::new("unused".into(), "Loosdrecht").unwrap());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let service = CertificationService::new(cfg, Arc::new(MemoryStore::new()))
            .with_clock(clock.clone());
        TestApp {
            app: router(AppState::new(service, KEY)),
            clock,
            admin: PersonId::new(),
            secretariat: PersonId::new(),
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<(PersonId, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .header("content-type", "application/json");
        if let Some((id, privilege)) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, id.to_string())
                .header(ACTOR_NAME_HEADER, "Test Persoon")
                .header(ACTOR_PRIVILEGE_HEADER, privilege);
        }
        let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn curriculum_body() -> Value {
        json!({
            "title": "Kielboot",
            "revision": 1,
            "modules": [
                {"title": "Varen", "required": true, "competencies": [{"title": "Aanleggen"}, {"title": "Reven"}]},
                {"title": "Veiligheid", "required": false, "competencies": [{"title": "Man over boord"}]}
            ]
        })
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let t = app();
        let response = t
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_api_key_is_unauthorized() {
        let t = app();
        let response = t
            .app
            .oneshot(Request::get("/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_validation_error() {
        let t = app();
        let admin = Some((t.admin, "location_admin"));

        let (status, body) =
            send(&t.app, "POST", "/requests/submit", admin, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
        assert!(body["message"].as_str().unwrap().contains("requests"));

        let (status, body) =
            send(&t.app, "GET", "/certificates/verify/ABCD2345", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let t = app();
        let (status, doc) = send(&t.app, "GET", "/api-docs/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/requests/submit"].is_object());
        assert!(doc["paths"]["/certificates/verify/{handle}"].is_object());
    }

    #[tokio::test]
    async fn request_lifecycle_and_guard_conflict() {
        let t = app();
        let admin = Some((t.admin, "location_admin"));
        let (status, created) = send(
            &t.app,
            "POST",
            "/requests",
            admin,
            Some(json!({
                "type": "intern",
                "candidate": PersonId::new().to_string(),
                "task_units": ["550e8400e29b41d4a716446655440000"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "concept");
        assert_eq!(created["location"], "Loosdrecht");
        let id = created["id"].as_str().unwrap().to_string();

        let targets = json!({"requests": [{"id": id, "version": 1}]});
        let (status, submitted) =
            send(&t.app, "POST", "/requests/submit", admin, Some(targets.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["requests"][0]["status"], "wacht_op_voorwaarden");

        // Stale version.
        let (status, body) =
            send(&t.app, "POST", "/requests/cancel", admin, Some(targets)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");

        let (status, _) = send(
            &t.app,
            "POST",
            "/requests/cancel",
            admin,
            Some(json!({"requests": [{"id": id}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &t.app,
            "POST",
            "/requests/submit",
            admin,
            Some(json!({"requests": [{"id": id}]})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "guard");

        let (status, list) =
            send(&t.app, "GET", "/requests?status=ingetrokken", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["requests"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn member_cannot_create_requests() {
        let t = app();
        let (status, body) = send(
            &t.app,
            "POST",
            "/requests",
            Some((PersonId::new(), "member")),
            Some(json!({
                "type": "extern",
                "candidate": PersonId::new().to_string(),
                "task_units": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "permission");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let t = app();
        let (status, _) = send(
            &t.app,
            "GET",
            &format!("/requests/{}", PersonId::new()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&t.app, "GET", "/requests/nope", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn issue_verify_and_late_withdrawal() {
        let t = app();
        let (status, curriculum) = send(
            &t.app,
            "POST",
            "/curricula",
            Some((t.secretariat, "system_admin")),
            Some(curriculum_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let admin = Some((t.admin, "location_admin"));
        let (status, enrollment) = send(
            &t.app,
            "POST",
            "/enrollments",
            admin,
            Some(json!({
                "person": PersonId::new().to_string(),
                "curriculum": curriculum["id"],
                "gear_type": PersonId::new().to_string()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let enrollment_id = enrollment["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &t.app,
            "POST",
            "/enrollments/complete-core",
            admin,
            Some(json!({"enrollments": [enrollment_id]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, progress) = send(
            &t.app,
            "GET",
            &format!("/enrollments/{enrollment_id}/progress"),
            None,
            None,
        )
        .await;
        assert_eq!(progress["required_completed"], 2);
        assert_eq!(progress["has_completed_module"], true);

        let (status, issued) = send(
            &t.app,
            "POST",
            "/certificates/issue",
            admin,
            Some(json!({"enrollments": [enrollment_id]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let certificate = &issued["certificates"][0];

        let (status, again) = send(
            &t.app,
            "POST",
            "/certificates/issue",
            admin,
            Some(json!({"enrollments": [enrollment_id]})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["kind"], "uniqueness");

        let (status, verified) = send(
            &t.app,
            "GET",
            &format!(
                "/certificates/verify/{}?code={}",
                certificate["handle"].as_str().unwrap(),
                certificate["verification_code"].as_str().unwrap()
            ),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["valid"], true);

        t.clock.advance(Duration::hours(25));
        let (status, body) = send(
            &t.app,
            "POST",
            "/certificates/withdraw",
            admin,
            Some(json!({"certificates": [certificate["id"]]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["message"].as_str().unwrap().contains("secretariat"));
    }

    #[tokio::test]
    async fn import_reports_per_row() {
        let t = app();
        let (status, report) = send(
            &t.app,
            "POST",
            "/qualifications/import",
            Some((t.admin, "location_admin")),
            Some(json!({"rows": [
                {"person": PersonId::new().to_string(), "task_unit": PersonId::new().to_string()},
                {"person": "bogus", "task_unit": PersonId::new().to_string()}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["succeeded"], 1);
        assert_eq!(report["failed"][0]["row"], 1);
    }
}
