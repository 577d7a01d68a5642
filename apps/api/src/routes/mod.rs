pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::state::AppState;
use crate::{
    admin, announcements, applications, auth, documents, employer, jobs, notifications, professor,
    profile,
};

/// Room for multipart framing around the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/auth/register", post(auth::handlers::handle_register))
        .route("/api/auth/login", post(auth::handlers::handle_login))
        .route("/api/auth/refresh", post(auth::handlers::handle_refresh))
        .route("/api/auth/logout", post(auth::handlers::handle_logout))
        .route("/api/auth/me", get(auth::handlers::handle_me))
        .route(
            "/api/auth/change-password",
            post(auth::handlers::handle_change_password),
        )
        // Profile
        .route(
            "/api/profile",
            get(profile::handlers::handle_get_profile).patch(profile::handlers::handle_update_profile),
        )
        // Admin
        .route("/api/admin/users", get(admin::handlers::handle_list_users))
        .route(
            "/api/admin/users/professor",
            post(admin::handlers::handle_create_professor),
        )
        .route(
            "/api/admin/users/:id",
            get(admin::handlers::handle_get_user).delete(admin::handlers::handle_delete_user),
        )
        .route(
            "/api/admin/users/:id/approve",
            post(admin::handlers::handle_approve_user),
        )
        .route(
            "/api/admin/users/:id/reject",
            post(admin::handlers::handle_reject_user),
        )
        .route(
            "/api/admin/users/:id/suspend",
            post(admin::handlers::handle_suspend_user),
        )
        .route(
            "/api/admin/users/:id/reactivate",
            post(admin::handlers::handle_reactivate_user),
        )
        .route(
            "/api/admin/dashboard",
            get(admin::handlers::handle_admin_dashboard),
        )
        // Jobs
        .route("/api/job/list", post(jobs::handlers::handle_list_jobs))
        .route("/api/jobs", post(jobs::handlers::handle_create_job))
        .route(
            "/api/jobs/:job_id",
            get(jobs::handlers::handle_get_job)
                .patch(jobs::handlers::handle_update_job)
                .delete(jobs::handlers::handle_delete_job),
        )
        .route("/api/jobs/:job_id/close", post(jobs::handlers::handle_close_job))
        .route("/api/employer/jobs", get(jobs::handlers::handle_employer_jobs))
        // Applications
        .route(
            "/api/jobs/:job_id/apply",
            post(applications::handlers::handle_apply),
        )
        .route(
            "/api/jobs/:job_id/applications",
            get(applications::handlers::handle_job_applications),
        )
        .route(
            "/api/applications/mine",
            get(applications::handlers::handle_my_applications),
        )
        .route(
            "/api/applications/:id/status",
            axum::routing::patch(applications::handlers::handle_change_status),
        )
        .route(
            "/api/applications/:id/withdraw",
            post(applications::handlers::handle_withdraw),
        )
        // Documents
        .route(
            "/api/documents/resume",
            post(documents::handlers::handle_upload_profile_resume)
                .delete(documents::handlers::handle_delete_profile_resume),
        )
        .route(
            "/api/documents/resume/:user_id/download",
            get(documents::handlers::handle_download_resume),
        )
        .route(
            "/api/jobs/:job_id/resume",
            get(documents::handlers::handle_get_job_resume)
                .post(documents::handlers::handle_upload_job_resume)
                .delete(documents::handlers::handle_delete_job_resume),
        )
        .route(
            "/api/applications/:id/resume",
            get(documents::handlers::handle_download_application_resume),
        )
        // Announcements
        .route(
            "/api/announcements",
            get(announcements::handlers::handle_list_announcements)
                .post(announcements::handlers::handle_create_announcement),
        )
        .route(
            "/api/announcements/:id",
            axum::routing::patch(announcements::handlers::handle_update_announcement)
                .delete(announcements::handlers::handle_delete_announcement),
        )
        // Notifications
        .route(
            "/api/notifications",
            get(notifications::handlers::handle_list_notifications),
        )
        .route(
            "/api/notifications/read-all",
            post(notifications::handlers::handle_mark_all_read),
        )
        .route(
            "/api/notifications/:id/read",
            post(notifications::handlers::handle_mark_read),
        )
        // Dashboards
        .route(
            "/api/professor/students",
            get(professor::handlers::handle_list_students),
        )
        .route(
            "/api/professor/dashboard",
            get(professor::handlers::handle_professor_dashboard),
        )
        .route(
            "/api/employer/dashboard",
            get(employer::handlers::handle_employer_dashboard),
        )
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::tokens::TokenKind;
    use crate::models::user::Role;
    use crate::storage::local::LocalStorage;

    async fn test_state(dir: &tempfile::TempDir) -> AppState {
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        AppState::for_tests(Arc::new(storage))
    }

    fn bearer(state: &AppState, role: Role) -> String {
        let (token, _) = state
            .tokens
            .issue(Uuid::new_v4(), role, TokenKind::Access)
            .unwrap();
        format!("Bearer {token}")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "jobboard");
    }

    #[tokio::test]
    async fn test_protected_route_without_token_is_401() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::get("/api/admin/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_garbage_token_is_401() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::get("/api/notifications")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_student_cannot_open_admin_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let token = bearer(&state, Role::Student);
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::get("/api/admin/dashboard")
                    .header(header::AUTHORIZATION, token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_employer_cannot_apply() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let token = bearer(&state, Role::Employer);
        let app = build_router(state);
        let uri = format!("/api/jobs/{}/apply", Uuid::new_v4());
        let response = app
            .oneshot(
                Request::post(uri)
                    .header(header::AUTHORIZATION, token)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"resume_mode":"profile","pdpa_consent":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_apply_without_consent_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let token = bearer(&state, Role::Student);
        let app = build_router(state);
        let uri = format!("/api/jobs/{}/apply", Uuid::new_v4());
        let response = app
            .oneshot(
                Request::post(uri)
                    .header(header::AUTHORIZATION, token)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"resume_mode":"profile"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_enum_in_body_is_400_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::post("/api/job/list")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"job_type":"gig"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["message"].as_str().unwrap().contains("job_type"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_missing_json_content_type_is_415_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::post("/api/job/list")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["code"], "UNSUPPORTED_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn test_bad_uuid_in_path_is_400_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);
        let response = app
            .oneshot(
                Request::get("/api/jobs/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_upload_without_multipart_is_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let token = bearer(&state, Role::Student);
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::post("/api/documents/resume")
                    .header(header::AUTHORIZATION, token)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }
}
