use std::time::{Duration, Instant};

use jobboard_client::types::JobFilter;
use jobboard_client::{ApiClient, ClientError, GovernorConfig};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_governor() -> GovernorConfig {
    GovernorConfig {
        base_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..GovernorConfig::default()
    }
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "OK",
        "data": data,
    }))
}

fn job_json(id: Uuid) -> Value {
    json!({
        "id": id,
        "employer_id": Uuid::new_v4(),
        "title": "Backend Intern",
        "description": "Build APIs",
        "location": "Bangkok",
        "job_type": "internship",
        "work_mode": "hybrid",
        "salary_min": 15000,
        "salary_max": 20000,
        "requirements": [],
        "tags": ["rust"],
        "application_deadline": null,
        "status": "open",
        "company_name": "Acme",
        "created_at": "2026-01-05T10:00:00Z",
        "updated_at": "2026-01-05T10:00:00Z"
    })
}

#[tokio::test]
async fn test_retries_after_429_then_succeeds() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let job_path = format!("/api/jobs/{id}");

    Mock::given(method("GET"))
        .and(path(job_path.as_str()))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(job_path.as_str()))
        .respond_with(ok(job_json(id)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), fast_governor()).unwrap();
    let job = client.get_job(id).await.unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.company_name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/list"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let governor = GovernorConfig {
        max_retries: 2,
        ..fast_governor()
    };
    let client = ApiClient::new(server.uri(), governor).unwrap();
    let err = client.list_jobs(&JobFilter::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::RateLimited { retries: 2 }));
}

#[tokio::test]
async fn test_concurrent_identical_gets_share_one_request() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(format!("/api/jobs/{id}").as_str()))
        .respond_with(ok(job_json(id)).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), fast_governor()).unwrap();
    let (a, b, c) = tokio::join!(client.get_job(id), client.get_job(id), client.get_job(id));
    assert_eq!(a.unwrap().id, id);
    assert_eq!(b.unwrap().id, id);
    assert_eq!(c.unwrap().id, id);
}

#[tokio::test]
async fn test_api_error_surfaces_envelope_message() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(format!("/api/jobs/{id}").as_str()))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "message": "Job not found",
            "data": null,
            "code": "NOT_FOUND",
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), fast_governor()).unwrap();
    match client.get_job(id).await {
        Err(ClientError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Job not found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_login_token_is_sent_on_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ok(json!({
            "access_token": "tok-123",
            "token_type": "Bearer",
            "expires_in": 900,
            "user": {
                "id": Uuid::new_v4(),
                "email": "student@uni.ac.th",
                "role": "student",
                "status": "approved",
                "full_name": "Somchai",
                "phone": null
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .and(query_param("unread_only", "true"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ok(json!({ "items": [], "unread_count": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), fast_governor()).unwrap();
    let session = client.login("student@uni.ac.th", "Secret123").await.unwrap();
    assert_eq!(session.user.role, "student");
    let list = client.notifications(true).await.unwrap();
    assert_eq!(list.unread_count, 0);
}

#[tokio::test]
async fn test_concurrency_cap_serializes_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok(json!(null)).set_delay(Duration::from_millis(150)))
        .expect(2)
        .mount(&server)
        .await;

    let governor = GovernorConfig {
        max_concurrent: 1,
        ..fast_governor()
    };
    let client = ApiClient::new(server.uri(), governor).unwrap();
    let start = Instant::now();
    let (a, b) = tokio::join!(client.get::<()>("/a"), client.get::<()>("/b"));
    a.unwrap();
    b.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_endpoint_cooldown_spaces_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/list"))
        .respond_with(ok(json!({ "items": [], "page": 1, "page_size": 20, "total": 0 })))
        .expect(2)
        .mount(&server)
        .await;

    let governor = fast_governor().with_cooldown("/api/job/list", Duration::from_millis(250));
    let client = ApiClient::new(server.uri(), governor).unwrap();
    let start = Instant::now();
    client.list_jobs(&JobFilter::default()).await.unwrap();
    let page = client.list_jobs(&JobFilter::default()).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(start.elapsed() >= Duration::from_millis(250));
}
