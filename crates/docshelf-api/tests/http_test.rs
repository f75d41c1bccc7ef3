//! Router tests: status codes, the identity header and multipart upload.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use common::Pipeline;
use docshelf_api::{router, USER_ID_HEADER};
use docshelf_core::Category;

const BOUNDARY: &str = "docshelf-test-boundary";

fn multipart_body(filename: &str, data: &[u8], subject: &str, category: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"subject\"\r\n\r\n{subject}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{category}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(user: Uuid, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/documents")
        .header(USER_ID_HEADER, user.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_reports_components() {
    let p = Pipeline::new();
    let app = router(p.state());

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["index"], true);
    assert_eq!(body["cache"]["store"], "memory");
    assert!(body["extractors"].is_object());
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let p = Pipeline::new();
    let app = router(p.state());

    let (status, body) = send(&app, get("/api/v1/search?q=krebs", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains(USER_ID_HEADER));

    let request = Request::builder()
        .uri("/api/v1/stats")
        .header(USER_ID_HEADER, "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_multipart_upload_then_search() {
    let p = Pipeline::new();
    let app = router(p.state());
    let user = Uuid::new_v4();

    let body = multipart_body("osmosis.txt", b"water crosses membranes splendrix", "Biology", "notes");
    let (status, receipt) = send(&app, upload_request(user, body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(receipt["status"], "pending");
    assert_eq!(receipt["stage"], "enqueued");
    let id = receipt["id"].as_str().unwrap().to_string();

    p.drain().await;

    let (status, view) = send(
        &app,
        get(&format!("/api/v1/documents/{id}/status"), Some(user)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");

    let (status, results) = send(
        &app,
        get("/api/v1/search?q=splendrix&subject=Biology", Some(user)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["total"], 1);
    assert_eq!(results["hits"][0]["id"], id.as_str());

    let (status, subjects) = send(&app, get("/api/v1/subjects", Some(user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subjects[0]["value"], "Biology");
    assert_eq!(subjects[0]["count"], 1);
}

#[tokio::test]
async fn test_upload_rejections_map_to_status_codes() {
    let p = Pipeline::new().with_max_upload_bytes(16);
    let app = router(p.state());
    let user = Uuid::new_v4();

    let body = multipart_body("tool.exe", b"MZ", "Biology", "notes");
    let (status, _) = send(&app, upload_request(user, body)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let body = multipart_body("big.txt", &[b'a'; 32], "Biology", "notes");
    let (status, _) = send(&app, upload_request(user, body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let body = multipart_body("a.txt", b"fine", "Biology", "poster");
    let (status, body) = send(&app, upload_request(user, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("category"));

    assert!(p.documents.is_empty().await);
}

#[tokio::test]
async fn test_status_and_delete_respect_ownership() {
    let p = Pipeline::new();
    let app = router(p.state());
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();
    let stranger = Uuid::new_v4();

    let (status, _) = send(
        &app,
        get(&format!("/api/v1/documents/{}/status", receipt.id), Some(stranger)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let delete = |user: Uuid| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/v1/documents/{}", receipt.id))
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete(stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = send(&app, delete(p.owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["blob_removed"], true);

    let (status, _) = send(&app, delete(p.owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rename_subject_route() {
    let p = Pipeline::new();
    let app = router(p.state());
    p.upload("a.txt", "Bio 101", Category::Notes, b"alpha")
        .await
        .unwrap();

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/v1/subjects/Bio%20101")
        .header(USER_ID_HEADER, p.owner.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"new_name":"Biology"}"#))
        .unwrap();
    let (status, report) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["old_name"], "Bio 101");
    assert_eq!(report["records_renamed"], 1);

    let (status, page) = send(
        &app,
        get("/api/v1/documents?subject=Biology", Some(p.owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
}
