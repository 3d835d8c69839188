//! End-to-end tests for the HTTP surface, run against the in-memory store

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use axum_test::TestServer;
use tower::ServiceExt;

use ssec_gateway::config::{Config, StoreBackend};
use ssec_gateway::encryption::KeyMaterial;
use ssec_gateway::routes;
use ssec_gateway::state::AppState;
use ssec_gateway::storage::{FaultKind, MemoryStore, StoreCall};

const BOUNDARY: &str = "gateway-test-boundary";
const PART_SIZE: usize = 1024;

fn test_keys(config: &Config) -> Arc<KeyMaterial> {
    Arc::new(
        KeyMaterial::from_base64(
            &config.encryption.key_base64,
            &config.encryption.key_md5_base64,
        )
        .unwrap(),
    )
}

fn test_app_with(config: Config) -> (Router, MemoryStore, Arc<KeyMaterial>) {
    let store = MemoryStore::recording();
    let keys = test_keys(&config);
    let state = AppState::new(config, Arc::new(store.clone()), keys.clone());
    (routes::router(state), store, keys)
}

fn test_app() -> (Router, MemoryStore, Arc<KeyMaterial>) {
    let mut config = Config::default();
    config.storage.backend = StoreBackend::Memory;
    config.transfer.part_size = PART_SIZE;
    test_app_with(config)
}

fn multipart_body(field: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
    let disposition = match file_name {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };
    let mut body = format!(
        "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, disposition
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

fn bucket() -> String {
    Config::default().storage.bucket
}

#[tokio::test]
async fn test_upload_returns_success_message() {
    let (app, store, _) = test_app();
    let data = sample_data(3000);

    let response = app
        .oneshot(upload_request(multipart_body("file", Some("report.bin"), &data)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"upload successfully!");

    let stored = store.object_data(&bucket(), "report.bin").await.unwrap();
    assert_eq!(stored.as_ref(), data.as_slice());

    let parts: Vec<i32> = store
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::UploadPart { part_number, .. } => Some(part_number),
            _ => None,
        })
        .collect();
    assert_eq!(parts, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let (app, _, _) = test_app();
    let data = sample_data(5000);

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body("file", Some("notes.txt"), &data)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/download/notes.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        data.len().to_string().as_str()
    );
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_upload_keeps_only_base_file_name() {
    let (app, store, _) = test_app();
    let data = sample_data(2000);

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body("file", Some("dir/sub/a.bin"), &data)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.object_data(&bucket(), "dir/sub/a.bin").await.is_none());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/download/a.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_upload_with_dot_file_name_is_rejected() {
    let (app, store, _) = test_app();

    let response = app
        .oneshot(upload_request(multipart_body("file", Some("dir/.."), b"abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.calls().await.is_empty());
}

#[tokio::test]
async fn test_upload_skips_other_fields() {
    let (app, store, _) = test_app();

    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nhello\r\n",
        BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(&multipart_body("file", Some("late.bin"), b"payload"));

    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        store.object_data(&bucket(), "late.bin").await.unwrap().as_ref(),
        b"payload"
    );
}

#[tokio::test]
async fn test_upload_part_failure_returns_empty_400_and_aborts() {
    let (app, store, _) = test_app();
    store.fail_part(2, FaultKind::Transport).await;

    let response = app
        .oneshot(upload_request(multipart_body(
            "file",
            Some("broken.bin"),
            &sample_data(3000),
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_bytes(response).await.is_empty());

    let calls = store.calls().await;
    let aborts = calls
        .iter()
        .filter(|c| matches!(c, StoreCall::AbortMultipartUpload { .. }))
        .count();
    assert_eq!(aborts, 1);
    assert!(!calls
        .iter()
        .any(|c| matches!(c, StoreCall::CompleteMultipartUpload { .. })));
    assert!(store.open_uploads().await.is_empty());
    assert!(store.object_data(&bucket(), "broken.bin").await.is_none());
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let (app, store, _) = test_app();

    let response = app
        .oneshot(upload_request(multipart_body("file", Some("empty.bin"), b"")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.calls().await.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_field_is_rejected() {
    let (app, store, _) = test_app();

    let response = app
        .oneshot(upload_request(multipart_body("document", Some("a.bin"), b"abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.calls().await.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_name_is_rejected() {
    let (app, store, _) = test_app();

    let response = app
        .oneshot(upload_request(multipart_body("file", None, b"abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.calls().await.is_empty());
}

#[tokio::test]
async fn test_upload_over_body_limit_is_rejected() {
    let mut config = Config::default();
    config.storage.backend = StoreBackend::Memory;
    config.transfer.part_size = PART_SIZE;
    config.transfer.max_upload_bytes = Some(2048);
    let (app, store, _) = test_app_with(config);

    let response = app
        .oneshot(upload_request(multipart_body(
            "file",
            Some("huge.bin"),
            &sample_data(8192),
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.object_data(&bucket(), "huge.bin").await.is_none());
    assert!(store.open_uploads().await.is_empty());
}

#[tokio::test]
async fn test_download_sets_content_length_and_type() {
    let (app, store, keys) = test_app();
    let data = sample_data(10 * 1024);
    store
        .insert_object(&bucket(), "image.png", data.clone(), keys.context())
        .await;

    let server = TestServer::new(app).unwrap();
    let response = server.get("/download/image.png").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header(header::CONTENT_LENGTH), "10240");
    assert_eq!(response.header(header::CONTENT_TYPE), "image/png");
    assert_eq!(response.as_bytes().as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_download_missing_object_is_400() {
    let (app, _, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/download/nothing-here.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_download_with_wrong_key_is_400() {
    let (app, store, _) = test_app();
    let other = KeyMaterial::from_raw_key(vec![7u8; 32]);
    store
        .insert_object(&bucket(), "secret.bin", b"ciphertext".to_vec(), other.context())
        .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/download/secret.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = test_app();
    let server = TestServer::new(app).unwrap();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "ssec-gateway");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["bucket"], "s3-sse-c-sample");
    assert_eq!(json["part_size"], PART_SIZE);
    assert_eq!(json["concurrency"], 1);
}
