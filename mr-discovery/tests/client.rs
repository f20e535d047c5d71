//! Exercises [`DiscoveryClient`] against a local mock HTTP server standing in
//! for the discovery service, grounded on the mockito-based HTTP client
//! tests elsewhere in the example pack.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mr_discovery::DiscoveryClient;
use mr_discovery::DiscoveryError;

const TASK_ID: &str = "task-42";
const KEY: [u8; 16] = *b"0123456789abcdef";

fn key_b64() -> String {
    BASE64.encode(KEY)
}

#[tokio::test]
async fn register_worker_returns_the_granted_lease() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/workers")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"worker_id":"w1","port":11235,"ttl":60}"#)
        .create_async()
        .await;

    let client = DiscoveryClient::new(server.url()).unwrap();
    let registration = client.register_worker(11235).await.unwrap();

    assert_eq!(registration.worker_id, "w1");
    assert_eq!(registration.ttl, 60);
    mock.assert_async().await;
}

#[tokio::test]
async fn get_tasks_reports_insufficient_credits() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/tasks")
        .with_status(406)
        .with_header("content-type", "application/json")
        .with_body(r#"{"available_credits":2,"needed_credits":5}"#)
        .create_async()
        .await;

    let client = DiscoveryClient::new(server.url()).unwrap();
    let err = client.get_tasks(5).await.unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::InsufficientCredits {
            available: 2,
            needed: 5
        }
    ));
}

#[tokio::test]
async fn encrypt_then_decrypt_for_task_round_trips() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("/tasks/{TASK_ID}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"key":"{}"}}"#, key_b64()))
        .expect(1)
        .create_async()
        .await;
    server
        .mock("DELETE", format!("/tasks/{TASK_ID}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"key":"{}"}}"#, key_b64()))
        .expect(1)
        .create_async()
        .await;

    let client = DiscoveryClient::new(server.url()).unwrap();
    let ciphertext = client
        .encrypt_for_task(TASK_ID, b"0123456789abcdef")
        .await
        .unwrap();
    let plaintext = client.decrypt_for_task(TASK_ID, &ciphertext).await.unwrap();

    assert_eq!(plaintext, b"0123456789abcdef");
}

#[tokio::test]
async fn unknown_task_key_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("/tasks/{TASK_ID}").as_str())
        .with_status(404)
        .create_async()
        .await;

    let client = DiscoveryClient::new(server.url()).unwrap();
    let err = client.encrypt_for_task(TASK_ID, b"data").await.unwrap_err();

    assert!(matches!(err, DiscoveryError::UnknownTask { .. }));
}

#[tokio::test]
async fn invalidate_data_returns_the_refunded_balance() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", format!("/tasks/{TASK_ID}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"credits":17}"#)
        .create_async()
        .await;

    let client = DiscoveryClient::new(server.url()).unwrap();
    let credits = client.invalidate_data(TASK_ID).await.unwrap();

    assert_eq!(credits, 17);
}
