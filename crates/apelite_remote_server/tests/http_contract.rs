//! The remote server over a real socket.

use apelite_remote_server::{RemoteServer, ServerConfig, INTERNAL_ID};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn serves_documents_over_tcp() {
    let running = RemoteServer::new(ServerConfig::ephemeral())
        .spawn()
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let base = running.url();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert!(health.status().is_success());

    let response = client
        .put(format!("{base}/collections/users/documents/u1"))
        .json(&json!({"id": "u1", "name": "A"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let docs: Vec<Value> = client
        .get(format!("{base}/collections/users/documents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "u1");
    assert!(docs[0][INTERNAL_ID].is_string());

    running.shutdown().await;
}

#[tokio::test]
async fn health_can_be_switched_off() {
    let running = RemoteServer::new(ServerConfig::ephemeral())
        .spawn()
        .await
        .unwrap();
    running.set_healthy(false);

    let health = reqwest::get(format!("{}/health", running.url()))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

    running.shutdown().await;
}
