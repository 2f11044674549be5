// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::disallowed_macros,
    clippy::uninlined_format_args
)]

use std::net::SocketAddr;

use axum::http::StatusCode;
use tokio::net::TcpListener;
use tokio::time::Duration;

use voxgate_core::settings::Settings;
use voxgate_gateway::{server::create_app, Config};

struct TestServer {
    addr: SocketAddr,
    _data_dir: tempfile::TempDir,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_test_server(
    mutate: impl FnOnce(&mut Config, &mut Settings),
) -> Option<TestServer> {
    let data_dir = tempfile::tempdir().expect("tempdir");

    let mut config = Config::default();
    config.data_dir = Some(data_dir.path().join("data").display().to_string());
    let mut settings = Settings::default();
    mutate(&mut config, &mut settings);

    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("Failed to bind test server listener: {e}"),
    };
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (app, _state) = create_app(config, settings);
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    Some(TestServer { addr, _data_dir: data_dir, _handle: handle })
}

#[tokio::test]
async fn test_root_and_health() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        eprintln!("Skipping HTTP tests: local TCP bind not permitted");
        return;
    };

    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{}/", server.addr)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "voxgate-gateway");
    assert!(body["quic_base"].is_null());

    let resp = client.get(format!("http://{}/health", server.addr)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_bearer_auth_matrix() {
    let Some(server) = start_test_server(|_, settings| {
        settings.api_tokens = vec!["s1".to_string(), "s2".to_string()];
    })
    .await
    else {
        return;
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/health", server.addr);

    let resp =
        client.get(&url).header("Authorization", "Bearer s2").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp =
        client.get(&url).header("Authorization", "Bearer s3").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit_rejects_fourth_request() {
    let Some(server) = start_test_server(|config, _| {
        config.limits.max_requests = 3;
        config.limits.window_seconds = 10;
    })
    .await
    else {
        return;
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/health", server.addr);

    for _ in 0..3 {
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_models_list_reads_store() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/models", server.addr);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_completions_echoes_last_message() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "model": "anything",
        "messages": [
            { "role": "user", "content": "first" },
            { "role": "user", "content": "hello voxgate" }
        ]
    });

    let resp = client
        .post(format!("http://{}/v1/chat/completions", server.addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["object"], "chat.completion");
    assert_eq!(parsed["model"], "anything");
    assert_eq!(parsed["choices"][0]["message"]["content"], "echo: hello voxgate");
    assert_eq!(parsed["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_images_generations_not_implemented() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/v1/images/generations", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let resp =
        client.get(format!("http://{}/v1/nope", server.addr)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_validation_errors() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/models/download", server.addr);

    // Missing name.
    let resp = client.post(&url).json(&serde_json::json!({})).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Generic download without a URL.
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "name": "my-model" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["error"], "url required for generic download");

    // Piper voice without a voice path.
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "name": "piper-tts" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_status_starts_empty() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/v1/models/download/status", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert!(parsed.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_speech_without_engine_is_502() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/v1/audio/speech", server.addr))
        .json(&serde_json::json!({ "text": "hi", "model": "en_US-amy-medium" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["error"], "STREAM_ENGINE_BASE not configured");
}

#[tokio::test]
async fn test_transcriptions_without_engine_is_502() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(b"RIFFWAVE".to_vec()).file_name("in.wav"))
        .text("model", "ggml-base.en")
        .text("response_format", "json");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/v1/audio/transcriptions", server.addr))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_transcriptions_require_file_field() {
    let Some(server) = start_test_server(|_, _| {}).await else {
        return;
    };

    let form = reqwest::multipart::Form::new().text("model", "ggml-base.en");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/v1/audio/transcriptions", server.addr))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(parsed["error"], "file field required");
}
