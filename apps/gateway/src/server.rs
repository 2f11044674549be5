// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! OpenAI-compatible HTTP/1.1 surface.
//!
//! Admission (bearer auth, sliding-window rate limit, connection tracking)
//! runs as middleware ahead of every route. Speech and transcription
//! requests are translated onto the HTTP/3 bridge; model listing and
//! downloads are handled locally.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use voxgate_core::error::SpeechError;
use voxgate_core::protocol::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, DownloadReceipt,
    DownloadRequest, ModelList, TranscriptionResult,
};

use crate::auth;
use crate::config::Config;
use crate::connections::ConnectionInfo;
use crate::downloads;
use crate::rate_limit;
use crate::state::AppState;

/// Engine-side stream routes the bridge posts to.
const ENGINE_SPEECH_PATH: &str = "/v1/stream/audio/speech";
const ENGINE_TRANSCRIPTIONS_PATH: &str = "/v1/stream/audio/transcriptions";

/// Error wrapper so handlers can use `?` and still produce the JSON envelope.
pub struct ApiError(pub SpeechError);

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_envelope())).into_response()
    }
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    ApiError(SpeechError::Internal(err.to_string()))
}

/// Combined admission middleware: auth, then rate limit, then connection
/// tracking around the handler.
async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let authorization =
        req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned);
    if let Err(err) = auth::authorize(&state.settings.api_tokens, authorization.as_deref()) {
        return ApiError(err).into_response();
    }

    if let Err(err) = state.limiter.check(&rate_limit::peer_key(Some(peer))).await {
        warn!(%peer, "rate limit exceeded");
        return ApiError(err).into_response();
    }

    let id = state.connections.insert(ConnectionInfo { peer: Some(peer), user: None }).await;
    let response = next.run(req).await;
    state.connections.remove(id).await;
    response
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    Json(serde_json::json!({
        "name": "voxgate-gateway",
        "time": time,
        "quic_base": state.settings.stream_engine_base,
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn models_list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelList>, ApiError> {
    let store = state.store.clone();
    let data = tokio::task::spawn_blocking(move || store.list_all())
        .await
        .map_err(internal)??;
    Ok(Json(ModelList { data }))
}

async fn models_download_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadReceipt>, ApiError> {
    let receipt = downloads::route_download(&state.downloader, req).await?;
    Ok(Json(receipt))
}

async fn download_status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.downloader.states().await)
}

/// Compatibility stub: there is no local LLM, so the last user message is
/// echoed back in the OpenAI completion shape.
async fn chat_completions_handler(
    Json(req): Json<ChatCompletionRequest>,
) -> Json<ChatCompletionResponse> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();

    Json(ChatCompletionResponse {
        id: format!("chatcmpl-{}", now.as_millis()),
        object: "chat.completion".to_string(),
        created: now.as_secs(),
        model: req.model.unwrap_or_else(|| "stub-echo".to_string()),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: format!("echo: {last}"),
            },
            finish_reason: "stop".to_string(),
        }],
    })
}

async fn audio_speech_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let reply = state.bridge.post_json(ENGINE_SPEECH_PATH, &body).await?;
    if reply.status != 200 {
        return Err(SpeechError::UpstreamUnavailable(reply.error_detail()).into());
    }

    let content_type = reply.content_type.unwrap_or_else(|| "audio/wav".to_string());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(reply.body))
        .map_err(internal)
}

async fn audio_transcriptions_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file: Option<Vec<u8>> = None;
    let mut model = "whisper-1".to_string();
    let mut language: Option<String> = None;
    let mut response_format = "json".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SpeechError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let read_err = |e: axum::extract::multipart::MultipartError| {
            SpeechError::BadRequest(format!("invalid multipart field: {e}"))
        };
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => file = Some(field.bytes().await.map_err(read_err)?.to_vec()),
            Some("model") => {
                let value = field.text().await.map_err(read_err)?;
                if !value.trim().is_empty() {
                    model = value.trim().to_string();
                }
            },
            Some("language") => {
                let value = field.text().await.map_err(read_err)?;
                if !value.trim().is_empty() {
                    language = Some(value.trim().to_string());
                }
            },
            Some("response_format") => {
                let value = field.text().await.map_err(read_err)?;
                if !value.trim().is_empty() {
                    response_format = value.trim().to_string();
                }
            },
            _ => {},
        }
    }

    let file = file
        .ok_or_else(|| ApiError(SpeechError::BadRequest("file field required".to_string())))?;

    // The audio travels as base64 JSON over the bridge.
    let payload = serde_json::json!({
        "model": model,
        "language": language,
        "audio_b64": base64::engine::general_purpose::STANDARD.encode(&file),
    });

    let reply = state.bridge.post_json(ENGINE_TRANSCRIPTIONS_PATH, &payload).await?;
    if reply.status != 200 {
        return Err(SpeechError::UpstreamUnavailable(reply.error_detail()).into());
    }

    let result: TranscriptionResult = serde_json::from_slice(&reply.body)
        .unwrap_or(TranscriptionResult { text: String::new(), language: None });
    let text = result.text.trim().to_string();

    match response_format.as_str() {
        "json" => Ok(Json(serde_json::json!({ "text": text })).into_response()),
        "text" => Ok(text.into_response()),
        "verbose_json" => Ok(Json(result).into_response()),
        other => Err(SpeechError::BadRequest(format!("Unsupported response_format: {other}"))
            .into()),
    }
}

async fn images_generations_handler() -> ApiError {
    ApiError(SpeechError::DependencyMissing("Image generation not implemented".to_string()))
}

async fn fallback_handler() -> ApiError {
    ApiError(SpeechError::NotFound("not found".to_string()))
}

/// Build the router and shared state.
pub fn create_app(config: Config, settings: voxgate_core::Settings) -> (Router, Arc<AppState>) {
    let state = AppState::new(config, settings);

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_list_handler))
        .route("/v1/models/download", post(models_download_handler))
        .route("/v1/models/download/status", get(download_status_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/audio/speech", post(audio_speech_handler))
        .route("/v1/audio/transcriptions", post(audio_transcriptions_handler))
        .route("/v1/images/generations", post(images_generations_handler))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), admission_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    (router, state)
}

/// Bind and serve until shutdown.
///
/// # Errors
///
/// Returns an error on fatal startup problems: unparsable address or port
/// bind failure.
pub async fn start_server(
    config: &Config,
    settings: voxgate_core::Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.server.address.parse()?;
    let (app, _state) = create_app(config.clone(), settings);

    // Set up graceful shutdown signal handler
    // These expect() calls are justified: installing signal handlers only
    // fails in environments where the process cannot run at all.
    #[allow(clippy::expect_used)]
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received CTRL-C signal, initiating graceful shutdown"),
            () = terminate => info!("Received SIGTERM signal, initiating graceful shutdown"),
        }
    };

    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("gateway stopped");
    Ok(())
}
