// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Request routing and dispatch for the engine.
//!
//! The transport layer hands over `(method, path, body)` once a stream's
//! request body is complete; everything here is transport-agnostic, which is
//! also what makes it unit-testable without a QUIC endpoint.
//!
//! Dispatch for an inference request: classify the model identifier, fetch
//! (or load) the handle through the cache, then run the adapter.

use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::{debug, warn};

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::protocol::{SpeechRequest, TranscriptionRequest};
use voxgate_models::{cache_key, classify, Endpoint, ModelKind};
use voxgate_runtimes::SpeechExtras;

use crate::state::EngineState;

pub const SPEECH_PATH: &str = "/v1/stream/audio/speech";
pub const TRANSCRIPTIONS_PATH: &str = "/v1/stream/audio/transcriptions";

/// A fully-buffered engine response, sent as one DATA frame.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl Reply {
    fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: Bytes::from(value.to_string()),
        }
    }

    fn from_error(err: &SpeechError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::json(status, &err.to_envelope())
    }
}

/// Route a complete request to its handler.
pub async fn dispatch(state: &Arc<EngineState>, method: &Method, path: &str, body: &[u8]) -> Reply {
    debug!(%method, path, body_len = body.len(), "dispatching stream request");

    match (method.as_str(), path) {
        ("GET", "/health") => {
            Reply::json(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
        },
        ("POST", SPEECH_PATH) => match handle_speech(state, body).await {
            Ok(wav) => Reply { status: StatusCode::OK, content_type: "audio/wav", body: wav },
            Err(err) => {
                warn!(error = %err, "speech request failed");
                Reply::from_error(&err)
            },
        },
        ("POST", TRANSCRIPTIONS_PATH) => match handle_transcription(state, body).await {
            Ok(json) => {
                Reply { status: StatusCode::OK, content_type: "application/json", body: json }
            },
            Err(err) => {
                warn!(error = %err, "transcription request failed");
                Reply::from_error(&err)
            },
        },
        _ => Reply::json(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "not found" })),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body).map_err(|e| SpeechError::BadRequest(format!("invalid JSON: {e}")))
}

async fn handle_speech(state: &Arc<EngineState>, body: &[u8]) -> Result<Bytes> {
    let req: SpeechRequest = parse_body(body)?;
    let text = req.text.trim().to_string();
    let model = req.model.trim().to_string();
    if text.is_empty() || model.is_empty() {
        return Err(SpeechError::BadRequest("text and model required".to_string()));
    }

    let models_root = state.store.layout().models_dir()?;
    let kind = classify(&model, Endpoint::Speech, &models_root)?;
    let engine = match kind {
        ModelKind::ParlerSnapshot => Arc::clone(&state.parler),
        ModelKind::PiperVoice => Arc::clone(&state.piper),
        ModelKind::WhisperCppLocal | ModelKind::HfWhisperRemote => {
            return Err(SpeechError::Internal(format!(
                "classifier produced non-TTS kind '{}' for the speech route",
                kind.label()
            )));
        },
    };

    let extras = SpeechExtras { voice: req.voice.clone(), description: req.description.clone() };
    let key = cache_key(kind.label(), &model, extras.voice.as_deref());

    let loader_engine = Arc::clone(&engine);
    let loader_model = model.clone();
    let loader_extras = extras.clone();
    let handle = state
        .cache
        .get(&key, move || async move { loader_engine.load(&loader_model, &loader_extras).await })
        .await?;

    let wav = engine.synthesize(&handle, &text, &extras).await?;
    Ok(Bytes::from(wav))
}

async fn handle_transcription(state: &Arc<EngineState>, body: &[u8]) -> Result<Bytes> {
    let req: TranscriptionRequest = parse_body(body)?;
    let model = {
        let trimmed = req.model.trim();
        if trimmed.is_empty() { "whisper-1".to_string() } else { trimmed.to_string() }
    };
    if req.audio_b64.is_empty() {
        return Err(SpeechError::BadRequest("audio_b64 required".to_string()));
    }
    let audio = base64::engine::general_purpose::STANDARD
        .decode(req.audio_b64.as_bytes())
        .map_err(|_| SpeechError::BadRequest("invalid base64".to_string()))?;

    let models_root = state.store.layout().models_dir()?;
    let kind = classify(&model, Endpoint::Transcription, &models_root)?;
    let engine = match kind {
        ModelKind::HfWhisperRemote => Arc::clone(&state.hf_whisper),
        ModelKind::WhisperCppLocal => Arc::clone(&state.whisper_cpp),
        ModelKind::ParlerSnapshot | ModelKind::PiperVoice => {
            return Err(SpeechError::Internal(format!(
                "classifier produced non-STT kind '{}' for the transcription route",
                kind.label()
            )));
        },
    };

    let key = cache_key(kind.label(), &model, None);
    let loader_engine = Arc::clone(&engine);
    let loader_model = model.clone();
    let handle = state
        .cache
        .get(&key, move || async move { loader_engine.load(&loader_model).await })
        .await?;

    let result = engine.transcribe(&handle, &audio, req.language.as_deref()).await?;
    let json = serde_json::to_vec(&result)
        .map_err(|e| SpeechError::Internal(format!("transcript encode failed: {e}")))?;
    Ok(Bytes::from(json))
}
