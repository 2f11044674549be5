// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Wire types shared by the gateway surface and the engine router.

use serde::{Deserialize, Serialize};

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

/// Body of `POST /v1/audio/speech` and `/v1/stream/audio/speech`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub model: String,
    /// Piper voice id, when distinct from `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Free-form voice description for description-conditioned runtimes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of `POST /v1/stream/audio/transcriptions`.
///
/// Audio travels as base64 inside the JSON body; the gateway packs the
/// multipart upload into this shape before bridging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    #[serde(default = "default_stt_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub audio_b64: String,
}

/// Transcript produced by an STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Error envelope used on both tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// One on-disk model or voice in a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSummary {
    pub id: String,
    pub files: Vec<String>,
}

/// Response of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelSummary>,
}

/// Body of `POST /v1/models/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Response of `POST /v1/models/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReceipt {
    pub status: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}
