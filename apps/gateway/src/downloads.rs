// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Download request routing.
//!
//! `POST /v1/models/download` fans out by name shape: Parler snapshot ids,
//! the piper voice dataset, canonical whisper artifacts, or a plain URL.

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::protocol::{DownloadReceipt, DownloadRequest};
use voxgate_models::Downloader;

/// Route one download request to the matching fetcher.
///
/// # Errors
///
/// Returns `bad-request` when required fields for the matched route are
/// missing.
pub async fn route_download(
    downloader: &Downloader,
    req: DownloadRequest,
) -> Result<DownloadReceipt> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(SpeechError::BadRequest("name required".to_string()));
    }

    // Parler-TTS: model name like "parler-tts/parler-tts-mini-v1"
    if name.starts_with("parler-tts/") {
        return downloader.start_parler_snapshot(name).await;
    }

    // Piper voices (ONNX dataset) go to the data dir
    if name == "piper-tts" {
        let voice = req
            .voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SpeechError::BadRequest("voice required for piper-tts".to_string()))?;
        return downloader.start_piper_voice(voice).await;
    }

    let url = req.url.as_deref().map(str::trim).filter(|u| !u.is_empty()).map(String::from);

    // Whisper GGUF/BIN by canonical names
    if name.ends_with(".bin") || name.ends_with(".gguf") || name.starts_with("ggml-") {
        return downloader.start_whisper(name, url).await;
    }

    // Fallback: direct URL into the models dir
    let url = url
        .ok_or_else(|| SpeechError::BadRequest("url required for generic download".to_string()))?;
    downloader.start_generic(name, &url, req.format).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use voxgate_core::layout::DataLayout;
    use voxgate_models::ModelStore;

    fn downloader(tmp: &tempfile::TempDir) -> Downloader {
        Downloader::new(ModelStore::new(DataLayout::new(tmp.path().join("data"))), None)
    }

    fn request(name: &str) -> DownloadRequest {
        DownloadRequest { name: name.to_string(), url: None, format: None, voice: None }
    }

    #[tokio::test]
    async fn test_name_required() {
        let tmp = tempfile::tempdir().unwrap();
        let err = route_download(&downloader(&tmp), request("  ")).await.unwrap_err();
        assert!(matches!(err, SpeechError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_piper_requires_voice() {
        let tmp = tempfile::tempdir().unwrap();
        let err = route_download(&downloader(&tmp), request("piper-tts")).await.unwrap_err();
        assert!(err.to_string().contains("voice required"));
    }

    #[tokio::test]
    async fn test_generic_requires_url() {
        let tmp = tempfile::tempdir().unwrap();
        let err = route_download(&downloader(&tmp), request("my-model")).await.unwrap_err();
        assert!(err.to_string().contains("url required"));
    }

    #[tokio::test]
    async fn test_whisper_route_accepts_canonical_name() {
        let tmp = tempfile::tempdir().unwrap();
        let receipt =
            route_download(&downloader(&tmp), request("ggml-base.en.bin")).await.unwrap();
        assert_eq!(receipt.status, "started");
        assert!(receipt.path.contains("ggml-base.en"));
    }
}
