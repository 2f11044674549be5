// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Maps an opaque model identifier to a runtime flavor.
//!
//! Classification is a pure function of the identifier, the endpoint it
//! arrived on, and the existence of a handful of files under the models
//! directory. It never touches the network, and the disk probes are single
//! directory reads.

use std::path::Path;

use voxgate_core::error::{Result, SpeechError};

/// Which route a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Speech,
    Transcription,
}

/// Runtime flavor a model identifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Snapshot directory consumed by the Parler runtime.
    ParlerSnapshot,
    /// Piper `.onnx` voice with a `.onnx.json` sidecar.
    PiperVoice,
    /// whisper.cpp `.gguf`/`.bin` artifact run locally.
    WhisperCppLocal,
    /// Hub-hosted `openai/whisper-*` model.
    HfWhisperRemote,
}

impl ModelKind {
    /// Tag used as the cache-key prefix and in logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ParlerSnapshot => "parler",
            Self::PiperVoice => "piper",
            Self::WhisperCppLocal => "whispercpp",
            Self::HfWhisperRemote => "hf-whisper",
        }
    }
}

const HF_WHISPER_ALIASES: [&str; 6] = [
    "whisper-tiny",
    "whisper-base",
    "whisper-small",
    "whisper-medium",
    "whisper-large",
    "whisper-large-v2",
];

/// Classify `id` for `endpoint`. `models_root` is the local model directory
/// probed for artifacts placed by hand or by the downloader.
///
/// # Errors
///
/// Returns `wrong-endpoint` when a Whisper artifact is sent to the speech
/// route.
pub fn classify(id: &str, endpoint: Endpoint, models_root: &Path) -> Result<ModelKind> {
    match endpoint {
        Endpoint::Speech => {
            if looks_like_parler(id, models_root) {
                return Ok(ModelKind::ParlerSnapshot);
            }
            if looks_like_whisper(id, models_root) {
                return Err(SpeechError::WrongEndpoint(
                    "Whisper/STT models are not valid for TTS. Use /v1/stream/audio/transcriptions."
                        .to_string(),
                ));
            }
            Ok(ModelKind::PiperVoice)
        },
        Endpoint::Transcription => {
            if is_hf_whisper(id) {
                Ok(ModelKind::HfWhisperRemote)
            } else {
                Ok(ModelKind::WhisperCppLocal)
            }
        },
    }
}

/// Normalize an HF whisper id: aliases get the `openai/` prefix.
pub fn hf_whisper_id(id: &str) -> String {
    if id.starts_with("openai/") {
        id.to_string()
    } else {
        format!("openai/{id}")
    }
}

fn is_hf_whisper(id: &str) -> bool {
    id.starts_with("openai/whisper-") || HF_WHISPER_ALIASES.contains(&id)
}

fn looks_like_parler(id: &str, models_root: &Path) -> bool {
    if id.starts_with("parler-tts/") {
        return true;
    }
    let dir = models_root.join(id);
    dir.join("config.json").is_file()
        || dir.join("pytorch_model.bin").is_file()
        || dir_has_extension(&dir, "safetensors")
}

fn looks_like_whisper(id: &str, models_root: &Path) -> bool {
    if id.starts_with("ggml-") || id.ends_with(".gguf") || id.ends_with(".bin") {
        return true;
    }
    let dir = models_root.join(id);
    dir_has_extension(&dir, "gguf") || dir_has_extension(&dir, "bin")
}

fn dir_has_extension(dir: &Path, ext: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(std::result::Result::ok).any(|entry| {
        let path = entry.path();
        path.is_file() && path.extension().is_some_and(|e| e == ext)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parler_prefix_classifies_on_speech() {
        let tmp = tempfile::tempdir().unwrap();
        let kind = classify("parler-tts/parler-tts-mini-v1", Endpoint::Speech, tmp.path()).unwrap();
        assert_eq!(kind, ModelKind::ParlerSnapshot);
    }

    #[test]
    fn test_local_snapshot_dir_classifies_as_parler() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("my-voice-model");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), "{}").unwrap();

        let kind = classify("my-voice-model", Endpoint::Speech, tmp.path()).unwrap();
        assert_eq!(kind, ModelKind::ParlerSnapshot);
    }

    #[test]
    fn test_whisper_artifact_rejected_on_speech() {
        let tmp = tempfile::tempdir().unwrap();
        for id in ["ggml-base.en", "model.gguf", "model.bin"] {
            let err = classify(id, Endpoint::Speech, tmp.path()).unwrap_err();
            assert!(matches!(err, SpeechError::WrongEndpoint(_)));
            assert!(err.to_string().contains("Whisper/STT models are not valid for TTS."));
        }
    }

    #[test]
    fn test_local_gguf_dir_rejected_on_speech() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("ggml-base-en");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("weights.gguf"), b"gguf").unwrap();

        let err = classify("ggml-base-en", Endpoint::Speech, tmp.path()).unwrap_err();
        assert!(matches!(err, SpeechError::WrongEndpoint(_)));
    }

    #[test]
    fn test_plain_name_defaults_to_piper() {
        let tmp = tempfile::tempdir().unwrap();
        let kind = classify("en_US-amy-medium", Endpoint::Speech, tmp.path()).unwrap();
        assert_eq!(kind, ModelKind::PiperVoice);
    }

    #[test]
    fn test_transcription_aliases_route_to_hub() {
        let tmp = tempfile::tempdir().unwrap();
        for id in ["whisper-tiny", "whisper-large-v2", "openai/whisper-small"] {
            let kind = classify(id, Endpoint::Transcription, tmp.path()).unwrap();
            assert_eq!(kind, ModelKind::HfWhisperRemote);
        }
        let kind = classify("ggml-base.en", Endpoint::Transcription, tmp.path()).unwrap();
        assert_eq!(kind, ModelKind::WhisperCppLocal);
    }

    #[test]
    fn test_hf_whisper_id_normalization() {
        assert_eq!(hf_whisper_id("whisper-small"), "openai/whisper-small");
        assert_eq!(hf_whisper_id("openai/whisper-small"), "openai/whisper-small");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let first = classify("en_US-amy-medium", Endpoint::Speech, tmp.path()).unwrap();
        let second = classify("en_US-amy-medium", Endpoint::Speech, tmp.path()).unwrap();
        assert_eq!(first, second);
    }
}
