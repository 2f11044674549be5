// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Piper TTS via the `piper` binary.
//!
//! Loading resolves the `.onnx` voice through the model store and requires
//! the matching `.onnx.json` sidecar. Synthesis shells out once per request;
//! the cached handle carries only the resolved paths, which is what makes
//! repeat requests cheap.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::settings::Settings;

use voxgate_models::{LoadedModel, ModelHandle, ModelStore};

use crate::{archive, downcast_handle, invocation_error, resolve_binary, SpeechExtras, TtsEngine};

/// A resolved Piper voice.
#[derive(Debug)]
pub struct PiperVoice {
    pub model_path: PathBuf,
    pub config_path: PathBuf,
}

impl LoadedModel for PiperVoice {
    fn kind(&self) -> &'static str {
        "piper"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct PiperTts {
    store: ModelStore,
    bin: Option<PathBuf>,
}

impl PiperTts {
    pub fn new(store: ModelStore, settings: &Settings) -> Self {
        Self { store, bin: settings.piper_bin.clone() }
    }

    fn binary(&self) -> Result<PathBuf> {
        resolve_binary(
            self.bin.as_deref(),
            &["piper"],
            "PIPER_BIN not configured or binary not found",
        )
    }
}

#[async_trait]
impl TtsEngine for PiperTts {
    async fn load(&self, id: &str, extras: &SpeechExtras) -> Result<ModelHandle> {
        let store = self.store.clone();
        let id = id.to_string();
        let voice = extras.voice.clone();

        // Resolution walks the voice tree; keep it off the reactor.
        let model_path = tokio::task::spawn_blocking(move || {
            store.resolve_piper_voice(&id, voice.as_deref())
        })
        .await
        .map_err(|e| SpeechError::Internal(format!("voice resolution task failed: {e}")))??;

        let config_path = PathBuf::from(format!("{}.json", model_path.display()));
        if !config_path.is_file() {
            return Err(SpeechError::ArtifactMissing(format!(
                "Piper config not found: {}",
                config_path.display()
            )));
        }

        debug!(model = %model_path.display(), "resolved piper voice");
        Ok(std::sync::Arc::new(PiperVoice { model_path, config_path }))
    }

    async fn synthesize(
        &self,
        handle: &ModelHandle,
        text: &str,
        _extras: &SpeechExtras,
    ) -> Result<Vec<u8>> {
        let voice = downcast_handle::<PiperVoice>(handle)?;
        let bin = self.binary()?;

        let scratch = tempfile::tempdir()?;
        let text_file = scratch.path().join("text.txt");
        let wav_file = scratch.path().join("out.wav");
        tokio::fs::write(&text_file, text).await?;

        let output = Command::new(&bin)
            .arg("--model")
            .arg(&voice.model_path)
            .arg("--config")
            .arg(&voice.config_path)
            .arg("--output_file")
            .arg(&wav_file)
            .arg("--text_file")
            .arg(&text_file)
            .output()
            .await
            .map_err(|e| {
                SpeechError::InvocationFailed(format!("failed to run {}: {e}", bin.display()))
            })?;
        if !output.status.success() {
            return Err(invocation_error("piper", &output));
        }

        let wav = tokio::fs::read(&wav_file).await.map_err(|e| {
            SpeechError::InvocationFailed(format!("piper produced no output: {e}"))
        })?;
        archive::save_tts(self.store.layout(), &wav).await;
        Ok(wav)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use voxgate_core::layout::DataLayout;

    fn engine(tmp: &tempfile::TempDir, settings: Settings) -> PiperTts {
        PiperTts::new(ModelStore::new(DataLayout::new(tmp.path().join("data"))), &settings)
    }

    #[tokio::test]
    async fn test_load_missing_voice_is_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(&tmp, Settings::default());
        let err =
            engine.load("no-such-voice", &SpeechExtras::default()).await.unwrap_err();
        assert!(matches!(err, SpeechError::ArtifactMissing(_)));
    }

    #[tokio::test]
    async fn test_load_requires_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(&tmp, Settings::default());

        let piper = engine.store.layout().piper_dir().unwrap();
        let voice = piper.join("en/en_US/amy/medium/en_US-amy-medium.onnx");
        std::fs::create_dir_all(voice.parent().unwrap()).unwrap();
        std::fs::write(&voice, b"onnx").unwrap();

        let err =
            engine.load("en_US-amy-medium", &SpeechExtras::default()).await.unwrap_err();
        assert!(matches!(err, SpeechError::ArtifactMissing(_)));
        assert!(err.to_string().contains("Piper config not found"));

        std::fs::write(format!("{}.json", voice.display()), b"{}").unwrap();
        let handle = engine.load("en_US-amy-medium", &SpeechExtras::default()).await.unwrap();
        assert_eq!(handle.kind(), "piper");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesize_with_stub_binary() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();

        // Stand-in binary that writes a few bytes to --output_file.
        let stub = tmp.path().join("piper-stub");
        std::fs::write(
            &stub,
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output_file\" ]; then out=\"$2\"; fi\n  shift\ndone\nprintf 'RIFFWAVE' > \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = Settings { piper_bin: Some(stub), ..Settings::default() };
        let engine = engine(&tmp, settings);

        let piper = engine.store.layout().piper_dir().unwrap();
        let voice = piper.join("en_US-amy-medium.onnx");
        std::fs::write(&voice, b"onnx").unwrap();
        std::fs::write(format!("{}.json", voice.display()), b"{}").unwrap();

        let handle = engine.load("en_US-amy-medium", &SpeechExtras::default()).await.unwrap();
        let wav =
            engine.synthesize(&handle, "hello world", &SpeechExtras::default()).await.unwrap();
        assert_eq!(wav, b"RIFFWAVE");
    }

    #[tokio::test]
    async fn test_synthesize_without_binary_is_dependency_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings {
            piper_bin: Some(tmp.path().join("missing-piper")),
            ..Settings::default()
        };
        let engine = engine(&tmp, settings);

        let piper = engine.store.layout().piper_dir().unwrap();
        let voice = piper.join("en_US-amy-medium.onnx");
        std::fs::write(&voice, b"onnx").unwrap();
        std::fs::write(format!("{}.json", voice.display()), b"{}").unwrap();

        let handle = engine.load("en_US-amy-medium", &SpeechExtras::default()).await.unwrap();
        let err = engine
            .synthesize(&handle, "hello", &SpeechExtras::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::DependencyMissing(_)));
    }
}
