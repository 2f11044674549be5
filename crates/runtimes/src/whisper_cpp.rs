// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Speech-to-text via the whisper.cpp binary.
//!
//! The binary writes its transcript next to the input (`-otxt -of <base>`);
//! we run it in a scratch directory and read the `.txt` back. whisper.cpp
//! builds often keep `libwhisper` as an uninstalled sibling of the binary,
//! so the loader path is extended with the binary's directory and its
//! neighbors before spawning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::protocol::TranscriptionResult;
use voxgate_core::settings::Settings;

use voxgate_models::{LoadedModel, ModelHandle, ModelStore};

use crate::{archive, downcast_handle, invocation_error, resolve_binary, SttEngine};

const BINARY_CANDIDATES: [&str; 4] = ["whisper-cpp", "whisper_cpp", "main", "whisper"];

/// A resolved whisper.cpp model file.
#[derive(Debug)]
pub struct WhisperModel {
    pub model_path: PathBuf,
}

impl LoadedModel for WhisperModel {
    fn kind(&self) -> &'static str {
        "whispercpp"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct WhisperCpp {
    store: ModelStore,
    bin: Option<PathBuf>,
    threads: usize,
}

impl WhisperCpp {
    pub fn new(store: ModelStore, settings: &Settings) -> Self {
        Self { store, bin: settings.whisper_cpp_bin.clone(), threads: settings.whisper_threads() }
    }

    fn binary(&self) -> Result<PathBuf> {
        resolve_binary(
            self.bin.as_deref(),
            &BINARY_CANDIDATES,
            "WHISPER_CPP_BIN not configured or binary not found",
        )
    }
}

#[async_trait]
impl SttEngine for WhisperCpp {
    async fn load(&self, id: &str) -> Result<ModelHandle> {
        let store = self.store.clone();
        let id = id.to_string();
        let model_path =
            tokio::task::spawn_blocking(move || store.resolve_whisper_model(&id))
                .await
                .map_err(|e| SpeechError::Internal(format!("model resolution task failed: {e}")))??;
        Ok(std::sync::Arc::new(WhisperModel { model_path }))
    }

    async fn transcribe(
        &self,
        handle: &ModelHandle,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let model = downcast_handle::<WhisperModel>(handle)?;
        let bin = self.binary()?;

        let scratch = tempfile::tempdir()?;
        let wav_path = scratch.path().join("input.wav");
        let out_base = scratch.path().join("out");
        tokio::fs::write(&wav_path, audio).await?;

        let mut cmd = Command::new(&bin);
        cmd.arg("-t")
            .arg(self.threads.to_string())
            .arg("-m")
            .arg(&model.model_path)
            .arg("-f")
            .arg(&wav_path)
            .arg("-otxt")
            .arg("-of")
            .arg(&out_base);
        if let Some(lang) = language {
            cmd.arg("-l").arg(lang);
        }
        cmd.env("LD_LIBRARY_PATH", library_path(&bin));

        let output = cmd.output().await.map_err(|e| {
            SpeechError::InvocationFailed(format!("failed to run {}: {e}", bin.display()))
        })?;
        if !output.status.success() {
            return Err(invocation_error("whisper.cpp", &output));
        }

        let txt_path = scratch.path().join("out.txt");
        let text = tokio::fs::read_to_string(&txt_path).await.map_err(|e| {
            SpeechError::InvocationFailed(format!("whisper.cpp produced no transcript: {e}"))
        })?;

        archive::save_stt(self.store.layout(), audio, &text).await;
        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            language: language.map(String::from),
        })
    }
}

/// Loader path covering common uninstalled whisper.cpp layouts.
fn library_path(bin: &Path) -> String {
    let mut parts: Vec<String> = std::env::var("LD_LIBRARY_PATH")
        .unwrap_or_default()
        .split(':')
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();

    let bin_dir = bin.parent();
    let root_dir = bin_dir.and_then(Path::parent);
    let candidates = [root_dir.map(|r| r.join("src")), bin_dir.map(Path::to_path_buf), root_dir.map(Path::to_path_buf)];
    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            let rendered = candidate.display().to_string();
            if !parts.contains(&rendered) {
                parts.push(rendered);
            }
        }
    }
    parts.join(":")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use voxgate_core::layout::DataLayout;

    fn engine(tmp: &tempfile::TempDir, settings: Settings) -> WhisperCpp {
        WhisperCpp::new(ModelStore::new(DataLayout::new(tmp.path().join("data"))), &settings)
    }

    #[tokio::test]
    async fn test_load_missing_model_is_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(&tmp, Settings::default());
        let err = engine.load("ggml-absent").await.unwrap_err();
        assert!(matches!(err, SpeechError::ArtifactMissing(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcribe_with_stub_binary() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();

        // Stand-in binary that writes a transcript to <-of base>.txt.
        let stub = tmp.path().join("whisper-stub");
        std::fs::write(
            &stub,
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-of\" ]; then base=\"$2\"; fi\n  shift\ndone\nprintf ' hello from whisper \\n' > \"$base.txt\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = Settings {
            whisper_cpp_bin: Some(stub),
            whisper_threads: Some(2),
            ..Settings::default()
        };
        let engine = engine(&tmp, settings);

        let models = engine.store.layout().models_dir().unwrap();
        let model_dir = models.join("ggml-base.en");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("ggml-base.en.bin"), b"bin").unwrap();

        let handle = engine.load("ggml-base.en").await.unwrap();
        let result =
            engine.transcribe(&handle, b"RIFFWAVE", Some("en")).await.unwrap();
        assert_eq!(result.text, "hello from whisper");
        assert_eq!(result.language.as_deref(), Some("en"));

        // Input and transcript are archived.
        let uploads = engine.store.layout().stt_uploads_dir().unwrap();
        assert_eq!(std::fs::read_dir(uploads).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_transcribe_without_binary_is_dependency_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings {
            whisper_cpp_bin: Some(tmp.path().join("missing-whisper")),
            ..Settings::default()
        };
        let engine = engine(&tmp, settings);

        let models = engine.store.layout().models_dir().unwrap();
        let model_dir = models.join("m");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("m.gguf"), b"gguf").unwrap();

        let handle = engine.load("m").await.unwrap();
        let err = engine.transcribe(&handle, b"wav", None).await.unwrap_err();
        assert!(matches!(err, SpeechError::DependencyMissing(_)));
    }
}
