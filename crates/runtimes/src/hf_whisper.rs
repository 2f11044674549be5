// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Hub-hosted Whisper (`openai/whisper-*`) over an optional runner binary.
//!
//! The transformers runtime lives outside this process; `HF_WHISPER_BIN`
//! points at a runner that pulls the model from its own hub cache. The
//! handle carries only the normalized model id.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::layout::DataLayout;
use voxgate_core::protocol::TranscriptionResult;
use voxgate_core::settings::Settings;

use voxgate_models::classify::hf_whisper_id;
use voxgate_models::{LoadedModel, ModelHandle};

use crate::{archive, downcast_handle, invocation_error, SttEngine};

/// A normalized hub whisper model id.
#[derive(Debug)]
pub struct HfWhisperModel {
    pub model_id: String,
}

impl LoadedModel for HfWhisperModel {
    fn kind(&self) -> &'static str {
        "hf-whisper"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct HfWhisper {
    layout: DataLayout,
    runner: Option<PathBuf>,
}

impl HfWhisper {
    pub fn new(layout: DataLayout, settings: &Settings) -> Self {
        Self { layout, runner: settings.hf_whisper_bin.clone() }
    }

    fn runner(&self) -> Result<&PathBuf> {
        match &self.runner {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(SpeechError::DependencyMissing(
                "HF Whisper runtime not installed. Set HF_WHISPER_BIN to a runner binary."
                    .to_string(),
            )),
        }
    }
}

#[async_trait]
impl SttEngine for HfWhisper {
    async fn load(&self, id: &str) -> Result<ModelHandle> {
        Ok(std::sync::Arc::new(HfWhisperModel { model_id: hf_whisper_id(id) }))
    }

    async fn transcribe(
        &self,
        handle: &ModelHandle,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let model = downcast_handle::<HfWhisperModel>(handle)?;
        let runner = self.runner()?.clone();

        let scratch = tempfile::tempdir()?;
        let wav_path = scratch.path().join("input.wav");
        let txt_path = scratch.path().join("out.txt");
        tokio::fs::write(&wav_path, audio).await?;

        let mut cmd = Command::new(&runner);
        cmd.arg("--model")
            .arg(&model.model_id)
            .arg("--input")
            .arg(&wav_path)
            .arg("--output")
            .arg(&txt_path);
        if let Some(lang) = language {
            cmd.arg("--language").arg(lang);
        }

        let output = cmd.output().await.map_err(|e| {
            SpeechError::InvocationFailed(format!("failed to run {}: {e}", runner.display()))
        })?;
        if !output.status.success() {
            return Err(invocation_error("hf-whisper runner", &output));
        }

        let text = tokio::fs::read_to_string(&txt_path).await.map_err(|e| {
            SpeechError::InvocationFailed(format!("hf-whisper runner produced no transcript: {e}"))
        })?;

        archive::save_stt(&self.layout, audio, &text).await;
        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            language: language.map(String::from),
        })
    }
}
