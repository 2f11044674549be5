// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parler TTS over a snapshot directory.
//!
//! The PyTorch runtime is not linked in; synthesis goes through an external
//! runner binary (`PARLER_TTS_BIN`) pointed at the snapshot. Without a
//! runner the adapter reports the missing dependency so the route answers
//! 501 instead of failing deeper in.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::settings::Settings;

use voxgate_models::{LoadedModel, ModelHandle, ModelStore};

use crate::{archive, downcast_handle, invocation_error, SpeechExtras, TtsEngine};

const DEFAULT_DESCRIPTION: &str = "A clear, neutral voice";

/// A verified Parler snapshot directory.
#[derive(Debug)]
pub struct ParlerSnapshot {
    pub dir: PathBuf,
}

impl LoadedModel for ParlerSnapshot {
    fn kind(&self) -> &'static str {
        "parler"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct ParlerTts {
    store: ModelStore,
    runner: Option<PathBuf>,
}

impl ParlerTts {
    pub fn new(store: ModelStore, settings: &Settings) -> Self {
        Self { store, runner: settings.parler_tts_bin.clone() }
    }

    fn runner(&self) -> Result<&PathBuf> {
        match &self.runner {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(SpeechError::DependencyMissing(
                "Parler-TTS runtime not installed. Set PARLER_TTS_BIN to a runner binary or mount the runtime."
                    .to_string(),
            )),
        }
    }
}

#[async_trait]
impl TtsEngine for ParlerTts {
    async fn load(&self, id: &str, _extras: &SpeechExtras) -> Result<ModelHandle> {
        let dir = self.store.model_dir(id)?;
        if !dir.is_dir() {
            return Err(SpeechError::ArtifactMissing(format!(
                "Parler model not found at {}",
                dir.display()
            )));
        }
        Ok(std::sync::Arc::new(ParlerSnapshot { dir }))
    }

    async fn synthesize(
        &self,
        handle: &ModelHandle,
        text: &str,
        extras: &SpeechExtras,
    ) -> Result<Vec<u8>> {
        let snapshot = downcast_handle::<ParlerSnapshot>(handle)?;
        let runner = self.runner()?.clone();

        let scratch = tempfile::tempdir()?;
        let text_file = scratch.path().join("text.txt");
        let wav_file = scratch.path().join("out.wav");
        tokio::fs::write(&text_file, text).await?;

        let description =
            extras.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION);

        let output = Command::new(&runner)
            .arg("--model-dir")
            .arg(&snapshot.dir)
            .arg("--text-file")
            .arg(&text_file)
            .arg("--output")
            .arg(&wav_file)
            .arg("--description")
            .arg(description)
            .output()
            .await
            .map_err(|e| {
                SpeechError::InvocationFailed(format!("failed to run {}: {e}", runner.display()))
            })?;
        if !output.status.success() {
            return Err(invocation_error("parler runner", &output));
        }

        let wav = tokio::fs::read(&wav_file).await.map_err(|e| {
            SpeechError::InvocationFailed(format!("parler runner produced no output: {e}"))
        })?;
        archive::save_tts(self.store.layout(), &wav).await;
        Ok(wav)
    }
}
