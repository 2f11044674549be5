// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voxgate Runtimes - adapters around the actual inference engines.
//!
//! Every adapter implements the same two-step contract: `load` produces a
//! cacheable handle, then `synthesize` (TTS) or `transcribe` (STT) runs one
//! inference against it. Whether the work happens in an external binary or a
//! native library is an adapter detail; the router never knows.
//!
//! - [`piper`]: Piper ONNX voices via the `piper` binary
//! - [`whisper_cpp`]: local `.gguf`/`.bin` models via the whisper.cpp binary
//! - [`parler`]: Parler snapshot directories via an optional runner binary
//! - [`hf_whisper`]: hub-hosted `openai/whisper-*` models via an optional runner

pub mod archive;
pub mod hf_whisper;
pub mod parler;
pub mod piper;
pub mod whisper_cpp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::protocol::TranscriptionResult;
pub use voxgate_models::{LoadedModel, ModelHandle};

/// Per-request knobs that affect a synthesis call.
#[derive(Debug, Clone, Default)]
pub struct SpeechExtras {
    /// Piper voice id, when distinct from the model name.
    pub voice: Option<String>,
    /// Free-form voice description for description-conditioned runtimes.
    pub description: Option<String>,
}

/// Text-to-speech adapter contract.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Load the model behind `id` into a cacheable handle.
    async fn load(&self, id: &str, extras: &SpeechExtras) -> Result<ModelHandle>;

    /// Produce WAV bytes from text.
    async fn synthesize(
        &self,
        handle: &ModelHandle,
        text: &str,
        extras: &SpeechExtras,
    ) -> Result<Vec<u8>>;
}

/// Speech-to-text adapter contract.
#[async_trait]
pub trait SttEngine: Send + Sync {
    async fn load(&self, id: &str) -> Result<ModelHandle>;

    /// Transcribe WAV bytes.
    async fn transcribe(
        &self,
        handle: &ModelHandle,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;
}

/// Downcast a cached handle to an adapter's concrete type.
///
/// # Errors
///
/// Returns `internal` when the handle was produced by a different adapter,
/// which would indicate a cache-key collision.
pub fn downcast_handle<T: LoadedModel>(handle: &ModelHandle) -> Result<&T> {
    handle.as_any().downcast_ref::<T>().ok_or_else(|| {
        SpeechError::Internal(format!("cached handle has unexpected kind '{}'", handle.kind()))
    })
}

/// Search `PATH` for an executable name.
pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
}

/// Last few lines of subprocess stderr, enough to diagnose without flooding.
pub(crate) fn stderr_tail(output: &std::process::Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = text.lines().rev().take(5).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

pub(crate) fn invocation_error(what: &str, output: &std::process::Output) -> SpeechError {
    SpeechError::InvocationFailed(format!(
        "{what} exited with {}: {}",
        output.status,
        stderr_tail(output)
    ))
}

/// Resolve a configured binary, falling back to a `PATH` search.
///
/// # Errors
///
/// Returns `dependency-missing` with `hint` when nothing usable is found.
pub(crate) fn resolve_binary(
    configured: Option<&Path>,
    fallbacks: &[&str],
    hint: &str,
) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        // A directory is accepted when it contains one of the fallback names.
        if path.is_dir() {
            for name in fallbacks {
                let candidate = path.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        return Err(SpeechError::DependencyMissing(hint.to_string()));
    }
    for name in fallbacks {
        if let Some(found) = find_in_path(name) {
            return Ok(found);
        }
    }
    Err(SpeechError::DependencyMissing(hint.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_binary_missing_reports_dependency() {
        let err = resolve_binary(
            Some(Path::new("/nonexistent/piper")),
            &[],
            "PIPER_BIN not configured or binary not found",
        )
        .unwrap_err();
        assert!(matches!(err, SpeechError::DependencyMissing(_)));
        assert_eq!(err.status_code(), 501);
    }
}
