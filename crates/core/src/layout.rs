// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! On-disk data layout.
//!
//! Everything lives under one data root:
//!
//! ```text
//! data/
//!   models/<model-id>/                    model artifacts + model.json
//!   piper-tts/<lang>/<locale>/<voice>/..  voice .onnx files + .json sidecars
//!   audio/tts/                            synthesized output archive
//!   audio/stt/uploads/                    transcription input archive
//!   audio/stt/transcripts/                transcription output archive
//!   tmp/
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Resolves and creates subdirectories of the data root on demand.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `data/models/`, created if absent.
    pub fn models_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("models"))
    }

    /// `data/piper-tts/`, created if absent.
    pub fn piper_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("piper-tts"))
    }

    pub fn tts_audio_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("audio").join("tts"))
    }

    pub fn stt_uploads_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("audio").join("stt").join("uploads"))
    }

    pub fn stt_transcripts_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("audio").join("stt").join("transcripts"))
    }

    pub fn tmp_dir(&self) -> io::Result<PathBuf> {
        ensure(self.root.join("tmp"))
    }
}

fn ensure(path: PathBuf) -> io::Result<PathBuf> {
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_creates_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(tmp.path().join("data"));

        let models = layout.models_dir().expect("models dir");
        assert!(models.is_dir());
        assert!(models.ends_with("models"));

        let transcripts = layout.stt_transcripts_dir().expect("transcripts dir");
        assert!(transcripts.is_dir());
        assert!(transcripts.ends_with("audio/stt/transcripts"));
    }
}
