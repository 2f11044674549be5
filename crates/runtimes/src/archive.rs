// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Best-effort archival of inference inputs and outputs.
//!
//! Copies land under `data/audio/`. Archival must never fail a request;
//! errors are logged and dropped.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use voxgate_core::layout::DataLayout;

/// Milliseconds since the epoch, used in archive file names.
pub fn timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis())
}

/// Archive synthesized audio as `audio/tts/tts_<ms>.wav`.
pub async fn save_tts(layout: &DataLayout, wav: &[u8]) {
    let result = async {
        let dir = layout.tts_audio_dir()?;
        tokio::fs::write(dir.join(format!("tts_{}.wav", timestamp_ms())), wav).await
    }
    .await;
    if let Err(err) = result {
        warn!(error = %err, "failed to archive synthesized audio");
    }
}

/// Archive a transcription input and its transcript under `audio/stt/`.
pub async fn save_stt(layout: &DataLayout, audio: &[u8], transcript: &str) {
    let ts = timestamp_ms();
    let result = async {
        let uploads = layout.stt_uploads_dir()?;
        tokio::fs::write(uploads.join(format!("stt_{ts}.wav")), audio).await?;
        let transcripts = layout.stt_transcripts_dir()?;
        tokio::fs::write(transcripts.join(format!("stt_{ts}.txt")), transcript).await
    }
    .await;
    if let Err(err) = result {
        warn!(error = %err, "failed to archive transcription");
    }
}
