// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Resumable artifact downloads with a per-model state table.
//!
//! Transfers write to `<dest>.part` and commit with an atomic rename. When a
//! part file already exists the request carries a `Range` header; if the
//! server answers 206 the transfer appends, otherwise it restarts from zero.
//! A failed transfer leaves the part file in place so the next attempt can
//! resume.
//!
//! `start_*` methods are fire-and-forget: they CAS the state table, spawn the
//! transfer on a semaphore-bounded pool, and return a receipt immediately.
//! The spawned task may outlive the HTTP request that started it; completion
//! and failure are recorded in the table, not reported in-band.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::{header, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::protocol::DownloadReceipt;

use crate::store::ModelStore;

const HF_HUB_BASE: &str = "https://huggingface.co";
const PIPER_VOICES_DATASET: &str = "rhasspy/piper-voices";

/// Concurrent transfers allowed at once.
const MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Canonical whisper.cpp artifact names and their hub URLs.
const WHISPER_URLS: [(&str, &str); 9] = [
    ("ggml-base.en.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin"),
    ("ggml-base.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin"),
    ("ggml-small.en.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.en.bin"),
    ("ggml-small.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin"),
    ("ggml-medium.en.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.en.bin"),
    ("ggml-medium.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin"),
    ("ggml-large.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large.bin"),
    ("ggml-large-v2.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v2.bin"),
    ("ggml-large-v3.bin", "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3.bin"),
];

/// In-memory download state for one model identifier.
///
/// Absence from the table means no download was ever requested.
#[derive(Debug, Clone)]
pub enum DownloadState {
    InProgress,
    Complete,
    Failed(String),
}

impl DownloadState {
    pub fn describe(&self) -> String {
        match self {
            Self::InProgress => "in-progress".to_string(),
            Self::Complete => "complete".to_string(),
            Self::Failed(reason) => format!("failed: {reason}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HfSibling {
    rfilename: String,
}

#[derive(Debug, Deserialize)]
struct HfModelInfo {
    #[serde(default)]
    siblings: Vec<HfSibling>,
}

/// Downloads model artifacts into the store's layout.
#[derive(Clone)]
pub struct Downloader {
    store: ModelStore,
    client: reqwest::Client,
    hf_token: Option<String>,
    states: Arc<Mutex<HashMap<String, DownloadState>>>,
    permits: Arc<Semaphore>,
}

impl Downloader {
    pub fn new(store: ModelStore, hf_token: Option<String>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            hf_token,
            states: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS)),
        }
    }

    /// Snapshot of the state table for the status endpoint.
    pub async fn states(&self) -> BTreeMap<String, String> {
        let states = self.states.lock().await;
        states.iter().map(|(k, v)| (k.clone(), v.describe())).collect()
    }

    /// Start a direct-URL download into `data/models/<name>/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination directory cannot be created.
    pub async fn start_generic(
        &self,
        name: &str,
        url: &str,
        format: Option<String>,
    ) -> Result<DownloadReceipt> {
        let dir = self.store.ensure_model_dir(name)?;
        let dest = dir.join(filename_from_url(url));
        let url = url.to_string();
        let name_owned = name.to_string();
        self.launch(name, dest.display().to_string(), move |this| async move {
            this.fetch_generic(&name_owned, &url, format.as_deref()).await
        })
        .await
    }

    /// Start a canonical whisper.cpp download. `name` may be a canonical
    /// file name (`ggml-base.en.bin`) or an alias without extension.
    ///
    /// # Errors
    ///
    /// Returns `bad-request` for an unknown name with no explicit URL.
    pub async fn start_whisper(&self, name: &str, url: Option<String>) -> Result<DownloadReceipt> {
        let filename = if name.ends_with(".bin") || name.ends_with(".gguf") {
            name.to_string()
        } else {
            // Alias without extension: prefer the .bin mapping.
            format!("{name}.bin")
        };
        let url = match url {
            Some(url) => url,
            None => whisper_url(&filename)
                .ok_or_else(|| {
                    SpeechError::BadRequest(
                        "Unknown whisper model name; provide a direct url".to_string(),
                    )
                })?
                .to_string(),
        };

        // Directory name without the extension, e.g. models/ggml-base.en/.
        let dir_name =
            filename.rsplit_once('.').map_or(filename.as_str(), |(stem, _)| stem).to_string();
        let format = filename.rsplit_once('.').map(|(_, ext)| ext.to_string());

        let dir = self.store.ensure_model_dir(&dir_name)?;
        let dest = dir.join(&filename);
        let key = dir_name.clone();
        self.launch(&key, dest.display().to_string(), move |this| async move {
            this.fetch_generic(&dir_name, &url, format.as_deref()).await
        })
        .await
    }

    /// Start a Piper voice download from the hub dataset.
    ///
    /// `voice` is a path inside the dataset, e.g.
    /// `en/en_US/amy/medium/en_US-amy-medium.onnx`. The `.onnx.json` sidecar
    /// is fetched best-effort alongside.
    ///
    /// # Errors
    ///
    /// Returns an error when the piper directory cannot be created.
    pub async fn start_piper_voice(&self, voice: &str) -> Result<DownloadReceipt> {
        let rel = if voice.ends_with(".onnx") { voice.to_string() } else { format!("{voice}.onnx") };
        let base = self.store.layout().piper_dir()?;
        let full = base.join(&rel);
        let dest_dir = full.parent().map_or_else(|| base.clone(), Path::to_path_buf);

        let rel_for_task = rel.clone();
        self.launch(voice, dest_dir.display().to_string(), move |this| async move {
            this.fetch_piper_voice(&rel_for_task).await
        })
        .await
    }

    /// Start a snapshot fetch of an entire hub repository into
    /// `data/models/<model_id>/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination directory cannot be created.
    pub async fn start_parler_snapshot(&self, model_id: &str) -> Result<DownloadReceipt> {
        let dir = self.store.ensure_model_dir(model_id)?;
        let id = model_id.to_string();
        self.launch(model_id, dir.display().to_string(), move |this| async move {
            this.fetch_snapshot(&id).await
        })
        .await
    }

    /// CAS the state table and spawn the transfer. Returns immediately.
    async fn launch<F, Fut>(&self, key: &str, path: String, transfer: F) -> Result<DownloadReceipt>
    where
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        {
            let mut states = self.states.lock().await;
            if matches!(states.get(key), Some(DownloadState::InProgress)) {
                return Ok(DownloadReceipt { status: "in-progress".to_string(), path });
            }
            states.insert(key.to_string(), DownloadState::InProgress);
        }

        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&this.permits).acquire_owned().await else {
                return;
            };
            let result = transfer(this.clone()).await;
            let mut states = this.states.lock().await;
            match result {
                Ok(()) => {
                    info!(key, "download complete");
                    states.insert(key, DownloadState::Complete);
                },
                Err(err) => {
                    warn!(key, error = %err, "download failed");
                    states.insert(key, DownloadState::Failed(err.to_string()));
                },
            }
        });

        Ok(DownloadReceipt { status: "started".to_string(), path })
    }

    async fn fetch_generic(&self, name: &str, url: &str, format: Option<&str>) -> Result<()> {
        let dir = self.store.ensure_model_dir(name)?;
        let dest = dir.join(filename_from_url(url));
        self.download_file(url, &dest).await?;

        let meta = serde_json::json!({
            "name": name,
            "file": dest.file_name().and_then(|n| n.to_str()),
            "url": url,
            "format": format,
        });
        let encoded = serde_json::to_vec_pretty(&meta)
            .map_err(|e| SpeechError::Internal(format!("metadata encode failed: {e}")))?;
        tokio::fs::write(dir.join("model.json"), encoded).await?;
        Ok(())
    }

    async fn fetch_piper_voice(&self, rel: &str) -> Result<()> {
        let base = self.store.layout().piper_dir()?;
        let onnx_url = format!("{HF_HUB_BASE}/datasets/{PIPER_VOICES_DATASET}/resolve/main/{rel}");
        self.download_file(&onnx_url, &base.join(rel)).await?;

        // Sidecar is best-effort; some voices keep metadata elsewhere.
        let sidecar_rel = format!("{rel}.json");
        let sidecar_url =
            format!("{HF_HUB_BASE}/datasets/{PIPER_VOICES_DATASET}/resolve/main/{sidecar_rel}");
        if let Err(err) = self.download_file(&sidecar_url, &base.join(&sidecar_rel)).await {
            warn!(voice = rel, error = %err, "voice sidecar not fetched");
        }
        Ok(())
    }

    /// Fetch every sibling of a hub repository, mirroring its tree.
    async fn fetch_snapshot(&self, model_id: &str) -> Result<()> {
        let info_url = format!("{HF_HUB_BASE}/api/models/{model_id}");
        let mut request = self.client.get(&info_url);
        if let Some(token) = &self.hf_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            SpeechError::UpstreamUnavailable(format!("snapshot listing failed: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(SpeechError::UpstreamUnavailable(format!(
                "snapshot listing failed: HTTP {} for {model_id}",
                response.status()
            )));
        }
        let info: HfModelInfo = response.json().await.map_err(|e| {
            SpeechError::UpstreamUnavailable(format!("snapshot listing decode failed: {e}"))
        })?;

        let dir = self.store.ensure_model_dir(model_id)?;
        for sibling in info.siblings {
            let url = format!("{HF_HUB_BASE}/{model_id}/resolve/main/{}", sibling.rfilename);
            self.download_file(&url, &dir.join(&sibling.rfilename)).await?;
        }
        Ok(())
    }

    /// Resumable single-file transfer. Holds no table lock while bytes move.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);
        let existing = tokio::fs::metadata(&part).await.map(|m| m.len()).unwrap_or(0);

        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, concat!("voxgate/", env!("CARGO_PKG_VERSION")))
            .header(header::ACCEPT, "application/octet-stream, */*");
        if let Some(token) = &self.hf_token {
            request = request.bearer_auth(token);
        }
        if existing > 0 {
            request = request.header(header::RANGE, format!("bytes={existing}-"));
        }

        let response = request.send().await.map_err(|e| {
            SpeechError::UpstreamUnavailable(format!("download request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::UpstreamUnavailable(format!(
                "download failed: HTTP {status} for {url}"
            )));
        }

        let resuming = existing > 0 && status == StatusCode::PARTIAL_CONTENT;
        if existing > 0 && !resuming {
            warn!(url, "server ignored Range request, restarting from zero");
        }
        if resuming {
            info!(url, offset = existing, "resuming download");
        }

        let mut file = if resuming {
            tokio::fs::OpenOptions::new().append(true).open(&part).await?
        } else {
            tokio::fs::File::create(&part).await?
        };

        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            // A mid-stream failure keeps the part file for the next resume.
            let chunk = chunk.map_err(|e| {
                SpeechError::UpstreamUnavailable(format!("download stream error: {e}"))
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }
}

/// Hub URL for a canonical whisper.cpp file name.
fn whisper_url(filename: &str) -> Option<&'static str> {
    WHISPER_URLS.iter().find(|(name, _)| *name == filename).map(|(_, url)| *url)
}

fn filename_from_url(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url).trim_end_matches('/');
    base.rsplit('/').next().unwrap_or(base).to_string()
}

/// `<dest>.part`, appended to the full file name.
fn part_path(dest: &Path) -> PathBuf {
    let name = dest.file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string());
    dest.with_file_name(format!("{name}.part"))
}
