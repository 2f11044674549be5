// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Filesystem view of the model tree.
//!
//! The store owns no network: it enumerates what is on disk and resolves
//! identifiers to artifact paths. All methods are synchronous; HTTP handlers
//! call them through `spawn_blocking`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::layout::DataLayout;
use voxgate_core::protocol::ModelSummary;

#[derive(Debug, Clone)]
pub struct ModelStore {
    layout: DataLayout,
}

impl ModelStore {
    pub const fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Enumerate models one level deep under `data/models/`.
    ///
    /// A directory counts as a model when it holds a `config.json` or any
    /// `.onnx` file. Hidden directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when the models directory cannot be read.
    pub fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let root = self.layout.models_dir()?;
        let mut out = Vec::new();

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() || name.starts_with('.') {
                continue;
            }
            if !is_model_dir(&path) {
                continue;
            }

            let mut files: Vec<String> = std::fs::read_dir(&path)?
                .filter_map(std::result::Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect();
            files.sort();
            out.push(ModelSummary { id: name, files });
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Enumerate Piper voices by their `.onnx.json` sidecars.
    ///
    /// The voice id is the sidecar path relative to the piper root with the
    /// `.onnx.json` extension stripped.
    ///
    /// # Errors
    ///
    /// Returns an error when the piper directory cannot be created.
    pub fn list_piper_voices(&self) -> Result<Vec<ModelSummary>> {
        let root = self.layout.piper_dir()?;
        let mut out = Vec::new();

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.path()))
            .filter_map(std::result::Result::ok)
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some(stem) = name.strip_suffix(".onnx.json") else { continue };

            let rel = path.strip_prefix(&root).unwrap_or(path);
            let id = rel
                .to_string_lossy()
                .strip_suffix(".onnx.json")
                .map_or_else(|| stem.to_string(), String::from);

            let mut files = vec![format!("{stem}.onnx.json")];
            if path.with_extension("").is_file() {
                // The sidecar's sibling: <voice>.onnx
                files.insert(0, format!("{stem}.onnx"));
            }
            out.push(ModelSummary { id, files });
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Combined listing for the public models endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when either walk fails.
    pub fn list_all(&self) -> Result<Vec<ModelSummary>> {
        let mut out = self.list_models()?;
        out.extend(self.list_piper_voices()?);
        Ok(out)
    }

    /// Resolve a Piper voice to its `.onnx` path.
    ///
    /// Tried in order: literal path, `models/<model>/*.onnx`, the piper tree
    /// (exact relative path, with `.onnx` appended, then a recursive search
    /// for a filename equal to or ending with `<pattern>.onnx`). A `voice`
    /// override is searched before the model name.
    ///
    /// # Errors
    ///
    /// Returns `artifact-missing` when nothing matches.
    pub fn resolve_piper_voice(&self, model: &str, voice: Option<&str>) -> Result<PathBuf> {
        let literal = Path::new(model);
        if literal.is_file() {
            return Ok(literal.to_path_buf());
        }

        let model_dir = self.layout.models_dir()?.join(model);
        if model_dir.is_dir() {
            if let Some(onnx) = first_file_with_extension(&model_dir, "onnx") {
                return Ok(onnx);
            }
        }

        let piper_root = self.layout.piper_dir()?;
        for pattern in voice.into_iter().chain(std::iter::once(model)) {
            if let Some(found) = search_voice(&piper_root, pattern) {
                return Ok(found);
            }
        }

        Err(SpeechError::ArtifactMissing(format!(
            "Piper voice not found for model '{model}'. Looked under {} and {}",
            model_dir.display(),
            piper_root.display()
        )))
    }

    /// Resolve a whisper.cpp model to its `.gguf`/`.bin` file.
    ///
    /// # Errors
    ///
    /// Returns `artifact-missing` when neither a literal path nor a match
    /// under `models/<model>/` exists.
    pub fn resolve_whisper_model(&self, model: &str) -> Result<PathBuf> {
        let literal = Path::new(model);
        if literal.is_file() {
            return Ok(literal.to_path_buf());
        }

        let dir = self.layout.models_dir()?.join(model);
        if dir.is_dir() {
            if let Some(found) = first_file_with_extension(&dir, "gguf")
                .or_else(|| first_file_with_extension(&dir, "bin"))
            {
                return Ok(found);
            }
            return Err(SpeechError::ArtifactMissing(format!(
                "No gguf/bin found in {}",
                dir.display()
            )));
        }

        Err(SpeechError::ArtifactMissing(format!("Model not found: {model}")))
    }

    /// Snapshot directory for a model id, without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error when the models root cannot be created.
    pub fn model_dir(&self, id: &str) -> Result<PathBuf> {
        Ok(self.layout.models_dir()?.join(id))
    }

    /// Create and return `data/models/<id>/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn ensure_model_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.model_dir(id)?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn is_model_dir(path: &Path) -> bool {
    path.join("config.json").is_file() || first_file_with_extension(path, "onnx").is_some()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.len() > 1)
}

fn first_file_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn search_voice(root: &Path, pattern: &str) -> Option<PathBuf> {
    let candidate = root.join(pattern);
    if candidate.is_file() {
        return Some(candidate);
    }
    if !pattern.ends_with(".onnx") {
        let with_ext = root.join(format!("{pattern}.onnx"));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    let target =
        if pattern.ends_with(".onnx") { pattern.to_string() } else { format!("{pattern}.onnx") };
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.path()))
        .filter_map(std::result::Result::ok)
        .map(|e| e.path().to_path_buf())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n == target || n.ends_with(&target))
        })
}
