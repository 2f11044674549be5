// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voxgate Models - model lifecycle management.
//!
//! - [`store`]: filesystem enumeration and identifier resolution
//! - [`download`]: resumable downloader with a per-model state table
//! - [`cache`]: bounded LRU cache of loaded handles with single-flight loads
//! - [`classify`]: model identifier to runtime flavor mapping

pub mod cache;
pub mod classify;
pub mod download;
pub mod store;

pub use cache::{cache_key, LoadedModel, ModelCache, ModelHandle};
pub use classify::{classify, Endpoint, ModelKind};
pub use download::{DownloadState, Downloader};
pub use store::ModelStore;
