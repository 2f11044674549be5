// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use voxgate_core::layout::DataLayout;
use voxgate_core::settings::Settings;
use voxgate_models::{Downloader, ModelStore};

use crate::bridge::EngineBridge;
use crate::config::Config;
use crate::connections::ConnectionMap;
use crate::rate_limit::SlidingWindowRateLimiter;

/// Long-lived gateway state shared by every request.
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<Settings>,
    pub store: ModelStore,
    pub downloader: Downloader,
    pub bridge: EngineBridge,
    pub limiter: SlidingWindowRateLimiter,
    pub connections: ConnectionMap,
}

impl AppState {
    pub fn new(config: Config, settings: Settings) -> Arc<Self> {
        let settings = Arc::new(settings);
        let store = ModelStore::new(DataLayout::new(config.data_dir()));

        Arc::new(Self {
            limiter: SlidingWindowRateLimiter::new(
                config.limits.max_requests,
                config.limits.window_seconds,
            ),
            downloader: Downloader::new(store.clone(), settings.huggingface_token.clone()),
            bridge: EngineBridge::new(Arc::clone(&settings)),
            store,
            connections: ConnectionMap::default(),
            config: Arc::new(config),
            settings,
        })
    }
}
