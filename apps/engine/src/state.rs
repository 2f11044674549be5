// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use voxgate_core::layout::DataLayout;
use voxgate_core::settings::Settings;
use voxgate_models::{ModelCache, ModelStore};
use voxgate_runtimes::hf_whisper::HfWhisper;
use voxgate_runtimes::parler::ParlerTts;
use voxgate_runtimes::piper::PiperTts;
use voxgate_runtimes::whisper_cpp::WhisperCpp;
use voxgate_runtimes::{SttEngine, TtsEngine};

use crate::config::Config;

/// Long-lived engine process state shared by every request stream.
pub struct EngineState {
    pub store: ModelStore,
    pub cache: ModelCache,
    pub piper: Arc<dyn TtsEngine>,
    pub parler: Arc<dyn TtsEngine>,
    pub whisper_cpp: Arc<dyn SttEngine>,
    pub hf_whisper: Arc<dyn SttEngine>,
}

impl EngineState {
    pub fn new(config: &Config, settings: &Settings) -> Arc<Self> {
        let layout = DataLayout::new(config.data_dir());
        let store = ModelStore::new(layout.clone());

        Arc::new(Self {
            store: store.clone(),
            cache: ModelCache::new(config.cache.capacity),
            piper: Arc::new(PiperTts::new(store.clone(), settings)),
            parler: Arc::new(ParlerTts::new(store.clone(), settings)),
            whisper_cpp: Arc::new(WhisperCpp::new(store, settings)),
            hf_whisper: Arc::new(HfWhisper::new(layout, settings)),
        })
    }
}
