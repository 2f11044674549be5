// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Ambient environment settings shared by both processes.
//!
//! These are the documented bare variable names (no prefix); structured
//! per-process options live in each app's figment config and are layered
//! separately.

use std::path::PathBuf;

/// Runtime settings resolved from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Accepted bearer tokens. Empty disables authentication.
    pub api_tokens: Vec<String>,
    /// Engine base URL, e.g. `https://localhost:9443`.
    pub stream_engine_base: Option<String>,
    /// Optional client certificate for the QUIC connection. Only used when
    /// the matching key is also present.
    pub quic_client_cert: Option<PathBuf>,
    pub quic_client_key: Option<PathBuf>,
    /// Skip TLS verification on the QUIC connection (default on).
    pub quic_insecure: bool,
    pub piper_bin: Option<PathBuf>,
    pub whisper_cpp_bin: Option<PathBuf>,
    pub whisper_threads: Option<usize>,
    pub huggingface_token: Option<String>,
    pub parler_tts_bin: Option<PathBuf>,
    pub hf_whisper_bin: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_tokens: Vec::new(),
            stream_engine_base: None,
            quic_client_cert: None,
            quic_client_key: None,
            // Verification is off by default; engines run self-signed.
            quic_insecure: true,
            piper_bin: None,
            whisper_cpp_bin: None,
            whisper_threads: None,
            huggingface_token: None,
            parler_tts_bin: None,
            hf_whisper_bin: None,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            api_tokens: parse_token_set(&env_str("API_TOKENS").unwrap_or_default()),
            stream_engine_base: env_str("STREAM_ENGINE_BASE"),
            quic_client_cert: env_str("QUIC_CLIENT_CERT").map(PathBuf::from),
            quic_client_key: env_str("QUIC_CLIENT_KEY").map(PathBuf::from),
            quic_insecure: env_flag("QUIC_INSECURE", true),
            piper_bin: env_str("PIPER_BIN").map(PathBuf::from),
            whisper_cpp_bin: env_str("WHISPER_CPP_BIN").map(PathBuf::from),
            whisper_threads: env_str("WHISPER_THREADS").and_then(|v| v.parse().ok()),
            huggingface_token: env_str("HUGGINGFACE_TOKEN"),
            parler_tts_bin: env_str("PARLER_TTS_BIN").map(PathBuf::from),
            hf_whisper_bin: env_str("HF_WHISPER_BIN").map(PathBuf::from),
        }
    }

    /// Whether bearer authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.api_tokens.is_empty()
    }

    /// Client certificate pair, present only when both halves are set.
    pub fn quic_client_pair(&self) -> Option<(&PathBuf, &PathBuf)> {
        match (&self.quic_client_cert, &self.quic_client_key) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    /// Thread count for whisper.cpp: override or available parallelism.
    pub fn whisper_threads(&self) -> usize {
        self.whisper_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(2, |n| n.get()))
    }
}

/// Parse a comma-separated token list, dropping empties.
pub fn parse_token_set(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect()
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Lenient boolean: only explicit "0"/"false" variants disable.
fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name).map_or(default, |v| !matches!(v.trim(), "0" | "false" | "False"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_set() {
        assert_eq!(parse_token_set("s1,s2"), vec!["s1", "s2"]);
        assert_eq!(parse_token_set(" s1 , ,s2, "), vec!["s1", "s2"]);
        assert!(parse_token_set("").is_empty());
        assert!(parse_token_set(" , ,").is_empty());
    }

    #[test]
    fn test_auth_enabled() {
        let mut settings = Settings::default();
        assert!(!settings.auth_enabled());
        settings.api_tokens = parse_token_set("s1");
        assert!(settings.auth_enabled());
    }

    #[test]
    fn test_client_pair_requires_both() {
        let mut settings = Settings::default();
        settings.quic_client_cert = Some(PathBuf::from("/tmp/cert.pem"));
        assert!(settings.quic_client_pair().is_none());
        settings.quic_client_key = Some(PathBuf::from("/tmp/key.pem"));
        assert!(settings.quic_client_pair().is_some());
    }
}
