// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types shared by both tiers.
//!
//! The taxonomy is transport-independent: the engine serializes the message
//! into an `{"error": "..."}` envelope, and each HTTP surface maps a variant
//! to a status code via [`SpeechError::status_code`].

use thiserror::Error;

/// Main error type for Voxgate operations.
///
/// `Clone` so a single failure can be fanned out to every caller parked on
/// the same in-flight model load.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// Malformed request: invalid JSON, a missing required field, or a bad
    /// parameter value.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or unrecognized bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    /// The peer exceeded its sliding-window request budget.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Unknown route or unknown name.
    #[error("{0}")]
    NotFound(String),

    /// A model of the wrong family was sent to this route (e.g. a Whisper
    /// artifact on the speech endpoint).
    #[error("{0}")]
    WrongEndpoint(String),

    /// A runtime this request needs (binary or library) is not installed.
    #[error("{0}")]
    DependencyMissing(String),

    /// A model artifact is not present on disk.
    #[error("{0}")]
    ArtifactMissing(String),

    /// An external runtime was invoked and failed.
    #[error("{0}")]
    InvocationFailed(String),

    /// An adapter's load step failed; never retried by the cache.
    #[error("model load failed: {0}")]
    LoadFailed(String),

    /// The engine back-end is unreachable or answered with an error.
    #[error("{0}")]
    UpstreamUnavailable(String),

    /// The gateway-to-engine round trip exceeded its deadline.
    #[error("engine request timed out")]
    Timeout,

    /// Anything without a more specific category.
    #[error("{0}")]
    Internal(String),
}

/// Convenience type alias for Results using `SpeechError`.
pub type Result<T> = std::result::Result<T, SpeechError>;

impl SpeechError {
    /// HTTP status code for this error, identical on both tiers.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::WrongEndpoint(_) => 400,
            Self::Unauthorized => 401,
            Self::NotFound(_) | Self::ArtifactMissing(_) => 404,
            Self::RateLimited => 429,
            Self::InvocationFailed(_) | Self::LoadFailed(_) | Self::Internal(_) => 500,
            Self::DependencyMissing(_) => 501,
            Self::UpstreamUnavailable(_) => 502,
            Self::Timeout => 504,
        }
    }

    /// JSON envelope sent over the wire.
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<std::io::Error> for SpeechError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(SpeechError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(SpeechError::Unauthorized.status_code(), 401);
        assert_eq!(SpeechError::RateLimited.status_code(), 429);
        assert_eq!(SpeechError::NotFound("x".into()).status_code(), 404);
        assert_eq!(SpeechError::WrongEndpoint("x".into()).status_code(), 400);
        assert_eq!(SpeechError::DependencyMissing("x".into()).status_code(), 501);
        assert_eq!(SpeechError::ArtifactMissing("x".into()).status_code(), 404);
        assert_eq!(SpeechError::InvocationFailed("x".into()).status_code(), 500);
        assert_eq!(SpeechError::LoadFailed("x".into()).status_code(), 500);
        assert_eq!(SpeechError::UpstreamUnavailable("x".into()).status_code(), 502);
        assert_eq!(SpeechError::Timeout.status_code(), 504);
        assert_eq!(SpeechError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_envelope_shape() {
        let err = SpeechError::ArtifactMissing("Piper voice not found".to_string());
        let body = err.to_envelope();
        assert_eq!(body["error"], "Piper voice not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SpeechError = io_err.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("missing"));
    }
}
