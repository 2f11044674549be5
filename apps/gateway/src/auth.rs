// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bearer-token admission.
//!
//! The accepted token set comes from `API_TOKENS`. An empty set disables
//! authentication entirely, which is the development default.

use voxgate_core::error::{Result, SpeechError};

/// Check an `Authorization` header value against the accepted token set.
///
/// # Errors
///
/// Returns `unauthorized` when auth is enabled and the header is missing,
/// malformed, or carries an unknown token.
pub fn authorize(tokens: &[String], header: Option<&str>) -> Result<()> {
    if tokens.is_empty() {
        return Ok(());
    }

    let presented = header.and_then(|value| value.strip_prefix("Bearer ")).map(str::trim);
    match presented {
        Some(token) if !token.is_empty() && tokens.iter().any(|t| t == token) => Ok(()),
        _ => Err(SpeechError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Vec<String> {
        vec!["s1".to_string(), "s2".to_string()]
    }

    #[test]
    fn test_empty_set_disables_auth() {
        assert!(authorize(&[], None).is_ok());
        assert!(authorize(&[], Some("Bearer whatever")).is_ok());
    }

    #[test]
    fn test_known_token_accepted() {
        assert!(authorize(&tokens(), Some("Bearer s2")).is_ok());
        assert!(authorize(&tokens(), Some("Bearer s1")).is_ok());
    }

    #[test]
    fn test_missing_or_unknown_token_rejected() {
        assert!(matches!(authorize(&tokens(), None), Err(SpeechError::Unauthorized)));
        assert!(matches!(authorize(&tokens(), Some("Bearer s3")), Err(SpeechError::Unauthorized)));
        assert!(matches!(authorize(&tokens(), Some("s1")), Err(SpeechError::Unauthorized)));
        assert!(matches!(authorize(&tokens(), Some("Bearer ")), Err(SpeechError::Unauthorized)));
    }
}
