// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sliding-window rate limiting, keyed per peer.
//!
//! Each key keeps an ordered queue of accepted-request timestamps. A check
//! lazily prunes entries older than the window, rejects when the remainder
//! is at capacity, and otherwise records the new timestamp. Checks on the
//! same key are mutually exclusive via the table mutex.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use voxgate_core::error::{Result, SpeechError};

pub struct SlidingWindowRateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_seconds),
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request for `key`.
    ///
    /// # Errors
    ///
    /// Returns `rate-limited` when the key already has `max_requests`
    /// accepted timestamps inside the window.
    pub async fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let queue = hits.entry(key.to_string()).or_default();

        if let Some(cutoff) = now.checked_sub(self.window) {
            while queue.front().is_some_and(|t| *t < cutoff) {
                queue.pop_front();
            }
        }

        if queue.len() >= self.max_requests {
            return Err(SpeechError::RateLimited);
        }
        queue.push_back(now);
        Ok(())
    }
}

/// Rate-limit key for a peer address: `"{host}:{port}"`.
pub fn peer_key(peer: Option<std::net::SocketAddr>) -> String {
    peer.map_or_else(|| "unknown".to_string(), |addr| format!("{}:{}", addr.ip(), addr.port()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_admits_up_to_max() {
        let limiter = SlidingWindowRateLimiter::new(3, 10);

        assert!(limiter.check("peer:1").await.is_ok());
        assert!(limiter.check("peer:1").await.is_ok());
        assert!(limiter.check("peer:1").await.is_ok());
        let err = limiter.check("peer:1").await.unwrap_err();
        assert!(matches!(err, SpeechError::RateLimited));

        // After the window passes, the peer is admitted again.
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("peer:1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowRateLimiter::new(1, 10);

        assert!(limiter.check("peer:1").await.is_ok());
        assert!(limiter.check("peer:2").await.is_ok());
        assert!(limiter.check("peer:1").await.is_err());
    }

    #[test]
    fn test_peer_key_format() {
        let addr: std::net::SocketAddr = "127.0.0.1:4242".parse().unwrap();
        assert_eq!(peer_key(Some(addr)), "127.0.0.1:4242");
        assert_eq!(peer_key(None), "unknown");
    }
}
