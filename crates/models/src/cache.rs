// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bounded cache of loaded model handles.
//!
//! Models are expensive to load and expensive to keep resident, so the cache
//! is small (default capacity 2) and strictly LRU. Lookups for a key that is
//! already being loaded collapse onto the in-flight load instead of starting
//! a second one: the map holds either a ready handle or a pending marker, and
//! waiters park on a per-key watch channel until the leader publishes the
//! outcome.
//!
//! The loader itself runs on its own task, outside the cache lock. A caller
//! that disappears mid-load (client disconnect) does not cancel the load;
//! whatever handle it produces stays resident for the next request.
//!
//! A failed load is published to every waiter and never retried here; retry
//! is a caller decision.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use voxgate_core::error::{Result, SpeechError};

/// An in-memory loaded model, owned exclusively by the cache.
///
/// Handles are opaque to the router; adapters downcast via [`LoadedModel::as_any`].
pub trait LoadedModel: Send + Sync + std::fmt::Debug + 'static {
    /// Runtime flavor tag, used in logs and cache keys.
    fn kind(&self) -> &str;

    fn as_any(&self) -> &dyn std::any::Any;

    /// Release GPU/CPU resources. Called exactly once, before the cache
    /// drops an evicted handle.
    fn release(&self) {}
}

pub type ModelHandle = Arc<dyn LoadedModel>;

/// Cache key: `"{kind}:{model}:{extra}"`, where `extra` is any dimension
/// that changes what the loader produces (e.g. a voice override).
pub fn cache_key(kind: &str, model: &str, extra: Option<&str>) -> String {
    format!("{kind}:{model}:{}", extra.unwrap_or("-"))
}

#[derive(Clone)]
enum LoadOutcome {
    Pending,
    Ready(ModelHandle),
    Failed(SpeechError),
}

enum Slot {
    Ready { handle: ModelHandle, last_access: Instant },
    Loading(watch::Receiver<LoadOutcome>),
}

/// Bounded LRU cache with single-flight loading.
pub struct ModelCache {
    capacity: usize,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ModelCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), slots: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Get the handle for `key`, loading it with `loader` on a miss.
    ///
    /// A hit promotes the entry to most-recently-used. On a miss the loader
    /// runs exactly once no matter how many callers arrive concurrently;
    /// everyone receives the same handle, or the same failure.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error to every waiting caller; the pending
    /// marker is removed so a later call may try again.
    pub async fn get<F, Fut>(&self, key: &str, loader: F) -> Result<ModelHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModelHandle>> + Send + 'static,
    {
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(key) {
                Some(Slot::Ready { handle, last_access }) => {
                    *last_access = Instant::now();
                    debug!(key, "model cache hit");
                    return Ok(handle.clone());
                },
                Some(Slot::Loading(rx)) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(LoadOutcome::Pending);
                    slots.insert(key.to_string(), Slot::Loading(rx.clone()));
                    drop(slots);
                    self.spawn_load(key.to_string(), loader(), tx);
                    rx
                },
            }
        };

        Self::wait(rx).await
    }

    /// Number of resident (loaded) handles. Pending loads do not count.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| matches!(slot, Slot::Ready { .. })).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &str) -> bool {
        let slots = self.slots.lock().await;
        matches!(slots.get(key), Some(Slot::Ready { .. }))
    }

    /// Drop every resident handle, invoking release hooks.
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        for (key, slot) in slots.drain() {
            if let Slot::Ready { handle, .. } = slot {
                handle.release();
                info!(key, "released cached model");
            }
        }
    }

    fn spawn_load(
        &self,
        key: String,
        fut: impl Future<Output = Result<ModelHandle>> + Send + 'static,
        tx: watch::Sender<LoadOutcome>,
    ) {
        let slots = Arc::clone(&self.slots);
        let capacity = self.capacity;
        tokio::spawn(async move {
            let result = fut.await;
            let mut guard = slots.lock().await;
            match result {
                Ok(handle) => {
                    evict_excess(&mut guard, capacity);
                    guard.insert(
                        key.clone(),
                        Slot::Ready { handle: handle.clone(), last_access: Instant::now() },
                    );
                    drop(guard);
                    info!(key, kind = handle.kind(), "model loaded");
                    let _ = tx.send(LoadOutcome::Ready(handle));
                },
                Err(err) => {
                    guard.remove(&key);
                    drop(guard);
                    let _ = tx.send(LoadOutcome::Failed(err));
                },
            }
        });
    }

    async fn wait(mut rx: watch::Receiver<LoadOutcome>) -> Result<ModelHandle> {
        loop {
            let outcome = rx.borrow_and_update().clone();
            match outcome {
                LoadOutcome::Ready(handle) => return Ok(handle),
                // The loader's error is propagated verbatim to every waiter.
                LoadOutcome::Failed(err) => return Err(err),
                LoadOutcome::Pending => {
                    if rx.changed().await.is_err() {
                        return Err(SpeechError::LoadFailed("loader task dropped".to_string()));
                    }
                },
            }
        }
    }
}

/// Evict least-recently-used ready entries until a new one fits.
fn evict_excess(slots: &mut HashMap<String, Slot>, capacity: usize) {
    loop {
        let resident =
            slots.values().filter(|slot| matches!(slot, Slot::Ready { .. })).count();
        if resident < capacity {
            return;
        }

        let oldest = slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready { last_access, .. } => Some((key.clone(), *last_access)),
                Slot::Loading(_) => None,
            })
            .min_by_key(|(_, last_access)| *last_access)
            .map(|(key, _)| key);

        let Some(key) = oldest else { return };
        if let Some(Slot::Ready { handle, .. }) = slots.remove(&key) {
            handle.release();
            info!(key, "evicted model from cache");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    #[derive(Debug)]
    struct TestModel {
        released: Arc<AtomicUsize>,
    }

    impl LoadedModel for TestModel {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn loader(
        loads: &Arc<AtomicUsize>,
        released: &Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<ModelHandle>> + Send + 'static {
        let loads = Arc::clone(loads);
        let released = Arc::clone(released);
        async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(TestModel { released }) as ModelHandle)
        }
    }

    #[tokio::test]
    async fn test_lru_eviction_releases_oldest() {
        let cache = ModelCache::new(2);
        let loads = Arc::new(AtomicUsize::new(0));
        let released_a = Arc::new(AtomicUsize::new(0));
        let released_b = Arc::new(AtomicUsize::new(0));
        let released_c = Arc::new(AtomicUsize::new(0));

        cache.get("a", || loader(&loads, &released_a)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get("b", || loader(&loads, &released_b)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get("c", || loader(&loads, &released_c)).await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len().await, 2);
        assert!(!cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(cache.contains("c").await);
        assert_eq!(released_a.load(Ordering::SeqCst), 1);
        assert_eq!(released_b.load(Ordering::SeqCst), 0);
        assert_eq!(released_c.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hit_promotes_entry() {
        let cache = ModelCache::new(2);
        let loads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        cache.get("a", || loader(&loads, &released)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get("b", || loader(&loads, &released)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a", || loader(&loads, &released)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get("c", || loader(&loads, &released)).await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(cache.contains("c").await);
    }

    #[tokio::test]
    async fn test_single_flight_collapses_concurrent_loads() {
        let cache = Arc::new(ModelCache::new(2));
        let loads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            let released = Arc::clone(&released);
            tasks.push(tokio::spawn(async move {
                cache
                    .get("a", move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new(TestModel { released }) as ModelHandle)
                    })
                    .await
            }));
        }

        let handles: Vec<ModelHandle> = futures::future::try_join_all(tasks)
            .await
            .unwrap()
            .into_iter()
            .map(|result| result.unwrap())
            .collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1, "loader must run exactly once");
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle), "all callers share one handle");
        }
    }

    #[tokio::test]
    async fn test_failed_load_propagates_and_clears_marker() {
        let cache = Arc::new(ModelCache::new(2));
        let loads = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            tasks.push(tokio::spawn(async move {
                cache
                    .get("broken", move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(SpeechError::ArtifactMissing("no such model".to_string()))
                    })
                    .await
            }));
        }

        for task in tasks {
            let result = task.await.unwrap();
            assert!(matches!(result, Err(SpeechError::ArtifactMissing(_))));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 0);

        // A later call is a fresh attempt, not a cached failure.
        let released = Arc::new(AtomicUsize::new(0));
        cache.get("broken", || loader(&loads, &released)).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("piper", "en_US-amy-medium", None), "piper:en_US-amy-medium:-");
        assert_eq!(
            cache_key("piper", "voice-pack", Some("en_US-amy-medium")),
            "piper:voice-pack:en_US-amy-medium"
        );
    }
}
