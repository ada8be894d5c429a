//! Shared model lifecycle: lazy loading, runtime switching, idle eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::model::inference::{ModelLoader, VisionLanguageModel};

/// Owns the process-wide inference model.
///
/// Guarantees at most one loaded model, shared across all concurrent
/// callers, and releases its memory after a configurable idle period.
///
/// One mutex serializes load, unload and model-switch. It is *not* held
/// during inference: [`acquire`](Self::acquire) hands out an `Arc` clone
/// and concurrent inferences proceed without blocking each other. The
/// last-used stamp is an atomic, so touching it is cheap and race-free.
pub struct ModelLifecycleManager {
    loader: Arc<dyn ModelLoader>,
    config: Arc<RuntimeConfig>,
    slot: Mutex<Option<Arc<dyn VisionLanguageModel>>>,
    started: Instant,
    last_used_ms: AtomicU64,
}

impl ModelLifecycleManager {
    /// Create a manager in the unloaded state.
    pub fn new(loader: Arc<dyn ModelLoader>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            loader,
            config,
            slot: Mutex::new(None),
            started: Instant::now(),
            last_used_ms: AtomicU64::new(0),
        }
    }

    /// Get the loaded model, loading or switching it first when needed.
    ///
    /// Every call, including ones served from the already-loaded model,
    /// refreshes the last-used stamp. When the configured model identifier
    /// differs from the loaded one, the old model is unloaded before the
    /// new one loads, even if it is still fresh.
    ///
    /// # Errors
    ///
    /// Propagates [`VisuraError::ModelLoad`](crate::error::VisuraError) on
    /// initialization failure; the manager stays unloaded so the next call
    /// can retry. A partially-initialized model is never handed out.
    pub async fn acquire(&self) -> Result<Arc<dyn VisionLanguageModel>> {
        let configured_id = self.config.model_id();
        let mut slot = self.slot.lock().await;

        let needs_load = match slot.as_ref() {
            Some(model) => model.model_id() != configured_id,
            None => true,
        };

        if needs_load {
            if let Some(previous) = slot.take() {
                info!(
                    previous = previous.model_id(),
                    next = %configured_id,
                    "switching model, unloading previous"
                );
                drop(previous);
            }

            info!(model = %configured_id, "loading model");
            let load_start = Instant::now();
            let model = self.loader.load(&configured_id).await?;
            info!(
                model = %configured_id,
                elapsed_ms = load_start.elapsed().as_millis() as u64,
                "model loaded"
            );
            *slot = Some(model);
        } else {
            debug!(model = %configured_id, "model already in memory");
        }

        self.touch();

        // needs_load guarantees the slot is filled here; stay defensive
        // about it anyway rather than unwrapping.
        slot.as_ref()
            .cloned()
            .ok_or_else(|| crate::error::VisuraError::model_load("model slot empty after load"))
    }

    /// Whether a model is currently resident.
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Time elapsed since the last `acquire`.
    pub fn idle_for(&self) -> Duration {
        let last_used = Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last_used)
    }

    /// Unload the model immediately, releasing its memory.
    pub async fn unload(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(model) = slot.take() {
            info!(model = model.model_id(), "unloading model");
            drop(model);
        }
    }

    /// Unload the model when it has been idle past the configured timeout.
    ///
    /// Returns whether an eviction happened. The idle threshold comes from
    /// the live configuration on every call, so a configuration reload is
    /// picked up on the next cycle.
    pub async fn evict_if_idle(&self) -> bool {
        let idle_timeout = self.config.idle_timeout();
        let idle = self.idle_for();
        if idle < idle_timeout {
            return false;
        }

        let mut slot = self.slot.lock().await;
        // Re-check under the lock: an acquire may have touched the stamp
        // while we waited.
        if self.idle_for() < idle_timeout {
            return false;
        }

        match slot.take() {
            Some(model) => {
                info!(
                    model = model.model_id(),
                    idle_secs = idle.as_secs(),
                    timeout_secs = idle_timeout.as_secs(),
                    "evicting idle model"
                );
                drop(model);
                true
            }
            None => false,
        }
    }

    /// Spawn the background idle-eviction task.
    ///
    /// Exactly one of these should run per manager. The poll interval is
    /// fixed at spawn time and independent of the idle threshold, which
    /// stays live-configurable.
    pub fn spawn_eviction_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let poll_interval = manager
            .config
            .snapshot()
            .eviction_poll_interval()
            .max(Duration::from_secs(1));
        info!(
            poll_secs = poll_interval.as_secs(),
            "starting idle-eviction task"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately; skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if manager.evict_if_idle().await {
                    debug!("idle eviction cycle unloaded the model");
                }
            }
        })
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_used_ms.store(elapsed, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ModelLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLifecycleManager")
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::VisuraError;
    use crate::vector::EmbeddingVector;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    /// Deterministic model for lifecycle tests.
    #[derive(Debug)]
    struct StaticModel {
        id: String,
    }

    impl VisionLanguageModel for StaticModel {
        fn model_id(&self) -> &str {
            &self.id
        }

        fn dimension(&self) -> usize {
            4
        }

        fn embed_image(&self, _bytes: &[u8]) -> Result<EmbeddingVector> {
            Ok(EmbeddingVector::new(vec![1.0, 0.0, 0.0, 0.0]))
        }

        fn embed_text(&self, _text: &str) -> Result<EmbeddingVector> {
            Ok(EmbeddingVector::new(vec![0.0, 1.0, 0.0, 0.0]))
        }
    }

    /// Loader that counts loads and can be scripted to fail.
    struct CountingLoader {
        loads: SyncMutex<Vec<String>>,
        fail_next: SyncMutex<bool>,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                loads: SyncMutex::new(Vec::new()),
                fail_next: SyncMutex::new(false),
            }
        }

        fn load_count(&self) -> usize {
            self.loads.lock().len()
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self, model_id: &str) -> Result<Arc<dyn VisionLanguageModel>> {
            if std::mem::take(&mut *self.fail_next.lock()) {
                return Err(VisuraError::model_load("scripted failure"));
            }
            self.loads.lock().push(model_id.to_string());
            Ok(Arc::new(StaticModel {
                id: model_id.to_string(),
            }))
        }
    }

    fn manager_with(
        loader: Arc<CountingLoader>,
        config: EngineConfig,
    ) -> (Arc<ModelLifecycleManager>, Arc<RuntimeConfig>) {
        let runtime = Arc::new(RuntimeConfig::fixed(config));
        let manager = Arc::new(ModelLifecycleManager::new(loader, Arc::clone(&runtime)));
        (manager, runtime)
    }

    #[tokio::test]
    async fn test_acquire_loads_once_and_shares() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(loader.clone(), EngineConfig::default());

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();

        assert_eq!(loader.load_count(), 1);
        assert_eq!(first.model_id(), second.model_id());
        assert!(manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_manager_unloaded_and_retries() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(loader.clone(), EngineConfig::default());

        *loader.fail_next.lock() = true;
        let result = manager.acquire().await;
        assert!(matches!(result, Err(VisuraError::ModelLoad(_))));
        assert!(!manager.is_loaded().await);

        // the next call retries and succeeds
        assert!(manager.acquire().await.is_ok());
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_model_switch_unloads_fresh_model() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, runtime) = manager_with(loader.clone(), EngineConfig::default());

        let first = manager.acquire().await.unwrap();
        assert_eq!(first.model_id(), crate::config::DEFAULT_MODEL_ID);

        // switch while the old model is still fresh
        runtime.set_model_id("openai/clip-vit-large-patch14");
        let second = manager.acquire().await.unwrap();

        assert_eq!(second.model_id(), "openai/clip-vit-large-patch14");
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_idle_eviction_after_threshold() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(
            loader.clone(),
            EngineConfig {
                idle_timeout_secs: 0,
                ..EngineConfig::default()
            },
        );

        manager.acquire().await.unwrap();
        assert!(manager.is_loaded().await);

        // zero threshold: the model is already considered idle, so a
        // single poll cycle evicts it
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(manager.evict_if_idle().await);
        assert!(!manager.is_loaded().await);

        // a subsequent acquire reloads
        manager.acquire().await.unwrap();
        assert!(manager.is_loaded().await);
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_fresh_model_survives_eviction_cycle() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(loader.clone(), EngineConfig::default());

        manager.acquire().await.unwrap();
        assert!(!manager.evict_if_idle().await);
        assert!(manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_idle_threshold_reload_is_picked_up() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, runtime) = manager_with(loader.clone(), EngineConfig::default());

        manager.acquire().await.unwrap();
        assert!(!manager.evict_if_idle().await);

        // operator drops the timeout to zero at runtime
        runtime.set_idle_timeout(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(manager.evict_if_idle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_evicts_idle_model() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(
            loader.clone(),
            EngineConfig {
                idle_timeout_secs: 30,
                eviction_poll_secs: 10,
                ..EngineConfig::default()
            },
        );

        manager.acquire().await.unwrap();
        let task = manager.spawn_eviction_task();

        // well past the idle threshold plus a poll cycle (virtual time)
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!manager.is_loaded().await);

        task.abort();
    }

    #[tokio::test]
    async fn test_unload_on_unloaded_manager_is_noop() {
        let loader = Arc::new(CountingLoader::new());
        let (manager, _) = manager_with(loader, EngineConfig::default());

        manager.unload().await;
        assert!(!manager.is_loaded().await);
    }
}
