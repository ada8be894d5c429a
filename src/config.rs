//! Live engine configuration.
//!
//! Parameters that operators tune without restarting (which model to run,
//! how long it may sit idle, search caps) come from a JSON file read
//! through [`RuntimeConfig`]. Reads hit a cached snapshot; a
//! [`RuntimeConfig::reload`] invalidates the cache so the next read picks
//! up the new values.

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default inference model identifier.
pub const DEFAULT_MODEL_ID: &str = "openai/clip-vit-base-patch32";

/// Default idle period before the model is evicted (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Default poll interval of the idle-eviction task.
pub const DEFAULT_EVICTION_POLL_SECS: u64 = 60;

/// One immutable snapshot of the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inference model identifier; changing it swaps the model at runtime.
    pub model_id: String,
    /// Seconds the model may sit unused before eviction.
    pub idle_timeout_secs: u64,
    /// Seconds between idle-eviction checks (independent of the timeout).
    pub eviction_poll_secs: u64,
    /// Maximum results returned per search.
    pub max_results: usize,
    /// Minimum visual similarity for a candidate to survive.
    pub similarity_floor: f32,
    /// Minimum centroid similarity for a category detection to win.
    pub shortlist_confidence: f32,
    /// Similarity margin under which runner-up categories are searched too.
    pub shortlist_margin: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            eviction_poll_secs: DEFAULT_EVICTION_POLL_SECS,
            max_results: 10,
            similarity_floor: 0.1,
            shortlist_confidence: 0.2,
            shortlist_margin: 0.03,
        }
    }
}

impl EngineConfig {
    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Eviction poll interval as a [`Duration`].
    pub fn eviction_poll_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_poll_secs)
    }
}

/// Cached view over the live configuration source.
///
/// File-backed when constructed with [`RuntimeConfig::from_file`]; purely
/// programmatic otherwise. Thread-safe: reads share the cached snapshot,
/// writes go through the setters.
#[derive(Debug)]
pub struct RuntimeConfig {
    path: Option<PathBuf>,
    base: RwLock<EngineConfig>,
    cache: RwLock<Option<EngineConfig>>,
}

impl RuntimeConfig {
    /// Configuration backed by a JSON file.
    ///
    /// The file is read lazily on first use; unreadable or malformed files
    /// log a warning and fall back to the programmatic base values.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            base: RwLock::new(EngineConfig::default()),
            cache: RwLock::new(None),
        }
    }

    /// Purely in-memory configuration with the given values.
    pub fn fixed(config: EngineConfig) -> Self {
        Self {
            path: None,
            base: RwLock::new(config),
            cache: RwLock::new(None),
        }
    }

    /// In-memory configuration with default values.
    pub fn with_defaults() -> Self {
        Self::fixed(EngineConfig::default())
    }

    /// Current configuration snapshot, served from cache when warm.
    pub fn snapshot(&self) -> EngineConfig {
        if let Some(cached) = self.cache.read().as_ref() {
            return cached.clone();
        }

        let loaded = self.load();
        *self.cache.write() = Some(loaded.clone());
        loaded
    }

    /// Invalidate the cached snapshot; the next read re-loads the source.
    pub fn reload(&self) {
        *self.cache.write() = None;
    }

    /// Change the configured model identifier.
    ///
    /// Takes effect on the next [`snapshot`](Self::snapshot) (the cache is
    /// invalidated here), and therefore on the next model acquisition.
    pub fn set_model_id(&self, model_id: impl Into<String>) {
        self.base.write().model_id = model_id.into();
        self.reload();
    }

    /// Change the idle timeout.
    pub fn set_idle_timeout(&self, timeout: Duration) {
        self.base.write().idle_timeout_secs = timeout.as_secs();
        self.reload();
    }

    /// Convenience accessor for the configured model id.
    pub fn model_id(&self) -> String {
        self.snapshot().model_id
    }

    /// Convenience accessor for the idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.snapshot().idle_timeout()
    }

    fn load(&self) -> EngineConfig {
        let base = self.base.read().clone();

        let Some(path) = &self.path else {
            return base;
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed config file, using base values");
                    base
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable config file, using base values");
                base
            }
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fixed_snapshot_round_trip() {
        let config = RuntimeConfig::fixed(EngineConfig {
            model_id: "clip-test".to_string(),
            ..EngineConfig::default()
        });
        assert_eq!(config.model_id(), "clip-test");
        assert_eq!(config.idle_timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_file_backed_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model_id": "clip-a", "idle_timeout_secs": 60}}"#
        )
        .unwrap();

        let config = RuntimeConfig::from_file(file.path());
        assert_eq!(config.model_id(), "clip-a");
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
        // unspecified keys fall back to defaults
        assert_eq!(config.snapshot().eviction_poll_secs, 60);
    }

    #[test]
    fn test_snapshot_is_cached_until_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model_id": "clip-a"}}"#).unwrap();

        let config = RuntimeConfig::from_file(file.path());
        assert_eq!(config.model_id(), "clip-a");

        // rewrite the file: the cached snapshot must still be served
        std::fs::write(file.path(), r#"{"model_id": "clip-b"}"#).unwrap();
        assert_eq!(config.model_id(), "clip-a");

        // reload invalidates the cache
        config.reload();
        assert_eq!(config.model_id(), "clip-b");
    }

    #[test]
    fn test_malformed_file_falls_back_to_base() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let config = RuntimeConfig::from_file(file.path());
        assert_eq!(config.model_id(), DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_set_model_id_invalidates_cache() {
        let config = RuntimeConfig::with_defaults();
        assert_eq!(config.model_id(), DEFAULT_MODEL_ID);

        config.set_model_id("clip-next");
        assert_eq!(config.model_id(), "clip-next");
    }
}
