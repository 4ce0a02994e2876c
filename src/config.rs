//! Persisted bridge configuration.
//!
//! The executor reads and writes its [`BridgeConfig`] through a
//! [`ConfigStore`]. The file store keeps pretty-printed JSON on disk; the
//! memory store backs `--no-persist` runs and tests.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tally_link::{BridgeConfig, TallyError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ConfigError> for TallyError {
    fn from(e: ConfigError) -> Self {
        TallyError::Storage(e.to_string())
    }
}

/// Storage backend for the executor configuration.
pub trait ConfigStore: Send + Sync {
    /// The stored configuration, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError>;

    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError>;
}

/// Write `seed` only if the store holds no configuration yet; return the
/// configuration in effect either way.
pub fn ensure_defaults(
    store: &dyn ConfigStore,
    seed: BridgeConfig,
) -> Result<BridgeConfig, ConfigError> {
    match store.load()? {
        Some(existing) => Ok(existing),
        None => {
            store.save(&seed)?;
            tracing::info!("Wrote default configuration (endpoint {})", seed.endpoint);
            Ok(seed)
        }
    }
}

// ============================================================================
// File store
// ============================================================================

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryConfigStore {
    config: Mutex<Option<BridgeConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            config: Mutex::new(Some(config)),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError> {
        Ok(self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }
}
