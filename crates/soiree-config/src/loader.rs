//! Configuration loading and hot-reload support.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::SoireeConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full Soiree configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<SoireeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: SoireeConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &SoireeConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.bus.subscriber_capacity == 0 {
        return Err(ConfigError::Invalid(
            "bus.subscriber_capacity must be > 0".to_string(),
        ));
    }

    if config.bus.history_limit == 0 {
        return Err(ConfigError::Invalid(
            "bus.history_limit must be > 0".to_string(),
        ));
    }

    if config.router.cutoff > 100 {
        return Err(ConfigError::Invalid(
            "router.cutoff must be within 0..=100".to_string(),
        ));
    }

    if config.router.slow_path_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "router.slow_path_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.runtime.execution_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "runtime.execution_timeout_ms must be > 0".to_string(),
        ));
    }

    validate_graph(config)?;
    validate_classifier(config)?;

    Ok(())
}

fn validate_graph(config: &SoireeConfig) -> Result<(), ConfigError> {
    for (upstream, downstream) in &config.graph.edges {
        if upstream.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "graph.edges keys must not be empty".to_string(),
            ));
        }
        for domain in downstream {
            if domain.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "graph.edges[{}] contains an empty domain",
                    upstream
                )));
            }
        }
    }

    for domain in config.graph.priority.keys() {
        if domain.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "graph.priority keys must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_classifier(config: &SoireeConfig) -> Result<(), ConfigError> {
    for (domain, terms) in &config.classifier.keywords {
        if domain.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.keywords keys must not be empty".to_string(),
            ));
        }
        if terms.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "classifier.keywords[{}] contains an empty term",
                domain
            )));
        }
    }
    Ok(())
}

/// Manages unified configuration with hot-reload support.
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<SoireeConfig>>,
}

impl ConfigManager {
    /// Create a new config manager.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(SoireeConfig::default())),
        }
    }

    /// Get a reference to the current config.
    pub fn config(&self) -> Arc<RwLock<SoireeConfig>> {
        self.config.clone()
    }

    /// Load configuration from file.
    pub async fn load(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        let mut current = self.config.write().await;
        *current = config;
        Ok(())
    }

    /// Start watching for config file changes.
    pub fn start_watching(self: &Arc<Self>) -> Result<ConfigWatcher, ConfigError> {
        let manager = Arc::clone(self);
        let handle = tokio::runtime::Handle::current();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let manager = Arc::clone(&manager);
                        handle.spawn(async move {
                            if let Err(e) = manager.load().await {
                                tracing::error!("Failed to reload config: {}", e);
                            } else {
                                tracing::info!("Config reloaded successfully");
                            }
                        });
                    }
                }
            })?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        Ok(ConfigWatcher { _watcher: watcher })
    }
}

/// Keeps the file watcher alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}
