//! Bootstrap helpers for starting Soiree from a single YAML config.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use soiree_config::{load_config, ConfigError, SoireeConfig};
use soiree_core::classifier::{InputClassifier, KeywordClassifier};
use soiree_core::graph::{DependencyGraph, GraphError};
use soiree_core::router::{
    ComplexityRouter, FieldExtractor, RouterConfig, RouterWeights, SlowPlanner,
};
use soiree_core::scheduler::DependencyScheduler;
use soiree_core::types::Domain;
use soiree_stores::{InMemoryEventBus, InMemorySessionStore};

use crate::orchestrator::Orchestrator;
use crate::registry::AgentRegistry;
use crate::runtime::{AgentRuntime, RuntimeConfig};

/// Runtime bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("dependency graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Running app bundle created from unified config.
pub struct RuntimeApp {
    pub orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
    reactors: Vec<JoinHandle<()>>,
}

impl RuntimeApp {
    /// Create a runnable app from a single `soiree.yaml`.
    pub fn from_config_path(
        path: impl Into<PathBuf>,
        registry: AgentRegistry,
        slow_planner: Arc<dyn SlowPlanner>,
    ) -> Result<Self, BootstrapError> {
        let config = load_config(&path.into())?;
        Self::from_config(&config, registry, slow_planner)
    }

    /// Create a runnable app from an already-loaded config.
    pub fn from_config(
        config: &SoireeConfig,
        registry: AgentRegistry,
        slow_planner: Arc<dyn SlowPlanner>,
    ) -> Result<Self, BootstrapError> {
        let graph = Arc::new(graph_from_config(config));
        // Reject cyclic configs at startup; the scheduler assumes acyclicity.
        graph.validate()?;

        let classifier: Arc<dyn InputClassifier> = if config.classifier.keywords.is_empty() {
            Arc::new(KeywordClassifier::with_defaults())
        } else {
            Arc::new(KeywordClassifier::new(config.classifier.keywords.clone()))
        };

        let router = Arc::new(ComplexityRouter::new(
            router_config(config),
            Arc::new(FieldExtractor::new(classifier.clone())),
            slow_planner,
        ));

        let store = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(InMemoryEventBus::with_capacity(
            config.bus.subscriber_capacity,
            config.bus.history_limit,
        ));

        let shutdown = CancellationToken::new();
        let runtime = Arc::new(AgentRuntime::new(
            store.clone(),
            bus.clone(),
            Arc::new(registry),
            runtime_config(config),
            shutdown.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            store,
            bus,
            router,
            classifier,
            DependencyScheduler::new(graph),
            runtime,
            shutdown.clone(),
        ));
        let reactors = orchestrator.spawn_reactors();

        tracing::info!(app = %config.app.name, "soiree runtime started");

        Ok(Self {
            orchestrator,
            shutdown,
            reactors,
        })
    }

    /// Stop the reactor loops and signal in-flight executions.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for reactor in self.reactors {
            let _ = reactor.await;
        }
    }
}

fn graph_from_config(config: &SoireeConfig) -> DependencyGraph {
    let edges: HashMap<Domain, BTreeSet<Domain>> = config
        .graph
        .edges
        .iter()
        .map(|(upstream, downstream)| {
            (
                upstream.clone(),
                downstream.iter().cloned().collect::<BTreeSet<Domain>>(),
            )
        })
        .collect();
    DependencyGraph::from_parts(edges, config.graph.priority.clone())
}

fn router_config(config: &SoireeConfig) -> RouterConfig {
    RouterConfig {
        cutoff: config.router.cutoff,
        weights: RouterWeights {
            explicit_category: config.router.weights.explicit_category,
            explicit_count: config.router.weights.explicit_count,
            explicit_date_or_location: config.router.weights.explicit_date_or_location,
            short_text: config.router.weights.short_text,
            structured: config.router.weights.structured,
            narrative: config.router.weights.narrative,
            long_text: config.router.weights.long_text,
            image_description: config.router.weights.image_description,
        },
        slow_path_timeout: Duration::from_millis(config.router.slow_path_timeout_ms),
        short_text_chars: config.router.short_text_chars,
        long_text_chars: config.router.long_text_chars,
    }
}

fn runtime_config(config: &SoireeConfig) -> RuntimeConfig {
    RuntimeConfig {
        execution_timeout: Duration::from_millis(config.runtime.execution_timeout_ms),
        max_retry_attempts: config.runtime.max_retry_attempts,
        retry_base_delay: Duration::from_millis(config.runtime.retry_base_delay_ms),
        retry_max_delay: Duration::from_millis(config.runtime.retry_max_delay_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    use crate::builtin;

    #[test]
    fn test_bootstrap_rejects_cyclic_graph() {
        let mut config = SoireeConfig::default();
        config.graph.edges = HashMap::from([
            ("theme".to_string(), vec!["cake".to_string()]),
            ("cake".to_string(), vec!["theme".to_string()]),
        ]);

        let result = RuntimeApp::from_config(
            &config,
            builtin::default_registry(),
            Arc::new(builtin::UnavailablePlanner),
        );
        assert!(matches!(result, Err(BootstrapError::Graph(_))));
    }

    #[test]
    fn test_bootstrap_from_yaml_path() {
        tokio_test::block_on(async {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(
                b"version: 1\ngraph:\n  edges:\n    theme: [\"cake\"]\n  priority:\n    theme: 10\n",
            )
            .unwrap();
            file.flush().unwrap();

            let app = RuntimeApp::from_config_path(
                file.path(),
                builtin::default_registry(),
                Arc::new(builtin::UnavailablePlanner),
            )
            .unwrap();
            app.shutdown().await;
        });
    }
}
