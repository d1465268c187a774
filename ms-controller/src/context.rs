use std::sync::Arc;

use connector_abi::ConnectorRegistry;
use script::Sandbox;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::ControllerConfig;
use crate::controller::ExecutionController;
use crate::error::Error;
use crate::report::ReconcileReport;
use crate::store::{ConfigStore, FileStore, MemoryStore};

/// The wired engine: store, connector registry, sandbox and controller, built
/// in that order.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn ConfigStore>,
    pub registry: Arc<ConnectorRegistry>,
    pub sandbox: Sandbox,
    pub controller: ExecutionController,
}

impl EngineContext {
    /// Opens the file store when `config.state_dir` is set, otherwise keeps
    /// definitions in memory.
    pub async fn bootstrap(
        config: ControllerConfig,
        registry: ConnectorRegistry,
    ) -> Result<Self, Error> {
        let store: Arc<dyn ConfigStore> = match config.state_dir.as_ref() {
            Some(dir) => Arc::new(FileStore::open(dir.clone()).await?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(config, store, registry))
    }

    pub fn with_store(
        config: ControllerConfig,
        store: Arc<dyn ConfigStore>,
        registry: ConnectorRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let sandbox = Sandbox::new(config.sandbox);
        let catalog = Catalog::new(store.clone(), registry.clone());
        info!(
            "engine ready connectors={} state_dir={}",
            registry.len(),
            config
                .state_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "<memory>".to_string())
        );
        let controller = ExecutionController::new(catalog, sandbox.clone(), config);
        Self {
            store,
            registry,
            sandbox,
            controller,
        }
    }

    /// Starts autostart operations.
    pub async fn start(&self) -> Result<ReconcileReport, Error> {
        self.controller.start_autostart_operations().await
    }
}
