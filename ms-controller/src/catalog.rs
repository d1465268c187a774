use std::sync::Arc;

use connector_abi::ConnectorRegistry;
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::model::MicroserviceDefinition;
use crate::store::ConfigStore;
use crate::validate::validate;

/// Store access that only ever admits and returns valid definitions.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn ConfigStore>,
    registry: Arc<ConnectorRegistry>,
}

impl Catalog {
    pub fn new(store: Arc<dyn ConfigStore>, registry: Arc<ConnectorRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub async fn create(&self, document: Value) -> Result<MicroserviceDefinition, Error> {
        let mut definition = validate(&document, &self.registry)?;
        let id = self.store.save(definition.to_document()).await?;
        definition.id = id;
        Ok(definition)
    }

    pub async fn update(&self, id: &str, document: Value) -> Result<MicroserviceDefinition, Error> {
        let mut definition = validate(&document, &self.registry)?;
        self.store.update(id, definition.to_document()).await?;
        definition.id = id.to_string();
        Ok(definition)
    }

    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.store.delete(id).await?;
        Ok(())
    }

    /// Loads and re-validates a stored definition.
    pub async fn get(&self, id: &str) -> Result<MicroserviceDefinition, Error> {
        let document = self.store.get(id).await?;
        let mut definition = validate(&document, &self.registry).map_err(|source| {
            warn!("stored configuration failed validation id={id} err={source}");
            Error::CorruptConfiguration {
                id: id.to_string(),
                source,
            }
        })?;
        definition.id = id.to_string();
        Ok(definition)
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, Error> {
        Ok(self.store.list_ids().await?)
    }

    pub async fn exists(&self, id: &str) -> Result<bool, Error> {
        Ok(self.store.exists(id).await?)
    }
}
