//! Boundary between the execution controller and connector backends.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Operations on this connector must declare `inputsAsync`; responses come
    /// back later through the [`ResponseSink`].
    pub async_connection_required: bool,
}

impl ConnectorDescriptor {
    pub fn sync(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            async_connection_required: false,
        }
    }

    pub fn asynchronous(id: impl Into<String>) -> Self {
        Self {
            async_connection_required: true,
            ..Self::sync(id)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum ConnectorStatus {
    Running,
    Stopped,
    Error(String),
}

impl ConnectorStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ConnectorStatus::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConnectorError {
    pub message: String,
}

impl ConnectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Opaque state a connector hands back from `start`. The controller keeps it
/// for the lifetime of the operation and passes it to `call`, `status` and
/// `stop`.
#[derive(Clone)]
pub struct ConnectorHandle {
    label: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ConnectorHandle {
    pub fn new<T>(label: impl Into<String>, state: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            label: label.into(),
            inner: Arc::new(state),
        }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, ())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for ConnectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Inbound path for raw async responses.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(
        &self,
        microservice_id: &str,
        operation_id: &str,
        payload: Value,
    ) -> Result<Value, ConnectorError>;
}

#[derive(Clone)]
pub struct StartContext {
    pub microservice_id: String,
    pub operation_id: String,
    pub responses: Option<Arc<dyn ResponseSink>>,
}

impl StartContext {
    /// Context for ad-hoc starts that belong to no stored operation.
    pub fn detached() -> Self {
        Self {
            microservice_id: String::new(),
            operation_id: String::new(),
            responses: None,
        }
    }

    pub async fn deliver_response(&self, payload: Value) -> Result<Value, ConnectorError> {
        let Some(sink) = self.responses.as_ref() else {
            return Err(ConnectorError::new(
                "no response sink attached to this start context",
            ));
        };
        sink.deliver(&self.microservice_id, &self.operation_id, payload)
            .await
    }
}

impl fmt::Debug for StartContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartContext")
            .field("microservice_id", &self.microservice_id)
            .field("operation_id", &self.operation_id)
            .field("responses", &self.responses.is_some())
            .finish()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn descriptor(&self) -> ConnectorDescriptor;

    async fn start(
        &self,
        context: StartContext,
        config_start: &Value,
    ) -> Result<ConnectorHandle, ConnectorError>;

    async fn call(
        &self,
        handle: &ConnectorHandle,
        inputs: &Value,
        config_call: &Value,
    ) -> Result<Value, ConnectorError>;

    async fn status(&self, handle: &ConnectorHandle) -> Result<ConnectorStatus, ConnectorError>;

    async fn stop(&self, handle: &ConnectorHandle) -> Result<(), ConnectorError>;
}

/// Connector implementations keyed by descriptor id.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connector` under its descriptor id, replacing any previous one.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let id = connector.descriptor().id;
        self.connectors.insert(id, connector);
    }

    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connectors.contains_key(id)
    }

    pub fn descriptor(&self, id: &str) -> Option<ConnectorDescriptor> {
        self.connectors.get(id).map(|connector| connector.descriptor())
    }

    pub fn async_connection_required(&self, id: &str) -> Option<bool> {
        self.descriptor(id)
            .map(|descriptor| descriptor.async_connection_required)
    }

    pub fn descriptors(&self) -> Vec<ConnectorDescriptor> {
        self.connectors
            .values()
            .map(|connector| connector.descriptor())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.connectors.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoConnector {
        descriptor: ConnectorDescriptor,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        fn descriptor(&self) -> ConnectorDescriptor {
            self.descriptor.clone()
        }

        async fn start(
            &self,
            context: StartContext,
            config_start: &Value,
        ) -> Result<ConnectorHandle, ConnectorError> {
            Ok(ConnectorHandle::new(
                context.operation_id,
                config_start.clone(),
            ))
        }

        async fn call(
            &self,
            handle: &ConnectorHandle,
            inputs: &Value,
            _config_call: &Value,
        ) -> Result<Value, ConnectorError> {
            let started_with = handle
                .downcast_ref::<Value>()
                .cloned()
                .ok_or_else(|| ConnectorError::new("foreign handle"))?;
            Ok(serde_json::json!({"inputs": inputs, "startedWith": started_with}))
        }

        async fn status(
            &self,
            _handle: &ConnectorHandle,
        ) -> Result<ConnectorStatus, ConnectorError> {
            Ok(ConnectorStatus::Running)
        }

        async fn stop(&self, _handle: &ConnectorHandle) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    #[test]
    fn registry_reports_descriptors_in_id_order() {
        let registry = ConnectorRegistry::new()
            .with(Arc::new(EchoConnector {
                descriptor: ConnectorDescriptor::sync("rest"),
            }))
            .with(Arc::new(EchoConnector {
                descriptor: ConnectorDescriptor::asynchronous("amqp"),
            }));

        let ids: Vec<String> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["amqp".to_string(), "rest".to_string()]);
        assert_eq!(registry.async_connection_required("amqp"), Some(true));
        assert_eq!(registry.async_connection_required("rest"), Some(false));
        assert_eq!(registry.async_connection_required("soap"), None);
        assert!(!registry.contains("soap"));
    }

    #[test]
    fn handle_downcasts_to_connector_state() {
        let handle = ConnectorHandle::new("op", 7u32);
        assert_eq!(handle.label(), "op");
        assert_eq!(handle.downcast_ref::<u32>(), Some(&7));
        assert!(handle.downcast_ref::<String>().is_none());
        assert!(format!("{handle:?}").contains("op"));
    }

    #[test]
    fn descriptor_uses_camel_case_fields() {
        let encoded = serde_json::to_value(ConnectorDescriptor::asynchronous("amqp"))
            .expect("descriptor serializes");
        assert_eq!(
            encoded,
            serde_json::json!({"id": "amqp", "description": "", "asyncConnectionRequired": true})
        );
    }

    #[tokio::test]
    async fn detached_context_has_no_response_path() {
        let err = StartContext::detached()
            .deliver_response(Value::Null)
            .await
            .expect_err("no sink");
        assert!(err.message.contains("no response sink"));
    }

    #[tokio::test]
    async fn call_sees_state_from_start() {
        let connector = EchoConnector {
            descriptor: ConnectorDescriptor::sync("rest"),
        };
        let handle = connector
            .start(StartContext::detached(), &serde_json::json!({"port": 80}))
            .await
            .expect("start");
        let output = connector
            .call(&handle, &serde_json::json!({"a": 1}), &Value::Null)
            .await
            .expect("call");
        assert_eq!(
            output,
            serde_json::json!({"inputs": {"a": 1}, "startedWith": {"port": 80}})
        );
    }
}
