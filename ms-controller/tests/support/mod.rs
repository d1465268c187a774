#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use connector_abi::{
    Connector, ConnectorDescriptor, ConnectorError, ConnectorHandle, ConnectorRegistry,
    ConnectorStatus, StartContext,
};
use ms_controller::{ControllerConfig, EngineContext, ExecutionController, MemoryStore};
use serde_json::{Value, json};

static TEST_DIR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub fn unique_dir(test_name: &str) -> PathBuf {
    let seq = TEST_DIR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("ms-controller-{test_name}-{now}-{seq}"))
}

/// Connector double that counts every contract call.
pub struct MockConnector {
    descriptor: ConnectorDescriptor,
    pub starts: AtomicUsize,
    pub calls: AtomicUsize,
    pub statuses: AtomicUsize,
    pub stops: AtomicUsize,
    start_delay_ms: AtomicU64,
    fail_start: AtomicBool,
    fail_call: AtomicBool,
    status: Mutex<ConnectorStatus>,
    output: Mutex<Option<Value>>,
    contexts: Mutex<Vec<StartContext>>,
    inputs: Mutex<Vec<Value>>,
}

impl MockConnector {
    pub fn sync(id: &str) -> Arc<Self> {
        Arc::new(Self::with_descriptor(ConnectorDescriptor::sync(id)))
    }

    pub fn asynchronous(id: &str) -> Arc<Self> {
        Arc::new(Self::with_descriptor(ConnectorDescriptor::asynchronous(id)))
    }

    fn with_descriptor(descriptor: ConnectorDescriptor) -> Self {
        Self {
            descriptor,
            starts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            statuses: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            start_delay_ms: AtomicU64::new(0),
            fail_start: AtomicBool::new(false),
            fail_call: AtomicBool::new(false),
            status: Mutex::new(ConnectorStatus::Running),
            output: Mutex::new(None),
            contexts: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.start_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_call(&self, fail: bool) {
        self.fail_call.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: ConnectorStatus) {
        *self.status.lock().expect("status lock") = status;
    }

    /// Fixed raw output for every call; by default calls echo their inputs.
    pub fn set_output(&self, output: Value) {
        *self.output.lock().expect("output lock") = Some(output);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<StartContext> {
        self.contexts.lock().expect("contexts lock").last().cloned()
    }

    pub fn received_inputs(&self) -> Vec<Value> {
        self.inputs.lock().expect("inputs lock").clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn descriptor(&self) -> ConnectorDescriptor {
        self.descriptor.clone()
    }

    async fn start(
        &self,
        context: StartContext,
        config_start: &Value,
    ) -> Result<ConnectorHandle, ConnectorError> {
        let generation = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ConnectorError::new("start refused"));
        }
        self.contexts.lock().expect("contexts lock").push(context);
        Ok(ConnectorHandle::new(
            format!("{}#{generation}", self.descriptor.id),
            json!({"generation": generation, "configStart": config_start}),
        ))
    }

    async fn call(
        &self,
        handle: &ConnectorHandle,
        inputs: &Value,
        config_call: &Value,
    ) -> Result<Value, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().expect("inputs lock").push(inputs.clone());
        if self.fail_call.load(Ordering::SeqCst) {
            return Err(ConnectorError::new("call refused"));
        }
        if let Some(output) = self.output.lock().expect("output lock").clone() {
            return Ok(output);
        }
        Ok(json!({
            "echo": inputs,
            "configCall": config_call,
            "handle": handle.label(),
        }))
    }

    async fn status(&self, _handle: &ConnectorHandle) -> Result<ConnectorStatus, ConnectorError> {
        self.statuses.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().expect("status lock").clone())
    }

    async fn stop(&self, _handle: &ConnectorHandle) -> Result<(), ConnectorError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn registry(connectors: &[Arc<MockConnector>]) -> ConnectorRegistry {
    connectors
        .iter()
        .fold(ConnectorRegistry::new(), |registry, connector| {
            registry.with(connector.clone())
        })
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        script_timeout: Duration::from_secs(2),
        status_check_timeout: Duration::from_secs(1),
        ..ControllerConfig::default()
    }
}

/// Controller over an in-memory store.
pub fn controller(connectors: &[Arc<MockConnector>]) -> ExecutionController {
    controller_with(test_config(), connectors).0
}

/// Controller plus the store behind it, for tests that inspect or corrupt
/// persisted documents.
pub fn controller_with(
    config: ControllerConfig,
    connectors: &[Arc<MockConnector>],
) -> (ExecutionController, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let context = EngineContext::with_store(config, store.clone(), registry(connectors));
    (context.controller, store)
}

/// A valid operation document bound to `connector_id`.
pub fn operation(connector_id: &str) -> Value {
    json!({
        "name": "run",
        "description": "runs the connector",
        "autostart": false,
        "configuration": {
            "connectorId": connector_id,
            "configStart": {},
            "configCall": {"mode": "test"},
            "inputs": {},
            "outputDescription": "raw connector output",
            "outputAdaptationAlgorithm": "",
            "statusCheckAlgorithm": ""
        }
    })
}

pub fn async_spec(target_ms: &str, target_op: &str, input_id: &str, script: &str) -> Value {
    json!({
        "responseServiceId": target_ms,
        "responseServiceOperationId": target_op,
        "responseServiceInputId": input_id,
        "responseServiceOtherInputs": {},
        "inputAdaptationAlgorithm": script
    })
}

/// A valid definition whose default operation is the first entry.
pub fn definition(name: &str, operations: Vec<(&str, Value)>) -> Value {
    let default_operation_id = operations
        .first()
        .map(|(id, _)| id.to_string())
        .unwrap_or_default();
    let operations: serde_json::Map<String, Value> = operations
        .into_iter()
        .map(|(id, operation)| (id.to_string(), operation))
        .collect();
    json!({
        "name": name,
        "description": format!("{name} service"),
        "isPublic": true,
        "defaultOperationId": default_operation_id,
        "operations": operations,
        "moreInfo": {}
    })
}
