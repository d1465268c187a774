use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use connector_abi::{
    Connector, ConnectorError, ConnectorHandle, ConnectorRegistry, ConnectorStatus, ResponseSink,
    StartContext,
};
use script::{Bindings, CapabilitySet, HostFunctionRegistry, Sandbox};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge;
use crate::catalog::Catalog;
use crate::config::ControllerConfig;
use crate::error::Error;
use crate::model::{InputSpec, InputValue, MicroserviceDefinition, Operation, OperationKey};
use crate::report::{
    ConnectorStatusReport, ReconcileFailure, ReconcileReport, RuntimeEntry, StatusReport,
};
use crate::runtime::{Lifecycle, RuntimeTable, Slot, SlotState};
use crate::validate::ValidationError;

/// Script run on async payloads when the operation leaves the adaptation empty.
const PASSTHROUGH_SCRIPT: &str = "return output;";

/// Connector invocation on a configuration that is not stored anywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHocCall {
    pub connector_id: String,
    #[serde(default = "empty_object")]
    pub config_start: Value,
    #[serde(default = "empty_object")]
    pub config_call: Value,
    #[serde(default = "empty_object")]
    pub inputs: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub(crate) struct ControllerInner {
    catalog: Catalog,
    registry: Arc<ConnectorRegistry>,
    sandbox: Sandbox,
    runtime: RuntimeTable,
    config: ControllerConfig,
    host: Arc<HostFunctionRegistry>,
    responses: Arc<dyn ResponseSink>,
}

/// Owner of every operation's runtime state. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionController {
    inner: Arc<ControllerInner>,
}

impl ExecutionController {
    pub fn new(catalog: Catalog, sandbox: Sandbox, config: ControllerConfig) -> Self {
        let registry = catalog.registry().clone();
        let inner = Arc::new_cyclic(|weak: &Weak<ControllerInner>| ControllerInner {
            catalog,
            registry,
            sandbox,
            runtime: RuntimeTable::default(),
            config,
            host: Arc::new(bridge::host_functions(weak.clone())),
            responses: Arc::new(InboundResponses {
                controller: weak.clone(),
            }),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ControllerInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.inner.registry
    }

    pub async fn create(&self, document: Value) -> Result<String, Error> {
        let definition = self.inner.catalog.create(document).await?;
        info!(
            "created microservice id={} name={}",
            definition.id, definition.name
        );
        Ok(definition.id)
    }

    /// Replaces a definition. Operations that disappear, or whose connector
    /// changes, are stopped.
    pub async fn update(&self, id: &str, document: Value) -> Result<(), Error> {
        let definition = self.inner.catalog.update(id, document).await?;
        for key in self.inner.runtime.keys_for(id) {
            let connector_id = definition
                .operation(&key.operation_id)
                .map(|operation| operation.configuration.connector_id.as_str());
            let Some(slot) = self.inner.runtime.existing(&key) else {
                continue;
            };
            let mut state = slot.lock().await;
            if connector_id.is_some() && state.connector_id.as_deref() == connector_id {
                continue;
            }
            if let Err(err) = self.stop_locked(&key, &mut state).await {
                warn!("failed to stop operation after update key={key} err={err}");
            }
            if connector_id.is_none() {
                self.inner.runtime.remove(&key);
            }
        }
        info!("updated microservice id={id}");
        Ok(())
    }

    /// Deletes the definition, then stops its operations and drops their
    /// runtime state. A start racing with the delete finds the definition gone.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.inner.catalog.delete(id).await?;
        for key in self.inner.runtime.keys_for(id) {
            let Some(slot) = self.inner.runtime.existing(&key) else {
                continue;
            };
            let mut state = slot.lock().await;
            if let Err(err) = self.stop_locked(&key, &mut state).await {
                warn!("failed to stop operation after delete key={key} err={err}");
            }
            self.inner.runtime.remove(&key);
        }
        info!("deleted microservice id={id}");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<MicroserviceDefinition, Error> {
        self.inner.catalog.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<String>, Error> {
        self.inner.catalog.list_ids().await
    }

    /// Starts the operation's connector. Starting a started operation is a no-op.
    pub async fn start(&self, microservice_id: &str, operation_id: &str) -> Result<(), Error> {
        self.load_operation(microservice_id, operation_id).await?;
        let key = OperationKey::new(microservice_id, operation_id);
        let slot = self.inner.runtime.slot(&key);
        let mut state = slot.lock().await;
        self.start_locked(&key, &mut state).await?;
        Ok(())
    }

    pub async fn stop(&self, microservice_id: &str, operation_id: &str) -> Result<(), Error> {
        let key = OperationKey::new(microservice_id, operation_id);
        let Some(slot) = self.inner.runtime.existing(&key) else {
            return Ok(());
        };
        let mut state = slot.lock().await;
        self.stop_locked(&key, &mut state).await
    }

    /// Calls a started operation.
    pub async fn call(
        &self,
        microservice_id: &str,
        operation_id: &str,
        inputs: Value,
    ) -> Result<Value, Error> {
        let operation = self.load_operation(microservice_id, operation_id).await?;
        let key = OperationKey::new(microservice_id, operation_id);
        let (connector_id, handle) = self.started_handle(&key).await?;
        let operation = self.current_operation(&key, operation, &connector_id).await?;
        self.invoke(&key, &operation, handle, inputs).await
    }

    /// Starts the operation if needed, then calls it. Concurrent forced calls
    /// on one operation start its connector once.
    pub async fn call_forced(
        &self,
        microservice_id: &str,
        operation_id: &str,
        inputs: Value,
    ) -> Result<Value, Error> {
        let operation = self.load_operation(microservice_id, operation_id).await?;
        let key = OperationKey::new(microservice_id, operation_id);
        let (connector_id, handle) = {
            let slot = self.inner.runtime.slot(&key);
            let mut state = slot.lock().await;
            self.start_locked(&key, &mut state).await?;
            state
                .connector_id
                .clone()
                .zip(state.handle.clone())
                .ok_or_else(|| Error::NotStarted {
                    microservice_id: key.microservice_id.clone(),
                    operation_id: key.operation_id.clone(),
                })?
        };
        let operation = self.current_operation(&key, operation, &connector_id).await?;
        self.invoke(&key, &operation, handle, inputs).await
    }

    /// Inbound path for a raw response delivered by an async connector of
    /// `microservice_id/operation_id`. The payload is adapted and forwarded to
    /// the operation configured as its response target.
    pub async fn handle_async_response(
        &self,
        microservice_id: &str,
        operation_id: &str,
        payload: Value,
    ) -> Result<Value, Error> {
        let operation = self.load_operation(microservice_id, operation_id).await?;
        let Some(spec) = operation.configuration.inputs_async.as_ref() else {
            return Err(Error::Validation(ValidationError::new(
                format!("operations.{operation_id}.configuration.inputsAsync"),
                "operation does not expect asynchronous responses",
            )));
        };

        let bindings = match payload {
            Value::String(text) if looks_like_json(&text) => {
                Bindings::new().with_json_text("output", text)
            }
            other => Bindings::new().with_value("output", other),
        };
        let script = if spec.input_adaptation_algorithm.trim().is_empty() {
            PASSTHROUGH_SCRIPT
        } else {
            spec.input_adaptation_algorithm.as_str()
        };
        let adapted = self
            .inner
            .sandbox
            .evaluate(
                bindings,
                script,
                &CapabilitySet::read_only(),
                self.inner.config.script_timeout,
            )
            .await?;

        let mut inputs: Map<String, Value> = spec
            .response_service_other_inputs
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().into_document()))
            .collect();
        match adapted {
            Value::Object(map) if map.contains_key(&spec.response_service_input_id) => {
                inputs.extend(map);
            }
            other => {
                inputs.insert(
                    spec.response_service_input_id.clone(),
                    InputValue::new(other).into_document(),
                );
            }
        }

        info!(
            "forwarding async response from={microservice_id}/{operation_id} to={}/{}",
            spec.response_service_id, spec.response_service_operation_id
        );
        self.call_forced(
            &spec.response_service_id,
            &spec.response_service_operation_id,
            Value::Object(inputs),
        )
        .await
    }

    /// Lifecycle state plus the value of the operation's status check script.
    pub async fn check_status(
        &self,
        microservice_id: &str,
        operation_id: &str,
    ) -> Result<StatusReport, Error> {
        let operation = self.load_operation(microservice_id, operation_id).await?;
        let key = OperationKey::new(microservice_id, operation_id);
        let state = self.lifecycle(&key).await;

        let script = operation.configuration.status_check_algorithm.as_str();
        if script.trim().is_empty() {
            return Ok(StatusReport {
                state,
                computed: Value::Null,
            });
        }
        let bindings = Bindings::new()
            .with_value("state", Value::from(state.as_str()))
            .with_value("microserviceId", Value::from(microservice_id))
            .with_value("operationId", Value::from(operation_id));
        let computed = self
            .inner
            .sandbox
            .evaluate(
                bindings,
                script,
                &CapabilitySet::read_only(),
                self.inner.config.status_check_timeout,
            )
            .await?;
        Ok(StatusReport { state, computed })
    }

    /// Asks the connector about a started operation. A started operation whose
    /// connector is not running becomes broken.
    pub async fn check_connector_status(
        &self,
        microservice_id: &str,
        operation_id: &str,
    ) -> Result<ConnectorStatusReport, Error> {
        self.load_operation(microservice_id, operation_id).await?;
        let key = OperationKey::new(microservice_id, operation_id);
        let Some(slot) = self.inner.runtime.existing(&key) else {
            return Ok(ConnectorStatusReport {
                believed: Lifecycle::NotStarted,
                actual: None,
            });
        };
        let mut state = slot.lock().await;
        let believed = state.lifecycle;
        let (Some(connector_id), Some(handle)) = (state.connector_id.clone(), state.handle.clone())
        else {
            return Ok(ConnectorStatusReport {
                believed,
                actual: None,
            });
        };

        let actual = self.connector_status(&connector_id, &handle).await;
        if believed == Lifecycle::Started && !actual.is_running() {
            let reason = describe_status(&actual);
            warn!("operation drifted from started key={key} actual={reason}");
            state.mark_broken(reason);
        }
        Ok(ConnectorStatusReport {
            believed,
            actual: Some(actual),
        })
    }

    /// One pass over every stored operation that is autostart or has runtime
    /// state: drifted or broken operations are restarted once, autostart
    /// operations that are not running are started. Failures are collected in
    /// the report and never stop the sweep.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        for id in self.inner.catalog.list_ids().await? {
            let definition = match self.inner.catalog.get(&id).await {
                Ok(definition) => definition,
                Err(err) => {
                    warn!("skipping microservice during reconciliation id={id} err={err}");
                    continue;
                }
            };
            for (operation_id, operation) in &definition.operations {
                let key = OperationKey::new(&id, operation_id);
                let slot = if operation.autostart {
                    Some(self.inner.runtime.slot(&key))
                } else {
                    self.inner.runtime.existing(&key)
                };
                let Some(slot) = slot else {
                    continue;
                };
                report.checked += 1;
                self.reconcile_slot(&key, operation, &slot, &mut report)
                    .await;
            }
        }
        if report.is_clean() {
            debug!(
                "reconciliation finished checked={} started={} restarted={}",
                report.checked,
                report.started.len(),
                report.restarted.len()
            );
        } else {
            warn!(
                "reconciliation finished with failures checked={} failures={}",
                report.checked,
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Starts every autostart operation that is not started yet.
    pub async fn start_autostart_operations(&self) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        for id in self.inner.catalog.list_ids().await? {
            let definition = match self.inner.catalog.get(&id).await {
                Ok(definition) => definition,
                Err(err) => {
                    warn!("skipping microservice during autostart id={id} err={err}");
                    continue;
                }
            };
            for (operation_id, operation) in &definition.operations {
                if !operation.autostart {
                    continue;
                }
                report.checked += 1;
                let key = OperationKey::new(&id, operation_id);
                let slot = self.inner.runtime.slot(&key);
                let mut state = slot.lock().await;
                match self.start_locked(&key, &mut state).await {
                    Ok(true) => report.started.push(key),
                    Ok(false) => {}
                    Err(err) => report.failures.push(ReconcileFailure {
                        key,
                        reason: err.to_string(),
                    }),
                }
            }
        }
        info!(
            "autostart finished started={} failures={}",
            report.started.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Start, call and stop a connector on a one-off configuration. No runtime
    /// state is kept. Async connectors are rejected.
    pub async fn call_sync_connector_forced(&self, request: AdHocCall) -> Result<Value, Error> {
        let connector = self.connector(&request.connector_id)?;
        if connector.descriptor().async_connection_required {
            return Err(Error::Validation(ValidationError::new(
                "connectorId",
                format!(
                    "connector '{}' delivers responses asynchronously",
                    request.connector_id
                ),
            )));
        }

        let connector_id = request.connector_id.as_str();
        let handle = connector
            .start(StartContext::detached(), &request.config_start)
            .await
            .map_err(|err| Error::connector(connector_id, err))?;
        let result = connector
            .call(&handle, &request.inputs, &request.config_call)
            .await
            .map_err(|err| Error::connector(connector_id, err));
        if let Err(err) = connector.stop(&handle).await {
            warn!("failed to stop ad-hoc connector connector={connector_id} err={err}");
        }
        result
    }

    /// Runtime state of every operation that has been started or has failed.
    pub async fn runtime_snapshot(&self) -> Vec<RuntimeEntry> {
        let mut entries = Vec::new();
        for key in self.inner.runtime.keys() {
            let Some(slot) = self.inner.runtime.existing(&key) else {
                continue;
            };
            let state = slot.lock().await;
            if state.lifecycle == Lifecycle::NotStarted && state.last_error.is_none() {
                continue;
            }
            entries.push(RuntimeEntry {
                key,
                state: state.lifecycle,
                connector_id: state.connector_id.clone(),
                last_error: state.last_error.clone(),
            });
        }
        entries
    }

    /// Runs [`ExecutionController::reconcile_all`] every `interval` until
    /// `token` is cancelled.
    pub fn spawn_reconcile_loop(
        &self,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            info!("reconcile loop started interval_ms={}", interval.as_millis());
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(err) = controller.reconcile_all().await {
                    warn!("reconciliation pass failed err={err}");
                }
            }
            info!("reconcile loop stopped");
        })
    }

    async fn load_operation(
        &self,
        microservice_id: &str,
        operation_id: &str,
    ) -> Result<Operation, Error> {
        let mut definition = self.inner.catalog.get(microservice_id).await?;
        definition
            .operations
            .remove(operation_id)
            .ok_or_else(|| Error::operation_not_found(microservice_id, operation_id))
    }

    fn connector(&self, connector_id: &str) -> Result<Arc<dyn Connector>, Error> {
        self.inner
            .registry
            .get(connector_id)
            .ok_or_else(|| Error::NotFound {
                kind: "connector",
                id: connector_id.to_string(),
            })
    }

    async fn lifecycle(&self, key: &OperationKey) -> Lifecycle {
        match self.inner.runtime.existing(key) {
            Some(slot) => slot.lock().await.lifecycle,
            None => Lifecycle::NotStarted,
        }
    }

    async fn started_handle(
        &self,
        key: &OperationKey,
    ) -> Result<(String, ConnectorHandle), Error> {
        let not_started = || Error::NotStarted {
            microservice_id: key.microservice_id.clone(),
            operation_id: key.operation_id.clone(),
        };
        let slot = self.inner.runtime.existing(key).ok_or_else(not_started)?;
        let state = slot.lock().await;
        match (&state.lifecycle, &state.connector_id, &state.handle) {
            (Lifecycle::Started, Some(connector_id), Some(handle)) => {
                Ok((connector_id.clone(), handle.clone()))
            }
            _ => Err(not_started()),
        }
    }

    /// `operation` was loaded before the slot lock was taken. If the handle
    /// came from another connector, the definition changed in between and is
    /// loaded again.
    async fn current_operation(
        &self,
        key: &OperationKey,
        operation: Operation,
        connector_id: &str,
    ) -> Result<Operation, Error> {
        if operation.configuration.connector_id == connector_id {
            return Ok(operation);
        }
        self.load_operation(&key.microservice_id, &key.operation_id)
            .await
    }

    /// Returns whether the connector was actually started. A stale handle left
    /// by a broken operation is stopped first.
    ///
    /// The operation is reloaded under the slot lock: `delete` and `update`
    /// change the catalog before they take slot locks, so a caller holding an
    /// older copy cannot start a connector for an operation that is gone.
    async fn start_locked(
        &self,
        key: &OperationKey,
        state: &mut SlotState,
    ) -> Result<bool, Error> {
        if state.lifecycle == Lifecycle::Started {
            return Ok(false);
        }
        if let Some((stale_connector, stale_handle)) = state.clear() {
            self.stop_handle_best_effort(key, &stale_connector, &stale_handle)
                .await;
        }

        let operation = match self
            .load_operation(&key.microservice_id, &key.operation_id)
            .await
        {
            Ok(operation) => operation,
            Err(err) => {
                if matches!(err, Error::NotFound { .. }) {
                    self.inner.runtime.remove(key);
                }
                return Err(err);
            }
        };
        let connector_id = operation.configuration.connector_id.as_str();
        let connector = self.connector(connector_id)?;
        let context = StartContext {
            microservice_id: key.microservice_id.clone(),
            operation_id: key.operation_id.clone(),
            responses: Some(self.inner.responses.clone()),
        };
        match connector
            .start(context, &operation.configuration.config_start)
            .await
        {
            Ok(handle) => {
                state.mark_started(connector_id, handle);
                info!("started operation key={key} connector={connector_id}");
                Ok(true)
            }
            Err(err) => {
                warn!("failed to start operation key={key} connector={connector_id} err={err}");
                state.last_error = Some(err.message.clone());
                Err(Error::connector(connector_id, err))
            }
        }
    }

    async fn stop_locked(&self, key: &OperationKey, state: &mut SlotState) -> Result<(), Error> {
        state.last_error = None;
        let Some((connector_id, handle)) = state.clear() else {
            return Ok(());
        };
        let connector = self.connector(&connector_id)?;
        connector
            .stop(&handle)
            .await
            .map_err(|err| Error::connector(&connector_id, err))?;
        info!("stopped operation key={key} connector={connector_id}");
        Ok(())
    }

    async fn stop_handle_best_effort(
        &self,
        key: &OperationKey,
        connector_id: &str,
        handle: &ConnectorHandle,
    ) {
        let Ok(connector) = self.connector(connector_id) else {
            return;
        };
        if let Err(err) = connector.stop(handle).await {
            warn!("failed to stop stale handle key={key} connector={connector_id} err={err}");
        }
    }

    async fn connector_status(
        &self,
        connector_id: &str,
        handle: &ConnectorHandle,
    ) -> ConnectorStatus {
        match self.connector(connector_id) {
            Ok(connector) => connector
                .status(handle)
                .await
                .unwrap_or_else(|err| ConnectorStatus::Error(err.message)),
            Err(err) => ConnectorStatus::Error(err.to_string()),
        }
    }

    async fn reconcile_slot(
        &self,
        key: &OperationKey,
        operation: &Operation,
        slot: &Slot,
        report: &mut ReconcileReport,
    ) {
        let mut state = slot.lock().await;
        match state.lifecycle {
            Lifecycle::Started => {
                let (Some(connector_id), Some(handle)) =
                    (state.connector_id.clone(), state.handle.clone())
                else {
                    state.mark_broken("started without a connector handle".to_string());
                    self.restart(key, &mut state, report).await;
                    return;
                };
                let actual = self.connector_status(&connector_id, &handle).await;
                if actual.is_running() {
                    return;
                }
                let reason = describe_status(&actual);
                warn!("operation drifted from started key={key} actual={reason}");
                state.mark_broken(reason);
                self.restart(key, &mut state, report).await;
            }
            Lifecycle::Broken => self.restart(key, &mut state, report).await,
            Lifecycle::NotStarted if operation.autostart => {
                match self.start_locked(key, &mut state).await {
                    Ok(_) => report.started.push(key.clone()),
                    Err(err) => report.failures.push(ReconcileFailure {
                        key: key.clone(),
                        reason: err.to_string(),
                    }),
                }
            }
            Lifecycle::NotStarted => {}
        }
    }

    async fn restart(
        &self,
        key: &OperationKey,
        state: &mut SlotState,
        report: &mut ReconcileReport,
    ) {
        match self.start_locked(key, state).await {
            Ok(_) => report.restarted.push(key.clone()),
            Err(err) => report.failures.push(ReconcileFailure {
                key: key.clone(),
                reason: err.to_string(),
            }),
        }
    }

    async fn invoke(
        &self,
        key: &OperationKey,
        operation: &Operation,
        handle: ConnectorHandle,
        inputs: Value,
    ) -> Result<Value, Error> {
        let configuration = &operation.configuration;
        let script = configuration.output_adaptation_algorithm.as_str();
        let caller_inputs = if script.trim().is_empty() {
            Value::Null
        } else {
            inputs.clone()
        };
        let call_inputs = merge_inputs(&configuration.inputs, inputs)?;
        let connector_id = configuration.connector_id.as_str();
        let connector = self.connector(connector_id)?;
        let raw = connector
            .call(&handle, &call_inputs, &configuration.config_call)
            .await
            .map_err(|err| {
                warn!("connector call failed key={key} connector={connector_id} err={err}");
                Error::connector(connector_id, err)
            })?;

        if script.trim().is_empty() {
            return Ok(raw);
        }
        let bindings = Bindings::new()
            .with_value("output", raw)
            .with_value("input", caller_inputs);
        let adapted = self
            .inner
            .sandbox
            .evaluate_with_host(
                bindings,
                script,
                &CapabilitySet::cross_call(),
                self.inner.host.clone(),
                self.inner.config.script_timeout,
            )
            .await?;
        Ok(adapted)
    }
}

/// Builds the connector's inputs: each declared slot takes the caller's value
/// (unwrapped from `{"value": ...}`) or its working example, keyed by its
/// matching name. Keys the operation does not declare pass through as given.
pub(crate) fn merge_inputs(
    declared: &BTreeMap<String, InputSpec>,
    inputs: Value,
) -> Result<Value, Error> {
    let mut provided = match inputs {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::Validation(ValidationError::new(
                "inputs",
                format!("expected an object, found {other}"),
            )));
        }
    };

    let mut merged = Map::new();
    for (key, spec) in declared {
        let value = match provided.remove(key) {
            Some(value) => unwrap_input(value),
            None => spec.working_example.clone(),
        };
        merged.insert(spec.matching_name.clone(), value);
    }
    for (key, value) in provided {
        merged.entry(key).or_insert(value);
    }
    Ok(Value::Object(merged))
}

fn unwrap_input(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn describe_status(status: &ConnectorStatus) -> String {
    match status {
        ConnectorStatus::Running => "running".to_string(),
        ConnectorStatus::Stopped => "stopped".to_string(),
        ConnectorStatus::Error(message) => format!("error: {message}"),
    }
}

/// Response path handed to connectors at start.
struct InboundResponses {
    controller: Weak<ControllerInner>,
}

#[async_trait]
impl ResponseSink for InboundResponses {
    async fn deliver(
        &self,
        microservice_id: &str,
        operation_id: &str,
        payload: Value,
    ) -> Result<Value, ConnectorError> {
        let controller = self
            .controller
            .upgrade()
            .map(ExecutionController::from_inner)
            .ok_or_else(|| ConnectorError::new("controller has shut down"))?;
        controller
            .handle_async_response(microservice_id, operation_id, payload)
            .await
            .map_err(|err| ConnectorError::new(err.to_string()))
    }
}
