use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored microservice: named operations plus descriptive metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub default_operation_id: String,
    pub operations: BTreeMap<String, Operation>,
    #[serde(default = "empty_document")]
    pub more_info: Value,
}

impl MicroserviceDefinition {
    pub fn operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations.get(operation_id)
    }

    pub fn default_operation(&self) -> Option<&Operation> {
        self.operations.get(&self.default_operation_id)
    }

    /// Document form as persisted; the id lives in the store key, not the body.
    pub fn to_document(&self) -> Value {
        let mut definition = self.clone();
        definition.id.clear();
        serde_json::to_value(definition).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub description: String,
    pub autostart: bool,
    pub configuration: OperationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    pub connector_id: String,
    pub config_start: Value,
    pub config_call: Value,
    pub inputs: BTreeMap<String, InputSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_async: Option<AsyncSpec>,
    pub output_description: String,
    pub output_adaptation_algorithm: String,
    pub status_check_algorithm: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    pub matching_name: String,
    pub description: String,
    pub working_example: Value,
}

/// Where an async connector's eventual response is forwarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncSpec {
    pub response_service_id: String,
    pub response_service_operation_id: String,
    pub response_service_input_id: String,
    pub response_service_other_inputs: BTreeMap<String, InputValue>,
    pub input_adaptation_algorithm: String,
}

/// `{"value": ...}` wrapper used for operation inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub value: Value,
}

impl InputValue {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn into_document(self) -> Value {
        let mut wrapped = Map::new();
        wrapped.insert("value".to_string(), self.value);
        Value::Object(wrapped)
    }
}

/// Identity of one operation of one microservice.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationKey {
    pub microservice_id: String,
    pub operation_id: String,
}

impl OperationKey {
    pub fn new(microservice_id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            microservice_id: microservice_id.into(),
            operation_id: operation_id.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.microservice_id, self.operation_id)
    }
}

fn empty_document() -> Value {
    Value::Object(Map::new())
}
