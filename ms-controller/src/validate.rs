use connector_abi::ConnectorRegistry;
use serde_json::{Map, Value};

use crate::model::MicroserviceDefinition;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `operations.op1.configuration.inputsAsync`.
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

const ROOT_PATH: &str = "document";

/// Checks a submitted definition document and returns its typed form.
///
/// Checks run in a fixed order and stop at the first violation: top-level
/// fields, then each operation in key order (operation fields, configuration
/// fields, declared inputs, `inputsAsync` against the connector's async flag,
/// then the adaptation scripts).
pub fn validate(document: &Value, registry: &ConnectorRegistry) -> Result<MicroserviceDefinition> {
    let root = Fields::object(document, ROOT_PATH)?;
    root.string("name")?;
    root.string("description")?;
    root.bool("isPublic")?;
    let default_operation_id = root.string("defaultOperationId")?;
    let operations = root.object_field("operations")?;
    if operations.map.is_empty() {
        return Err(ValidationError::new(
            operations.path.clone(),
            "at least one operation is required",
        ));
    }
    if root.map.contains_key("moreInfo") {
        root.object_field("moreInfo")?;
    }
    if !operations.map.contains_key(default_operation_id) {
        return Err(ValidationError::new(
            root.child_path("defaultOperationId"),
            format!("'{default_operation_id}' is not a key of operations"),
        ));
    }

    for key in operations.map.keys() {
        validate_operation(&operations.object_field(key)?, registry)?;
    }

    serde_json::from_value(document.clone())
        .map_err(|err| ValidationError::new(ROOT_PATH, err.to_string()))
}

fn validate_operation(operation: &Fields<'_>, registry: &ConnectorRegistry) -> Result<()> {
    operation.string("name")?;
    operation.string("description")?;
    operation.bool("autostart")?;
    let configuration = operation.object_field("configuration")?;

    let connector_id = configuration.string("connectorId")?;
    let Some(async_required) = registry.async_connection_required(connector_id) else {
        return Err(ValidationError::new(
            configuration.child_path("connectorId"),
            format!("unknown connector '{connector_id}'"),
        ));
    };
    configuration.object_field("configStart")?;
    configuration.object_field("configCall")?;
    let inputs = configuration.object_field("inputs")?;
    configuration.string("outputDescription")?;

    for key in inputs.map.keys() {
        let input = inputs.object_field(key)?;
        input.string("matchingName")?;
        input.string("description")?;
        input.present("workingExample")?;
    }

    match (async_required, configuration.optional_object("inputsAsync")?) {
        (true, Some(inputs_async)) => {
            inputs_async.string("responseServiceId")?;
            inputs_async.string("responseServiceOperationId")?;
            inputs_async.string("responseServiceInputId")?;
            inputs_async.string("inputAdaptationAlgorithm")?;
            let others = inputs_async.object_field("responseServiceOtherInputs")?;
            for key in others.map.keys() {
                others.object_field(key)?.present("value")?;
            }
        }
        (true, None) => {
            return Err(ValidationError::new(
                configuration.child_path("inputsAsync"),
                format!("required because connector '{connector_id}' delivers responses asynchronously"),
            ));
        }
        (false, Some(_)) => {
            return Err(ValidationError::new(
                configuration.child_path("inputsAsync"),
                format!("not allowed because connector '{connector_id}' responds synchronously"),
            ));
        }
        (false, None) => {}
    }

    configuration.string("outputAdaptationAlgorithm")?;
    configuration.string("statusCheckAlgorithm")?;
    Ok(())
}

/// A JSON object being checked, with the path used in error reports.
struct Fields<'a> {
    path: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn object(value: &'a Value, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        match value {
            Value::Object(map) => Ok(Self { path, map }),
            other => Err(ValidationError::new(
                path,
                format!("expected an object, found {}", kind(other)),
            )),
        }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path == ROOT_PATH {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn present(&self, key: &str) -> Result<&'a Value> {
        self.map
            .get(key)
            .ok_or_else(|| ValidationError::new(self.child_path(key), "missing required field"))
    }

    fn string(&self, key: &str) -> Result<&'a str> {
        match self.present(key)? {
            Value::String(text) => Ok(text),
            other => Err(ValidationError::new(
                self.child_path(key),
                format!("expected a string, found {}", kind(other)),
            )),
        }
    }

    fn bool(&self, key: &str) -> Result<bool> {
        match self.present(key)? {
            Value::Bool(flag) => Ok(*flag),
            other => Err(ValidationError::new(
                self.child_path(key),
                format!("expected a boolean, found {}", kind(other)),
            )),
        }
    }

    fn object_field(&self, key: &str) -> Result<Fields<'a>> {
        Fields::object(self.present(key)?, self.child_path(key))
    }

    /// Absent and `null` both count as not provided.
    fn optional_object(&self, key: &str) -> Result<Option<Fields<'a>>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Fields::object(value, self.child_path(key)).map(Some),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
