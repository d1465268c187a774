use std::sync::Weak;

use script::{Capability, HostCallContext, HostError, HostFunctionRegistry};
use serde_json::Value;

use crate::controller::{AdHocCall, ControllerInner, ExecutionController};

/// Host functions that let adaptation scripts call back into the controller.
pub(crate) fn host_functions(controller: Weak<ControllerInner>) -> HostFunctionRegistry {
    let mut registry = HostFunctionRegistry::new();

    let weak = controller.clone();
    registry.register(
        Capability::CallMicroservice.function_name(),
        Capability::CallMicroservice,
        3,
        move |ctx: &HostCallContext, args: Vec<Value>| {
            let controller = upgrade(&weak)?;
            let (microservice_id, operation_id, inputs) =
                operation_args(Capability::CallMicroservice, args)?;
            ctx.block_on(controller.call(&microservice_id, &operation_id, inputs))?
                .map_err(failed)
        },
    );

    let weak = controller.clone();
    registry.register(
        Capability::CallMicroserviceForced.function_name(),
        Capability::CallMicroserviceForced,
        3,
        move |ctx: &HostCallContext, args: Vec<Value>| {
            let controller = upgrade(&weak)?;
            let (microservice_id, operation_id, inputs) =
                operation_args(Capability::CallMicroserviceForced, args)?;
            ctx.block_on(controller.call_forced(&microservice_id, &operation_id, inputs))?
                .map_err(failed)
        },
    );

    registry.register(
        Capability::CallSyncConnector.function_name(),
        Capability::CallSyncConnector,
        1,
        move |ctx: &HostCallContext, mut args: Vec<Value>| {
            let controller = upgrade(&controller)?;
            let request: AdHocCall = serde_json::from_value(args.pop().unwrap_or(Value::Null))
                .map_err(|err| HostError::Failed(format!("invalid connector request: {err}")))?;
            ctx.block_on(controller.call_sync_connector_forced(request))?
                .map_err(failed)
        },
    );

    registry
}

fn upgrade(controller: &Weak<ControllerInner>) -> Result<ExecutionController, HostError> {
    controller
        .upgrade()
        .map(ExecutionController::from_inner)
        .ok_or_else(|| HostError::Failed("controller has shut down".to_string()))
}

fn operation_args(
    capability: Capability,
    args: Vec<Value>,
) -> Result<(String, String, Value), HostError> {
    let mut args = args.into_iter();
    let name = capability.function_name();
    let microservice_id = match args.next() {
        Some(Value::String(id)) => id,
        _ => {
            return Err(HostError::Failed(format!(
                "{name} expects a microservice id string"
            )));
        }
    };
    let operation_id = match args.next() {
        Some(Value::String(id)) => id,
        _ => {
            return Err(HostError::Failed(format!(
                "{name} expects an operation id string"
            )));
        }
    };
    Ok((microservice_id, operation_id, args.next().unwrap_or(Value::Null)))
}

fn failed(err: crate::Error) -> HostError {
    HostError::Failed(err.to_string())
}
