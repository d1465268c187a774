//! Stores microservice definitions and runs their operations against
//! connectors, adapting inputs and outputs with sandboxed scripts.

mod bridge;
pub mod catalog;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod report;
mod runtime;
pub mod store;
pub mod validate;

pub use catalog::Catalog;
pub use config::{ConfigError, ControllerConfig};
pub use context::EngineContext;
pub use controller::{AdHocCall, ExecutionController};
pub use error::Error;
pub use logging::init_logging;
pub use model::{
    AsyncSpec, InputSpec, InputValue, MicroserviceDefinition, Operation, OperationConfig,
    OperationKey,
};
pub use report::{
    ConnectorStatusReport, ReconcileFailure, ReconcileReport, RuntimeEntry, StatusReport,
};
pub use runtime::Lifecycle;
pub use store::{ConfigStore, FileStore, MemoryStore, StoreError};
pub use validate::{ValidationError, validate};
