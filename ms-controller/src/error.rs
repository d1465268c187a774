use script::SandboxError;

use crate::report::ReconcileFailure;
use crate::store::StoreError;
use crate::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("operation {microservice_id}/{operation_id} is not started")]
    NotStarted {
        microservice_id: String,
        operation_id: String,
    },
    #[error("connector '{connector_id}' failed: {message}")]
    Connector {
        connector_id: String,
        message: String,
    },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("stored configuration '{id}' is corrupt: {source}")]
    CorruptConfiguration { id: String, source: ValidationError },
    #[error("reconciliation left {} operation(s) unhealthy", .0.len())]
    ReconciliationPartialFailure(Vec<ReconcileFailure>),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) | StoreError::InvalidId(id) => Error::NotFound {
                kind: "microservice",
                id,
            },
            other => Error::Store(other),
        }
    }
}

impl Error {
    pub(crate) fn connector(connector_id: &str, err: impl std::fmt::Display) -> Self {
        Error::Connector {
            connector_id: connector_id.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn operation_not_found(microservice_id: &str, operation_id: &str) -> Self {
        Error::NotFound {
            kind: "operation",
            id: format!("{microservice_id}/{operation_id}"),
        }
    }
}
