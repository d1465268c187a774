use connector_abi::ConnectorStatus;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::model::OperationKey;
use crate::runtime::Lifecycle;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: Lifecycle,
    /// Result of the operation's status check script; null when it has none.
    pub computed: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatusReport {
    pub believed: Lifecycle,
    /// None when there is no handle to ask about.
    pub actual: Option<ConnectorStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFailure {
    pub key: OperationKey,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked: usize,
    pub started: Vec<OperationKey>,
    pub restarted: Vec<OperationKey>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<ReconcileReport, Error> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::ReconciliationPartialFailure(self.failures))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEntry {
    pub key: OperationKey,
    pub state: Lifecycle,
    pub connector_id: Option<String>,
    pub last_error: Option<String>,
}
