use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use connector_abi::ConnectorHandle;
use serde::{Deserialize, Serialize};

use crate::model::OperationKey;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    #[default]
    NotStarted,
    Started,
    /// Believed started, but the connector disagrees.
    Broken,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "notStarted",
            Lifecycle::Started => "started",
            Lifecycle::Broken => "broken",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SlotState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) handle: Option<ConnectorHandle>,
    pub(crate) connector_id: Option<String>,
    pub(crate) last_error: Option<String>,
}

impl SlotState {
    pub(crate) fn mark_started(&mut self, connector_id: &str, handle: ConnectorHandle) {
        self.lifecycle = Lifecycle::Started;
        self.handle = Some(handle);
        self.connector_id = Some(connector_id.to_string());
        self.last_error = None;
    }

    pub(crate) fn mark_broken(&mut self, reason: String) {
        self.lifecycle = Lifecycle::Broken;
        self.last_error = Some(reason);
    }

    /// Back to NotStarted, returning the handle that was held.
    pub(crate) fn clear(&mut self) -> Option<(String, ConnectorHandle)> {
        self.lifecycle = Lifecycle::NotStarted;
        let handle = self.handle.take();
        let connector_id = self.connector_id.take();
        connector_id.zip(handle)
    }
}

pub(crate) type Slot = Arc<tokio::sync::Mutex<SlotState>>;

/// Per-operation runtime slots. The table lock is only held to look up or
/// insert a slot; each slot has its own async mutex.
#[derive(Default)]
pub(crate) struct RuntimeTable {
    slots: Mutex<HashMap<OperationKey, Slot>>,
}

impl RuntimeTable {
    pub(crate) fn slot(&self, key: &OperationKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    pub(crate) fn existing(&self, key: &OperationKey) -> Option<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn remove(&self, key: &OperationKey) -> Option<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub(crate) fn keys(&self) -> Vec<OperationKey> {
        let mut keys: Vec<OperationKey> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn keys_for(&self, microservice_id: &str) -> Vec<OperationKey> {
        self.keys()
            .into_iter()
            .filter(|key| key.microservice_id == microservice_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_shared_per_key() {
        let table = RuntimeTable::default();
        let key = OperationKey::new("ms", "op");
        let first = table.slot(&key);
        let second = table.slot(&key);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(table.existing(&OperationKey::new("ms", "other")).is_none());
        assert_eq!(table.keys_for("ms"), vec![key.clone()]);

        assert!(table.remove(&key).is_some());
        assert!(table.existing(&key).is_none());
        assert!(table.keys().is_empty());
        assert!(!Arc::ptr_eq(&first, &table.slot(&key)));
    }

    #[test]
    fn clearing_returns_connector_and_handle() {
        let mut state = SlotState::default();
        state.mark_started("cmd", ConnectorHandle::empty("h"));
        assert_eq!(state.lifecycle, Lifecycle::Started);
        let (connector_id, handle) = state.clear().expect("handle was held");
        assert_eq!(connector_id, "cmd");
        assert_eq!(handle.label(), "h");
        assert_eq!(state.lifecycle, Lifecycle::NotStarted);
        assert!(state.clear().is_none());
    }
}
