use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Privileged host facility a script can be granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    CallMicroservice,
    CallMicroserviceForced,
    CallSyncConnector,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::CallMicroservice,
        Capability::CallMicroserviceForced,
        Capability::CallSyncConnector,
    ];

    /// Script-visible name of the host function guarded by this capability.
    pub fn function_name(self) -> &'static str {
        match self {
            Capability::CallMicroservice => "callMicroservice",
            Capability::CallMicroserviceForced => "callMicroserviceForced",
            Capability::CallSyncConnector => "callSyncConnector",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Capability::CallMicroservice => 1,
            Capability::CallMicroserviceForced => 1 << 1,
            Capability::CallSyncConnector => 1 << 2,
        }
    }
}

/// Capabilities granted at one evaluation site. Empty by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    bits: u8,
}

impl CapabilitySet {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn cross_call() -> Self {
        Capability::ALL
            .into_iter()
            .fold(Self::default(), |set, capability| set.with(capability))
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.bits |= capability.bit();
        self
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host call cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

tokio::task_local! {
    static CALL_DEPTH: usize;
}

/// Number of script evaluations enclosing the current task through host calls.
pub(crate) fn current_call_depth() -> usize {
    CALL_DEPTH.try_with(|depth| *depth).unwrap_or(0)
}

/// Handed to host functions while a script is running on the blocking pool.
pub struct HostCallContext {
    token: CancellationToken,
    deadline: Instant,
    runtime: Handle,
    depth: usize,
}

impl HostCallContext {
    pub(crate) fn new(
        token: CancellationToken,
        deadline: Instant,
        runtime: Handle,
        depth: usize,
    ) -> Self {
        Self {
            token,
            deadline,
            runtime,
            depth,
        }
    }

    /// Evaluations enclosing the running script; 0 for a top-level script.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drives `future` to completion from the interpreter thread, abandoning it
    /// as soon as the evaluation is cancelled or its deadline passes. Scripts
    /// evaluated by `future` run one level deeper than this one.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, HostError>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(HostError::Cancelled);
        }
        let token = self.token.clone();
        let deadline = self.deadline;
        let nested = CALL_DEPTH.scope(self.depth + 1, future);
        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(HostError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(HostError::Cancelled),
                output = nested => Ok(output),
            }
        })
    }
}

pub trait HostFunction: Send + Sync {
    fn call(&self, ctx: &HostCallContext, args: Vec<Value>) -> Result<Value, HostError>;
}

impl<F> HostFunction for F
where
    F: Fn(&HostCallContext, Vec<Value>) -> Result<Value, HostError> + Send + Sync,
{
    fn call(&self, ctx: &HostCallContext, args: Vec<Value>) -> Result<Value, HostError> {
        self(ctx, args)
    }
}

#[derive(Clone)]
pub(crate) struct RegistryEntry {
    pub(crate) capability: Capability,
    pub(crate) arity: u8,
    pub(crate) function: Arc<dyn HostFunction>,
}

/// Named host functions, each guarded by the capability it requires.
#[derive(Default, Clone)]
pub struct HostFunctionRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl HostFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) `name`.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        capability: Capability,
        arity: u8,
        function: F,
    ) where
        F: HostFunction + 'static,
    {
        self.entries.insert(
            name.into(),
            RegistryEntry {
                capability,
                arity,
                function: Arc::new(function),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }
}
