use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ast::{Expr, Stmt, walk_stmts};
use crate::builtins::{BuiltinFunction, is_denied_global};
use crate::host::{
    Capability, CapabilitySet, HostCallContext, HostFunctionRegistry, current_call_depth,
};
use crate::interp::{Budget, Halt, Interpreter};
use crate::parser::{ParseError, is_ident_continue, is_ident_start, is_reserved_word, parse_script};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("script error: {0}")]
    Script(String),
    #[error("script timed out after {}ms", limit.as_millis())]
    TimedOut { limit: Duration },
    #[error("capability denied: {0}")]
    CapabilityDenied(String),
}

impl From<ParseError> for SandboxError {
    fn from(err: ParseError) -> Self {
        SandboxError::Script(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Statements, loop iterations and calls a single evaluation may perform.
    pub max_steps: u64,
    /// Nesting limit for expressions and blocks.
    pub max_depth: usize,
    /// Approximate size limit for any single value a script builds or stores.
    pub max_value_bytes: usize,
    /// How many evaluations may be nested through host function calls.
    pub max_call_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
            max_depth: 128,
            max_value_bytes: 64 * 1024 * 1024,
            max_call_depth: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Value(Value),
    JsonText(String),
}

/// Named values exposed to a script as globals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert_value(name, value);
        self
    }

    pub fn with_json_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert_json_text(name, text);
        self
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert(name.into(), Binding::Value(value));
    }

    /// The text is parsed as JSON right before the script runs.
    pub fn insert_json_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.insert(name.into(), Binding::JsonText(text.into()));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, binding: Binding) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = binding;
        } else {
            self.entries.push((name, binding));
        }
    }

    fn resolve(self) -> Result<HashMap<String, Value>, SandboxError> {
        let mut globals = HashMap::with_capacity(self.entries.len());
        for (name, binding) in self.entries {
            if !is_valid_binding_name(&name) {
                return Err(SandboxError::Script(format!(
                    "invalid binding name '{name}'"
                )));
            }
            let value = match binding {
                Binding::Value(value) => value,
                Binding::JsonText(text) => serde_json::from_str(&text).map_err(|err| {
                    SandboxError::Script(format!("binding '{name}' is not valid JSON: {err}"))
                })?,
            };
            globals.insert(name, value);
        }
        Ok(globals)
    }
}

fn is_valid_binding_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start)
        && chars.all(is_ident_continue)
        && !is_reserved_word(name)
        && !is_denied_global(name)
}

/// Evaluates untrusted scripts under a time limit and a capability set.
#[derive(Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
    no_host: Arc<HostFunctionRegistry>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            no_host: Arc::new(HostFunctionRegistry::new()),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub async fn evaluate(
        &self,
        bindings: Bindings,
        script: &str,
        capabilities: &CapabilitySet,
        time_limit: Duration,
    ) -> Result<Value, SandboxError> {
        self.evaluate_with_host(
            bindings,
            script,
            capabilities,
            self.no_host.clone(),
            time_limit,
        )
        .await
    }

    /// Like [`Sandbox::evaluate`], with host functions available to the script
    /// as far as `capabilities` allows.
    ///
    /// The script is checked statically before it runs: references to denied
    /// globals or to host functions outside `capabilities` fail with
    /// [`SandboxError::CapabilityDenied`] without executing anything.
    pub async fn evaluate_with_host(
        &self,
        bindings: Bindings,
        script: &str,
        capabilities: &CapabilitySet,
        host: Arc<HostFunctionRegistry>,
        time_limit: Duration,
    ) -> Result<Value, SandboxError> {
        let call_depth = current_call_depth();
        if call_depth > self.config.max_call_depth {
            return Err(SandboxError::Script(format!(
                "nested script calls exceed depth limit of {}",
                self.config.max_call_depth
            )));
        }
        let program = parse_script(script, self.config.max_depth)?;
        check_program(&program, capabilities, &host)?;
        let globals = bindings.resolve()?;

        let token = CancellationToken::new();
        // Cancels the worker when this future is dropped, e.g. by an enclosing
        // evaluation timing out.
        let _cancel_on_drop = token.clone().drop_guard();
        let deadline = Instant::now() + time_limit;
        let runtime = Handle::current();
        let limits = self.config;
        let worker_token = token.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let ctx = HostCallContext::new(worker_token.clone(), deadline, runtime, call_depth);
            let budget = Budget::new(worker_token, deadline, &limits);
            Interpreter::new(globals, &host, &ctx, budget).run(&program)
        });

        match tokio::time::timeout_at(deadline, worker).await {
            Err(_) => {
                token.cancel();
                warn!(
                    "script evaluation timed out limit_ms={}",
                    time_limit.as_millis()
                );
                Err(SandboxError::TimedOut { limit: time_limit })
            }
            Ok(Err(err)) => Err(SandboxError::Script(format!(
                "evaluation worker failed: {err}"
            ))),
            Ok(Ok(Err(Halt::Cancelled))) => {
                warn!(
                    "script evaluation cancelled limit_ms={}",
                    time_limit.as_millis()
                );
                Err(SandboxError::TimedOut { limit: time_limit })
            }
            Ok(Ok(Err(Halt::Script(message)))) => {
                debug!("script evaluation failed: {message}");
                Err(SandboxError::Script(message))
            }
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

fn check_program(
    program: &[Stmt],
    capabilities: &CapabilitySet,
    host: &HostFunctionRegistry,
) -> Result<(), SandboxError> {
    walk_stmts(program, &mut |expr: &Expr, line: u32| match expr {
        Expr::Ident(name) => check_name(name, capabilities, host),
        Expr::Call { callee, args } => {
            let Some(path) = callee.callee_path() else {
                return Err(SandboxError::Script(format!(
                    "line {line}: expression is not callable"
                )));
            };
            let root = path.split('.').next().unwrap_or_default();
            check_name(root, capabilities, host)?;

            let arity = if let Some(builtin) = BuiltinFunction::from_name(&path) {
                builtin.arity()
            } else if let Some(entry) = host.lookup(&path) {
                entry.arity
            } else {
                return Err(SandboxError::Script(format!(
                    "line {line}: '{path}' is not a function"
                )));
            };
            if args.len() != usize::from(arity) {
                return Err(SandboxError::Script(format!(
                    "line {line}: {path} expects {arity} argument(s), got {}",
                    args.len()
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    })
}

fn check_name(
    name: &str,
    capabilities: &CapabilitySet,
    host: &HostFunctionRegistry,
) -> Result<(), SandboxError> {
    if is_denied_global(name) {
        return Err(SandboxError::CapabilityDenied(name.to_string()));
    }
    let registered = host
        .lookup(name)
        .is_some_and(|entry| !capabilities.allows(entry.capability));
    let well_known = Capability::ALL
        .into_iter()
        .any(|capability| capability.function_name() == name && !capabilities.allows(capability));
    if registered || well_known {
        return Err(SandboxError::CapabilityDenied(name.to_string()));
    }
    Ok(())
}
