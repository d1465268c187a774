//! Sandboxed evaluation of small JavaScript-flavoured scripts over JSON values.

mod ast;
mod builtins;
mod host;
mod interp;
mod parser;
mod sandbox;

pub use host::{
    Capability, CapabilitySet, HostCallContext, HostError, HostFunction, HostFunctionRegistry,
};
pub use parser::ParseError;
pub use sandbox::{Bindings, Sandbox, SandboxConfig, SandboxError};

/// Globals that no capability set can unlock.
pub fn denied_globals() -> &'static [&'static str] {
    builtins::DENIED_GLOBALS
}
