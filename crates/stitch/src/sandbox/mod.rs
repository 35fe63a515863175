//! Global-leak validation for module code that is not wrapped in a closure
//!
//! Unwrapped code ends up inside a closure in the bundled build but runs at
//! the top level in a debug build. Anything it writes to the global scope
//! therefore behaves differently between the two, so it is executed once in
//! an isolated engine and every new global is reported.

#[cfg(feature = "sandbox")]
mod boa;

use std::fmt;

#[cfg(feature = "sandbox")]
pub use self::boa::BoaSandbox;
use crate::{config::Config, error::Result};

/// How a leaked global looked after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Value,
    /// The code read a global that only exists outside the sandbox
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakedSymbol {
    pub name: String,
    pub kind: SymbolKind,
}

impl fmt::Display for LeakedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Function => write!(f, "function '{}'", self.name),
            SymbolKind::Value => write!(f, "variable '{}'", self.name),
            SymbolKind::Unresolved => write!(f, "undefined reference '{}'", self.name),
        }
    }
}

/// Outcome of running one block of code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxVerdict {
    Clean,
    Leaked(Vec<LeakedSymbol>),
    /// The loop or recursion budget ran out
    TimedOut,
    /// Any other failure (syntax errors, type errors, ...)
    Failed(String),
}

/// An isolated script engine exposing only inert stand-ins for the module API
pub trait ScriptSandbox: fmt::Debug {
    fn run(&mut self, source: &str) -> SandboxVerdict;
}

/// Create the sandbox configured for a build target
#[cfg(feature = "sandbox")]
pub fn create(config: &Config) -> Result<Box<dyn ScriptSandbox>> {
    Ok(Box::new(BoaSandbox::new(
        &config.namespace,
        &config.declaration_method,
        &config.sandbox,
    )))
}

#[cfg(not(feature = "sandbox"))]
pub fn create(_config: &Config) -> Result<Box<dyn ScriptSandbox>> {
    Err(crate::error::BuildError::SandboxUnavailable(
        "stitch was built without the `sandbox` feature; disable validation to build anyway"
            .to_owned(),
    ))
}
