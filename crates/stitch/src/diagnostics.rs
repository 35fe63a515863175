//! Recoverable warnings and the policy deciding whether they abort a build

use log::warn;
use thiserror::Error;

use crate::{
    error::{BuildError, Result},
    sandbox::LeakedSymbol,
};

/// A condition that lets the build continue with a documented fallback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error(
        "'{path}' declares modules {} while also appending to {}; the file's module is ambiguous",
        quoted(.declared),
        quoted(.appended)
    )]
    AmbiguousModuleFile {
        path: String,
        declared: Vec<String>,
        appended: Vec<String>,
    },

    #[error("malformed module declaration in '{path}'{}: {reason}", module_suffix(.module))]
    MalformedDeclaration {
        path: String,
        module: Option<String>,
        reason: String,
    },

    #[error(
        "code in '{path}' (module '{module}') is not wrapped in a closure and leaks into the global scope: {}",
        describe_symbols(.symbols)
    )]
    GlobalLeak {
        path: String,
        module: String,
        symbols: Vec<LeakedSymbol>,
    },

    #[error("validation of '{path}' (module '{module}') exceeded its execution budget")]
    SandboxTimeout { path: String, module: String },

    #[error("validation of '{path}' (module '{module}') failed: {message}")]
    SandboxError {
        path: String,
        module: String,
        message: String,
    },

    #[error(
        "closure in '{path}' receives module '{module}' as '{found}' instead of '{expected}'"
    )]
    ParameterMismatch {
        path: String,
        module: String,
        found: String,
        expected: String,
    },

    #[error("closure in '{path}' is invoked with module '{found}' but the file belongs to '{expected}'")]
    ClosureModuleMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn module_suffix(module: &Option<String>) -> String {
    module
        .as_ref()
        .map(|name| format!(" (module '{name}')"))
        .unwrap_or_default()
}

fn describe_symbols(symbols: &[LeakedSymbol]) -> String {
    symbols
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Warnings collected for one build target
#[derive(Debug, Default)]
pub struct Diagnostics {
    force: bool,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new(force: bool) -> Self {
        Self {
            force,
            warnings: Vec::new(),
        }
    }

    /// Record a warning. Without `force` the warning is escalated to a fatal error.
    pub fn report(&mut self, warning: Warning) -> Result<()> {
        if !self.force {
            return Err(BuildError::Warning(warning));
        }
        warn!("{warning}");
        self.warnings.push(warning);
        Ok(())
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
