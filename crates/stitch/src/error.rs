//! Fatal build errors
//!
//! Anything in here aborts the current build target. Recoverable conditions
//! live in [`crate::diagnostics::Warning`] and only end up here when they are
//! escalated.

use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostics::Warning;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no entry module specified")]
    MissingEntry,

    #[error("no source files specified")]
    NoSources,

    #[error("no output target specified")]
    NoOutput,

    #[error(
        "duplicate declaration of module '{module}' in '{path}' (already declared in '{existing}')"
    )]
    DuplicateDeclaration {
        module: String,
        path: String,
        existing: String,
    },

    #[error("module '{module}' not found{}", required_by_suffix(.required_by))]
    ModuleNotFound {
        module: String,
        required_by: Option<String>,
    },

    #[error("module '{module}' is appended to in '{path}' but never declared")]
    ModuleNotDeclared { module: String, path: String },

    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("invalid standalone pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid source glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("script sandbox is not available: {0}")]
    SandboxUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} (use the force option to continue anyway)")]
    Warning(Warning),
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|parent| format!(" (required by '{parent}')"))
        .unwrap_or_default()
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found_message() {
        let err = BuildError::ModuleNotFound {
            module: "Util".to_owned(),
            required_by: Some("App".to_owned()),
        };
        assert_eq!(
            err.to_string(),
            "module 'Util' not found (required by 'App')"
        );

        let err = BuildError::ModuleNotFound {
            module: "App".to_owned(),
            required_by: None,
        };
        assert_eq!(err.to_string(), "module 'App' not found");
    }

    #[test]
    fn test_cycle_message() {
        let err = BuildError::DependencyCycle {
            cycle: vec!["A".to_owned(), "B".to_owned(), "A".to_owned()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: A -> B -> A");
    }
}
