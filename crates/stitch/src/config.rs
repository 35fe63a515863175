//! Build configuration
//!
//! A project file (`stitch.toml`) holds one or more named build targets:
//!
//! ```toml
//! [targets.app]
//! entry = "App"
//! src = ["src/**/*.js"]
//! output = "dist/app.js"
//! external-modules = ["ngRoute"]
//! ```
//!
//! Every key is optional and falls back to [`Config::default`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{BuildError, Result};

/// Module API methods the sandbox stubs out by default
pub const DEFAULT_API_METHODS: &[&str] = &[
    "animation",
    "component",
    "config",
    "constant",
    "controller",
    "decorator",
    "directive",
    "factory",
    "filter",
    "provider",
    "run",
    "service",
    "value",
];

/// Options for a single build target
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Name of the module the dependency traversal starts from
    pub entry: Option<String>,
    /// Glob patterns selecting the source files
    pub src: Vec<String>,
    /// Bundle file, or loader script for reference-list builds
    pub output: Option<PathBuf>,
    /// Emit a list of file references instead of a concatenated bundle
    pub debug: bool,
    /// Modules supplied outside this build
    pub external_modules: Vec<String>,
    /// Modules never traversed
    pub exclude: Vec<String>,
    /// Regex over file paths selecting header-less files to include anyway
    pub standalone: Option<String>,
    /// Object exposing the declaration method (`angular`)
    pub namespace: String,
    /// Declaration method name (`module`)
    pub declaration_method: String,
    /// Parameter name of the emitted module closures
    pub module_var: String,
    /// Rename a closure's differently named module parameter instead of warning
    pub rename_module_variable: bool,
    /// One indentation level of emitted closure bodies
    pub indent: String,
    /// Text inserted between emitted blocks
    pub separator: String,
    /// Continue past warnings
    pub force: bool,
    /// Run unwrapped code through the sandbox
    pub validate: bool,
    /// Prefix prepended to every path of a reference-list build
    pub reference_prefix: String,
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: None,
            src: Vec::new(),
            output: None,
            debug: false,
            external_modules: Vec::new(),
            exclude: Vec::new(),
            standalone: None,
            namespace: "angular".to_owned(),
            declaration_method: "module".to_owned(),
            module_var: "module".to_owned(),
            rename_module_variable: false,
            indent: "  ".to_owned(),
            separator: "\n".to_owned(),
            force: false,
            validate: true,
            reference_prefix: String::new(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Reject option values the pipeline cannot work with
    pub fn validate_options(&self) -> Result<()> {
        for (key, value) in [
            ("namespace", &self.namespace),
            ("declaration-method", &self.declaration_method),
            ("module-var", &self.module_var),
        ] {
            if !crate::scanner::is_identifier(value) {
                return Err(BuildError::Config(format!(
                    "{key} must be a JavaScript identifier, got '{value}'"
                )));
            }
        }
        if !self.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(BuildError::Config(
                "indent may only contain spaces and tabs".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SandboxConfig {
    /// Chainable methods of the stubbed module object
    pub api_methods: Vec<String>,
    /// Iterations any single loop may run before validation gives up
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_methods: DEFAULT_API_METHODS
                .iter()
                .map(|method| (*method).to_owned())
                .collect(),
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
        }
    }
}

/// Contents of a project configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub targets: IndexMap<String, Config>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|err| match err {
            BuildError::Config(message) => {
                BuildError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let project: Self =
            toml::from_str(text).map_err(|err| BuildError::Config(err.to_string()))?;
        if project.targets.is_empty() {
            return Err(BuildError::Config("no build targets defined".to_owned()));
        }
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.module_var, "module");
        assert_eq!(config.namespace, "angular");
        assert_eq!(config.indent, "  ");
        assert!(config.validate);
        assert!(!config.force);
        assert!(config.sandbox.api_methods.contains(&"controller".to_owned()));
    }

    #[test]
    fn test_parse_targets_in_order() {
        let project = ProjectConfig::parse(
            r#"
            [targets.release]
            entry = "App"
            src = ["src/**/*.js"]
            output = "dist/app.js"
            external-modules = ["ngRoute"]
            rename-module-variable = true

            [targets.debug]
            entry = "App"
            src = ["src/**/*.js"]
            output = "dist/app.debug.js"
            debug = true
            reference-prefix = "/static/"

            [targets.debug.sandbox]
            loop-iteration-limit = 5000
            "#,
        )
        .unwrap();

        let names: Vec<_> = project.targets.keys().cloned().collect();
        assert_eq!(names, vec!["release", "debug"]);

        let release = &project.targets["release"];
        assert_eq!(release.entry.as_deref(), Some("App"));
        assert_eq!(release.external_modules, vec!["ngRoute"]);
        assert!(release.rename_module_variable);
        assert!(!release.debug);

        let debug = &project.targets["debug"];
        assert!(debug.debug);
        assert_eq!(debug.reference_prefix, "/static/");
        assert_eq!(debug.sandbox.loop_iteration_limit, 5000);
        assert_eq!(debug.sandbox.recursion_limit, 512);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ProjectConfig::parse("[targets.app]\nentyr = \"App\"\n").unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_empty_project_rejected() {
        assert!(ProjectConfig::parse("").is_err());
    }

    #[test]
    fn test_validate_options() {
        assert!(Config::default().validate_options().is_ok());

        let config = Config {
            module_var: "my-module".to_owned(),
            ..Config::default()
        };
        assert!(config.validate_options().is_err());

        let config = Config {
            indent: "--".to_owned(),
            ..Config::default()
        };
        assert!(config.validate_options().is_err());
    }
}
