//! Module registry for one build target
//!
//! The ModuleRegistry is the single source of truth for module identity while
//! a target is built. It maps module names to their records, owns the rules
//! for merging declaring and appending files, and remembers which modules are
//! supplied from outside the build. A fresh registry is created per target.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use rustc_hash::FxHasher;

use crate::error::{BuildError, Result};

/// Type alias for FxHasher-based IndexMap
type FxIndexMap<K, V> = IndexMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// A source file as handed over by file discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Identifying path, used in diagnostics and reference-list output
    pub path: String,
    /// Shared reference to the file contents
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything known about one module name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    /// The file declaring the module, always emitted first
    pub declaration: Option<SourceFile>,
    /// Files appending to the module, in discovery order
    pub appended: Vec<SourceFile>,
    /// Required modules in loading order, taken from the declaring file
    pub dependencies: Vec<String>,
    /// Opaque extra declaration arguments
    pub config_trailer: Option<String>,
    /// Supplied outside this build: satisfies requirements, emits nothing
    pub is_external: bool,
}

impl ModuleRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            declaration: None,
            appended: Vec::new(),
            dependencies: Vec::new(),
            config_trailer: None,
            is_external: false,
        }
    }

    /// Declaring file first, then appended files
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.declaration.iter().chain(&self.appended)
    }
}

/// Central registry of modules and standalone files
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: FxIndexMap<String, ModuleRecord>,
    standalone: Vec<SourceFile>,
}

impl ModuleRegistry {
    /// Create a new empty module registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given names already marked external
    pub fn with_externals<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register_external(name.as_ref());
        }
        registry
    }

    /// Mark a module as supplied outside this build
    pub fn register_external(&mut self, name: &str) {
        let record = self
            .modules
            .entry(name.to_owned())
            .or_insert_with(|| ModuleRecord::new(name));
        record.is_external = true;
    }

    /// Register the declaring file of a module
    pub fn ingest_declaration(
        &mut self,
        name: &str,
        file: &SourceFile,
        dependencies: Vec<String>,
        config_trailer: Option<String>,
    ) -> Result<()> {
        let record = self
            .modules
            .entry(name.to_owned())
            .or_insert_with(|| ModuleRecord::new(name));
        if record.is_external {
            debug!(
                "Ignoring declaration of external module '{name}' in '{}'",
                file.path
            );
            return Ok(());
        }
        if let Some(existing) = &record.declaration {
            return Err(BuildError::DuplicateDeclaration {
                module: name.to_owned(),
                path: file.path.clone(),
                existing: existing.path.clone(),
            });
        }

        debug!(
            "Module '{name}' declared in '{}' requiring {:?}",
            file.path, dependencies
        );
        record.appended.retain(|f| f.path != file.path);
        record.declaration = Some(file.clone());
        record.dependencies = dependencies;
        record.config_trailer = config_trailer;
        Ok(())
    }

    /// Register a file appending to a module
    pub fn ingest_append(&mut self, name: &str, file: &SourceFile) {
        let record = self
            .modules
            .entry(name.to_owned())
            .or_insert_with(|| ModuleRecord::new(name));
        if record.is_external {
            debug!(
                "Ignoring append to external module '{name}' in '{}'",
                file.path
            );
            return;
        }
        if record.files().any(|f| f.path == file.path) {
            return;
        }
        debug!("Module '{name}' extended by '{}'", file.path);
        record.appended.push(file.clone());
    }

    /// Register a header-less file that is included anyway
    pub fn add_standalone(&mut self, file: SourceFile) {
        debug!("Standalone file '{}'", file.path);
        self.standalone.push(file);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.modules.get(name).is_some_and(|r| r.is_external)
    }

    pub fn standalone(&self) -> &[SourceFile] {
        &self.standalone
    }

    /// Iterate over all modules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> SourceFile {
        SourceFile::new(path, format!("// {path}"))
    }

    #[test]
    fn test_declare_then_append() {
        let mut registry = ModuleRegistry::new();
        registry.ingest_append("Lib", &file("b.js"));
        registry
            .ingest_declaration("Lib", &file("a.js"), vec!["Dep".to_owned()], None)
            .unwrap();
        registry.ingest_append("Lib", &file("c.js"));

        let record = registry.get("Lib").unwrap();
        let paths: Vec<_> = record.files().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.js", "b.js", "c.js"]);
        assert_eq!(record.dependencies, vec!["Dep"]);
        assert!(!record.is_external);
    }

    #[test]
    fn test_duplicate_declaration_fails() {
        let mut registry = ModuleRegistry::new();
        registry
            .ingest_declaration("App", &file("a.js"), Vec::new(), None)
            .unwrap();
        let err = registry
            .ingest_declaration("App", &file("b.js"), Vec::new(), None)
            .unwrap_err();
        match err {
            BuildError::DuplicateDeclaration {
                module,
                path,
                existing,
            } => {
                assert_eq!(module, "App");
                assert_eq!(path, "b.js");
                assert_eq!(existing, "a.js");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_external_modules_stay_empty() {
        let mut registry = ModuleRegistry::with_externals(["ngRoute"]);
        registry
            .ingest_declaration("ngRoute", &file("route.js"), vec!["x".to_owned()], None)
            .unwrap();
        registry
            .ingest_declaration("ngRoute", &file("route2.js"), Vec::new(), None)
            .unwrap();
        registry.ingest_append("ngRoute", &file("extra.js"));

        let record = registry.get("ngRoute").unwrap();
        assert!(record.is_external);
        assert!(record.declaration.is_none());
        assert!(record.appended.is_empty());
        assert!(record.dependencies.is_empty());
        assert!(registry.is_external("ngRoute"));
    }

    #[test]
    fn test_same_file_appended_once() {
        let mut registry = ModuleRegistry::new();
        registry.ingest_append("Lib", &file("a.js"));
        registry.ingest_append("Lib", &file("a.js"));
        assert_eq!(registry.get("Lib").unwrap().appended.len(), 1);
    }

    #[test]
    fn test_declaring_file_never_appended() {
        let mut registry = ModuleRegistry::new();
        registry.ingest_append("Lib", &file("lib.js"));
        registry
            .ingest_declaration("Lib", &file("lib.js"), Vec::new(), None)
            .unwrap();
        registry.ingest_append("Lib", &file("lib.js"));
        let record = registry.get("Lib").unwrap();
        assert_eq!(record.files().count(), 1);
        assert!(record.appended.is_empty());
    }

    #[test]
    fn test_standalone_keeps_order() {
        let mut registry = ModuleRegistry::new();
        registry.add_standalone(file("z.js"));
        registry.add_standalone(file("a.js"));
        let paths: Vec<_> = registry.standalone().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["z.js", "a.js"]);
        assert!(registry.is_empty());
    }
}
