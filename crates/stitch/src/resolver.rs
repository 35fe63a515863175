//! Dependency resolution
//!
//! Depth-first traversal from the entry module. Dependencies are expanded in
//! their declared order before the module itself is emitted, which makes the
//! order deterministic for identical inputs. Every module carries a
//! three-state mark so shared dependencies are emitted once and a re-entry
//! into a module whose dependencies are still being expanded is reported as
//! a cycle.

use log::{debug, trace};
use rustc_hash::FxHashSet;

use crate::{
    context::{VisitMark, VisitState},
    error::{BuildError, Result},
    module_registry::{ModuleRecord, ModuleRegistry},
};

#[derive(Debug)]
pub struct DependencyResolver<'a> {
    registry: &'a ModuleRegistry,
    excluded: FxHashSet<&'a str>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a ModuleRegistry, excluded: &'a [String]) -> Self {
        Self {
            registry,
            excluded: excluded.iter().map(String::as_str).collect(),
        }
    }

    /// Modules to emit, dependencies before dependents. External and excluded
    /// modules are skipped but still satisfy requirements.
    pub fn resolve(&self, entry: &str, visits: &mut VisitState) -> Result<Vec<&'a ModuleRecord>> {
        let mut order = Vec::new();
        let mut path = Vec::new();
        self.visit(entry, None, visits, &mut path, &mut order)?;
        debug!(
            "Resolved {} module(s) from entry '{entry}': {:?}",
            order.len(),
            order.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()
        );
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        required_by: Option<&str>,
        visits: &mut VisitState,
        path: &mut Vec<&'a str>,
        order: &mut Vec<&'a ModuleRecord>,
    ) -> Result<()> {
        if self.excluded.contains(name) {
            trace!("Skipping excluded module '{name}'");
            return Ok(());
        }
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| BuildError::ModuleNotFound {
                module: name.to_owned(),
                required_by: required_by.map(str::to_owned),
            })?;
        if record.is_external {
            trace!("Skipping external module '{name}'");
            return Ok(());
        }

        match visits.mark_of(name) {
            Some(VisitMark::Done) => return Ok(()),
            Some(VisitMark::InProgress) => {
                let start = path.iter().position(|m| *m == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|m| (*m).to_owned()).collect();
                cycle.push(name.to_owned());
                return Err(BuildError::DependencyCycle { cycle });
            }
            None => {}
        }

        if record.declaration.is_none() {
            return Err(BuildError::ModuleNotDeclared {
                module: name.to_owned(),
                path: record
                    .appended
                    .first()
                    .map(|f| f.path.clone())
                    .unwrap_or_default(),
            });
        }

        visits.set(name, VisitMark::InProgress);
        path.push(record.name.as_str());
        for dependency in &record.dependencies {
            self.visit(dependency, Some(record.name.as_str()), visits, path, order)?;
        }
        path.pop();
        visits.set(name, VisitMark::Done);
        order.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::module_registry::SourceFile;

    fn registry(modules: &[(&str, &[&str])]) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for (name, deps) in modules {
            let file = SourceFile::new(format!("{name}.js"), "");
            registry
                .ingest_declaration(
                    name,
                    &file,
                    deps.iter().map(|d| (*d).to_owned()).collect(),
                    None,
                )
                .unwrap();
        }
        registry
    }

    fn resolve(registry: &ModuleRegistry, entry: &str, excluded: &[String]) -> Result<Vec<String>> {
        let resolver = DependencyResolver::new(registry, excluded);
        let mut visits = VisitState::default();
        Ok(resolver
            .resolve(entry, &mut visits)?
            .into_iter()
            .map(|r| r.name.clone())
            .collect())
    }

    #[test]
    fn test_diamond_emits_shared_dependency_once() {
        let registry = registry(&[
            ("App", &["A", "B"]),
            ("A", &["C"]),
            ("B", &["C"]),
            ("C", &[]),
        ]);
        assert_eq!(resolve(&registry, "App", &[]).unwrap(), vec!["C", "A", "B", "App"]);
    }

    #[test]
    fn test_declared_order_breaks_ties() {
        let registry = registry(&[("App", &["Z", "A", "M"]), ("A", &[]), ("M", &[]), ("Z", &[])]);
        assert_eq!(resolve(&registry, "App", &[]).unwrap(), vec!["Z", "A", "M", "App"]);
    }

    #[test]
    fn test_unreachable_modules_not_emitted() {
        let registry = registry(&[("App", &[]), ("Unused", &[])]);
        assert_eq!(resolve(&registry, "App", &[]).unwrap(), vec!["App"]);
    }

    #[test]
    fn test_missing_entry() {
        let registry = registry(&[("App", &[])]);
        let err = resolve(&registry, "Main", &[]).unwrap_err();
        assert_eq!(err.to_string(), "module 'Main' not found");
    }

    #[test]
    fn test_missing_dependency_names_parent() {
        let registry = registry(&[("App", &["Util"])]);
        let err = resolve(&registry, "App", &[]).unwrap_err();
        assert_eq!(err.to_string(), "module 'Util' not found (required by 'App')");
    }

    #[test]
    fn test_external_and_excluded_satisfy_requirements() {
        let mut registry = registry(&[("App", &["ngRoute", "Legacy", "Util"]), ("Util", &[])]);
        registry.register_external("ngRoute");
        let excluded = vec!["Legacy".to_owned()];
        assert_eq!(resolve(&registry, "App", &excluded).unwrap(), vec!["Util", "App"]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let registry = registry(&[("App", &["A"]), ("A", &["B"]), ("B", &["A"])]);
        match resolve(&registry, "App", &[]).unwrap_err() {
            BuildError::DependencyCycle { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry(&[("App", &["App"])]);
        assert!(matches!(
            resolve(&registry, "App", &[]),
            Err(BuildError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_appended_but_undeclared_module() {
        let mut registry = registry(&[("App", &["Lib"])]);
        registry.ingest_append("Lib", &SourceFile::new("lib.extra.js", ""));
        match resolve(&registry, "App", &[]).unwrap_err() {
            BuildError::ModuleNotDeclared { module, path } => {
                assert_eq!(module, "Lib");
                assert_eq!(path, "lib.extra.js");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
