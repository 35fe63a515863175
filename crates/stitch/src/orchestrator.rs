//! Build pipeline for one target
//!
//! Sources are analyzed into a fresh registry, the module graph is resolved
//! from the entry module and the output is emitted. Fatal errors abort the
//! target; warnings are collected unless the configuration escalates them.

use std::fmt;

use log::{debug, info, trace};
use regex::Regex;

use crate::{
    config::Config,
    context::BuildContext,
    diagnostics::Warning,
    emitter::{self, BuildOutput, Emitter},
    error::{BuildError, Result},
    extensions::BuildExtension,
    header::{HeaderExtractor, ModuleHeader},
    module_registry::{ModuleRegistry, SourceFile},
    resolver::DependencyResolver,
    sandbox::{self, ScriptSandbox},
};

/// Output of a successful build together with the warnings it passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub output: BuildOutput,
    pub warnings: Vec<Warning>,
}

pub struct Bundler {
    config: Config,
    extensions: Vec<Box<dyn BuildExtension>>,
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("config", &self.config)
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Bundler {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            extensions: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register an extension; extensions run in registration order
    pub fn add_extension(&mut self, extension: Box<dyn BuildExtension>) {
        debug!("Registered build extension '{}'", extension.name());
        self.extensions.push(extension);
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl BuildExtension + 'static) -> Self {
        self.add_extension(Box::new(extension));
        self
    }

    /// Build the configured target from already loaded sources
    pub fn build(&mut self, sources: &[SourceFile]) -> Result<BuildResult> {
        let config = &self.config;
        let entry = config.entry.as_deref().ok_or(BuildError::MissingEntry)?;
        if sources.is_empty() {
            return Err(BuildError::NoSources);
        }
        config.validate_options()?;

        let extractor = HeaderExtractor::new(&config.namespace, &config.declaration_method)?;
        let standalone = config
            .standalone
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| BuildError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
            .transpose()?;
        let mut sandbox = if config.validate && !config.debug {
            Some(sandbox::create(config)?)
        } else {
            None
        };

        info!(
            "Building from entry module '{entry}' with {} source file(s)",
            sources.len()
        );
        let mut context = BuildContext::new(config.force);
        let registry = analyze_sources(
            config,
            sources,
            &extractor,
            standalone.as_ref(),
            &mut context,
            &mut self.extensions,
        )?;

        let resolver = DependencyResolver::new(&registry, &config.exclude);
        let order = resolver.resolve(entry, &mut context.visits)?;
        for record in &order {
            for extension in &mut self.extensions {
                extension.on_visit_module(record)?;
            }
        }

        let mut output = if config.debug {
            BuildOutput::ReferenceList(emitter::reference_list(&registry, &order, &mut context))
        } else {
            let sandbox: Option<&mut dyn ScriptSandbox> = match sandbox.as_mut() {
                Some(sandbox) => Some(sandbox.as_mut()),
                None => None,
            };
            let mut emitter = Emitter::new(config, &extractor, sandbox);
            BuildOutput::Bundle(emitter.emit_bundle(&registry, &order, &mut context)?)
        };
        for extension in &mut self.extensions {
            extension.on_emit(&mut output)?;
        }

        Ok(BuildResult {
            output,
            warnings: context.diagnostics.into_warnings(),
        })
    }
}

/// Extract headers of every file and fill a fresh registry
fn analyze_sources(
    config: &Config,
    sources: &[SourceFile],
    extractor: &HeaderExtractor,
    standalone: Option<&Regex>,
    context: &mut BuildContext,
    extensions: &mut [Box<dyn BuildExtension>],
) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::with_externals(&config.external_modules);

    for file in sources {
        let headers = extractor.extract(&file.content);
        for problem in &headers.problems {
            context.diagnostics.report(Warning::MalformedDeclaration {
                path: file.path.clone(),
                module: problem.module.clone(),
                reason: problem.reason.clone(),
            })?;
        }
        if let Some((declared, appended)) = headers.ambiguity() {
            context.diagnostics.report(Warning::AmbiguousModuleFile {
                path: file.path.clone(),
                declared,
                appended,
            })?;
        }
        for extension in extensions.iter_mut() {
            extension.on_analyze(file, &headers)?;
        }

        if headers.is_empty() {
            if standalone.is_some_and(|pattern| pattern.is_match(&file.path)) {
                registry.add_standalone(file.clone());
            } else {
                trace!("Ignoring '{}' without module headers", file.path);
            }
            continue;
        }
        for header in headers.headers {
            match header {
                ModuleHeader::Declare {
                    name,
                    dependencies,
                    config_trailer,
                } => registry.ingest_declaration(&name, file, dependencies, config_trailer)?,
                ModuleHeader::Append { name } => registry.ingest_append(&name, file),
            }
        }
    }

    debug!(
        "Registry holds {} module(s) and {} standalone file(s)",
        registry.len(),
        registry.standalone().len()
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(entry: &str) -> Config {
        Config {
            entry: Some(entry.to_owned()),
            validate: false,
            ..Config::default()
        }
    }

    fn sources(files: &[(&str, &str)]) -> Vec<SourceFile> {
        files
            .iter()
            .map(|(path, content)| SourceFile::new(*path, *content))
            .collect()
    }

    #[test]
    fn test_fatal_configuration() {
        let files = sources(&[("a.js", "")]);
        assert!(matches!(
            Bundler::new(Config::default()).build(&files),
            Err(BuildError::MissingEntry)
        ));
        assert!(matches!(
            Bundler::new(config("App")).build(&[]),
            Err(BuildError::NoSources)
        ));
    }

    #[test]
    fn test_entry_not_found() {
        let files = sources(&[("util.js", "angular.module('Util', []);")]);
        let err = Bundler::new(config("App")).build(&files).unwrap_err();
        assert_eq!(err.to_string(), "module 'App' not found");
    }

    #[test]
    fn test_duplicate_declaration_aborts() {
        let files = sources(&[
            ("a.js", "angular.module('App', []);"),
            ("b.js", "angular.module('App', []);"),
        ]);
        assert!(matches!(
            Bundler::new(config("App")).build(&files),
            Err(BuildError::DuplicateDeclaration { .. })
        ));
    }

    #[test]
    fn test_standalone_pattern() {
        let files = sources(&[
            ("vendor/polyfill.js", "window.fill = 1;"),
            ("notes.js", "// nothing"),
            ("app.js", "angular.module('App', []).run(go);"),
        ]);
        let config = Config {
            standalone: Some("^vendor/".to_owned()),
            debug: true,
            ..config("App")
        };
        let result = Bundler::new(config).build(&files).unwrap();
        assert_eq!(
            result.output,
            BuildOutput::ReferenceList(vec!["vendor/polyfill.js".to_owned(), "app.js".to_owned()])
        );
    }

    #[test]
    fn test_invalid_standalone_pattern() {
        let config = Config {
            standalone: Some("(".to_owned()),
            ..config("App")
        };
        let files = sources(&[("app.js", "angular.module('App', []);")]);
        assert!(matches!(
            Bundler::new(config).build(&files),
            Err(BuildError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_ambiguous_file_warns() {
        let content = "angular.module('A', []);\nangular.module('B', []);\nangular.module('C').run(x);";
        let files = sources(&[
            ("multi.js", content),
            ("c.js", "angular.module('C', []);"),
        ]);
        let err = Bundler::new(config("A")).build(&files).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Warning(Warning::AmbiguousModuleFile { .. })
        ));

        let forced = Config {
            force: true,
            ..config("A")
        };
        let result = Bundler::new(forced).build(&files).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_malformed_declaration_is_skipped_when_forced() {
        let files = sources(&[
            ("app.js", "angular.module('App', []);\nangular.module('Bad', deps);"),
        ]);
        let forced = Config {
            force: true,
            ..config("App")
        };
        let result = Bundler::new(forced).build(&files).unwrap();
        assert_eq!(
            result.output.as_bundle(),
            Some(
                "(function (module) {\n  angular.module('Bad', deps);\n})(angular.module('App', \
                 []));\n"
            )
        );
        assert!(matches!(
            result.warnings.as_slice(),
            [Warning::MalformedDeclaration { .. }]
        ));
    }

    #[test]
    fn test_extensions_see_every_stage() {
        #[derive(Debug, Default)]
        struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<String>>>);

        impl BuildExtension for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }

            fn on_analyze(
                &mut self,
                file: &SourceFile,
                _headers: &crate::header::ExtractedHeaders,
            ) -> Result<()> {
                self.0.borrow_mut().push(format!("analyze {}", file.path));
                Ok(())
            }

            fn on_visit_module(&mut self, record: &crate::module_registry::ModuleRecord) -> Result<()> {
                self.0.borrow_mut().push(format!("visit {}", record.name));
                Ok(())
            }

            fn on_emit(&mut self, output: &mut BuildOutput) -> Result<()> {
                self.0.borrow_mut().push("emit".to_owned());
                if let BuildOutput::Bundle(text) = output {
                    text.insert_str(0, "'use strict';\n");
                }
                Ok(())
            }
        }

        let log = std::rc::Rc::default();
        let files = sources(&[
            ("app.js", "angular.module('App', ['Util']);"),
            ("util.js", "angular.module('Util', []);"),
        ]);
        let result = Bundler::new(config("App"))
            .with_extension(Recorder(std::rc::Rc::clone(&log)))
            .build(&files)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["analyze app.js", "analyze util.js", "visit Util", "visit App", "emit"]
        );
        assert_eq!(
            result.output.as_bundle(),
            Some("'use strict';\nangular.module('Util', []);\n\nangular.module('App', ['Util']);\n")
        );
    }
}
