//! Output assembly
//!
//! A bundle is the standalone files in discovery order followed by one block
//! per resolved module. A module with code becomes a closure receiving its own
//! declaration:
//!
//! ```js
//! (function (module) {
//!   module.controller('Main', MainController);
//! })(angular.module('App', ['Util']));
//! ```
//!
//! A module without any code becomes the bare declaration call. Reference-list
//! builds skip all of that and only list the files in the same order.

use log::{debug, trace};

use crate::{
    config::Config,
    context::BuildContext,
    error::Result,
    header::HeaderExtractor,
    module_registry::{ModuleRecord, ModuleRegistry},
    sandbox::ScriptSandbox,
    scanner::{is_blank, reindent},
    transform::BlockTransformer,
};

/// The result of a build target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutput {
    /// Concatenated source text
    Bundle(String),
    /// File paths in loading order
    ReferenceList(Vec<String>),
}

impl BuildOutput {
    pub fn as_bundle(&self) -> Option<&str> {
        match self {
            Self::Bundle(text) => Some(text),
            Self::ReferenceList(_) => None,
        }
    }

    pub fn as_references(&self) -> Option<&[String]> {
        match self {
            Self::Bundle(_) => None,
            Self::ReferenceList(paths) => Some(paths),
        }
    }
}

#[derive(Debug)]
pub struct Emitter<'a> {
    config: &'a Config,
    extractor: &'a HeaderExtractor,
    transformer: BlockTransformer<'a>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        config: &'a Config,
        extractor: &'a HeaderExtractor,
        sandbox: Option<&'a mut dyn ScriptSandbox>,
    ) -> Self {
        Self {
            config,
            extractor,
            transformer: BlockTransformer::new(
                extractor,
                &config.module_var,
                config.rename_module_variable,
                sandbox,
            ),
        }
    }

    /// Concatenate standalone files and module blocks
    pub fn emit_bundle(
        &mut self,
        registry: &ModuleRegistry,
        order: &[&ModuleRecord],
        context: &mut BuildContext,
    ) -> Result<String> {
        let mut pieces = Vec::new();
        for file in registry.standalone() {
            if context.claim_file(&file.path) {
                trace!("Emitting standalone file '{}'", file.path);
                pieces.push(format!("{}\n", file.content.trim_end()));
            }
        }
        for record in order {
            pieces.extend(self.module_block(record, context)?);
        }
        debug!("Bundle assembled from {} block(s)", pieces.len());
        Ok(pieces.join(&self.config.separator))
    }

    /// Closure or bare declaration for one module. A module whose declaring
    /// file was already emitted under another module is only referenced, so its
    /// registrations are not wiped by a second declaration.
    fn module_block(
        &mut self,
        record: &ModuleRecord,
        context: &mut BuildContext,
    ) -> Result<Option<String>> {
        let mut blocks = Vec::new();
        let mut declared_here = true;
        for file in record.files() {
            if !context.claim_file(&file.path) {
                debug!(
                    "Skipping '{}' for module '{}', already emitted",
                    file.path, record.name
                );
                if record
                    .declaration
                    .as_ref()
                    .is_some_and(|declaration| declaration.path == file.path)
                {
                    declared_here = false;
                }
                continue;
            }
            let result = self
                .transformer
                .transform(&record.name, file, &mut context.diagnostics)?;
            trace!("'{}' transformed as {:?}", file.path, result.status);
            let text = strip_blank_lines(&result.text);
            if !is_blank(text) {
                blocks.push(reindent(text, &self.config.indent));
            }
        }

        let invocation = if declared_here {
            self.extractor.render_declaration(
                &record.name,
                &record.dependencies,
                record.config_trailer.as_deref(),
            )
        } else if blocks.is_empty() {
            debug!(
                "Module '{}' was declared by an earlier block, nothing left to emit",
                record.name
            );
            return Ok(None);
        } else {
            self.extractor.render_reference(&record.name)
        };
        if blocks.is_empty() {
            return Ok(Some(format!("{invocation};\n")));
        }
        Ok(Some(format!(
            "(function ({}) {{\n{}\n}})({invocation});\n",
            self.config.module_var,
            blocks.join("\n\n")
        )))
    }
}

/// Paths of the files a bundle would contain, in the same order
pub fn reference_list(
    registry: &ModuleRegistry,
    order: &[&ModuleRecord],
    context: &mut BuildContext,
) -> Vec<String> {
    let files = registry
        .standalone()
        .iter()
        .chain(order.iter().flat_map(|record| record.files()));
    files
        .filter(|file| context.claim_file(&file.path))
        .map(|file| file.path.clone())
        .collect()
}

/// Loader script including every referenced file through `document.write`
pub fn render_loader_script(paths: &[String], prefix: &str) -> String {
    paths
        .iter()
        .map(|path| {
            let src = format!("{prefix}{path}").replace('\\', "/").replace('\'', "\\'");
            format!("document.write('<script src=\"{src}\"></script>');\n")
        })
        .collect()
}

/// Drop leading blank lines and trailing whitespace, keeping the indentation
/// of the first line
fn strip_blank_lines(text: &str) -> &str {
    let text = text.trim_end();
    let first_line = text
        .split_inclusive('\n')
        .take_while(|line| line.trim().is_empty())
        .map(str::len)
        .sum::<usize>();
    &text[first_line..]
}
