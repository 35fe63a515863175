//! Build extensions
//!
//! Extensions observe a build at three fixed points and may adjust the final
//! output. They are invoked in registration order.

use log::info;

use crate::{
    emitter::BuildOutput,
    error::Result,
    header::ExtractedHeaders,
    module_registry::{ModuleRecord, SourceFile},
};

/// Hooks into one build target. Every hook defaults to a no-op.
pub trait BuildExtension {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Called for every source file after its headers were extracted
    fn on_analyze(&mut self, _file: &SourceFile, _headers: &ExtractedHeaders) -> Result<()> {
        Ok(())
    }

    /// Called for every module in emission order
    fn on_visit_module(&mut self, _record: &ModuleRecord) -> Result<()> {
        Ok(())
    }

    /// Called once with the finished output
    fn on_emit(&mut self, _output: &mut BuildOutput) -> Result<()> {
        Ok(())
    }
}

/// Counts what went into a build and logs it once the output is ready
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    target: String,
    analyzed_files: usize,
    modules: usize,
    module_files: usize,
    output_size: usize,
}

impl BuildSummary {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn analyzed_files(&self) -> usize {
        self.analyzed_files
    }

    pub fn modules(&self) -> usize {
        self.modules
    }

    pub fn module_files(&self) -> usize {
        self.module_files
    }

    /// Bytes of bundle text, or number of references
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}

impl BuildExtension for BuildSummary {
    fn name(&self) -> &str {
        "summary"
    }

    fn on_analyze(&mut self, _file: &SourceFile, _headers: &ExtractedHeaders) -> Result<()> {
        self.analyzed_files += 1;
        Ok(())
    }

    fn on_visit_module(&mut self, record: &ModuleRecord) -> Result<()> {
        self.modules += 1;
        self.module_files += record.files().count();
        Ok(())
    }

    fn on_emit(&mut self, output: &mut BuildOutput) -> Result<()> {
        match output {
            BuildOutput::Bundle(text) => {
                self.output_size = text.len();
                info!(
                    "Target '{}': {} file(s) analyzed, {} module(s) from {} file(s), {} byte(s) \
                     bundled",
                    self.target, self.analyzed_files, self.modules, self.module_files,
                    self.output_size
                );
            }
            BuildOutput::ReferenceList(paths) => {
                self.output_size = paths.len();
                info!(
                    "Target '{}': {} file(s) analyzed, {} module(s), {} reference(s)",
                    self.target, self.analyzed_files, self.modules, self.output_size
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = BuildSummary::new("app");
        let file = SourceFile::new("a.js", "");
        summary
            .on_analyze(&file, &ExtractedHeaders::default())
            .unwrap();
        summary
            .on_analyze(&file, &ExtractedHeaders::default())
            .unwrap();

        let record = ModuleRecord {
            name: "A".to_owned(),
            declaration: Some(file.clone()),
            appended: vec![SourceFile::new("b.js", "")],
            dependencies: Vec::new(),
            config_trailer: None,
            is_external: false,
        };
        summary.on_visit_module(&record).unwrap();
        summary
            .on_emit(&mut BuildOutput::Bundle("x;\n".to_owned()))
            .unwrap();

        assert_eq!(summary.analyzed_files(), 2);
        assert_eq!(summary.modules(), 1);
        assert_eq!(summary.module_files(), 2);
        assert_eq!(summary.output_size(), 3);
    }
}
