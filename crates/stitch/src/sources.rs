//! Source discovery
//!
//! Expands the `src` patterns of a target into loaded [`SourceFile`]s. Patterns
//! are applied in order; a pattern starting with `!` removes previously matched
//! files. Paths keep first-seen order and use `/` separators.

use std::{fs, io, path::Path};

use cow_utils::CowUtils;
use glob::{Pattern, glob};
use indexmap::IndexSet;
use log::{debug, trace};

use crate::{
    error::{BuildError, Result},
    module_registry::SourceFile,
};

/// Resolve glob patterns to file paths
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<String>> {
    let mut paths: IndexSet<String> = IndexSet::new();

    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            let matcher = Pattern::new(negated).map_err(|source| BuildError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            paths.retain(|path| !matcher.matches(path));
            continue;
        }

        let entries = glob(pattern).map_err(|source| BuildError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        let mut matched = 0;
        for entry in entries {
            let path = entry.map_err(|err| BuildError::Io {
                path: err.path().to_path_buf(),
                source: io::Error::new(err.error().kind(), err.error().to_string()),
            })?;
            if path.is_file() {
                matched += 1;
                paths.insert(display_path(&path));
            }
        }
        trace!("Pattern '{pattern}' matched {matched} file(s)");
    }

    Ok(paths.into_iter().collect())
}

/// Expand the patterns and read every matched file
pub fn collect_sources(patterns: &[String]) -> Result<Vec<SourceFile>> {
    let sources = expand_patterns(patterns)?
        .into_iter()
        .map(|path| load_source(&path))
        .collect::<Result<Vec<_>>>()?;
    debug!("Collected {} source file(s)", sources.len());
    Ok(sources)
}

/// Read one file, normalizing line endings to `\n`
pub fn load_source(path: &str) -> Result<SourceFile> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.into(),
        source,
    })?;
    let content = content.cow_replace("\r\n", "\n");
    Ok(SourceFile::new(path, content.as_ref()))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().cow_replace('\\', "/").into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn pattern(dir: &TempDir, suffix: &str) -> String {
        format!("{}/{suffix}", display_path(dir.path()))
    }

    #[test]
    fn test_patterns_keep_first_seen_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.js", "");
        write(dir.path(), "a.js", "");
        write(dir.path(), "lib/c.js", "");

        let paths = expand_patterns(&[pattern(&dir, "b.js"), pattern(&dir, "**/*.js")]).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["b.js", "a.js", "c.js"]);
    }

    #[test]
    fn test_negated_pattern_removes_matches() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.js", "");
        write(dir.path(), "app.spec.js", "");

        let paths = expand_patterns(&[
            pattern(&dir, "*.js"),
            format!("!{}", pattern(&dir, "*.spec.js")),
        ])
        .unwrap();
        assert_eq!(paths, vec![pattern(&dir, "app.js")]);
    }

    #[test]
    fn test_crlf_normalized() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.js", "var a;\r\nvar b;\r\n");

        let sources = collect_sources(&[pattern(&dir, "a.js")]).unwrap();
        assert_eq!(&*sources[0].content, "var a;\nvar b;\n");
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            expand_patterns(&["src/***/[".to_owned()]),
            Err(BuildError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_no_matches_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(expand_patterns(&[pattern(&dir, "*.js")]).unwrap().is_empty());
    }
}
