//! Per-target build state
//!
//! Everything that changes while one target is traversed and emitted lives
//! here and is dropped with the target. Nothing is shared between targets.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::Diagnostics;

/// Traversal mark of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMark {
    /// Its dependencies are being expanded
    InProgress,
    /// Emitted
    Done,
}

/// Traversal marks of one build. Unmarked modules are unvisited.
#[derive(Debug, Default)]
pub struct VisitState {
    marks: FxHashMap<String, VisitMark>,
}

impl VisitState {
    pub fn mark_of(&self, name: &str) -> Option<VisitMark> {
        self.marks.get(name).copied()
    }

    pub fn set(&mut self, name: &str, mark: VisitMark) {
        self.marks.insert(name.to_owned(), mark);
    }

    pub fn is_done(&self, name: &str) -> bool {
        self.mark_of(name) == Some(VisitMark::Done)
    }
}

#[derive(Debug)]
pub struct BuildContext {
    pub visits: VisitState,
    pub diagnostics: Diagnostics,
    /// Paths already written to the output, so a file registered under
    /// several modules is emitted once
    emitted_files: FxHashSet<String>,
}

impl BuildContext {
    pub fn new(force: bool) -> Self {
        Self {
            visits: VisitState::default(),
            diagnostics: Diagnostics::new(force),
            emitted_files: FxHashSet::default(),
        }
    }

    /// Claim a file for emission. Returns false if it was already emitted.
    pub fn claim_file(&mut self, path: &str) -> bool {
        self.emitted_files.insert(path.to_owned())
    }
}
