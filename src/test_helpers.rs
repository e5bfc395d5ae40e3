//! Shared test utilities for the archivist test suite.
//!
//! Archive fixtures are small enough to write inline, so instead of a
//! fixtures directory these helpers lay out trees in a [`TempDir`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_source(tmp.path(), "notes", "# Notes\n");
//! write_file(tmp.path(), "notes/log.json", "[]");
//!
//! let source = compliant(&tmp.path().join("notes"));
//! assert_eq!(source.name, "Notes");
//! ```

use std::fs;
use std::path::Path;

pub use tempfile::TempDir;

use crate::compliance::Checker;
use crate::types::{ComplianceVerdict, Source};

// =========================================================================
// Tree writers
// =========================================================================

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
}

/// Create a compliant source at `root/rel`: a README plus one JSON file.
///
/// `rel` may be empty to make `root` itself a source.
pub fn write_source(root: &Path, rel: &str, readme: &str) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("README.md"), readme).unwrap();
    fs::write(dir.join("data.json"), "{}").unwrap();
}

/// A directory with a README but no durable data.
pub fn write_hollow_source(root: &Path, rel: &str, readme: &str) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("README.md"), readme).unwrap();
    fs::write(dir.join("run.sh"), "#!/bin/sh\n").unwrap();
}

// =========================================================================
// Verdict lookups (panic with a clear message on miss)
// =========================================================================

/// Check `path` with the default checker and return its source. Panics if
/// the directory is not compliant.
pub fn compliant(path: &Path) -> Source {
    match Checker::default().check(path) {
        ComplianceVerdict::Compliant(source) => source,
        ComplianceVerdict::NotCompliant { path, reason } => {
            panic!("{} expected compliant, got: {reason}", path.display())
        }
    }
}

/// Directory names of `sources`, in order.
pub fn dir_names(sources: &[Source]) -> Vec<String> {
    sources.iter().map(Source::dir_name).collect()
}

/// Resolved names of `sources`, in order.
pub fn names(sources: &[Source]) -> Vec<&str> {
    sources.iter().map(|s| s.name.as_str()).collect()
}
