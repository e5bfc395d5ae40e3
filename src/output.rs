//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every source leads
//! with its resolved name; the directory it lives in is secondary context on
//! an indented `Source:` line. The output reads as an inventory of the
//! archive while still pointing back at the filesystem.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! notes/: compliant
//!     Name: Notes (README text)
//!     Description: Daily notes, one file per day.
//!     Durable formats: .json .md
//!     Other formats: .sh
//! ```
//!
//! ## Query (`tree`)
//!
//! ```text
//! 001 Family Archive
//!     Source: ./
//!     001 Notes
//!         Source: notes/
//!         Formats: .json
//!     002 Photos
//!         Source: photos/
//!         Formats: .jpg .png
//!
//! 3 sources
//! ```
//!
//! ## Build
//!
//! ```text
//! Built 3 sources → site/index.html
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::discover::SourceNode;
use crate::formats::FormatRegistry;
use crate::generate::BuildOutcome;
use crate::types::{ComplianceVerdict, Provenance, Source};
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

/// `path` relative to `root` with a trailing slash; `./` for the root itself.
fn display_dir(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "./".to_string(),
        Ok(rel) => format!("{}/", rel.display()),
        Err(_) => format!("{}/", path.display()),
    }
}

fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::FrontMatter => "front-matter",
        Provenance::Document => "README text",
        Provenance::Filesystem => "directory name",
    }
}

fn join_formats(formats: &[impl AsRef<str>]) -> String {
    formats
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

fn source_count_line(count: usize) -> String {
    match count {
        1 => "1 source".to_string(),
        n => format!("{n} sources"),
    }
}

// ============================================================================
// check
// ============================================================================

/// One line per verdict; `verbose` adds the resolved metadata of a
/// compliant source.
pub fn format_check(verdict: &ComplianceVerdict, verbose: bool) -> Vec<String> {
    let source = match verdict {
        ComplianceVerdict::NotCompliant { path, reason } => {
            return vec![format!("{}: not compliant: {reason}", path.display())];
        }
        ComplianceVerdict::Compliant(source) => source,
    };

    let mut lines = vec![format!("{}: compliant", source.path.display())];
    if !verbose {
        return lines;
    }
    lines.push(format!(
        "    Name: {} ({})",
        source.name,
        provenance_label(source.name_provenance)
    ));
    if !source.description.is_empty() {
        lines.push(format!(
            "    Description: {}",
            truncate_desc(&source.description, 72)
        ));
    }
    if let Some(readme) = source.readme_path.file_name() {
        lines.push(format!("    README: {}", readme.to_string_lossy()));
    }
    if let Some(icon) = &source.icon {
        lines.push(format!("    Icon: {icon}"));
    }
    lines.push(format!(
        "    Durable formats: {}",
        join_formats(&source.durable_formats)
    ));
    let other = source.other_formats();
    if !other.is_empty() {
        lines.push(format!("    Other formats: {}", join_formats(&other)));
    }
    if let Some(contents) = source.contents() {
        let listed: Vec<&str> = contents.iter().map(|e| e.path.as_str()).collect();
        lines.push(format!("    Contents: {}", listed.join(", ")));
    }
    if source.has_prebuilt_site {
        lines.push("    Pre-rendered site: site/index.html".to_string());
    }
    lines
}

pub fn print_check(verdict: &ComplianceVerdict, verbose: bool) {
    for line in format_check(verdict, verbose) {
        println!("{}", line);
    }
}

// ============================================================================
// query
// ============================================================================

/// Flat listing in discovery order.
///
/// ```text
/// Notes
///     Source: notes/
///     Daily notes, one file per day.
///     Formats: .json
/// ```
pub fn format_query_list(sources: &[Source], root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for source in sources {
        lines.push(source.name.clone());
        lines.push(format!("    Source: {}", display_dir(&source.path, root)));
        if !source.description.is_empty() {
            lines.push(format!("    {}", truncate_desc(&source.description, 60)));
        }
        lines.push(format!(
            "    Formats: {}",
            join_formats(&source.durable_formats)
        ));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(source_count_line(sources.len()));
    lines
}

/// Indented tree with positional indices per sibling level.
pub fn format_query_tree(nodes: &[SourceNode], root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let count = walk_tree(nodes, root, 0, &mut lines);
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(source_count_line(count));
    lines
}

fn walk_tree(nodes: &[SourceNode], root: &Path, depth: usize, lines: &mut Vec<String>) -> usize {
    let mut count = 0;
    for (i, node) in nodes.iter().enumerate() {
        let base = indent(depth);
        let source = &node.source;
        lines.push(format!("{}{} {}", base, format_index(i + 1), source.name));
        lines.push(format!("{}    Source: {}", base, display_dir(&source.path, root)));
        lines.push(format!(
            "{}    Formats: {}",
            base,
            join_formats(&source.durable_formats)
        ));
        count += 1 + walk_tree(&node.children, root, depth + 1, lines);
    }
    count
}

pub fn format_query_json<T: serde::Serialize + ?Sized>(
    value: &T,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// build
// ============================================================================

pub fn format_build(outcome: &BuildOutcome) -> Vec<String> {
    match (&outcome.output_path, &outcome.error) {
        (Some(path), None) if outcome.success => vec![format!(
            "Built {} \u{2192} {}",
            source_count_line(outcome.source_count),
            path.display()
        )],
        (_, Some(error)) => vec![format!("Build failed: {error}")],
        _ => vec!["Build failed".to_string()],
    }
}

pub fn print_build(outcome: &BuildOutcome) {
    for line in format_build(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// formats
// ============================================================================

/// The durable allow-list, one category per header.
pub fn format_formats(registry: &FormatRegistry) -> Vec<String> {
    let mut lines = Vec::new();
    for category in registry.categories() {
        lines.push(category.name.to_string());
        lines.push(format!("    {}", category.extensions.join(" ")));
    }
    lines
}

pub fn print_formats(registry: &FormatRegistry) {
    for line in format_formats(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
