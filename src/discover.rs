//! Tree discovery and querying.
//!
//! Walks an archive from its root, one source at a time. At every source the
//! children to visit are decided by the source itself:
//!
//! - **Curated**: the README front-matter has a `contents` list. Exactly the
//!   listed paths are visited, in list order. Compliant siblings that are not
//!   listed are left out. Listed paths that are missing or not compliant are
//!   dropped with a warning.
//! - **Auto-discovered**: no `contents` key. Every immediate subdirectory
//!   that is itself compliant is visited, sorted by directory name.
//!
//! Depth counts source hops: the root is depth 0, its listed or discovered
//! children depth 1, and so on. A root that is not compliant is still
//! descended into, so an umbrella directory with only a README works as a
//! catalogue.
//!
//! Each canonical path is visited at most once, which stops symlink cycles.
//! Filters ([`Query`]) choose what is yielded; they never prune traversal.
//!
//! ```text
//! archive/                 README (no data)      not yielded, descended
//! ├── bookmarks/           compliant             depth 1
//! │   └── 2019/            compliant             depth 2
//! ├── chats/               compliant             depth 1
//! └── scratch/             README, no data       skipped
//! ```

use crate::compliance::{Checker, find_readme};
use crate::metadata::{self, scalar_to_string};
use crate::types::{ComplianceVerdict, ContentEntry, NonCompliance, Source, normalize_relative};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde_yaml_ng::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid field filter '{0}': expected key=pattern")]
    InvalidFilter(String),
    #[error("invalid pattern in field filter '{filter}': {source}")]
    Pattern {
        filter: String,
        source: glob::PatternError,
    },
    #[error("empty segment in source path '{0}'")]
    EmptySegment(String),
    #[error("{}: {reason}", .path.display())]
    NotASource { path: PathBuf, reason: NonCompliance },
    #[error("no source '{segment}' under {}", .parent.display())]
    NotFound { segment: String, parent: PathBuf },
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A `key=pattern` filter over front-matter fields.
///
/// The pattern is a glob (`*`, `?`, `[abc]`) matched case-insensitively
/// against the field's text. List-valued fields match when any element does.
/// Keys absent from the front-matter fall back to the resolved `name`,
/// `description` and `icon`.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    key: String,
    pattern: Pattern,
}

impl FieldFilter {
    pub fn new(key: &str, pattern: &str) -> Result<Self, QueryError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(QueryError::InvalidFilter(format!("{key}={pattern}")));
        }
        let pattern = Pattern::new(pattern.trim()).map_err(|source| QueryError::Pattern {
            filter: format!("{key}={pattern}"),
            source,
        })?;
        Ok(Self {
            key: key.to_string(),
            pattern,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, source: &Source) -> bool {
        match source.front_matter.get(self.key.as_str()) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(scalar_to_string)
                .any(|item| self.matches_text(&item)),
            Some(value) => scalar_to_string(value).is_some_and(|text| self.matches_text(&text)),
            None => match self.key.as_str() {
                "name" => self.matches_text(&source.name),
                "description" => self.matches_text(&source.description),
                "icon" => source.icon.as_deref().is_some_and(|i| self.matches_text(i)),
                _ => false,
            },
        }
    }

    fn matches_text(&self, text: &str) -> bool {
        self.pattern.matches_with(text, MATCH_OPTIONS)
    }
}

impl FromStr for FieldFilter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, pattern) = s
            .split_once('=')
            .ok_or_else(|| QueryError::InvalidFilter(s.to_string()))?;
        if key.trim().is_empty() {
            return Err(QueryError::InvalidFilter(s.to_string()));
        }
        Self::new(key, pattern)
    }
}

/// Traversal limit and yield filters.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Maximum depth in source hops. `Some(0)` yields only the root.
    pub max_depth: Option<usize>,
    /// Case-insensitive substring over resolved name and description.
    pub search: Option<String>,
    /// All must match.
    pub fields: Vec<FieldFilter>,
}

impl Query {
    pub fn matches(&self, source: &Source) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                source.name.to_lowercase().contains(&needle)
                    || source.description.to_lowercase().contains(&needle)
            }
            _ => true,
        };
        search_ok && self.fields.iter().all(|f| f.matches(source))
    }

    /// Whether a node at `depth` may have its children visited.
    pub fn descends_from(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth < max)
    }
}

/// A compliant child as seen from its parent.
#[derive(Debug, Clone)]
pub struct ChildSource {
    /// Path relative to the parent, as listed or as the directory name.
    pub rel_path: String,
    /// Curation note from the parent's `contents` entry.
    pub note: Option<String>,
    pub canonical: PathBuf,
    pub source: Source,
}

/// A child directory that looked like a source but failed the check.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedChild {
    pub rel_path: String,
    pub path: PathBuf,
    pub reason: NonCompliance,
    /// Named in the parent's `contents` list (vs. found by auto-discovery).
    pub curated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Children {
    pub sources: Vec<ChildSource>,
    pub rejected: Vec<RejectedChild>,
}

/// A source with its resolved children, for tree output.
#[derive(Debug, Clone, Serialize)]
pub struct SourceNode {
    #[serde(flatten)]
    pub source: Source,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SourceNode>,
}

/// Walks archive trees with a fixed [`Checker`].
#[derive(Debug, Clone, Default)]
pub struct Walker {
    checker: Checker,
}

impl Walker {
    pub fn new(checker: Checker) -> Self {
        Self { checker }
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    /// Lazily yield every matching source under `root`, depth-first, parents
    /// before children.
    pub fn discover<'a>(&'a self, root: &Path, query: &'a Query) -> Discover<'a> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        if let Some(canonical) = canonical(root) {
            visited.insert(canonical);
            match self.checker.check(root) {
                ComplianceVerdict::Compliant(source) => stack.push((source, 0)),
                ComplianceVerdict::NotCompliant { reason, .. } => {
                    tracing::debug!(root = %root.display(), %reason, "root is not a source; descending anyway");
                    if root.is_dir() && query.descends_from(0) {
                        let contents = readme_contents(root);
                        let children = self.children(root, contents.as_deref(), &visited);
                        push_children(&mut stack, &mut visited, children, 1);
                    }
                }
            }
        }
        Discover {
            walker: self,
            query,
            stack,
            visited,
        }
    }

    /// Resolve `query`'s matches under `root` into a tree.
    ///
    /// Nodes that do not match are kept only when a descendant matches. A
    /// compliant root gives a single tree; an umbrella root gives one tree
    /// per child.
    pub fn tree(&self, root: &Path, query: &Query) -> Vec<SourceNode> {
        let mut visited = HashSet::new();
        let Some(canonical) = canonical(root) else {
            return Vec::new();
        };
        visited.insert(canonical);
        match self.checker.check(root) {
            ComplianceVerdict::Compliant(source) => {
                self.grow(source, 0, query, &mut visited).into_iter().collect()
            }
            ComplianceVerdict::NotCompliant { .. } if root.is_dir() && query.descends_from(0) => {
                let contents = readme_contents(root);
                let children = self.children(root, contents.as_deref(), &visited);
                for child in &children.sources {
                    visited.insert(child.canonical.clone());
                }
                children
                    .sources
                    .into_iter()
                    .filter_map(|c| self.grow(c.source, 1, query, &mut visited))
                    .collect()
            }
            ComplianceVerdict::NotCompliant { .. } => Vec::new(),
        }
    }

    fn grow(
        &self,
        source: Source,
        depth: usize,
        query: &Query,
        visited: &mut HashSet<PathBuf>,
    ) -> Option<SourceNode> {
        let mut children = Vec::new();
        if query.descends_from(depth) {
            let found = self.children(&source.path, source.contents().as_deref(), visited);
            for child in &found.sources {
                visited.insert(child.canonical.clone());
            }
            children = found
                .sources
                .into_iter()
                .filter_map(|c| self.grow(c.source, depth + 1, query, visited))
                .collect();
        }
        (query.matches(&source) || !children.is_empty()).then_some(SourceNode { source, children })
    }

    /// Follow a dotted path of child names (`letters.1990s`) from `root`.
    ///
    /// Each segment is matched against the current node's children only:
    /// first by directory name, then by resolved name (case-insensitive).
    /// Nothing beyond the addressed path is checked.
    pub fn navigate(&self, root: &Path, dotted: &str) -> Result<Source, QueryError> {
        let mut visited = HashSet::new();
        if let Some(canonical) = canonical(root) {
            visited.insert(canonical);
        }
        let mut current_dir = root.to_path_buf();
        let mut current: Option<Source> = self.checker.check(root).into_source();

        for segment in dotted.split('.') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(QueryError::EmptySegment(dotted.to_string()));
            }
            let contents = match &current {
                Some(source) => source.contents(),
                None => readme_contents(&current_dir),
            };
            let mut sources = self
                .children(&current_dir, contents.as_deref(), &visited)
                .sources;
            let lowered = segment.to_lowercase();
            let found = sources
                .iter()
                .position(|c| c.source.dir_name() == segment)
                .or_else(|| {
                    sources
                        .iter()
                        .position(|c| c.source.name.to_lowercase() == lowered)
                });
            let Some(index) = found else {
                return Err(QueryError::NotFound {
                    segment: segment.to_string(),
                    parent: current_dir,
                });
            };
            let child = sources.swap_remove(index);
            visited.insert(child.canonical);
            current_dir = child.source.path.clone();
            current = Some(child.source);
        }

        match current {
            Some(source) => Ok(source),
            None => Err(QueryError::NotASource {
                reason: self
                    .checker
                    .check(&current_dir)
                    .reason()
                    .unwrap_or(NonCompliance::Missing),
                path: current_dir,
            }),
        }
    }

    /// The children of `dir`, excluding any whose canonical path is in `seen`.
    ///
    /// `contents` is the directory's curation list, if it has one.
    pub fn children(
        &self,
        dir: &Path,
        contents: Option<&[ContentEntry]>,
        seen: &HashSet<PathBuf>,
    ) -> Children {
        let mut out = Children::default();
        let mut local: HashSet<PathBuf> = HashSet::new();

        let candidates: Vec<(String, Option<String>, bool)> = match contents {
            Some(entries) => entries
                .iter()
                .map(|e| {
                    (
                        normalize_relative(&e.path).to_string(),
                        e.description.clone(),
                        true,
                    )
                })
                .collect(),
            None => self
                .subdirectories(dir)
                .into_iter()
                .map(|name| (name, None, false))
                .collect(),
        };

        for (rel_path, note, curated) in candidates {
            if !stays_inside(&rel_path) {
                tracing::warn!(
                    parent = %dir.display(),
                    entry = %rel_path,
                    "curated entry points outside its parent directory; skipping"
                );
                continue;
            }
            let path = dir.join(&rel_path);
            match self.checker.check(&path) {
                ComplianceVerdict::Compliant(source) => {
                    let Some(canonical) = canonical(&path) else {
                        continue;
                    };
                    if seen.contains(&canonical) || !local.insert(canonical.clone()) {
                        tracing::debug!(path = %path.display(), "already visited; skipping");
                        continue;
                    }
                    out.sources.push(ChildSource {
                        rel_path,
                        note,
                        canonical,
                        source,
                    });
                }
                ComplianceVerdict::NotCompliant { reason, .. } => {
                    if curated {
                        tracing::warn!(
                            parent = %dir.display(),
                            entry = %rel_path,
                            %reason,
                            "curated entry is not a source; skipping"
                        );
                    } else if reason == NonCompliance::NoReadme {
                        continue;
                    } else {
                        tracing::debug!(path = %path.display(), %reason, "not a source");
                    }
                    out.rejected.push(RejectedChild {
                        rel_path,
                        path,
                        reason,
                        curated,
                    });
                }
            }
        }
        out
    }

    /// Immediate subdirectory names of `dir`, sorted, skip-list applied.
    fn subdirectories(&self, dir: &Path) -> Vec<String> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), %err, "cannot list directory");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir() && !self.checker.skips(&e.path()))
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();
        names.sort();
        names
    }
}

/// Lazy depth-first iterator returned by [`Walker::discover`].
pub struct Discover<'a> {
    walker: &'a Walker,
    query: &'a Query,
    stack: Vec<(Source, usize)>,
    visited: HashSet<PathBuf>,
}

impl Iterator for Discover<'_> {
    type Item = Source;

    fn next(&mut self) -> Option<Source> {
        while let Some((source, depth)) = self.stack.pop() {
            if self.query.descends_from(depth) {
                let children = self.walker.children(
                    &source.path,
                    source.contents().as_deref(),
                    &self.visited,
                );
                push_children(&mut self.stack, &mut self.visited, children, depth + 1);
            }
            if self.query.matches(&source) {
                return Some(source);
            }
        }
        None
    }
}

fn push_children(
    stack: &mut Vec<(Source, usize)>,
    visited: &mut HashSet<PathBuf>,
    children: Children,
    depth: usize,
) {
    for child in children.sources.into_iter().rev() {
        visited.insert(child.canonical);
        stack.push((child.source, depth));
    }
}

/// Whether `rel` names something below its parent: no root, no `..`.
fn stays_inside(rel: &str) -> bool {
    !rel.is_empty()
        && Path::new(rel)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// The curation list of a directory that may not be compliant.
pub fn readme_contents(dir: &Path) -> Option<Vec<ContentEntry>> {
    let readme = find_readme(dir)?;
    let front_matter = metadata::parse_document(&readme)?.front_matter?;
    ContentEntry::list_from(&front_matter)
}

fn canonical(path: &Path) -> Option<PathBuf> {
    match fs::canonicalize(path) {
        Ok(canonical) => Some(canonical),
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "cannot resolve path");
            None
        }
    }
}
