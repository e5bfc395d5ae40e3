//! Shared types produced by the checker and consumed by discovery, output,
//! and the site builder.

use crate::metadata::{FrontMatter, mapping_to_json, scalar_to_string};
use serde::{Serialize, Serializer};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a resolved display field came from, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// An explicit front-matter key.
    FrontMatter,
    /// Inferred from the README text (heading or first paragraph).
    Document,
    /// The directory name, or an empty default.
    Filesystem,
}

/// A compliant directory with its metadata resolved.
///
/// Invariants: `durable_formats ⊆ formats`, `durable_formats` is non-empty,
/// and `readme_path` exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub path: PathBuf,
    pub readme_path: PathBuf,
    pub name: String,
    pub description: String,
    /// Every extension detected, lowercase and dot-prefixed.
    pub formats: Vec<String>,
    pub durable_formats: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub display_order: i64,
    pub has_prebuilt_site: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prebuilt_site_path: Option<PathBuf>,
    #[serde(rename = "metadata", serialize_with = "serialize_front_matter")]
    pub front_matter: FrontMatter,
    #[serde(skip)]
    pub name_provenance: Provenance,
    #[serde(skip)]
    pub description_provenance: Provenance,
}

impl Source {
    /// Final path component, used for alphabetical ordering and dotted lookup.
    pub fn dir_name(&self) -> String {
        dir_name(&self.path)
    }

    /// The curated child listing, if the README declares one.
    pub fn contents(&self) -> Option<Vec<ContentEntry>> {
        ContentEntry::list_from(&self.front_matter)
    }

    /// Formats detected but not on the durable list.
    pub fn other_formats(&self) -> Vec<&str> {
        self.formats
            .iter()
            .filter(|f| !self.durable_formats.contains(f))
            .map(String::as_str)
            .collect()
    }
}

pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn serialize_front_matter<S: Serializer>(fm: &FrontMatter, s: S) -> Result<S::Ok, S::Error> {
    mapping_to_json(fm).serialize(s)
}

/// Why a directory is not a source. The `Display` text is the reported reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NonCompliance {
    #[error("path does not exist")]
    Missing,
    #[error("path is not a directory")]
    NotADirectory,
    #[error("no README found")]
    NoReadme,
    #[error("no durable data formats found")]
    NoDurableFormats,
}

/// Result of checking one directory.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplianceVerdict {
    Compliant(Source),
    NotCompliant {
        path: PathBuf,
        reason: NonCompliance,
    },
}

impl ComplianceVerdict {
    pub fn is_compliant(&self) -> bool {
        matches!(self, Self::Compliant(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Compliant(source) => &source.path,
            Self::NotCompliant { path, .. } => path,
        }
    }

    pub fn reason(&self) -> Option<NonCompliance> {
        match self {
            Self::Compliant(_) => None,
            Self::NotCompliant { reason, .. } => Some(*reason),
        }
    }

    pub fn source(&self) -> Option<&Source> {
        match self {
            Self::Compliant(source) => Some(source),
            Self::NotCompliant { .. } => None,
        }
    }

    pub fn into_source(self) -> Option<Source> {
        match self {
            Self::Compliant(source) => Some(source),
            Self::NotCompliant { .. } => None,
        }
    }
}

/// One entry of a README's `contents` front-matter listing.
///
/// ```yaml
/// contents:
///   - path: photos
///     description: Scanned family albums
///   - letters          # bare path form
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContentEntry {
    /// Parse the `contents` key. `None` when the key is absent or not a list;
    /// list items without a usable path are skipped.
    pub fn list_from(front_matter: &FrontMatter) -> Option<Vec<ContentEntry>> {
        let Value::Sequence(items) = front_matter.get("contents")? else {
            return None;
        };
        let entries = items
            .iter()
            .filter_map(|item| match item {
                Value::Mapping(m) => Some(ContentEntry {
                    path: m.get("path").and_then(scalar_to_string)?,
                    description: m.get("description").and_then(scalar_to_string),
                }),
                other => scalar_to_string(other).map(|path| ContentEntry {
                    path,
                    description: None,
                }),
            })
            .filter(|e| !normalize_relative(&e.path).is_empty())
            .collect();
        Some(entries)
    }
}

/// Normalise a relative child path: strip leading `./` and trailing `/`.
pub fn normalize_relative(path: &str) -> &str {
    let mut p = path.trim();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p.trim_end_matches('/')
}
