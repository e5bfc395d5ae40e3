//! Parent-side overrides: the optional `manifest.yaml` side file.
//!
//! A directory may carry a `manifest.yaml` next to its README. It never
//! participates in compliance or in a source's own metadata resolution; it
//! is loaded separately and laid over the result afterwards.
//!
//! ```yaml
//! name: Family Archive          # fills in only if the README gave no name
//! description: Letters and photos
//! icon: archive
//! sources:
//!   - letters                   # bare path: listed, no overrides
//!   - path: photos/
//!     name: Photographs         # display name in this parent's listing
//!     icon: photo
//!     order: -1                 # sorts before order-0 siblings
//! ```
//!
//! ## Rules
//!
//! - No file means no overrides (`Ok(None)`).
//! - A file that exists must decode to a mapping. A list, a scalar, an empty
//!   file or a YAML syntax error is a [`ManifestError`], never ignored.
//! - `sources` entries change how a child is *listed by this parent*: its
//!   display name, icon and sort order. The child's own [`Source`] is never
//!   modified, so building that child standalone shows its own identity.
//! - The directory's own `name`/`description`/`icon` only fill fields whose
//!   resolution fell back to the filesystem default.

use crate::types::{Provenance, Source, normalize_relative};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },
    #[error("invalid manifest {}: expected a mapping", .0.display())]
    NotAMapping(PathBuf),
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),
}

/// Contents of a directory's override side file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<OverrideEntry>,
}

/// Overrides for one child, as seen from its parent.
///
/// Serialized as a bare path string when no override is set, otherwise as a
/// `{path, name, icon, order}` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct OverrideEntry {
    pub child_path: String,
    pub display_order: Option<i64>,
    pub name: Option<String>,
    pub icon: Option<String>,
}

impl OverrideEntry {
    pub fn bare(child_path: impl Into<String>) -> Self {
        Self {
            child_path: child_path.into(),
            display_order: None,
            name: None,
            icon: None,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.display_order.is_none() && self.name.is_none() && self.icon.is_none()
    }

    /// Whether this entry addresses the child at `rel` (normalised paths).
    pub fn matches(&self, rel: &str) -> bool {
        normalize_relative(&self.child_path) == normalize_relative(rel)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(String),
    Detailed {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<i64>,
    },
}

impl From<RawEntry> for OverrideEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Bare(path) => OverrideEntry::bare(path),
            RawEntry::Detailed {
                path,
                name,
                icon,
                order,
            } => OverrideEntry {
                child_path: path,
                display_order: order,
                name,
                icon,
            },
        }
    }
}

impl From<OverrideEntry> for RawEntry {
    fn from(entry: OverrideEntry) -> Self {
        if entry.is_bare() {
            return RawEntry::Bare(entry.child_path);
        }
        RawEntry::Detailed {
            path: entry.child_path,
            name: entry.name,
            icon: entry.icon,
            order: entry.display_order,
        }
    }
}

impl Manifest {
    /// The override entry for the child at relative path `rel`.
    pub fn entry_for(&self, rel: &str) -> Option<&OverrideEntry> {
        self.sources.iter().find(|e| e.matches(rel))
    }

    /// Fill `source`'s fields that resolved to the filesystem default.
    ///
    /// Only used on the directory that owns this manifest.
    pub fn fill_defaults(&self, source: &mut Source) {
        if source.name_provenance == Provenance::Filesystem
            && let Some(name) = non_blank(self.name.as_deref())
        {
            source.name = name;
        }
        if source.description_provenance == Provenance::Filesystem
            && let Some(description) = non_blank(self.description.as_deref())
        {
            source.description = description;
        }
        if source.icon.is_none() {
            source.icon = non_blank(self.icon.as_deref());
        }
    }
}

/// How a parent lists one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub icon: Option<String>,
    pub display_order: i64,
}

impl Listing {
    /// The child's own fields, with any parent override laid on top.
    pub fn resolve(child: &Source, entry: Option<&OverrideEntry>) -> Self {
        let entry_name = entry.and_then(|e| non_blank(e.name.as_deref()));
        let entry_icon = entry.and_then(|e| non_blank(e.icon.as_deref()));
        Self {
            name: entry_name.unwrap_or_else(|| child.name.clone()),
            icon: entry_icon.or_else(|| child.icon.clone()),
            display_order: entry
                .and_then(|e| e.display_order)
                .unwrap_or(child.display_order),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Load `dir/manifest.yaml`. `Ok(None)` when the file is absent.
pub fn load(dir: &Path) -> Result<Option<Manifest>, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    parse(&content, &path).map(Some)
}

fn parse(content: &str, path: &Path) -> Result<Manifest, ManifestError> {
    let value: Value = serde_yaml_ng::from_str(content).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if !value.is_mapping() {
        return Err(ManifestError::NotAMapping(path.to_path_buf()));
    }
    serde_yaml_ng::from_value(value).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `manifest` to `dir/manifest.yaml`, returning the file path.
pub fn save(manifest: &Manifest, dir: &Path) -> Result<PathBuf, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    let content = serde_yaml_ng::to_string(manifest)?;
    fs::write(&path, content)?;
    Ok(path)
}
