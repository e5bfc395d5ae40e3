//! Recursive site building.
//!
//! Folds an archive tree into one self-contained HTML page. The walk is
//! post-order: every child is built first (siblings in parallel), then the
//! parent renders its own README and metadata around the children's
//! fragments. The root fragment becomes the page.
//!
//! ## Output
//!
//! ```text
//! site/
//! ├── index.html      # the whole tree: nav, sections, inline CSS/JS, JSON data island
//! ├── archive.json    # the same resolved tree as structured data
//! ├── README.md       # front-matter (name, description, generated_at) + summary
//! └── sites/          # bundle mode only: copies of children's pre-rendered sites
//! ```
//!
//! The output directory passes [`Checker::check`] itself: it has a README and
//! a durable file. Raw data files are never copied; they are linked by path
//! relative to the output directory.
//!
//! ## Failure
//!
//! Any child failure aborts the whole build. A directory found by
//! auto-discovery that has a README but fails the check is a failure; a
//! curated entry that fails the check was already dropped by discovery.
//!
//! Everything is rendered in memory and written to a staging directory next
//! to the output, which must pass the checker before it is moved into place.
//! On any error the staging directory (and any output directories this build
//! created) are removed, so a failed build leaves no output behind.
//!
//! ## HTML Generation
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating and
//! `pulldown-cmark` for README bodies.

use crate::compliance::{Checker, SITE_DIR, SITE_ENTRY};
use crate::config::{self, ArchiveConfig, ColorConfig};
use crate::discover::{ChildSource, Walker};
use crate::formats::FormatRegistry;
use crate::manifest::{self, Listing, Manifest, ManifestError, OverrideEntry};
use crate::metadata::{self, mapping_to_json};
use crate::types::{ComplianceVerdict, NonCompliance, Source};
use chrono::{DateTime, SecondsFormat, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html as md_html};
use rayon::prelude::*;
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

pub const INDEX_FILE: &str = "index.html";
pub const DATA_FILE: &str = "archive.json";
pub const README_FILE: &str = "README.md";
/// Subdirectory of the output holding bundled child sites.
pub const BUNDLE_DIR: &str = "sites";

const CSS_STATIC: &str = include_str!("../static/style.css");
const JS: &str = include_str!("../static/archive.js");

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("{0}")]
    Manifest(#[from] ManifestError),
    #[error("{}: {reason}", .path.display())]
    NotASource { path: PathBuf, reason: NonCompliance },
    #[error("child {} is not a source: {reason}", .path.display())]
    ChildNotCompliant { path: PathBuf, reason: NonCompliance },
    #[error("output directory {} would overwrite the archive", .0.display())]
    OutputOverlapsSource(PathBuf),
    #[error("output directory {} holds files this tool did not generate", .0.display())]
    OutputOccupied(PathBuf),
    #[error("generated output {} failed its own check: {reason}", .path.display())]
    SelfCheck { path: PathBuf, reason: NonCompliance },
    #[error("build exceeded its {}s time limit", .0.as_secs())]
    Timeout(Duration),
}

/// Settings for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Relative paths resolve against the archive root.
    pub output_dir: PathBuf,
    pub bundle: bool,
    pub max_listed_files: usize,
    pub timeout: Option<Duration>,
    /// Fixed timestamp for reproducible output. `None` means now.
    pub generated_at: Option<DateTime<Utc>>,
    pub colors: ColorConfig,
}

impl BuildOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.build.output_dir),
            bundle: config.build.bundle,
            max_listed_files: config.build.max_listed_files,
            timeout: config.build.timeout_secs.map(Duration::from_secs),
            generated_at: None,
            colors: config.colors.clone(),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&ArchiveConfig::default())
    }
}

/// The root's rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifact {
    pub payload: String,
    /// Compliant nodes folded into the page.
    pub source_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output_dir: PathBuf,
    /// The written `index.html`.
    pub output_path: PathBuf,
    pub source_count: usize,
    pub generated_at: DateTime<Utc>,
    pub bundled_sites: usize,
}

/// Flat summary of a build for callers that only need success or failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildOutcome {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub source_count: usize,
    pub error: Option<String>,
}

impl From<Result<BuildReport, BuildError>> for BuildOutcome {
    fn from(result: Result<BuildReport, BuildError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                output_path: Some(report.output_path),
                source_count: report.source_count,
                error: None,
            },
            Err(err) => Self {
                success: false,
                output_path: None,
                source_count: 0,
                error: Some(err.to_string()),
            },
        }
    }
}

/// One node of the embedded data island and `archive.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    pub id: String,
    /// Path from the archive root, `/`-separated. Empty for the root.
    pub path: String,
    /// Display name (parent override applied).
    pub name: String,
    /// The source's own name, when a parent override changed the display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub formats: Vec<String>,
    pub durable_formats: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub files: Vec<FileLink>,
    #[serde(skip_serializing_if = "is_zero")]
    pub files_omitted: usize,
    pub children: Vec<NodeData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLink {
    /// Relative to the owning source.
    pub name: String,
    /// Relative to the output directory.
    pub href: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[derive(Serialize)]
struct ArchiveData<'a> {
    name: &'a str,
    description: &'a str,
    generated_at: String,
    source_count: usize,
    root: &'a NodeData,
}

/// A node after folding in its children.
#[derive(Debug)]
struct Folded {
    data: NodeData,
    fragment: String,
    source_count: usize,
    bundles: Vec<Bundle>,
}

/// A child site to copy into the output (bundle mode).
#[derive(Debug, Clone)]
struct Bundle {
    from: PathBuf,
    /// Relative to the output directory.
    to: PathBuf,
}

/// Where a node sits in the tree.
#[derive(Debug, Clone)]
struct Placement {
    id: String,
    path: String,
    depth: usize,
    entry: Option<OverrideEntry>,
    note: Option<String>,
}

impl Placement {
    fn root() -> Self {
        Self {
            id: "n".to_string(),
            path: String::new(),
            depth: 0,
            entry: None,
            note: None,
        }
    }

    fn child(&self, index: usize, child: &ChildSource, manifest: Option<&Manifest>) -> Self {
        let path = if self.path.is_empty() {
            child.rel_path.clone()
        } else {
            format!("{}/{}", self.path, child.rel_path)
        };
        Self {
            id: format!("{}-{index}", self.id),
            path,
            depth: self.depth + 1,
            entry: manifest.and_then(|m| m.entry_for(&child.rel_path)).cloned(),
            note: child.note.clone(),
        }
    }
}

/// Builds archive sites.
#[derive(Debug, Clone)]
pub struct Builder {
    checker: Checker,
    options: BuildOptions,
}

impl Builder {
    pub fn new(checker: Checker, options: BuildOptions) -> Self {
        Self { checker, options }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(
            Checker::new(FormatRegistry::default(), config.scan.depth),
            BuildOptions::from_config(config),
        )
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Render the page for `root` without writing anything.
    pub fn render(&self, root: &Path) -> Result<RenderedArtifact, BuildError> {
        let prepared = self.prepare(root)?;
        Ok(prepared.artifact)
    }

    /// Build `root` into the output directory.
    pub fn build(&self, root: &Path) -> Result<BuildReport, BuildError> {
        let Prepared {
            output_dir,
            folded,
            artifact,
            deadline,
        } = self.prepare(root)?;

        let archive_json = serde_json::to_string_pretty(&archive_data(&folded, &artifact))?;
        let readme = render_readme(&folded.data, &artifact)?;

        let mut staging = Staging::create(&output_dir)?;
        fs::write(staging.dir.join(INDEX_FILE), &artifact.payload)?;
        fs::write(staging.dir.join(DATA_FILE), archive_json + "\n")?;
        fs::write(staging.dir.join(README_FILE), readme)?;
        for bundle in &folded.bundles {
            check_deadline(deadline, self.options.timeout)?;
            copy_dir_recursive(&bundle.from, &staging.dir.join(&bundle.to))?;
        }

        if let ComplianceVerdict::NotCompliant { reason, .. } = self.checker.check(&staging.dir) {
            return Err(BuildError::SelfCheck {
                path: output_dir,
                reason,
            });
        }
        check_deadline(deadline, self.options.timeout)?;
        staging.commit(&output_dir)?;

        tracing::info!(
            output = %output_dir.display(),
            sources = folded.source_count,
            "site built"
        );
        Ok(BuildReport {
            output_path: output_dir.join(INDEX_FILE),
            output_dir,
            source_count: artifact.source_count,
            generated_at: artifact.generated_at,
            bundled_sites: folded.bundles.len(),
        })
    }

    fn prepare(&self, root: &Path) -> Result<Prepared, BuildError> {
        let started = Instant::now();
        let deadline = self.options.timeout.map(|t| started + t);

        let root = fs::canonicalize(root).map_err(|_| BuildError::NotASource {
            path: root.to_path_buf(),
            reason: NonCompliance::Missing,
        })?;
        let output_dir = resolve_output(&root, &self.options.output_dir)?;
        if root.starts_with(&output_dir) {
            return Err(BuildError::OutputOverlapsSource(output_dir));
        }
        ensure_output_is_ours(&output_dir)?;

        let walker = Walker::new(self.checker.clone().with_skipped_path(output_dir.clone()));

        let source = match walker.checker().check(&root) {
            ComplianceVerdict::Compliant(source) => source,
            ComplianceVerdict::NotCompliant { path, reason } => {
                return Err(BuildError::NotASource { path, reason });
            }
        };

        let folder = Folder {
            walker: &walker,
            options: &self.options,
            output_dir: &output_dir,
            deadline,
        };
        let mut ancestors = HashSet::new();
        ancestors.insert(root.clone());
        let folded = folder.fold(source, Placement::root(), &ancestors)?;
        check_deadline(deadline, self.options.timeout)?;

        let generated_at = self.options.generated_at.unwrap_or_else(Utc::now);
        let payload = render_page(&folded, &self.options.colors, generated_at)?;
        let artifact = RenderedArtifact {
            payload,
            source_count: folded.source_count,
            generated_at,
        };
        Ok(Prepared {
            output_dir,
            folded,
            artifact,
            deadline,
        })
    }
}

struct Prepared {
    output_dir: PathBuf,
    folded: Folded,
    artifact: RenderedArtifact,
    deadline: Option<Instant>,
}

struct Folder<'a> {
    walker: &'a Walker,
    options: &'a BuildOptions,
    output_dir: &'a Path,
    deadline: Option<Instant>,
}

impl Folder<'_> {
    fn fold(
        &self,
        mut source: Source,
        placement: Placement,
        ancestors: &HashSet<PathBuf>,
    ) -> Result<Folded, BuildError> {
        check_deadline(self.deadline, self.options.timeout)?;
        tracing::debug!(path = %source.path.display(), "building");

        let manifest = manifest::load(&source.path)?;
        if let Some(manifest) = &manifest {
            manifest.fill_defaults(&mut source);
        }

        let children = self
            .walker
            .children(&source.path, source.contents().as_deref(), ancestors);
        if let Some(rejected) = children.rejected.iter().find(|r| !r.curated) {
            return Err(BuildError::ChildNotCompliant {
                path: rejected.path.clone(),
                reason: rejected.reason,
            });
        }
        if let Some(manifest) = &manifest {
            for entry in &manifest.sources {
                if !children.sources.iter().any(|c| entry.matches(&c.rel_path)) {
                    tracing::warn!(
                        parent = %source.path.display(),
                        entry = %entry.child_path,
                        "override entry matches no listed source; ignoring"
                    );
                }
            }
        }

        let mut built: Vec<Folded> = children
            .sources
            .into_par_iter()
            .enumerate()
            .map(|(index, child)| {
                let placement = placement.child(index, &child, manifest.as_ref());
                let mut ancestors = ancestors.clone();
                ancestors.insert(child.canonical.clone());
                self.fold(child.source, placement, &ancestors)
            })
            .collect::<Result<_, _>>()?;
        built.sort_by_key(|c| c.data.order);

        let listing = Listing::resolve(&source, placement.entry.as_ref());
        let mut bundles = Vec::new();
        let site = if placement.depth == 0 {
            None
        } else {
            source.prebuilt_site_path.as_ref().map(|entry| {
                if self.options.bundle {
                    let to = Path::new(BUNDLE_DIR).join(contained(&placement.path));
                    let link = href(&to.join(SITE_ENTRY));
                    bundles.push(Bundle {
                        from: source.path.join(SITE_DIR),
                        to,
                    });
                    link
                } else {
                    href(&relative_path(self.output_dir, entry))
                }
            })
        };

        let all_files = self.walker.checker().data_files(&source.path);
        let files_omitted = all_files.len().saturating_sub(self.options.max_listed_files);
        let files = all_files
            .iter()
            .take(self.options.max_listed_files)
            .map(|path| FileLink {
                name: href(path.strip_prefix(&source.path).unwrap_or(path.as_path())),
                href: href(&relative_path(self.output_dir, path)),
            })
            .collect();

        let link_base = href(&relative_path(self.output_dir, &source.path));
        let body_html = metadata::parse_document(&source.readme_path)
            .map(|doc| readme_to_html(&doc.body, &link_base))
            .unwrap_or_default();

        let mut source_count = 1;
        let mut fragments = Vec::with_capacity(built.len());
        let mut child_data = Vec::with_capacity(built.len());
        for child in built {
            source_count += child.source_count;
            bundles.extend(child.bundles);
            fragments.push(child.fragment);
            child_data.push(child.data);
        }

        let data = NodeData {
            id: placement.id,
            path: placement.path,
            source_name: (listing.name != source.name).then(|| source.name.clone()),
            name: listing.name,
            description: source.description.clone(),
            icon: listing.icon,
            order: listing.display_order,
            note: placement.note,
            formats: source.formats.clone(),
            durable_formats: source.durable_formats.clone(),
            metadata: mapping_to_json(&source.front_matter),
            site,
            files,
            files_omitted,
            children: child_data,
        };
        let fragment = render_section(&data, placement.depth, &body_html, &fragments).into_string();

        Ok(Folded {
            data,
            fragment,
            source_count,
            bundles,
        })
    }
}

fn check_deadline(deadline: Option<Instant>, timeout: Option<Duration>) -> Result<(), BuildError> {
    match (deadline, timeout) {
        (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
            Err(BuildError::Timeout(timeout))
        }
        _ => Ok(()),
    }
}

fn archive_data<'a>(folded: &'a Folded, artifact: &RenderedArtifact) -> ArchiveData<'a> {
    ArchiveData {
        name: &folded.data.name,
        description: &folded.data.description,
        generated_at: timestamp(artifact.generated_at),
        source_count: artifact.source_count,
        root: &folded.data,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Output directory handling
// ============================================================================

/// Absolute form of the output directory, resolving symlinks in the part
/// that already exists.
fn resolve_output(root: &Path, output: &Path) -> std::io::Result<PathBuf> {
    let joined = if output.is_absolute() {
        output.to_path_buf()
    } else {
        root.join(output)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = fs::canonicalize(existing)?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Refuse to build into a directory whose README was not generated here.
fn ensure_output_is_ours(output_dir: &Path) -> Result<(), BuildError> {
    if !output_dir.exists() {
        return Ok(());
    }
    if !output_dir.is_dir() {
        return Err(BuildError::OutputOccupied(output_dir.to_path_buf()));
    }
    let readme = output_dir.join(README_FILE);
    if !readme.exists() {
        return Ok(());
    }
    let generated = metadata::parse_document(&readme)
        .is_some_and(|doc| doc.field("generated_at").is_some());
    if generated {
        Ok(())
    } else {
        Err(BuildError::OutputOccupied(output_dir.to_path_buf()))
    }
}

/// Highest ancestor of `path` (inclusive) that does not exist yet.
fn topmost_missing(path: &Path) -> Option<PathBuf> {
    let mut top = None;
    let mut current = Some(path);
    while let Some(p) = current {
        if p.exists() {
            break;
        }
        top = Some(p.to_path_buf());
        current = p.parent();
    }
    top
}

/// Sibling directory the build is written into before it is moved into
/// place. Removed on drop unless committed.
struct Staging {
    dir: PathBuf,
    created_top: Option<PathBuf>,
    committed: bool,
}

impl Staging {
    fn create(output_dir: &Path) -> Result<Self, BuildError> {
        let Some(name) = output_dir.file_name() else {
            return Err(BuildError::OutputOverlapsSource(output_dir.to_path_buf()));
        };
        let dir = output_dir.with_file_name(format!(".{}.partial", name.to_string_lossy()));
        let created_top = topmost_missing(output_dir);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            created_top,
            committed: false,
        })
    }

    fn commit(&mut self, output_dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(output_dir)?;
        let bundled = self.dir.join(BUNDLE_DIR).exists();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let target = output_dir.join(entry.file_name());
            if target.is_dir() && !target.is_symlink() {
                fs::remove_dir_all(&target)?;
            }
            fs::rename(entry.path(), &target)?;
        }
        let stale = output_dir.join(BUNDLE_DIR);
        if !bundled && stale.is_dir() && !stale.is_symlink() {
            fs::remove_dir_all(&stale)?;
        }
        fs::remove_dir(&self.dir)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), %err, "could not remove staging directory");
        }
        if let Some(top) = &self.created_top
            && top.exists()
        {
            if let Err(err) = fs::remove_dir_all(top) {
                tracing::warn!(dir = %top.display(), %err, "could not remove partial output");
            }
        }
    }
}

/// Copy a pre-rendered site. Symlinked directories are not followed.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.path().is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ============================================================================
// Paths and links
// ============================================================================

/// Path from directory `from_dir` to `to`. Both must be absolute.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// The plain components of a curated path, so it cannot climb out of the
/// directory it is joined onto.
fn contained(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// A relative path as a URL: `/`-separated and percent-encoded.
pub fn href(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let mut out = String::with_capacity(joined.len());
    for byte in joined.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

// ============================================================================
// Rendering
// ============================================================================

/// Emoji for an icon keyword. Unknown keywords get a default glyph; values
/// that are not plain words (an emoji, say) are shown as-is.
pub fn icon_glyph(icon: Option<&str>) -> String {
    const DEFAULT: &str = "📁";
    let Some(icon) = icon.map(str::trim).filter(|i| !i.is_empty()) else {
        return DEFAULT.to_string();
    };
    let glyph = match icon.to_lowercase().as_str() {
        "chat" => "💬",
        "bookmark" => "🔖",
        "database" => "🗄️",
        "photo" => "📷",
        "document" => "📄",
        "code" => "💻",
        "music" => "🎵",
        "video" => "🎬",
        "mail" => "✉️",
        "calendar" => "📅",
        "archive" => "📦",
        _ if icon.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => DEFAULT,
        _ => icon,
    };
    glyph.to_string()
}

/// Render a README body for a page that does not sit in the README's
/// directory. Relative link and image targets are prefixed with `link_base`
/// (the URL from the page to that directory). Raw HTML is shown as text.
pub fn readme_to_html(markdown: &str, link_base: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: rebase_url(dest_url, link_base),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: rebase_url(dest_url, link_base),
            title,
            id,
        }),
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

fn rebase_url<'a>(dest: CowStr<'a>, base: &str) -> CowStr<'a> {
    if base.is_empty() || !is_relative_url(&dest) {
        return dest;
    }
    let rest = dest.trim_start_matches("./");
    CowStr::from(format!("{}/{rest}", base.trim_end_matches('/')))
}

/// Whether `url` is a path relative to the document: no scheme, not
/// rooted, not a bare fragment or query.
fn is_relative_url(url: &str) -> bool {
    if url.is_empty() || url.starts_with(['/', '#', '?']) {
        return false;
    }
    let scheme = url.split_once(':').map(|(scheme, _)| scheme);
    !scheme.is_some_and(|s| {
        s.starts_with(|c: char| c.is_ascii_alphabetic())
            && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// JSON safe to place inside a `<script>` element.
fn json_island(json: &str) -> String {
    json.replace('<', "\\u003c")
}

fn render_section(data: &NodeData, depth: usize, body_html: &str, children: &[String]) -> Markup {
    html! {
        section.source id=(data.id) data-depth=(depth) data-path=(data.path) {
            header.source-header {
                h2 {
                    span.icon aria-hidden="true" { (icon_glyph(data.icon.as_deref())) }
                    " "
                    (data.name)
                }
                @if let Some(own) = &data.source_name {
                    p.own-name { "Source name: " (own) }
                }
                @if !data.description.is_empty() {
                    p.description { (data.description) }
                }
                @if let Some(note) = &data.note {
                    p.note { (note) }
                }
                ul.formats {
                    @for format in &data.durable_formats {
                        li { (format) }
                    }
                }
                @if let Some(site) = &data.site {
                    a.site-link href=(site) { "Open pre-rendered site" }
                }
            }
            @if !body_html.is_empty() {
                details.readme open[depth == 0] {
                    summary { "README" }
                    article.readme-body { (PreEscaped(body_html)) }
                }
            }
            @if !data.files.is_empty() {
                details.files {
                    summary { "Files (" (data.files.len() + data.files_omitted) ")" }
                    ul {
                        @for file in &data.files {
                            li { a href=(file.href) { (file.name) } }
                        }
                    }
                    @if data.files_omitted > 0 {
                        p.truncated { "… and " (data.files_omitted) " more" }
                    }
                }
            }
            @if !children.is_empty() {
                div.children {
                    @for child in children {
                        (PreEscaped(child))
                    }
                }
            }
        }
    }
}

fn render_nav(data: &NodeData) -> Markup {
    html! {
        li data-id=(data.id) {
            a href={ "#" (data.id) } {
                span.icon aria-hidden="true" { (icon_glyph(data.icon.as_deref())) }
                " "
                (data.name)
            }
            @if !data.children.is_empty() {
                ul {
                    @for child in &data.children {
                        (render_nav(child))
                    }
                }
            }
        }
    }
}

fn render_page(
    folded: &Folded,
    colors: &ColorConfig,
    generated_at: DateTime<Utc>,
) -> Result<String, BuildError> {
    let root = &folded.data;
    let css = format!("{}\n\n{}", config::generate_color_css(colors), CSS_STATIC);
    let json = serde_json::to_string(&ArchiveData {
        name: &root.name,
        description: &root.description,
        generated_at: timestamp(generated_at),
        source_count: folded.source_count,
        root,
    })?;
    let stamp = timestamp(generated_at);

    let page = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                meta name="generator" content="archivist";
                title { (root.name) }
                style { (PreEscaped(css)) }
            }
            body {
                header.site-header {
                    h1 {
                        span.icon aria-hidden="true" { (icon_glyph(root.icon.as_deref())) }
                        " "
                        (root.name)
                    }
                    @if !root.description.is_empty() {
                        p.description { (root.description) }
                    }
                    p.meta {
                        (folded.source_count) " sources · generated "
                        time datetime=(stamp) { (stamp) }
                    }
                    input.filter type="search" placeholder="Filter sources" aria-label="Filter sources";
                }
                div.layout {
                    nav.tree aria-label="Sources" {
                        ul { (render_nav(root)) }
                    }
                    main {
                        (PreEscaped(&folded.fragment))
                    }
                }
                script type="application/json" id="archive-data" { (PreEscaped(json_island(&json))) }
                script { (PreEscaped(JS)) }
            }
        }
    };
    Ok(page.into_string())
}

/// The generated README: front-matter plus a short human summary.
fn render_readme(root: &NodeData, artifact: &RenderedArtifact) -> Result<String, BuildError> {
    let mut front_matter = Mapping::new();
    front_matter.insert("name".into(), Value::String(root.name.clone()));
    front_matter.insert(
        "description".into(),
        Value::String(root.description.clone()),
    );
    front_matter.insert(
        "generated_at".into(),
        Value::String(timestamp(artifact.generated_at)),
    );

    let mut body = format!("# {}\n\n", root.name);
    if !root.description.is_empty() {
        body.push_str(&root.description);
        body.push_str("\n\n");
    }
    let _ = write!(
        body,
        "Generated by archivist from {} source{}.\n\n\
         - `{INDEX_FILE}`: the whole archive as one self-contained page\n\
         - `{DATA_FILE}`: the same tree as structured data\n",
        artifact.source_count,
        if artifact.source_count == 1 { "" } else { "s" },
    );
    Ok(metadata::join_front_matter(&front_matter, &body)?)
}

// ============================================================================
// Tests
// ============================================================================
