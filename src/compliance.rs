//! Compliance checking: is this directory a source?
//!
//! A directory is a source when it has a root-level README and holds at
//! least one file in a durable format. Checks run in a fixed order and the
//! first failure decides the reported reason:
//!
//! 1. the path exists and is a directory
//! 2. `README.md` or `README.txt` sits at its root (exact, case-sensitive)
//! 3. some file in the directory, or in its plain data subdirectories up to
//!    the scan depth, has a durable extension
//!
//! A compliant directory then gets its metadata resolved:
//!
//! ```text
//! name:        front-matter name → front-matter title → # heading → dir name
//! description: front-matter description → first paragraph → ""
//! ```
//!
//! ## What the format scan sees
//!
//! ```text
//! archive/
//! ├── README.md            # excluded (meta file)
//! ├── export.json          # .json
//! ├── raw/
//! │   └── 2019/
//! │       └── dump.csv     # .csv (depth 2)
//! ├── notes/
//! │   ├── README.md        # notes/ is its own source: not scanned
//! │   └── log.json
//! ├── site/                # pre-rendered output: not scanned
//! └── node_modules/        # skip-listed: not scanned
//! ```

use crate::config::CONFIG_FILE;
use crate::formats::{FormatRegistry, normalize_extension};
use crate::manifest::MANIFEST_FILE;
use crate::metadata::{self, Document, FrontMatter, scalar_to_string};
use crate::types::{ComplianceVerdict, NonCompliance, Provenance, Source};
use serde_yaml_ng::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Accepted README names, in lookup order.
pub const README_NAMES: [&str; 2] = ["README.md", "README.txt"];

/// Pre-rendered site directory and its entry file.
pub const SITE_DIR: &str = "site";
pub const SITE_ENTRY: &str = "index.html";

pub const DEFAULT_SCAN_DEPTH: usize = 2;

/// Files that describe the archive rather than being part of its data.
pub const EXCLUDED_FILES: &[&str] = &[
    "README.md",
    "README.txt",
    "CLAUDE.md",
    "CHANGELOG.md",
    ".gitignore",
    ".gitattributes",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    MANIFEST_FILE,
    CONFIG_FILE,
];

const SKIP_DIRECTORIES: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    "env",
    "dist",
    "build",
    "target",
    "site-packages",
    SITE_DIR,
];

/// Directories that are never scanned, traversed, or auto-discovered.
///
/// Dot-directories (`.git`, `.venv`, `.pytest_cache`, ...) are covered by the
/// leading-dot rule.
pub fn should_skip_directory(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".egg-info") || SKIP_DIRECTORIES.contains(&name)
}

/// The README at the root of `dir`, matched by exact file name.
pub fn find_readme(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let present: BTreeSet<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    README_NAMES
        .iter()
        .find(|name| present.contains(**name))
        .map(|name| dir.join(name))
}

/// Decides compliance and resolves [`Source`] records.
#[derive(Debug, Clone)]
pub struct Checker {
    registry: FormatRegistry,
    scan_depth: usize,
    skipped_paths: Vec<PathBuf>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(FormatRegistry::default(), DEFAULT_SCAN_DEPTH)
    }
}

impl Checker {
    pub fn new(registry: FormatRegistry, scan_depth: usize) -> Self {
        Self {
            registry,
            scan_depth,
            skipped_paths: Vec::new(),
        }
    }

    /// Also skip this one directory (the build output directory). Matched by
    /// canonical path, so a same-named directory elsewhere is unaffected.
    pub fn with_skipped_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.skipped_paths.contains(&path) {
            self.skipped_paths.push(path);
        }
        self
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Whether discovery and the format scan should stay out of directory `dir`.
    pub fn skips(&self, dir: &Path) -> bool {
        let skipped_name = dir
            .file_name()
            .is_some_and(|name| should_skip_directory(&name.to_string_lossy()));
        if skipped_name {
            return true;
        }
        if self.skipped_paths.is_empty() {
            return false;
        }
        self.skipped_paths.iter().any(|p| p == dir)
            || fs::canonicalize(dir).is_ok_and(|canonical| self.skipped_paths.contains(&canonical))
    }

    pub fn check(&self, path: &Path) -> ComplianceVerdict {
        let not_compliant = |reason| ComplianceVerdict::NotCompliant {
            path: path.to_path_buf(),
            reason,
        };

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return not_compliant(NonCompliance::Missing),
        };
        if !meta.is_dir() {
            return not_compliant(NonCompliance::NotADirectory);
        }
        let Some(readme_path) = find_readme(path) else {
            return not_compliant(NonCompliance::NoReadme);
        };

        let formats = self.detect_formats(path);
        let durable_formats: Vec<String> = formats
            .iter()
            .filter(|ext| self.registry.is_durable(ext))
            .cloned()
            .collect();
        if durable_formats.is_empty() {
            return not_compliant(NonCompliance::NoDurableFormats);
        }

        let document = metadata::parse_document(&readme_path);
        let front_matter = document
            .as_ref()
            .and_then(|d| d.front_matter.clone())
            .unwrap_or_default();

        let (name, name_provenance) = resolve_name(&front_matter, document.as_ref(), path);
        let (description, description_provenance) =
            resolve_description(&front_matter, document.as_ref());

        let site_entry = path.join(SITE_DIR).join(SITE_ENTRY);
        let has_prebuilt_site = site_entry.is_file();

        ComplianceVerdict::Compliant(Source {
            path: path.to_path_buf(),
            readme_path,
            name,
            description,
            formats,
            durable_formats,
            icon: front_matter
                .get("icon")
                .and_then(scalar_to_string)
                .filter(|s| !s.trim().is_empty()),
            display_order: front_matter.get("order").and_then(order_value).unwrap_or(0),
            has_prebuilt_site,
            prebuilt_site_path: has_prebuilt_site.then_some(site_entry),
            front_matter,
            name_provenance,
            description_provenance,
        })
    }

    /// Sorted, deduplicated extensions of every data file `check` counts.
    pub fn detect_formats(&self, dir: &Path) -> Vec<String> {
        self.data_files(dir)
            .iter()
            .filter_map(|path| path.extension())
            .filter_map(|ext| normalize_extension(&ext.to_string_lossy()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The data files a source owns, in walk order (sorted by name per level).
    pub fn data_files(&self, dir: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(self.scan_depth + 1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.scannable(e));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if EXCLUDED_FILES.contains(&file_name.as_ref()) {
                continue;
            }
            files.push(entry.into_path());
        }
        files
    }

    fn scannable(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        if !entry.file_type().is_dir() {
            return true;
        }
        // A subdirectory with its own README is a separate source.
        !self.skips(entry.path()) && find_readme(entry.path()).is_none()
    }
}

/// Check `path` with the stock allow-list and scan depth.
pub fn check(path: &Path) -> ComplianceVerdict {
    Checker::default().check(path)
}

fn resolve_name(
    front_matter: &FrontMatter,
    document: Option<&Document>,
    path: &Path,
) -> (String, Provenance) {
    let fm_name = front_matter.get("name").and_then(scalar_to_string);
    let fm_title = front_matter.get("title").and_then(scalar_to_string);
    if let Some(name) = metadata::resolve(&[fm_name.as_deref(), fm_title.as_deref()]) {
        return (name, Provenance::FrontMatter);
    }
    if let Some(name) = metadata::resolve(&[document.and_then(|d| d.title.as_deref())]) {
        return (name, Provenance::Document);
    }
    (display_dir_name(path), Provenance::Filesystem)
}

fn resolve_description(
    front_matter: &FrontMatter,
    document: Option<&Document>,
) -> (String, Provenance) {
    let fm_description = front_matter.get("description").and_then(scalar_to_string);
    if let Some(description) = metadata::resolve(&[fm_description.as_deref()]) {
        return (description, Provenance::FrontMatter);
    }
    if let Some(summary) = metadata::resolve(&[document.and_then(|d| d.summary.as_deref())]) {
        return (summary, Provenance::Document);
    }
    (String::new(), Provenance::Filesystem)
}

/// Base name of `path`, resolving `.` and similar through the filesystem.
fn display_dir_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().into_owned();
    }
    fs::canonicalize(path)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// `order:` as an integer. Accepts `3` and `"3"`.
pub(crate) fn order_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FormatCategory;
    use crate::test_helpers::*;
    use pretty_assertions::assert_eq;

    fn reason(path: &Path) -> Option<NonCompliance> {
        Checker::default().check(path).reason()
    }

    // =========================================================================
    // Short-circuit order
    // =========================================================================

    #[test]
    fn missing_path() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(reason(&tmp.path().join("nope")), Some(NonCompliance::Missing));
    }

    #[test]
    fn file_is_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "data.json", "{}");
        assert_eq!(
            reason(&tmp.path().join("data.json")),
            Some(NonCompliance::NotADirectory)
        );
    }

    #[test]
    fn readme_is_checked_before_formats() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "run.sh", "");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoReadme));
    }

    #[test]
    fn readme_alone_is_not_data() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# Empty\n");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoDurableFormats));
    }

    #[test]
    fn readme_name_is_case_sensitive() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "readme.md", "# Lower\n");
        write_file(tmp.path(), "data.json", "{}");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoReadme));
    }

    #[test]
    fn readme_in_subdirectory_does_not_count() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "docs/README.md", "# Docs\n");
        write_file(tmp.path(), "data.json", "{}");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoReadme));
    }

    #[test]
    fn readme_txt_is_accepted() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.txt", "Plain notes.\n");
        write_file(tmp.path(), "data.csv", "a,b\n");
        let source = compliant(tmp.path());
        assert!(source.readme_path.ends_with("README.txt"));
        assert_eq!(source.description, "Plain notes.");
    }

    // =========================================================================
    // Format detection
    // =========================================================================

    #[test]
    fn formats_are_sorted_lowercase_and_split_by_durability() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "PHOTO.JPG", "");
        write_file(tmp.path(), "run.sh", "");
        write_file(tmp.path(), "raw/b.csv", "");
        let source = compliant(tmp.path());
        assert_eq!(source.formats, vec![".csv", ".jpg", ".sh"]);
        assert_eq!(source.durable_formats, vec![".csv", ".jpg"]);
        assert_eq!(source.other_formats(), vec![".sh"]);
    }

    #[test]
    fn data_files_are_sorted_and_exclude_meta() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "b.json", "{}");
        write_file(tmp.path(), "a/z.csv", "");
        write_file(tmp.path(), "LICENSE", "");
        let files: Vec<String> = Checker::default()
            .data_files(tmp.path())
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(files, vec!["LICENSE", "a/z.csv", "b.json"]);
    }

    #[test]
    fn meta_files_are_not_data() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "CHANGELOG.md", "");
        write_file(tmp.path(), "requirements.txt", "");
        write_file(tmp.path(), MANIFEST_FILE, "name: x\n");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoDurableFormats));
    }

    #[test]
    fn scan_depth_is_bounded() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "a/b/c/deep.json", "{}");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoDurableFormats));

        let deeper = Checker::new(FormatRegistry::default(), 3);
        assert!(deeper.check(tmp.path()).is_compliant());
    }

    #[test]
    fn nested_sources_own_their_files() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# Archive\n");
        write_source(tmp.path(), "notes", "# Notes\n");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoDurableFormats));
        assert!(Checker::default().check(&tmp.path().join("notes")).is_compliant());
    }

    #[test]
    fn site_hidden_and_skip_listed_dirs_are_not_scanned() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "site/index.json", "{}");
        write_file(tmp.path(), ".git/objects.json", "{}");
        write_file(tmp.path(), "node_modules/pkg.json", "{}");
        write_file(tmp.path(), "foo.egg-info/PKG.txt", "");
        write_file(tmp.path(), ".hidden.json", "{}");
        assert_eq!(reason(tmp.path()), Some(NonCompliance::NoDurableFormats));
    }

    #[test]
    fn extra_skipped_path() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "out/archive.json", "{}");
        let checker = Checker::default().with_skipped_path(tmp.path().join("out"));
        assert_eq!(
            checker.check(tmp.path()).reason(),
            Some(NonCompliance::NoDurableFormats)
        );
        assert!(checker.skips(&tmp.path().join("out")));
    }

    #[test]
    fn skipped_path_does_not_match_same_name_elsewhere() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "README.md", "# A\n");
        write_file(tmp.path(), "out/archive.json", "{}");
        write_file(tmp.path(), "data/out/rows.csv", "a\n");
        let out = tmp.path().canonicalize().unwrap().join("out");
        let checker = Checker::default().with_skipped_path(out);

        let source = checker.check(tmp.path()).into_source().unwrap();
        assert_eq!(source.formats, vec![".csv"]);
        assert!(!checker.skips(&tmp.path().join("data/out")));
    }

    #[test]
    fn substituted_registry() {
        const ONLY_CSV: &[FormatCategory] = &[FormatCategory {
            name: "Tabular",
            extensions: &[".csv"],
        }];
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "", "# A\n");
        let checker = Checker::new(FormatRegistry::new(ONLY_CSV), 2);
        assert_eq!(
            checker.check(tmp.path()).reason(),
            Some(NonCompliance::NoDurableFormats)
        );
    }

    // =========================================================================
    // Name / description cascade
    // =========================================================================

    #[test]
    fn front_matter_name_beats_heading() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "---\nname: Custom\n---\n# Ignored\n\nBody.\n");
        let source = compliant(&tmp.path().join("x"));
        assert_eq!(source.name, "Custom");
        assert_eq!(source.name_provenance, Provenance::FrontMatter);
        assert_eq!(source.description, "Body.");
        assert_eq!(source.description_provenance, Provenance::Document);
    }

    #[test]
    fn front_matter_title_is_second_choice() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "---\ntitle: Titled\n---\n# Heading\n");
        assert_eq!(compliant(&tmp.path().join("x")).name, "Titled");
    }

    #[test]
    fn heading_beats_directory_name() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "# Heading\n");
        let source = compliant(&tmp.path().join("x"));
        assert_eq!(source.name, "Heading");
        assert_eq!(source.name_provenance, Provenance::Document);
    }

    #[test]
    fn directory_name_is_last_resort() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "bookmarks", "no heading here\n");
        let source = compliant(&tmp.path().join("bookmarks"));
        assert_eq!(source.name, "bookmarks");
        assert_eq!(source.name_provenance, Provenance::Filesystem);
        assert_eq!(source.description, "no heading here");
    }

    #[test]
    fn blank_front_matter_values_fall_through() {
        let tmp = TempDir::new().unwrap();
        write_source(
            tmp.path(),
            "x",
            "---\nname: \"  \"\ndescription: \"\"\n---\n# Real\n",
        );
        let source = compliant(&tmp.path().join("x"));
        assert_eq!(source.name, "Real");
        assert_eq!(source.description, "");
        assert_eq!(source.description_provenance, Provenance::Filesystem);
    }

    #[test]
    fn unreadable_readme_falls_back_to_directory_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("binary");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("README.md"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(dir.join("data.json"), "{}").unwrap();
        let source = compliant(&dir);
        assert_eq!(source.name, "binary");
        assert!(source.front_matter.is_empty());
    }

    #[test]
    fn typed_fields_from_front_matter() {
        let tmp = TempDir::new().unwrap();
        write_source(
            tmp.path(),
            "x",
            "---\nicon: chat\norder: \"4\"\ntags: [a]\n---\n# X\n",
        );
        let source = compliant(&tmp.path().join("x"));
        assert_eq!(source.icon.as_deref(), Some("chat"));
        assert_eq!(source.display_order, 4);
        assert!(source.front_matter.contains_key("tags"));
    }

    #[test]
    fn order_defaults_to_zero() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "---\norder: soon\n---\n");
        assert_eq!(compliant(&tmp.path().join("x")).display_order, 0);
    }

    // =========================================================================
    // Pre-rendered site
    // =========================================================================

    #[test]
    fn prebuilt_site_is_detected() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "# X\n");
        write_file(tmp.path(), "x/site/index.html", "<html></html>");
        let source = compliant(&tmp.path().join("x"));
        assert!(source.has_prebuilt_site);
        assert!(source.prebuilt_site_path.unwrap().ends_with("site/index.html"));
    }

    #[test]
    fn site_dir_without_entry_is_ignored() {
        let tmp = TempDir::new().unwrap();
        write_source(tmp.path(), "x", "# X\n");
        write_file(tmp.path(), "x/site/style.css", "");
        let source = compliant(&tmp.path().join("x"));
        assert!(!source.has_prebuilt_site);
        assert_eq!(source.prebuilt_site_path, None);
    }

    #[test]
    fn skip_list() {
        for name in [".git", ".venv", "node_modules", "__pycache__", "x.egg-info", "site"] {
            assert!(should_skip_directory(name), "{name}");
        }
        for name in ["notes", "sites", "environment"] {
            assert!(!should_skip_directory(name), "{name}");
        }
    }
}
