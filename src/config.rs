//! Archive configuration module.
//!
//! Handles loading, validating, and merging `archivist.toml`. The file is
//! optional and lives at the root of the archive being checked or built;
//! every key has a stock default, so a config file only needs the values it
//! changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [scan]
//! depth = 2                 # Nested data-directory levels scanned for formats
//!
//! [build]
//! output_dir = "site"       # Relative to the archive root
//! bundle = false            # Copy child sites instead of linking to them
//! max_listed_files = 200    # Data files listed per source on the page
//! # timeout_secs = 300      # Abort builds that run longer than this
//!
//! [colors.light]
//! background = "#fbfaf7"
//! surface = "#f1efe9"       # Cards and code blocks
//! text = "#1d1c1a"
//! text_muted = "#6b6862"    # Descriptions, breadcrumbs, file sizes
//! border = "#dedad2"
//! link = "#2f5d8a"
//! link_hover = "#16324f"
//!
//! [colors.dark]
//! background = "#141413"
//! surface = "#1e1d1b"
//! text = "#ecebe8"
//! text_muted = "#9c9992"
//! border = "#33312d"
//! link = "#8db6de"
//! link_hover = "#c4ddf3"
//!
//! [processing]
//! max_processes = 4         # Max parallel sibling builds (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = "archivist.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Archive configuration loaded from `archivist.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Format detection settings.
    pub scan: ScanConfig,
    /// Site build settings.
    pub build: BuildConfig,
    /// Color schemes for light and dark modes.
    pub colors: ColorConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ArchiveConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.depth > MAX_SCAN_DEPTH {
            return Err(ConfigError::Validation(format!(
                "scan.depth must be at most {MAX_SCAN_DEPTH}"
            )));
        }
        let output_dir = self.build.output_dir.trim();
        if output_dir.is_empty() {
            return Err(ConfigError::Validation(
                "build.output_dir must not be empty".into(),
            ));
        }
        if Path::new(output_dir)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::Validation(
                "build.output_dir must stay inside the archive".into(),
            ));
        }
        if self.build.max_listed_files == 0 {
            return Err(ConfigError::Validation(
                "build.max_listed_files must be at least 1".into(),
            ));
        }
        if self.build.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "build.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

const MAX_SCAN_DEPTH: usize = 16;

/// Format detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// How many levels of plain data subdirectories are scanned for file
    /// extensions. Subdirectories with their own README are never scanned.
    pub depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            depth: crate::compliance::DEFAULT_SCAN_DEPTH,
        }
    }
}

/// Site build settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory, relative to the archive root.
    pub output_dir: String,
    /// Copy children's pre-rendered sites into the output instead of linking.
    pub bundle: bool,
    /// Maximum number of data files listed for one source.
    pub max_listed_files: usize,
    /// Wall-clock limit for one build. Absent means no limit.
    pub timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: "site".to_string(),
            bundle: false,
            max_listed_files: 200,
            timeout_secs: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel sibling builds.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Color configuration for light and dark modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    pub light: ColorScheme,
    pub dark: ColorScheme,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            light: ColorScheme::default_light(),
            dark: ColorScheme::default_dark(),
        }
    }
}

/// Individual color scheme (light or dark).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorScheme {
    pub background: String,
    /// Card and code-block background.
    pub surface: String,
    pub text: String,
    /// Secondary text (descriptions, breadcrumbs, file listings).
    pub text_muted: String,
    pub border: String,
    pub link: String,
    pub link_hover: String,
}

impl ColorScheme {
    pub fn default_light() -> Self {
        Self {
            background: "#fbfaf7".to_string(),
            surface: "#f1efe9".to_string(),
            text: "#1d1c1a".to_string(),
            text_muted: "#6b6862".to_string(),
            border: "#dedad2".to_string(),
            link: "#2f5d8a".to_string(),
            link_hover: "#16324f".to_string(),
        }
    }

    pub fn default_dark() -> Self {
        Self {
            background: "#141413".to_string(),
            surface: "#1e1d1b".to_string(),
            text: "#ecebe8".to_string(),
            text_muted: "#9c9992".to_string(),
            border: "#33312d".to_string(),
            link: "#8db6de".to_string(),
            link_hover: "#c4ddf3".to_string(),
        }
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_light()
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer that user overrides are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ArchiveConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `archivist.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no config file.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ArchiveConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ArchiveConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config for the archive rooted at `root`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. When `root` is not a directory the stock
/// defaults are returned; the checker reports the path problem itself.
pub fn load_config(root: &Path) -> Result<ArchiveConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = if root.is_dir() {
        load_raw_config(root)?
    } else {
        None
    };
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `archivist.toml` with all keys and
/// explanations. Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Archivist Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at the root of the archive as archivist.toml.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Format detection
# ---------------------------------------------------------------------------
[scan]
# How many levels of plain data subdirectories to scan for file formats.
# A subdirectory with its own README is a separate source and is never
# scanned as part of its parent.
depth = 2

# ---------------------------------------------------------------------------
# Site build
# ---------------------------------------------------------------------------
[build]
# Where the rendered site is written, relative to the archive root.
output_dir = "site"

# When a child source already has a pre-rendered site/, link to it (false)
# or copy it into this build's output (true).
bundle = false

# Maximum number of raw data files listed for each source.
max_listed_files = 200

# Abort builds that take longer than this many seconds.
# timeout_secs = 300

# ---------------------------------------------------------------------------
# Colors - Light mode (prefers-color-scheme: light)
# ---------------------------------------------------------------------------
[colors.light]
background = "#fbfaf7"
surface = "#f1efe9"       # Cards, code blocks
text = "#1d1c1a"
text_muted = "#6b6862"    # Descriptions, breadcrumbs, file listings
border = "#dedad2"
link = "#2f5d8a"
link_hover = "#16324f"

# ---------------------------------------------------------------------------
# Colors - Dark mode (prefers-color-scheme: dark)
# ---------------------------------------------------------------------------
[colors.dark]
background = "#141413"
surface = "#1e1d1b"
text = "#ecebe8"
text_muted = "#9c9992"
border = "#33312d"
link = "#8db6de"
link_hover = "#c4ddf3"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel sibling builds.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

/// Generate CSS custom properties from color config.
pub fn generate_color_css(colors: &ColorConfig) -> String {
    fn vars(scheme: &ColorScheme, indent: &str) -> String {
        [
            ("bg", &scheme.background),
            ("surface", &scheme.surface),
            ("text", &scheme.text),
            ("text-muted", &scheme.text_muted),
            ("border", &scheme.border),
            ("link", &scheme.link),
            ("link-hover", &scheme.link_hover),
        ]
        .iter()
        .map(|(name, value)| format!("{indent}--color-{name}: {value};\n"))
        .collect()
    }

    format!(
        ":root {{\n{light}}}\n\n@media (prefers-color-scheme: dark) {{\n    :root {{\n{dark}    }}\n}}",
        light = vars(&colors.light, "    "),
        dark = vars(&colors.dark, "        "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ArchiveConfig::default();
        assert_eq!(config.scan.depth, 2);
        assert_eq!(config.build.output_dir, "site");
        assert!(!config.build.bundle);
        assert_eq!(config.build.max_listed_files, 200);
        assert_eq!(config.build.timeout_secs, None);
        assert_eq!(config.colors.light.background, "#fbfaf7");
        assert_eq!(config.colors.dark.background, "#141413");
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[colors.light]
background = "#fafafa"

[build]
bundle = true
"##;
        let config: ArchiveConfig = toml::from_str(toml).unwrap();
        // Overridden values
        assert_eq!(config.colors.light.background, "#fafafa");
        assert!(config.build.bundle);
        // Default values preserved
        assert_eq!(config.colors.light.text, "#1d1c1a");
        assert_eq!(config.build.output_dir, "site");
        assert_eq!(config.scan.depth, 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ArchiveConfig, _> = toml::from_str("[build]\nouptut_dir = \"x\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_overlays_nested_tables() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[colors.dark]\nlink = \"#f00\"\n").unwrap();
        let merged: ArchiveConfig = merge_toml(base, overlay).try_into().unwrap();
        assert_eq!(merged.colors.dark.link, "#f00");
        assert_eq!(merged.colors.dark.text, "#ecebe8");
    }

    #[test]
    fn merge_replaces_non_table_values() {
        let base: toml::Value = toml::from_str("a = 1\nb = [1, 2]\n").unwrap();
        let overlay: toml::Value = toml::from_str("b = [3]\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_config(tmp.path()).unwrap(), ArchiveConfig::default());
    }

    #[test]
    fn load_config_for_missing_root_is_default() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            load_config(&tmp.path().join("absent")).unwrap(),
            ArchiveConfig::default()
        );
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[scan]\ndepth = 4\n\n[build]\noutput_dir = \"public\"\ntimeout_secs = 30\n",
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.scan.depth, 4);
        assert_eq!(config.build.output_dir, "public");
        assert_eq!(config.build.timeout_secs, Some(30));
        assert_eq!(config.build.max_listed_files, 200);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates() {
        for bad in [
            "[build]\noutput_dir = \"\"\n",
            "[build]\noutput_dir = \"../out\"\n",
            "[build]\nmax_listed_files = 0\n",
            "[build]\ntimeout_secs = 0\n",
            "[scan]\ndepth = 99\n",
        ] {
            let tmp = TempDir::new().unwrap();
            fs::write(tmp.path().join(CONFIG_FILE), bad).unwrap();
            assert!(
                matches!(load_config(tmp.path()), Err(ConfigError::Validation(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn stock_config_toml_matches_defaults() {
        let parsed: ArchiveConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(parsed, ArchiveConfig::default());
    }

    // =========================================================================
    // CSS generation tests
    // =========================================================================

    #[test]
    fn generate_css_includes_all_variables() {
        let css = generate_color_css(&ColorConfig::default());
        for var in [
            "--color-bg:",
            "--color-surface:",
            "--color-text:",
            "--color-text-muted:",
            "--color-border:",
            "--color-link:",
            "--color-link-hover:",
        ] {
            assert_eq!(css.matches(var).count(), 2, "{var} in light and dark");
        }
        assert!(css.contains("@media (prefers-color-scheme: dark)"));
    }

    #[test]
    fn generate_css_uses_config_colors() {
        let mut colors = ColorConfig::default();
        colors.light.background = "#f0f0f0".to_string();
        colors.dark.background = "#1a1a1a".to_string();

        let css = generate_color_css(&colors);
        assert!(css.contains("--color-bg: #f0f0f0;"));
        assert!(css.contains("--color-bg: #1a1a1a;"));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_clamped() {
        let config = ProcessingConfig {
            max_processes: Some(100_000),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(
            effective_threads(&ProcessingConfig {
                max_processes: Some(0)
            }),
            1
        );
    }
}
