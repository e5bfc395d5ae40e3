//! The durable format allow-list.
//!
//! A directory only counts as a source if it holds at least one file whose
//! extension is in this list. The list is plain static data grouped by
//! category; [`FormatRegistry`] wraps a slice of categories so the checker
//! can be handed a smaller list in tests.
//!
//! | Category | Extensions |
//! |----------|------------|
//! | Structured data | `.db .sqlite .sqlite3 .json .jsonl` |
//! | Documents | `.md .markdown .txt .text .rst` |
//! | Archives | `.zip` |
//! | Images | `.jpg .jpeg .png .webp .gif` |
//! | Tabular / markup | `.csv .tsv .xml .yaml .yml` |
//!
//! Matching is case-insensitive: `PHOTO.JPG` is durable.

use serde::Serialize;

/// A named group of durable extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatCategory {
    pub name: &'static str,
    /// Lowercase, dot-prefixed.
    pub extensions: &'static [&'static str],
}

pub const DURABLE_CATEGORIES: &[FormatCategory] = &[
    FormatCategory {
        name: "Structured data",
        extensions: &[".db", ".sqlite", ".sqlite3", ".json", ".jsonl"],
    },
    FormatCategory {
        name: "Documents",
        extensions: &[".md", ".markdown", ".txt", ".text", ".rst"],
    },
    FormatCategory {
        name: "Archives",
        extensions: &[".zip"],
    },
    FormatCategory {
        name: "Images",
        extensions: &[".jpg", ".jpeg", ".png", ".webp", ".gif"],
    },
    FormatCategory {
        name: "Tabular / markup",
        extensions: &[".csv", ".tsv", ".xml", ".yaml", ".yml"],
    },
];

/// Lookup over a set of [`FormatCategory`] entries.
#[derive(Debug, Clone, Copy)]
pub struct FormatRegistry {
    categories: &'static [FormatCategory],
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new(DURABLE_CATEGORIES)
    }
}

impl FormatRegistry {
    pub fn new(categories: &'static [FormatCategory]) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &'static [FormatCategory] {
        self.categories
    }

    /// Category holding `extension`, accepted with or without the leading dot.
    pub fn category_of(&self, extension: &str) -> Option<&'static FormatCategory> {
        let ext = normalize_extension(extension)?;
        self.categories
            .iter()
            .find(|c| c.extensions.contains(&ext.as_str()))
    }

    pub fn is_durable(&self, extension: &str) -> bool {
        self.category_of(extension).is_some()
    }
}

/// Lowercase and dot-prefix an extension. `None` for an empty input.
pub fn normalize_extension(extension: &str) -> Option<String> {
    let trimmed = extension.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}
