//! README parsing: front-matter, title, and summary.
//!
//! A README may open with a YAML front-matter block:
//!
//! ```text
//! ---
//! name: Bookmarks
//! description: Every link I saved since 2009
//! tags: [web, personal]
//! ---
//! # Bookmark Archive
//!
//! Exported from three browsers and deduplicated.
//! ```
//!
//! ## Front-matter rules
//!
//! - The opening `---` line must be the very first line of the file. A `---`
//!   anywhere else is ordinary text.
//! - The block closes at the next line that is exactly `---`.
//! - The content in between must decode to a YAML mapping.
//!
//! Any violation (no closing line, invalid YAML, a list or scalar instead of a
//! mapping, an empty block) means the document has no front-matter and the
//! body is the *whole original text*. Parsing never drops content.
//!
//! ## Title and summary
//!
//! - **Title**: the first `# ` heading in the body.
//! - **Summary**: the first paragraph of non-heading lines, joined with single
//!   spaces and cut at [`MAX_SUMMARY_CHARS`] characters. A blank line or a
//!   heading ends it.
//!
//! ## Resolution priority
//!
//! Display fields are resolved with [`resolve`], which takes candidates in
//! priority order and returns the first non-empty one. The compliance checker
//! uses it for the name (`front-matter name` → `front-matter title` → heading
//! → directory name) and the description (`front-matter description` →
//! summary).

use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

/// Open-ended front-matter keys, in document order.
pub type FrontMatter = Mapping;

pub const FRONT_MATTER_DELIMITER: &str = "---";

pub const MAX_SUMMARY_CHARS: usize = 500;

/// A parsed README.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
    pub title: Option<String>,
    pub summary: Option<String>,
}

impl Document {
    /// Look up a front-matter key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.front_matter.as_ref().and_then(|fm| fm.get(key))
    }

    /// A front-matter key rendered as text, if it is a scalar.
    pub fn field_str(&self, key: &str) -> Option<String> {
        self.field(key).and_then(scalar_to_string)
    }
}

/// Split a leading front-matter block from `text`.
///
/// Returns `(None, text)` unchanged whenever the block is absent or invalid.
pub fn split_front_matter(text: &str) -> (Option<FrontMatter>, &str) {
    let mut lines = text.split_inclusive('\n');
    let Some(opening) = lines.next() else {
        return (None, text);
    };
    if strip_line_ending(opening) != FRONT_MATTER_DELIMITER {
        return (None, text);
    }

    let mut offset = opening.len();
    for line in lines {
        if strip_line_ending(line) == FRONT_MATTER_DELIMITER {
            let yaml = &text[opening.len()..offset];
            let body = &text[offset + line.len()..];
            return match serde_yaml_ng::from_str::<Value>(yaml) {
                Ok(Value::Mapping(mapping)) => (Some(mapping), body),
                _ => (None, text),
            };
        }
        offset += line.len();
    }

    (None, text)
}

/// Inverse of [`split_front_matter`]: prefix `body` with a front-matter block.
pub fn join_front_matter(
    front_matter: &FrontMatter,
    body: &str,
) -> Result<String, serde_yaml_ng::Error> {
    let yaml = serde_yaml_ng::to_string(front_matter)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Parse README text into a [`Document`].
pub fn parse_text(text: &str) -> Document {
    let (front_matter, body) = split_front_matter(text);

    let mut title = None;
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut summary_done = false;

    for line in body.lines() {
        let stripped = line.trim();

        if let Some(heading) = stripped.strip_prefix("# ") {
            if title.is_none() {
                let heading = heading.trim();
                if !heading.is_empty() {
                    title = Some(heading.to_string());
                }
            }
            if !summary_lines.is_empty() {
                summary_done = true;
            }
        } else if stripped.starts_with('#') {
            if !summary_lines.is_empty() {
                summary_done = true;
            }
        } else if stripped.is_empty() {
            if !summary_lines.is_empty() {
                summary_done = true;
            }
        } else if !summary_done {
            summary_lines.push(stripped);
        }

        if summary_done && title.is_some() {
            break;
        }
    }

    let summary = if summary_lines.is_empty() {
        None
    } else {
        Some(
            summary_lines
                .join(" ")
                .chars()
                .take(MAX_SUMMARY_CHARS)
                .collect(),
        )
    };

    Document {
        front_matter,
        body: body.to_string(),
        title,
        summary,
    }
}

/// Read and parse a README. `None` if it cannot be read or is not UTF-8.
pub fn parse_document(path: &Path) -> Option<Document> {
    match std::fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Some(parse_text(&text)),
            Err(_) => {
                tracing::debug!(path = %path.display(), "README is not valid UTF-8");
                None
            }
        },
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "README is unreadable");
            None
        }
    }
}

/// Resolve a metadata field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value.
///
/// ```text
/// name:        resolve(&[fm_name, fm_title, heading, dir_name])
/// description: resolve(&[fm_description, summary])
/// ```
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Text form of a YAML scalar. Sequences, mappings and null yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Convert YAML into JSON for embedding. Non-string keys are stringified.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => serde_json::Value::Array(items.iter().map(yaml_to_json).collect()),
        Value::Mapping(mapping) => serde_json::Value::Object(mapping_to_json(mapping)),
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

pub fn mapping_to_json(mapping: &Mapping) -> serde_json::Map<String, serde_json::Value> {
    mapping
        .iter()
        .map(|(k, v)| {
            let key = scalar_to_string(k).unwrap_or_else(|| {
                serde_yaml_ng::to_string(k)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            });
            (key, yaml_to_json(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn mapping(yaml: &str) -> FrontMatter {
        match serde_yaml_ng::from_str::<Value>(yaml).unwrap() {
            Value::Mapping(m) => m,
            other => panic!("not a mapping: {other:?}"),
        }
    }

    // =========================================================================
    // split_front_matter() tests
    // =========================================================================

    #[test]
    fn no_front_matter() {
        let (fm, body) = split_front_matter("# Title\n\nContent here.");
        assert!(fm.is_none());
        assert_eq!(body, "# Title\n\nContent here.");
    }

    #[test]
    fn yaml_front_matter() {
        let text = "---\ntitle: Hello\ndate: 2024-01-15\n---\n# Title\n\nContent.";
        let (fm, body) = split_front_matter(text);
        let fm = fm.unwrap();
        assert_eq!(fm.get("title").and_then(Value::as_str), Some("Hello"));
        assert_eq!(fm.get("date").and_then(Value::as_str), Some("2024-01-15"));
        assert_eq!(body, "# Title\n\nContent.");
    }

    #[test]
    fn crlf_delimiters_are_recognised() {
        let text = "---\r\nname: Win\r\n---\r\nBody\r\n";
        let (fm, body) = split_front_matter(text);
        assert_eq!(fm.unwrap().get("name").and_then(Value::as_str), Some("Win"));
        assert_eq!(body, "Body\r\n");
    }

    #[test]
    fn empty_block_keeps_original_text() {
        let text = "---\n---\n# Title";
        let (fm, body) = split_front_matter(text);
        assert!(fm.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn unterminated_block_keeps_original_text() {
        let text = "---\ntitle: Hello\n# No closing delimiter";
        let (fm, body) = split_front_matter(text);
        assert!(fm.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn invalid_yaml_keeps_original_text() {
        let text = "---\ntitle: [unclosed\n---\nBody";
        let (fm, body) = split_front_matter(text);
        assert!(fm.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn non_mapping_yaml_keeps_original_text() {
        for text in ["---\n- a\n- b\n---\nBody", "---\njust a scalar\n---\nBody"] {
            let (fm, body) = split_front_matter(text);
            assert!(fm.is_none(), "{text:?}");
            assert_eq!(body, text);
        }
    }

    #[test]
    fn delimiter_must_open_at_offset_zero() {
        for text in [
            "Some text\n---\ntitle: Hello\n---\nMore text",
            "\n---\ntitle: Hello\n---\n",
            " ---\ntitle: Hello\n---\n",
        ] {
            let (fm, body) = split_front_matter(text);
            assert!(fm.is_none(), "{text:?}");
            assert_eq!(body, text);
        }
    }

    #[test]
    fn longer_rule_is_not_a_delimiter() {
        let text = "----\nname: x\n----\nBody";
        let (fm, body) = split_front_matter(text);
        assert!(fm.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn join_then_split_recovers_mapping_and_body() {
        let fm = mapping("name: Custom\norder: 3\ntags:\n  - a\n  - b\n");
        for body in ["", "# Heading\n\nText.\n", "no trailing newline", "---\nnot fm\n"] {
            let text = join_front_matter(&fm, body).unwrap();
            let (parsed, rest) = split_front_matter(&text);
            assert_eq!(parsed.as_ref(), Some(&fm));
            assert_eq!(rest, body);
        }
    }

    // =========================================================================
    // parse_text() tests
    // =========================================================================

    #[test]
    fn simple_readme() {
        let doc = parse_text("# My Project\n\nA great project.\n\nMore details.");
        assert_eq!(doc.title.as_deref(), Some("My Project"));
        assert_eq!(doc.summary.as_deref(), Some("A great project."));
    }

    #[test]
    fn readme_with_front_matter() {
        let doc = parse_text(
            "---\ntitle: Custom Title\ndescription: Custom desc\n---\n# Heading\n\nFirst paragraph.",
        );
        assert_eq!(doc.field_str("title").as_deref(), Some("Custom Title"));
        assert_eq!(doc.field_str("description").as_deref(), Some("Custom desc"));
        assert_eq!(doc.title.as_deref(), Some("Heading"));
        assert_eq!(doc.summary.as_deref(), Some("First paragraph."));
        assert!(!doc.body.contains("Custom desc"));
    }

    #[test]
    fn no_heading() {
        let doc = parse_text("Just a paragraph with no heading.");
        assert_eq!(doc.title, None);
        assert_eq!(doc.summary.as_deref(), Some("Just a paragraph with no heading."));
    }

    #[test]
    fn multiline_paragraph_joined_with_spaces() {
        let doc = parse_text("# Title\n\nFirst line\n  second line.\n\nSecond paragraph.");
        assert_eq!(doc.summary.as_deref(), Some("First line second line."));
    }

    #[test]
    fn subheadings_before_paragraph_are_skipped() {
        let doc = parse_text("# Title\n\n## Section\n\nActual content.");
        assert_eq!(doc.title.as_deref(), Some("Title"));
        assert_eq!(doc.summary.as_deref(), Some("Actual content."));
    }

    #[test]
    fn heading_ends_summary() {
        let doc = parse_text("# Title\nline one\n## Next\nline two");
        assert_eq!(doc.summary.as_deref(), Some("line one"));
    }

    #[test]
    fn second_level_heading_is_not_a_title() {
        let doc = parse_text("## Only a section\n\nText.");
        assert_eq!(doc.title, None);
        assert_eq!(doc.summary.as_deref(), Some("Text."));
    }

    #[test]
    fn summary_is_hard_cut() {
        let doc = parse_text(&format!("# Title\n\n{}", "x".repeat(600)));
        assert_eq!(doc.summary.unwrap().chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn summary_cut_counts_characters_not_bytes() {
        let doc = parse_text(&"é".repeat(700));
        assert_eq!(doc.summary.unwrap().chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn non_string_scalars_render_as_text() {
        let doc = parse_text("---\norder: 7\npublic: true\n---\n");
        assert_eq!(doc.field_str("order").as_deref(), Some("7"));
        assert_eq!(doc.field_str("public").as_deref(), Some("true"));
        assert_eq!(doc.field_str("missing"), None);
    }

    // =========================================================================
    // parse_document() tests
    // =========================================================================

    #[test]
    fn parse_document_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("README.md");
        fs::write(&path, "# Notes\n\nDaily notes.").unwrap();
        let doc = parse_document(&path).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Notes"));
    }

    #[test]
    fn parse_document_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(parse_document(&tmp.path().join("NOPE.md")).is_none());
    }

    #[test]
    fn parse_document_binary_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("README.md");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x9f]).unwrap();
        assert!(parse_document(&path).is_none());
    }

    // =========================================================================
    // resolve() tests
    // =========================================================================

    #[test]
    fn resolve_picks_first_non_none() {
        assert_eq!(
            resolve(&[Some("Front Matter"), Some("Heading")]),
            Some("Front Matter".to_string())
        );
    }

    #[test]
    fn resolve_skips_none_and_blank() {
        assert_eq!(
            resolve(&[None, Some("  \n\t "), Some("Fallback")]),
            Some("Fallback".to_string())
        );
    }

    #[test]
    fn resolve_returns_none_when_exhausted() {
        assert_eq!(resolve(&[None, None]), None);
        assert_eq!(resolve(&[]), None);
    }

    #[test]
    fn resolve_trims_whitespace() {
        assert_eq!(resolve(&[Some("  Padded  ")]), Some("Padded".to_string()));
    }

    // =========================================================================
    // JSON conversion
    // =========================================================================

    #[test]
    fn yaml_to_json_stringifies_keys() {
        let fm = mapping("1: one\nname: x\nlist: [1, 2]\n");
        let json = mapping_to_json(&fm);
        assert_eq!(json["1"], serde_json::json!("one"));
        assert_eq!(json["list"], serde_json::json!([1, 2]));
    }
}
