//! # Archivist
//!
//! Validates and renders self-describing archive trees. Every directory in
//! an archive carries a README (optionally with YAML front-matter) and some
//! durable data files; directories nest arbitrarily deep. Archivist checks
//! that a directory qualifies, walks and queries the tree, and folds the
//! whole tree bottom-up into a single self-contained HTML page.
//!
//! # Architecture: Check, Walk, Fold
//!
//! ```text
//! 1. Check   directory  →  ComplianceVerdict   (README + durable formats → Source)
//! 2. Walk    root       →  Source stream/tree   (curation, auto-discovery, filters)
//! 3. Fold    root       →  site/index.html      (children first, then the parent)
//! ```
//!
//! Each stage builds on the one before it and nothing else: the walker only
//! knows sources through the checker, and the builder only knows children
//! through the walker. That keeps ordering and inclusion rules in one place,
//! so `query` and `build` always agree on what the tree looks like.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`formats`] | The durable extension allow-list, grouped by category |
//! | [`metadata`] | Front-matter split/join and README name/description inference |
//! | [`compliance`] | The checker: turns a directory into a [`types::Source`] or a reason it is not one |
//! | [`types`] | `Source`, `ComplianceVerdict`, `NonCompliance`, curation entries |
//! | [`discover`] | Tree walking: curated or auto-discovered children, queries, dotted navigation |
//! | [`manifest`] | `manifest.yaml` side files: parent overrides for child name, icon, and order |
//! | [`generate`] | The recursive site builder, rendered with Maud |
//! | [`config`] | `archivist.toml` loading, validation, merging, and CSS generation |
//! | [`output`] | CLI output formatting for every command |
//!
//! # Design Decisions
//!
//! ## Metadata Cascade
//!
//! A source's name is the first of: front-matter `name`, the README's first
//! heading, the directory name. Its description is front-matter
//! `description`, then the README's first paragraph, then empty. A
//! directory's own `manifest.yaml` can fill in fields that fell all the way
//! back to the directory default, and a parent's `manifest.yaml` can override
//! how a child is *listed* by that parent without changing the child itself.
//!
//! ## Curation Over Discovery
//!
//! A README front-matter `contents` list names exactly which children are
//! included and in what order. Without one, every compliant immediate
//! subdirectory is included, sorted by name. Curation is authoritative: an
//! unlisted sibling is never pulled in.
//!
//! ## Failed Builds Leave Nothing Behind
//!
//! The page is rendered fully in memory, written to a hidden staging
//! directory, checked by the same checker that validates input, and only
//! then moved into place. A single failing child aborts the build.
//!
//! ## Maud Over Template Engines
//!
//! HTML is generated with [Maud](https://maud.lambda.xyz/), a compile-time
//! HTML macro system. Interpolation is escaped by default, which matters here:
//! every string on the page comes from user-written READMEs.

pub mod compliance;
pub mod config;
pub mod discover;
pub mod formats;
pub mod generate;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
