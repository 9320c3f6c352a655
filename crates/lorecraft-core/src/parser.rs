//! # Frontmatter Parser
//!
//! Splits the `---`-delimited YAML header from the markdown body and extracts
//! the fields every entity must declare (`title`, `type`) plus the optional
//! `tags`. All other frontmatter keys are preserved untyped for downstream
//! filtering by the ingestion pipeline.
//!
//! The parser is pure: it never touches the filesystem except through
//! [`parse_file`], and it never blocks.

use std::path::Path;

use crate::error::LoreError;
use crate::types::Properties;

const MARKER: &str = "---\n";

/// A parsed markdown source document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// The full frontmatter mapping, including reserved keys.
    pub frontmatter: Properties,
    pub title: String,
    pub entity_type: String,
    pub tags: Vec<String>,
    pub body: String,
    /// Set by [`parse_file`]; empty when parsed from a buffer.
    pub source_file: String,
}

/// Read and parse a markdown file from disk.
pub fn parse_file(path: &Path) -> Result<Document, LoreError> {
    let data = std::fs::read(path)?;
    let mut doc = parse(&data)?;
    doc.source_file = path.to_string_lossy().into_owned();
    Ok(doc)
}

/// Parse a markdown buffer into a [`Document`].
///
/// Strips an optional BOM and leading whitespace, requires a `---\n` prefix,
/// and treats everything up to the next `---\n` as YAML. Fails with
/// [`LoreError::NoFrontmatter`] when either marker is missing.
pub fn parse(content: &[u8]) -> Result<Document, LoreError> {
    let text = String::from_utf8_lossy(content);
    let trimmed = text.trim_start_matches(['\u{feff}', '\n', '\r', '\t', ' ']);

    let Some(rest) = trimmed.strip_prefix(MARKER) else {
        return Err(LoreError::NoFrontmatter);
    };
    let Some(end) = rest.find(MARKER) else {
        return Err(LoreError::NoFrontmatter);
    };

    let yaml = &rest[..end];
    let body = rest[end + MARKER.len()..].to_string();

    let frontmatter: Properties = if yaml.trim().is_empty() {
        Properties::new()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| LoreError::InvalidYaml(e.to_string()))?
    };

    let title = require_string(&frontmatter, "title").ok_or(LoreError::MissingTitle)?;
    let entity_type = require_string(&frontmatter, "type").ok_or(LoreError::MissingType)?;
    let tags = parse_tags(frontmatter.get("tags"))?;

    Ok(Document {
        frontmatter,
        title,
        entity_type,
        tags,
        body,
        source_file: String::new(),
    })
}

fn require_string(frontmatter: &Properties, key: &str) -> Option<String> {
    let value = frontmatter.get(key)?.as_str()?;
    if value.trim().is_empty() {
        return None;
    }
    Some(value.to_string())
}

/// `tags` accepts a single string or a list of strings; blank entries are
/// dropped. Any other shape is rejected.
fn parse_tags(value: Option<&serde_json::Value>) -> Result<Vec<String>, LoreError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => {
            if s.trim().is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![s.clone()])
            }
        }
        Some(serde_json::Value::Array(items)) => {
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                let Some(s) = item.as_str() else {
                    return Err(LoreError::InvalidTags);
                };
                if s.trim().is_empty() {
                    continue;
                }
                tags.push(s.to_string());
            }
            Ok(tags)
        }
        Some(_) => Err(LoreError::InvalidTags),
    }
}

// =============================================================================
// TESTS
// =============================================================================
