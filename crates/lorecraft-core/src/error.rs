//! # Error Types
//!
//! All errors surfaced at the core boundary.
//!
//! - No silent failures
//! - Fallible operations return `Result<T, LoreError>`
//! - The core never panics; all errors are recoverable by the caller
//!
//! Parse failures are split into individual variants because the ingestion
//! pipeline treats them differently: a file without frontmatter, without a
//! `type` field, or with a type the schema does not declare is silently
//! skipped, while malformed YAML or a missing title is reported as a
//! per-file error.

use thiserror::Error;

/// Errors that can occur in the lorecraft core.
#[derive(Debug, Error)]
pub enum LoreError {
    /// The project configuration or schema file is invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The file has no `---` frontmatter block.
    #[error("no frontmatter found")]
    NoFrontmatter,

    /// The frontmatter block is not valid YAML.
    #[error("invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),

    /// The frontmatter is missing the required `title` field.
    #[error("frontmatter missing required 'title' field")]
    MissingTitle,

    /// The frontmatter is missing the required `type` field.
    #[error("frontmatter missing required 'type' field")]
    MissingType,

    /// The `tags` field is neither a string nor a list of strings.
    #[error("tags must be a string or a list of strings")]
    InvalidTags,

    /// The `consequences` field of an event could not be parsed.
    #[error("invalid consequences: {0}")]
    InvalidConsequences(String),

    /// The document declares an entity type the schema does not know.
    #[error("unknown entity type: {0}")]
    SchemaReject(String),

    /// A relationship type does not match `^[A-Z0-9_]+$`.
    #[error("invalid relationship type: {0}")]
    InvalidRelType(String),

    /// A traversal direction other than outgoing, incoming, or both.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// A full-text search with no query text.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A traversal depth outside the accepted range.
    #[error("depth must be between 1 and 5, got {0}")]
    DepthOutOfRange(i64),

    /// More than one entity matched a `(name, type)` lookup across layers.
    #[error("ambiguous entity {0:?}: multiple matches, narrow with a type filter")]
    Ambiguous(String),

    /// A layer name not present in the configured layer set.
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    /// A derived layer with no canonical ancestor.
    #[error("no canonical base layer found for {0}")]
    NoCanonicalLayer(String),

    /// An error from the underlying database.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON encode/decode error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tool server transport failed.
    #[error("tool server error: {0}")]
    ToolServer(String),

    /// The operation was cancelled or timed out.
    #[error("operation cancelled")]
    Cancelled,

    /// A command-level failure with a preformatted message.
    #[error("{0}")]
    Failed(String),
}

impl LoreError {
    /// True for per-file failures the ingestion pipeline skips silently.
    #[must_use]
    pub fn is_silent_skip(&self) -> bool {
        matches!(
            self,
            Self::NoFrontmatter | Self::MissingType | Self::SchemaReject(_)
        )
    }
}
