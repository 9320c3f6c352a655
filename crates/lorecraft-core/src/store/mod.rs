//! # Store Layer
//!
//! The persistence contract the pipeline and the query surface depend on,
//! plus the two backends that implement it:
//!
//! - [`postgres::PostgresGraph`] — a PostgreSQL pool with `tsvector`
//!   full-text search and native array tags.
//! - [`sqlite::SqliteGraph`] — a file-backed (or in-memory) SQLite database
//!   with an FTS5 virtual table kept in sync by triggers.
//!
//! Both present identical semantics; behavioral tests run the same suite
//! against each where an engine is available.
//!
//! Every operation is a future: dropping it cancels the in-flight query, and
//! the pools bound how long acquisition may block. Backends are `Send + Sync`
//! and safe to share behind an `Arc`.

pub mod postgres;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::LoreError;
use crate::layers::LayerDag;
use crate::types::{
    Consequence, CurrentState, Direction, Entity, EntityInput, EntitySummary, Event, Properties,
    Relationship, SearchResult,
};

pub use postgres::PostgresGraph;
pub use sqlite::SqliteGraph;

/// Maximum hits returned by a full-text search.
pub const SEARCH_LIMIT: i64 = 50;

/// Inclusive traversal depth bounds.
pub const MIN_DEPTH: i64 = 1;
pub const MAX_DEPTH: i64 = 5;

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// The persistence contract.
///
/// Filters passed as `Option<&str>` treat `None` and `Some("")` alike (no
/// filter). Reads never return placeholder entities except
/// [`GraphStore::list_dangling_placeholders`], which exists for them.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotently create tables, indexes, and full-text search objects.
    async fn ensure_schema(&self) -> Result<(), LoreError>;

    /// Insert or update an entity by `(name_normalized, layer)`.
    ///
    /// Clears the placeholder flag, refreshes the search index, and for
    /// `event` entities projects the consequences into the events table, all
    /// in one transaction.
    async fn upsert_entity(&self, input: &EntityInput) -> Result<(), LoreError>;

    /// Insert an edge, creating the target as a placeholder when absent.
    /// Unique on `(src, dst, rel_type)`; target upsert and edge insert share
    /// one transaction.
    async fn upsert_relationship(
        &self,
        from_name: &str,
        from_layer: &str,
        to_name: &str,
        to_layer: &str,
        rel_type: &str,
    ) -> Result<(), LoreError>;

    /// Delete non-placeholder entities in `layer` whose source file is
    /// absent from `current_source_files`. Returns the deleted count.
    async fn remove_stale_nodes(
        &self,
        layer: &str,
        current_source_files: &[String],
    ) -> Result<u64, LoreError>;

    /// Source-file → content-hash map for a layer's non-placeholder entities.
    async fn get_layer_hashes(&self, layer: &str) -> Result<HashMap<String, String>, LoreError>;

    /// First layer in `layers` (priority order) containing `name`, if any.
    async fn find_entity_layer(
        &self,
        name: &str,
        layers: &[String],
    ) -> Result<Option<String>, LoreError>;

    /// Fetch an entity by name, optionally narrowed by type. Fails with
    /// [`LoreError::Ambiguous`] when more than one layer matches.
    async fn get_entity(
        &self,
        name: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<Entity>, LoreError>;

    /// Breadth-first relationship traversal from `name`.
    ///
    /// `direction` is one of `outgoing`, `incoming`, `both` (empty means
    /// both); `depth` must be within `[1, 5]`. Already-visited neighbours
    /// are suppressed. At depth > 1, edge direction labels reflect the first
    /// matching frontier node rather than a global orientation.
    async fn get_relationships(
        &self,
        name: &str,
        rel_type: Option<&str>,
        direction: &str,
        depth: i64,
    ) -> Result<Vec<Relationship>, LoreError>;

    /// Entity summaries matching the filters, sorted by name.
    async fn list_entities(
        &self,
        entity_type: Option<&str>,
        layer: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<EntitySummary>, LoreError>;

    /// All non-placeholder entities with their full property maps.
    async fn list_entities_with_properties(&self) -> Result<Vec<Entity>, LoreError>;

    /// Ranked full-text search with snippets, capped at [`SEARCH_LIMIT`].
    async fn search(
        &self,
        query: &str,
        layer: Option<&str>,
        entity_type: Option<&str>,
    ) -> Result<Vec<SearchResult>, LoreError>;

    /// Project `name`'s canonical base through the ordered events of `layer`.
    /// Returns `None` when the canonical base entity does not exist.
    async fn get_current_state(
        &self,
        name: &str,
        layer: &str,
    ) -> Result<Option<CurrentState>, LoreError>;

    /// Events in `layer`, optionally filtered to those touching `entity`
    /// (via `AFFECTS` or `INVOLVES`) and bounded by session numbers; a bound
    /// of `0` is open. Ordered by `(session, id)`.
    async fn get_timeline(
        &self,
        layer: &str,
        entity: Option<&str>,
        from_session: i64,
        to_session: i64,
    ) -> Result<Vec<Event>, LoreError>;

    /// Entities still flagged as placeholders.
    async fn list_dangling_placeholders(&self) -> Result<Vec<EntitySummary>, LoreError>;

    /// Non-placeholder entities with zero incident edges.
    async fn list_orphaned_entities(&self) -> Result<Vec<EntitySummary>, LoreError>;

    /// Reserved: cross-layer rule violations. Empty until rules are defined.
    async fn list_cross_layer_violations(&self) -> Result<Vec<EntitySummary>, LoreError>;

    /// Raw SQL escape hatch with positional `$1…$N` parameter binding.
    async fn run_sql(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Vec<Properties>, LoreError>;

    /// Release the underlying connection pool.
    async fn close(&self);
}

/// Open the backend selected by the DSN scheme.
pub async fn open_store(
    dsn: &str,
    dag: LayerDag,
) -> Result<std::sync::Arc<dyn GraphStore>, LoreError> {
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        Ok(std::sync::Arc::new(PostgresGraph::connect(dsn, dag).await?))
    } else if dsn.starts_with("sqlite://") {
        Ok(std::sync::Arc::new(SqliteGraph::connect(dsn, dag).await?))
    } else {
        Err(LoreError::ConfigInvalid(format!(
            "unsupported database dsn scheme: {dsn}"
        )))
    }
}

// =============================================================================
// SHARED GUARDS
// =============================================================================

static REL_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Z0-9_]+$").expect("valid pattern"));

/// Enforce the `^[A-Z0-9_]+$` safety property at the store boundary.
pub(crate) fn check_rel_type(rel_type: &str) -> Result<(), LoreError> {
    if rel_type.trim().is_empty() || !REL_TYPE_PATTERN.is_match(rel_type) {
        return Err(LoreError::InvalidRelType(rel_type.to_string()));
    }
    Ok(())
}

/// Validate traversal arguments shared by both backends.
pub(crate) fn check_traversal(
    rel_type: Option<&str>,
    direction: &str,
    depth: i64,
) -> Result<Direction, LoreError> {
    let direction = Direction::parse(direction)?;
    if !(MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
        return Err(LoreError::DepthOutOfRange(depth));
    }
    if let Some(rel) = rel_type
        && !rel.trim().is_empty()
    {
        check_rel_type(rel)?;
    }
    Ok(direction)
}

pub(crate) fn filter_str(filter: Option<&str>) -> &str {
    filter.unwrap_or("")
}

// =============================================================================
// CONSEQUENCE APPLICATION
// =============================================================================

/// Apply `consequences` targeting `target` (case-insensitive) to `props`,
/// strictly in list order. `value` overwrites; `add` appends to a list,
/// replacing a scalar or absent value with a fresh single-element list.
pub(crate) fn apply_consequences(
    props: &mut Properties,
    consequences: &[Consequence],
    target: &str,
) {
    let target_normalized = target.trim().to_lowercase();
    for consequence in consequences {
        if !target_normalized.is_empty()
            && consequence.entity.to_lowercase() != target_normalized
        {
            continue;
        }
        if let Some(value) = &consequence.value {
            props.insert(consequence.property.clone(), value.clone());
            continue;
        }
        if let Some(add) = &consequence.add {
            let appended = append_value(props.get(&consequence.property), add);
            props.insert(consequence.property.clone(), appended);
        }
    }
}

fn append_value(existing: Option<&serde_json::Value>, add: &serde_json::Value) -> serde_json::Value {
    match existing {
        Some(serde_json::Value::Array(items)) => {
            let mut out = items.clone();
            out.push(add.clone());
            serde_json::Value::Array(out)
        }
        _ => serde_json::Value::Array(vec![add.clone()]),
    }
}

// =============================================================================
// TESTS
// =============================================================================
