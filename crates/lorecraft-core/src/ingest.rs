//! # Ingestion Pipeline
//!
//! Synchronises the graph with the markdown source tree in a single logical
//! sync: walk each layer's paths, skip unchanged files by content hash,
//! parse and filter frontmatter, upsert entities, resolve and upsert edges,
//! then delete stale nodes per layer.
//!
//! The pipeline never aborts on a single-file failure; per-file errors are
//! collected into [`IngestResult::errors`] and the pass continues. Entity
//! upserts always complete before any edge upsert, and stale-node removal
//! runs last.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::{Layer, ProjectConfig};
use crate::error::LoreError;
use crate::parser::{self, Document};
use crate::schema::{EntityType, Schema};
use crate::store::GraphStore;
use crate::types::{Consequence, EntityInput, Properties};

/// Frontmatter keys that never become stored properties.
const RESERVED_KEYS: [&str; 5] = ["title", "type", "tags", "related", "consequences"];

/// Counters and collected errors for one sync pass.
#[derive(Debug, Default)]
pub struct IngestResult {
    pub nodes_upserted: u64,
    pub edges_upserted: u64,
    pub nodes_removed: u64,
    pub files_skipped: u64,
    pub errors: Vec<String>,
}

/// Pipeline options.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Ignore cached hashes and re-ingest every file.
    pub full: bool,
}

struct ProcessedDoc {
    doc: Document,
    layer: Layer,
}

/// Run one sync pass over every configured layer, in declaration order.
pub async fn run(
    cfg: &ProjectConfig,
    schema: &Schema,
    store: &dyn GraphStore,
    options: IngestOptions,
) -> Result<IngestResult, LoreError> {
    store.ensure_schema().await?;

    let mut result = IngestResult::default();
    let mut processed: Vec<ProcessedDoc> = Vec::new();
    let mut layer_files: HashMap<String, Vec<String>> = HashMap::new();

    for layer in &cfg.layers {
        let existing_hashes = if options.full {
            HashMap::new()
        } else {
            store.get_layer_hashes(&layer.name).await?
        };

        let files = walk_markdown_files(&layer.paths, &cfg.exclude)?;
        layer_files.insert(layer.name.clone(), files.clone());

        for path in files {
            let data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    result.errors.push(format!("hashing {path}: {e}"));
                    continue;
                }
            };
            let hash = hex::encode(Sha256::digest(&data));

            if !options.full
                && existing_hashes.get(&path).is_some_and(|cached| *cached == hash)
            {
                result.files_skipped += 1;
                continue;
            }

            let mut doc = match parser::parse(&data) {
                Ok(doc) => doc,
                Err(e) if e.is_silent_skip() => {
                    tracing::debug!(path = %path, error = %e, "skipping file");
                    result.files_skipped += 1;
                    continue;
                }
                Err(e) => {
                    result.errors.push(format!("parsing {path}: {e}"));
                    continue;
                }
            };
            doc.source_file = path.clone();

            let Some(entity_type) = schema.entity_type_by_name(&doc.entity_type) else {
                let e = LoreError::SchemaReject(doc.entity_type.clone());
                tracing::debug!(path = %path, error = %e, "skipping file");
                result.files_skipped += 1;
                continue;
            };

            let mut props = filter_properties(&doc.frontmatter, entity_type);

            if doc.entity_type.eq_ignore_ascii_case("event")
                && let Some(value) = doc.frontmatter.get("consequences")
            {
                match parse_consequences(value) {
                    Ok(consequences) => {
                        let payload = serde_json::to_string(&consequences)?;
                        props.insert("consequences_json".into(), payload.into());
                    }
                    Err(e) => {
                        result
                            .errors
                            .push(format!("parsing consequences in {path}: {e}"));
                        continue;
                    }
                }
            }

            let input = EntityInput {
                name: doc.title.clone(),
                entity_type: doc.entity_type.clone(),
                layer: layer.name.clone(),
                source_file: path.clone(),
                source_hash: hash,
                properties: props,
                tags: doc.tags.clone(),
                body: doc.body.clone(),
            };

            if let Err(e) = store.upsert_entity(&input).await {
                result.errors.push(format!("upserting {path}: {e}"));
                continue;
            }
            result.nodes_upserted += 1;
            processed.push(ProcessedDoc {
                doc,
                layer: layer.clone(),
            });
        }
    }

    // Second pass: every entity exists, so cross-layer targets resolve
    // against rows upserted moments ago.
    for item in &processed {
        let Some(entity_type) = schema.entity_type_by_name(&item.doc.entity_type) else {
            continue;
        };

        for mapping in &entity_type.field_mappings {
            if let Some(value) = item.doc.frontmatter.get(mapping.field.as_str()) {
                upsert_edges(
                    store,
                    &mut result,
                    item,
                    value,
                    &mapping.relationship,
                )
                .await;
            }
        }

        if let Some(value) = item.doc.frontmatter.get("related") {
            upsert_edges(store, &mut result, item, value, "RELATED_TO").await;
        }
    }

    for layer in &cfg.layers {
        let files = layer_files.get(&layer.name).cloned().unwrap_or_default();
        match store.remove_stale_nodes(&layer.name, &files).await {
            Ok(deleted) => result.nodes_removed += deleted,
            Err(e) => result
                .errors
                .push(format!("removing stale nodes for {}: {e}", layer.name)),
        }
    }

    tracing::info!(
        nodes_upserted = result.nodes_upserted,
        edges_upserted = result.edges_upserted,
        nodes_removed = result.nodes_removed,
        files_skipped = result.files_skipped,
        errors = result.errors.len(),
        "sync complete"
    );

    Ok(result)
}

/// Upsert one edge per string value of a mapped field, resolving the target
/// layer through the current layer's dependency list.
async fn upsert_edges(
    store: &dyn GraphStore,
    result: &mut IngestResult,
    item: &ProcessedDoc,
    value: &serde_json::Value,
    rel_type: &str,
) {
    for target in resolve_field_values(value) {
        if target.is_empty() {
            continue;
        }

        let mut target_layer = item.layer.name.clone();
        if !item.layer.depends_on.is_empty() {
            let mut layers = vec![item.layer.name.clone()];
            layers.extend(item.layer.depends_on.iter().cloned());
            match store.find_entity_layer(&target, &layers).await {
                Ok(Some(layer)) => target_layer = layer,
                Ok(None) => {}
                Err(e) => {
                    result
                        .errors
                        .push(format!("finding layer for {target}: {e}"));
                    continue;
                }
            }
        }

        if let Err(e) = store
            .upsert_relationship(
                &item.doc.title,
                &item.layer.name,
                &target,
                &target_layer,
                rel_type,
            )
            .await
        {
            result
                .errors
                .push(format!("upserting relationship for {}: {e}", item.doc.title));
            continue;
        }
        result.edges_upserted += 1;
    }
}

// =============================================================================
// FILE WALKING
// =============================================================================

/// Collect `.md` files (lower-case suffix) under the layer paths, depth-first
/// in name order, skipping excluded paths and their subtrees.
fn walk_markdown_files(roots: &[String], excludes: &[String]) -> Result<Vec<String>, LoreError> {
    let excluded: Vec<PathBuf> = excludes
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| clean_path(Path::new(p)))
        .collect();

    let mut files = Vec::new();
    for root in roots {
        if root.is_empty() {
            continue;
        }
        let root = clean_path(Path::new(root));

        let walker = walkdir::WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.path(), &excluded));

        for entry in walker {
            let entry = entry.map_err(|e| {
                LoreError::Io(std::io::Error::other(format!(
                    "walking {}: {e}",
                    root.display()
                )))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.to_lowercase().ends_with(".md") {
                continue;
            }
            files.push(entry.path().to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    let clean = clean_path(path);
    excludes
        .iter()
        .any(|exclude| clean == *exclude || clean.starts_with(exclude))
}

/// Lexical path cleanup: drops `.` components and resolves `..` against
/// preceding components where possible.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

// =============================================================================
// FRONTMATTER FILTERING
// =============================================================================

/// Reduce the frontmatter to the stored property map: reserved keys and
/// mapped fields are dropped, as is anything not declared for the type.
fn filter_properties(frontmatter: &Properties, entity_type: &EntityType) -> Properties {
    let mut props = Properties::new();
    for (key, value) in frontmatter {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if entity_type.has_field_mapping(key) {
            continue;
        }
        if !entity_type.has_property(key) {
            continue;
        }
        props.insert(key.clone(), value.clone());
    }
    props
}

/// A mapped field accepts a single string or a list; non-string list items
/// are ignored.
fn resolve_field_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse the `consequences` frontmatter field: a list (or single map) of
/// `{entity, property, value? | add?}` entries.
fn parse_consequences(value: &serde_json::Value) -> Result<Vec<Consequence>, LoreError> {
    let items: Vec<&serde_json::Value> = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![value],
        _ => {
            return Err(LoreError::InvalidConsequences(
                "consequences must be a list".into(),
            ));
        }
    };

    let mut consequences = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(entry) = item.as_object() else {
            return Err(LoreError::InvalidConsequences(format!(
                "consequence {i} must be a map"
            )));
        };
        let entity = entry
            .get("entity")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        let property = entry
            .get("property")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        if entity.is_empty() || property.is_empty() {
            return Err(LoreError::InvalidConsequences(format!(
                "consequence {i} missing entity or property"
            )));
        }
        consequences.push(Consequence {
            entity: entity.to_string(),
            property: property.to_string(),
            value: entry.get("value").cloned(),
            add: entry.get("add").cloned(),
        });
    }

    Ok(consequences)
}

// =============================================================================
// TESTS
// =============================================================================
