//! # CLI Command Implementations

use std::path::Path;
use std::sync::Arc;

use lorecraft_core::{
    GraphStore, IngestOptions, LayerDag, LoreError, ProjectConfig, Schema, ingest,
    load_project_config, load_schema, open_store, validate,
};

use crate::cli::templates;
use crate::server::LoreServer;

/// Load the config and schema and open the configured store.
async fn open(
    config_path: &Path,
    schema_path: &Path,
) -> Result<(ProjectConfig, Schema, Arc<dyn GraphStore>), LoreError> {
    let cfg = load_project_config(config_path)?;
    let schema = load_schema(schema_path)?;
    let dag = LayerDag::new(&cfg.layers)?;
    let store = open_store(&cfg.database.dsn, dag).await?;
    Ok((cfg, schema, store))
}

/// Open the store for a query command; the schema file is not needed.
async fn open_query(config_path: &Path) -> Result<Arc<dyn GraphStore>, LoreError> {
    let cfg = load_project_config(config_path)?;
    let dag = LayerDag::new(&cfg.layers)?;
    open_store(&cfg.database.dsn, dag).await
}

// =============================================================================
// INGEST
// =============================================================================

pub async fn cmd_ingest(
    config_path: &Path,
    schema_path: &Path,
    full: bool,
) -> Result<(), LoreError> {
    let (cfg, schema, store) = open(config_path, schema_path).await?;

    let result = ingest::run(&cfg, &schema, store.as_ref(), IngestOptions { full }).await?;
    store.close().await;

    println!("Ingestion complete.");
    println!("  Nodes upserted: {}", result.nodes_upserted);
    println!("  Edges upserted: {}", result.edges_upserted);
    println!("  Nodes removed:  {}", result.nodes_removed);
    println!("  Files skipped:  {}", result.files_skipped);

    if !result.errors.is_empty() {
        println!("\nErrors ({}):", result.errors.len());
        for error in &result.errors {
            println!("  - {error}");
        }
        return Err(LoreError::Failed("ingestion completed with errors".into()));
    }

    Ok(())
}

// =============================================================================
// SERVE
// =============================================================================

pub async fn cmd_serve(config_path: &Path, schema_path: &Path) -> Result<(), LoreError> {
    let (_cfg, schema, store) = open(config_path, schema_path).await?;

    tracing::info!("starting MCP tool server on stdio");
    LoreServer::new(store, Arc::new(schema)).run_stdio().await
}

// =============================================================================
// VALIDATE
// =============================================================================

pub async fn cmd_validate(config_path: &Path, schema_path: &Path) -> Result<(), LoreError> {
    let (_cfg, schema, store) = open(config_path, schema_path).await?;

    let report = validate::run(&schema, store.as_ref()).await?;
    store.close().await;

    let errors: Vec<_> = report.errors().collect();
    let warnings: Vec<_> = report.warnings().collect();

    if errors.is_empty() && warnings.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    if !errors.is_empty() {
        println!("Errors ({}):", errors.len());
        print_issues(&errors);
    }
    if !warnings.is_empty() {
        if !errors.is_empty() {
            println!();
        }
        println!("Warnings ({}):", warnings.len());
        print_issues(&warnings);
    }

    if !errors.is_empty() {
        return Err(LoreError::Failed("validation found errors".into()));
    }
    Ok(())
}

fn print_issues(issues: &[&lorecraft_core::Issue]) {
    for issue in issues {
        let mut location = issue.entity.clone();
        if !issue.layer.is_empty() {
            location = format!("{location} [{}]", issue.layer);
        }
        if !issue.file_path.is_empty() {
            location = format!("{location} ({})", issue.file_path);
        }
        println!("  - {location}: {} ({})", issue.message, issue.code);
    }
}

// =============================================================================
// QUERY
// =============================================================================

pub async fn cmd_query_sql(
    config_path: &Path,
    stmt: &str,
    param_pairs: &[String],
) -> Result<(), LoreError> {
    let params = positional_params(param_pairs)?;
    let store = open_query(config_path).await?;

    let rows = store.run_sql(stmt, &params).await?;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

pub fn cmd_query_cypher() -> Result<(), LoreError> {
    Err(LoreError::Failed(
        "cypher queries are not supported by the configured SQL backends; use 'query sql'".into(),
    ))
}

pub async fn cmd_query_entity(
    config_path: &Path,
    name: &str,
    entity_type: Option<&str>,
) -> Result<(), LoreError> {
    let store = open_query(config_path).await?;
    let entity = store.get_entity(name, entity_type).await?;
    store.close().await;

    let Some(entity) = entity else {
        println!("No entity found for {name:?}.");
        return Ok(());
    };

    println!("Name: {}", entity.name);
    println!("Type: {}", entity.entity_type);
    println!("Layer: {}", entity.layer);
    if !entity.tags.is_empty() {
        println!("Tags: {}", entity.tags.join(", "));
    }
    if !entity.source_file.is_empty() {
        println!("Source: {}", entity.source_file);
    }

    if !entity.properties.is_empty() {
        let mut keys: Vec<_> = entity.properties.keys().collect();
        keys.sort();
        println!("Properties:");
        for key in keys {
            println!("  {key}: {}", render_value(&entity.properties[key]));
        }
    }
    Ok(())
}

pub async fn cmd_query_relations(
    config_path: &Path,
    name: &str,
    rel_type: Option<&str>,
    direction: &str,
    depth: i64,
) -> Result<(), LoreError> {
    let store = open_query(config_path).await?;
    let rels = store
        .get_relationships(name, rel_type, direction, depth)
        .await?;
    store.close().await;

    if rels.is_empty() {
        println!("No relationships found for {name:?}.");
        return Ok(());
    }

    for rel in rels {
        println!(
            "[{}] {} ({}) -{}-> {} ({}) [{}]",
            rel.depth,
            rel.from.name,
            rel.from.entity_type,
            rel.rel_type,
            rel.to.name,
            rel.to.entity_type,
            rel.direction.as_str(),
        );
    }
    Ok(())
}

pub async fn cmd_query_list(
    config_path: &Path,
    entity_type: Option<&str>,
    layer: Option<&str>,
    tag: Option<&str>,
) -> Result<(), LoreError> {
    let store = open_query(config_path).await?;
    let summaries = store.list_entities(entity_type, layer, tag).await?;
    store.close().await;

    if summaries.is_empty() {
        println!("No entities found.");
        return Ok(());
    }

    for summary in summaries {
        if summary.tags.is_empty() {
            println!("{} ({}) [{}]", summary.name, summary.entity_type, summary.layer);
        } else {
            println!(
                "{} ({}) [{}] #{}",
                summary.name,
                summary.entity_type,
                summary.layer,
                summary.tags.join(" #")
            );
        }
    }
    Ok(())
}

pub async fn cmd_query_search(
    config_path: &Path,
    text: &str,
    entity_type: Option<&str>,
    layer: Option<&str>,
) -> Result<(), LoreError> {
    let store = open_query(config_path).await?;
    let results = store.search(text, layer, entity_type).await?;
    store.close().await;

    if results.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    for result in results {
        println!(
            "{} ({}) [{}] score={:.2}",
            result.name, result.entity_type, result.layer, result.score
        );
        if !result.snippet.is_empty() {
            println!("  {}", result.snippet);
        }
    }
    Ok(())
}

pub async fn cmd_query_state(
    config_path: &Path,
    name: &str,
    layer: &str,
) -> Result<(), LoreError> {
    if layer.trim().is_empty() {
        return Err(LoreError::Failed("--layer is required".into()));
    }

    let store = open_query(config_path).await?;
    let state = store.get_current_state(name, layer).await?;
    store.close().await;

    let Some(state) = state else {
        println!("No state found for {name:?} in layer {layer:?}.");
        return Ok(());
    };

    print_property_block("Base properties", &state.base_properties);

    if !state.events.is_empty() {
        println!("Events:");
        for event in &state.events {
            println!("  [{}] {} ({})", event.session, event.name, event.layer);
            if !event.date_in_world.is_empty() {
                println!("    Date: {}", event.date_in_world);
            }
            if !event.participants.is_empty() {
                println!("    Participants: {}", event.participants.join(", "));
            }
            if !event.location.is_empty() {
                println!("    Location: {}", event.location.join(", "));
            }
            if !event.consequences.is_empty() {
                println!("    Consequences:");
                for consequence in &event.consequences {
                    if let Some(value) = &consequence.value {
                        println!(
                            "      - {}.{} = {}",
                            consequence.entity,
                            consequence.property,
                            render_value(value)
                        );
                    } else if let Some(add) = &consequence.add {
                        println!(
                            "      - {}.{} += {}",
                            consequence.entity,
                            consequence.property,
                            render_value(add)
                        );
                    }
                }
            }
        }
        println!();
    }

    print_property_block("Current properties", &state.current_properties);
    Ok(())
}

fn print_property_block(title: &str, props: &lorecraft_core::Properties) {
    if props.is_empty() {
        return;
    }
    let mut keys: Vec<_> = props.keys().collect();
    keys.sort();
    println!("{title}:");
    for key in keys {
        println!("  {key}: {}", render_value(&props[key]));
    }
    println!();
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Order `key=value` pairs into a positional `$1…$N` parameter list.
fn positional_params(pairs: &[String]) -> Result<Vec<String>, LoreError> {
    let mut by_key = std::collections::HashMap::new();
    for pair in pairs {
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(LoreError::Failed(format!(
                "invalid param {pair:?}: expected key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(LoreError::Failed(format!(
                "invalid param {pair:?}: empty key"
            )));
        }
        by_key.insert(key.to_string(), value.trim().to_string());
    }

    let mut params = Vec::with_capacity(by_key.len());
    for i in 1..=by_key.len() {
        if let Some(value) = by_key.get(&i.to_string()) {
            params.push(value.clone());
        }
    }
    Ok(params)
}

// =============================================================================
// INIT
// =============================================================================

pub fn cmd_init(project_name: &str, template: &str) -> Result<(), LoreError> {
    if project_name.trim().is_empty() {
        return Err(LoreError::Failed("--name is required".into()));
    }

    let config_path = Path::new("config.yaml");
    let schema_path = Path::new("schema.yaml");
    if config_path.exists() {
        return Err(LoreError::Failed("config.yaml already exists".into()));
    }
    if schema_path.exists() {
        return Err(LoreError::Failed("schema.yaml already exists".into()));
    }

    let Some(schema_contents) = templates::schema_template(template) else {
        return Err(LoreError::Failed(format!(
            "unknown template {template:?}; available: {}",
            templates::available().join(", ")
        )));
    };

    std::fs::write(config_path, templates::config_template(project_name))?;
    std::fs::write(schema_path, schema_contents)?;

    println!("Scaffolded config.yaml and schema.yaml for {project_name:?}.");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_params_ordered_by_numeric_key() {
        let pairs = vec!["2=beta".to_string(), "1=alpha".to_string()];
        assert_eq!(positional_params(&pairs).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn positional_params_reject_malformed() {
        assert!(positional_params(&["no-equals".to_string()]).is_err());
        assert!(positional_params(&["=value".to_string()]).is_err());
    }

    #[test]
    fn render_value_unquotes_strings() {
        assert_eq!(render_value(&serde_json::json!("plain")), "plain");
        assert_eq!(render_value(&serde_json::json!(["a", "b"])), "[\"a\",\"b\"]");
    }
}
