//! # MCP Tool Server
//!
//! Exposes the knowledge graph as a fixed set of MCP tools over stdio. A
//! thin adapter: handlers translate tool calls into store queries and shape
//! JSON responses, with no business logic beyond relationship dedup.

use std::collections::HashSet;
use std::sync::Arc;

use lorecraft_core::{GraphStore, LoreError, Relationship, Schema};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::Deserialize;

// =============================================================================
// SERVER
// =============================================================================

/// MCP server over a shared store and the loaded schema.
#[derive(Clone)]
pub struct LoreServer {
    store: Arc<dyn GraphStore>,
    schema: Arc<Schema>,
    #[allow(dead_code)]
    tool_router: ToolRouter<Self>,
}

// =============================================================================
// TOOL PARAMETER STRUCTS
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchLoreParams {
    /// Search terms; quoted phrases, -negation, and trailing * are honored.
    #[schemars(description = "Search terms")]
    pub query: String,
    /// Restrict to a specific layer.
    #[schemars(description = "Restrict to a specific layer")]
    pub layer: Option<String>,
    /// Restrict to a specific entity type.
    #[serde(rename = "type")]
    #[schemars(description = "Restrict to a specific entity type")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetEntityParams {
    /// Entity name.
    #[schemars(description = "Entity name")]
    pub name: String,
    /// Optional entity type to disambiguate.
    #[serde(rename = "type")]
    #[schemars(description = "Optional entity type to disambiguate")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetRelationshipsParams {
    /// Starting entity name.
    #[schemars(description = "Starting entity name")]
    pub name: String,
    /// Relationship type filter.
    #[serde(rename = "type")]
    #[schemars(description = "Relationship type filter")]
    pub rel_type: Option<String>,
    /// Maximum traversal depth (1-5, default 1).
    #[schemars(description = "Maximum traversal depth (1-5, default 1)")]
    pub depth: Option<i64>,
    /// Direction: outgoing, incoming, or both.
    #[schemars(description = "Direction: outgoing, incoming, or both")]
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListEntitiesParams {
    /// Entity type filter.
    #[serde(rename = "type")]
    #[schemars(description = "Entity type filter")]
    pub entity_type: Option<String>,
    /// Layer filter.
    #[schemars(description = "Layer filter")]
    pub layer: Option<String>,
    /// Tag filter.
    #[schemars(description = "Tag filter")]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetCurrentStateParams {
    /// Entity name.
    #[schemars(description = "Entity name")]
    pub name: String,
    /// Derived layer whose events are applied.
    #[schemars(description = "Derived layer whose events are applied")]
    pub layer: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetTimelineParams {
    /// Layer whose events are listed.
    #[schemars(description = "Layer whose events are listed")]
    pub layer: String,
    /// Restrict to events affecting or involving this entity.
    #[schemars(description = "Restrict to events affecting or involving this entity")]
    pub entity: Option<String>,
    /// Lowest session number to include (0 = unbounded).
    #[schemars(description = "Lowest session number to include (0 = unbounded)")]
    pub from_session: Option<i64>,
    /// Highest session number to include (0 = unbounded).
    #[schemars(description = "Highest session number to include (0 = unbounded)")]
    pub to_session: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CheckConsistencyParams {
    /// Entity name.
    #[schemars(description = "Entity name")]
    pub name: String,
    /// Derived layer to evaluate.
    #[schemars(description = "Derived layer to evaluate")]
    pub layer: String,
    /// Optional entity type to disambiguate.
    #[serde(rename = "type")]
    #[schemars(description = "Optional entity type to disambiguate")]
    pub entity_type: Option<String>,
    /// Maximum traversal depth (1-5, default 1).
    #[schemars(description = "Maximum traversal depth (1-5, default 1)")]
    pub depth: Option<i64>,
    /// Direction: outgoing, incoming, or both.
    #[schemars(description = "Direction: outgoing, incoming, or both")]
    pub direction: Option<String>,
}

// =============================================================================
// TOOL IMPLEMENTATIONS
// =============================================================================

#[tool_router]
impl LoreServer {
    pub fn new(store: Arc<dyn GraphStore>, schema: Arc<Schema>) -> Self {
        Self {
            store,
            schema,
            tool_router: Self::tool_router(),
        }
    }

    /// Serve MCP over stdio until the client disconnects.
    pub async fn run_stdio(self) -> Result<(), LoreError> {
        let service = self
            .serve(stdio())
            .await
            .map_err(|e| LoreError::ToolServer(e.to_string()))?;
        service
            .waiting()
            .await
            .map_err(|e| LoreError::ToolServer(e.to_string()))?;
        Ok(())
    }

    #[tool(description = "Search entities by name, tags, and text")]
    async fn search_lore(
        &self,
        params: Parameters<SearchLoreParams>,
    ) -> Result<CallToolResult, McpError> {
        let SearchLoreParams {
            query,
            layer,
            entity_type,
        } = params.0;
        if query.is_empty() {
            return Err(McpError::invalid_params("query is required", None));
        }
        let results = self
            .store
            .search(&query, layer.as_deref(), entity_type.as_deref())
            .await
            .map_err(internal)?;
        json_result(&serde_json::json!({ "results": results }))
    }

    #[tool(description = "Retrieve a specific entity and its properties")]
    async fn get_entity(
        &self,
        params: Parameters<GetEntityParams>,
    ) -> Result<CallToolResult, McpError> {
        let GetEntityParams { name, entity_type } = params.0;
        if name.is_empty() {
            return Err(McpError::invalid_params("name is required", None));
        }
        let entity = self
            .store
            .get_entity(&name, entity_type.as_deref())
            .await
            .map_err(internal)?
            .ok_or_else(|| McpError::invalid_params("entity not found", None))?;
        json_result(&serde_json::json!(entity))
    }

    #[tool(description = "Traverse relationships from an entity")]
    async fn get_relationships(
        &self,
        params: Parameters<GetRelationshipsParams>,
    ) -> Result<CallToolResult, McpError> {
        let GetRelationshipsParams {
            name,
            rel_type,
            depth,
            direction,
        } = params.0;
        if name.is_empty() {
            return Err(McpError::invalid_params("name is required", None));
        }
        let rels = self
            .store
            .get_relationships(
                &name,
                rel_type.as_deref(),
                direction.as_deref().unwrap_or(""),
                depth.unwrap_or(1),
            )
            .await
            .map_err(internal)?;
        json_result(&serde_json::json!({ "relationships": rels }))
    }

    #[tool(description = "List entities with optional filters")]
    async fn list_entities(
        &self,
        params: Parameters<ListEntitiesParams>,
    ) -> Result<CallToolResult, McpError> {
        let ListEntitiesParams {
            entity_type,
            layer,
            tag,
        } = params.0;
        let entities = self
            .store
            .list_entities(entity_type.as_deref(), layer.as_deref(), tag.as_deref())
            .await
            .map_err(internal)?;
        json_result(&serde_json::json!({ "entities": entities }))
    }

    #[tool(description = "Return the current schema definition")]
    async fn get_schema(&self) -> Result<CallToolResult, McpError> {
        json_result(&serde_json::json!(&*self.schema))
    }

    #[tool(description = "Compute an entity's current state from campaign events")]
    async fn get_current_state(
        &self,
        params: Parameters<GetCurrentStateParams>,
    ) -> Result<CallToolResult, McpError> {
        let GetCurrentStateParams { name, layer } = params.0;
        if name.is_empty() || layer.is_empty() {
            return Err(McpError::invalid_params("name and layer are required", None));
        }
        let state = self
            .store
            .get_current_state(&name, &layer)
            .await
            .map_err(internal)?
            .ok_or_else(|| McpError::invalid_params("no state found", None))?;
        json_result(&serde_json::json!(state))
    }

    #[tool(description = "List events in a layer, optionally filtered by entity and session range")]
    async fn get_timeline(
        &self,
        params: Parameters<GetTimelineParams>,
    ) -> Result<CallToolResult, McpError> {
        let GetTimelineParams {
            layer,
            entity,
            from_session,
            to_session,
        } = params.0;
        if layer.is_empty() {
            return Err(McpError::invalid_params("layer is required", None));
        }
        let events = self
            .store
            .get_timeline(
                &layer,
                entity.as_deref(),
                from_session.unwrap_or(0),
                to_session.unwrap_or(0),
            )
            .await
            .map_err(internal)?;
        json_result(&serde_json::json!({ "events": events }))
    }

    #[tool(
        description = "Fetch an entity together with its deduplicated relationships and timeline events"
    )]
    async fn check_consistency(
        &self,
        params: Parameters<CheckConsistencyParams>,
    ) -> Result<CallToolResult, McpError> {
        let CheckConsistencyParams {
            name,
            layer,
            entity_type,
            depth,
            direction,
        } = params.0;
        if name.is_empty() || layer.is_empty() {
            return Err(McpError::invalid_params("name and layer are required", None));
        }

        let entity = self
            .store
            .get_entity(&name, entity_type.as_deref())
            .await
            .map_err(internal)?
            .ok_or_else(|| McpError::invalid_params("entity not found", None))?;

        let rels = self
            .store
            .get_relationships(
                &name,
                None,
                direction.as_deref().unwrap_or(""),
                depth.unwrap_or(1),
            )
            .await
            .map_err(internal)?;

        let events = self
            .store
            .get_timeline(&layer, Some(&name), 0, 0)
            .await
            .map_err(internal)?;

        json_result(&serde_json::json!({
            "entity": entity,
            "relationships": dedup_relationships(rels),
            "events": events,
        }))
    }
}

// =============================================================================
// SERVER HANDLER
// =============================================================================

#[tool_handler]
impl ServerHandler for LoreServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Lorecraft knowledge graph server. Use tools to search lore, \
                 inspect entities and their relationships, list timelines, and \
                 project current state from campaign events."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// =============================================================================
// RESPONSE SHAPING
// =============================================================================

fn json_result(value: &serde_json::Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn internal(e: LoreError) -> McpError {
    McpError::internal_error(e.to_string(), None)
}

/// Drop repeat `(from, to, type)` edges while preserving discovery order.
fn dedup_relationships(rels: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    rels.into_iter()
        .filter(|rel| {
            seen.insert((
                rel.from.name.to_lowercase(),
                rel.to.name.to_lowercase(),
                rel.rel_type.clone(),
            ))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
