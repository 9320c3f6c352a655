//! # PostgreSQL Backend
//!
//! Relational implementation of [`GraphStore`] on a PostgreSQL pool.
//!
//! Entities carry a weighted `tsvector` search column (name weight A with
//! the `simple` configuration, tags weight B, body weight C, both English);
//! search uses `websearch_to_tsquery` with `ts_rank` scores and
//! `ts_headline` snippets. Tags are a native `TEXT[]`, properties and
//! consequences are JSONB.
//!
//! Relationship traversal is the same application-side breadth-first
//! frontier walk as the embedded backend, with `= ANY($n)` frontier sets.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::LoreError;
use crate::layers::LayerDag;
use crate::store::sqlite::event_columns;
use crate::store::{
    GraphStore, SEARCH_LIMIT, apply_consequences, check_rel_type, check_traversal, filter_str,
};
use crate::types::{
    Consequence, CurrentState, Direction, Entity, EntityInput, EntityRef, EntitySummary, Event,
    Properties, Relationship, SearchResult,
};

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id              BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    layer           TEXT NOT NULL,
    source_file     TEXT,
    source_hash     TEXT,
    tags            TEXT[] DEFAULT '{}',
    properties      JSONB DEFAULT '{}',
    body            TEXT DEFAULT '',
    is_placeholder  BOOLEAN DEFAULT FALSE,
    last_ingested   TIMESTAMPTZ DEFAULT now(),
    CONSTRAINT uq_entity_name_layer UNIQUE (name_normalized, layer)
);

ALTER TABLE entities ADD COLUMN IF NOT EXISTS search_vector TSVECTOR;

CREATE TABLE IF NOT EXISTS edges (
    id       BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    src_id   BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    dst_id   BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    CONSTRAINT uq_edge UNIQUE (src_id, dst_id, rel_type)
);

CREATE TABLE IF NOT EXISTS events (
    id            BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    entity_id     BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    layer         TEXT NOT NULL,
    session       INTEGER NOT NULL,
    date_in_world TEXT DEFAULT '',
    consequences  JSONB DEFAULT '[]',
    CONSTRAINT uq_event_entity UNIQUE (entity_id)
);

CREATE INDEX IF NOT EXISTS idx_entities_search ON entities USING GIN (search_vector);
CREATE INDEX IF NOT EXISTS idx_entities_layer ON entities (layer);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities (entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_source_file ON entities (source_file);
CREATE INDEX IF NOT EXISTS idx_entities_type_layer ON entities (entity_type, layer);
CREATE INDEX IF NOT EXISTS idx_entities_name_norm ON entities (name_normalized);
CREATE INDEX IF NOT EXISTS idx_entities_placeholder ON entities (is_placeholder) WHERE is_placeholder = TRUE;
CREATE INDEX IF NOT EXISTS idx_entities_tags ON entities USING GIN (tags);
CREATE INDEX IF NOT EXISTS idx_edges_src ON edges (src_id);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges (dst_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges (rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_src_type ON edges (src_id, rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_dst_type ON edges (dst_id, rel_type);
CREATE INDEX IF NOT EXISTS idx_events_layer ON events (layer);
CREATE INDEX IF NOT EXISTS idx_events_layer_session ON events (layer, session);
"#;

/// The PostgreSQL store.
pub struct PostgresGraph {
    pool: PgPool,
    dag: LayerDag,
}

impl std::fmt::Debug for PostgresGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresGraph").finish_non_exhaustive()
    }
}

impl PostgresGraph {
    /// Connect a pool to the given `postgres://` DSN.
    pub async fn connect(dsn: &str, dag: LayerDag) -> Result<Self, LoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(dsn)
            .await?;
        tracing::debug!("opened postgres store");
        Ok(Self { pool, dag })
    }

    /// The underlying pool, exposed for tests.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_entity_properties(
        &self,
        name: &str,
        layer: &str,
    ) -> Result<Option<Properties>, LoreError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT properties FROM entities
             WHERE name_normalized = $1 AND layer = $2 AND is_placeholder = FALSE",
        )
        .bind(name.to_lowercase())
        .bind(layer)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((value,)) => Ok(Some(json_object(value))),
        }
    }

    async fn fetch_events_for_entity(
        &self,
        name: &str,
        layer: &str,
    ) -> Result<Vec<Event>, LoreError> {
        let rows = sqlx::query(
            "SELECT ent.id, ent.name, ev.layer, ev.session, ev.date_in_world, ev.consequences
             FROM events ev
             JOIN entities ent ON ev.entity_id = ent.id
             JOIN edges ed ON ed.src_id = ent.id AND ed.rel_type = 'AFFECTS'
             JOIN entities target ON ed.dst_id = target.id
             WHERE target.name_normalized = $1 AND ev.layer = $2
             ORDER BY ev.session ASC, ev.id ASC",
        )
        .bind(name.to_lowercase())
        .bind(layer)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_events(rows).await
    }

    async fn hydrate_events(&self, rows: Vec<PgRow>) -> Result<Vec<Event>, LoreError> {
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let entity_id: i64 = row.try_get(0)?;
            let session: i32 = row.try_get(3)?;
            let consequences: serde_json::Value = row.try_get(5)?;
            events.push(Event {
                name: row.try_get(1)?,
                layer: row.try_get(2)?,
                session: i64::from(session),
                date_in_world: row.try_get(4)?,
                participants: self.fetch_edge_names(entity_id, "INVOLVES").await?,
                location: self.fetch_edge_names(entity_id, "OCCURS_IN").await?,
                consequences: serde_json::from_value::<Vec<Consequence>>(consequences)?,
            });
        }
        Ok(events)
    }

    async fn fetch_edge_names(
        &self,
        entity_id: i64,
        rel_type: &str,
    ) -> Result<Vec<String>, LoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT t.name FROM edges e
             JOIN entities t ON e.dst_id = t.id
             WHERE e.src_id = $1 AND e.rel_type = $2",
        )
        .bind(entity_id)
        .bind(rel_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[async_trait]
impl GraphStore for PostgresGraph {
    async fn ensure_schema(&self) -> Result<(), LoreError> {
        sqlx::raw_sql(DDL).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_entity(&self, input: &EntityInput) -> Result<(), LoreError> {
        let props = serde_json::Value::Object(input.properties.clone());

        let mut tx = self.pool.begin().await?;

        let (entity_id,): (i64,) = sqlx::query_as(
            "INSERT INTO entities (name, name_normalized, entity_type, layer, source_file,
                                   source_hash, tags, properties, body, is_placeholder,
                                   last_ingested, search_vector)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, now(),
                 setweight(to_tsvector('simple', coalesce($1, '')), 'A') ||
                 setweight(to_tsvector('english', coalesce(array_to_string($7, ' '), '')), 'B') ||
                 setweight(to_tsvector('english', coalesce($9, '')), 'C')
             )
             ON CONFLICT (name_normalized, layer) DO UPDATE SET
                 name = EXCLUDED.name,
                 entity_type = EXCLUDED.entity_type,
                 source_file = EXCLUDED.source_file,
                 source_hash = EXCLUDED.source_hash,
                 tags = EXCLUDED.tags,
                 properties = EXCLUDED.properties,
                 body = EXCLUDED.body,
                 is_placeholder = FALSE,
                 last_ingested = now(),
                 search_vector = EXCLUDED.search_vector
             RETURNING id",
        )
        .bind(&input.name)
        .bind(input.name.to_lowercase())
        .bind(&input.entity_type)
        .bind(&input.layer)
        .bind(&input.source_file)
        .bind(&input.source_hash)
        .bind(&input.tags)
        .bind(&props)
        .bind(&input.body)
        .fetch_one(&mut *tx)
        .await?;

        if input.entity_type.eq_ignore_ascii_case("event") {
            let (session, date_in_world, consequences) = event_columns(&input.properties);
            let consequences: serde_json::Value =
                serde_json::from_str(&consequences).unwrap_or_else(|_| serde_json::json!([]));
            sqlx::query(
                "INSERT INTO events (entity_id, layer, session, date_in_world, consequences)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (entity_id) DO UPDATE SET
                     layer = EXCLUDED.layer,
                     session = EXCLUDED.session,
                     date_in_world = EXCLUDED.date_in_world,
                     consequences = EXCLUDED.consequences",
            )
            .bind(entity_id)
            .bind(&input.layer)
            .bind(i32::try_from(session).unwrap_or(0))
            .bind(&date_in_world)
            .bind(&consequences)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        from_name: &str,
        from_layer: &str,
        to_name: &str,
        to_layer: &str,
        rel_type: &str,
    ) -> Result<(), LoreError> {
        check_rel_type(rel_type)?;

        let mut tx = self.pool.begin().await?;

        let (src_id,): (i64,) =
            sqlx::query_as("SELECT id FROM entities WHERE name_normalized = $1 AND layer = $2")
                .bind(from_name.to_lowercase())
                .bind(from_layer)
                .fetch_one(&mut *tx)
                .await?;

        let (dst_id,): (i64,) = sqlx::query_as(
            "INSERT INTO entities (name, name_normalized, entity_type, layer, is_placeholder)
             VALUES ($1, $2, '', $3, TRUE)
             ON CONFLICT (name_normalized, layer) DO UPDATE SET name = entities.name
             RETURNING id",
        )
        .bind(to_name)
        .bind(to_name.to_lowercase())
        .bind(to_layer)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO edges (src_id, dst_id, rel_type) VALUES ($1, $2, $3)
             ON CONFLICT (src_id, dst_id, rel_type) DO NOTHING",
        )
        .bind(src_id)
        .bind(dst_id)
        .bind(rel_type)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_stale_nodes(
        &self,
        layer: &str,
        current_source_files: &[String],
    ) -> Result<u64, LoreError> {
        let result = sqlx::query(
            "DELETE FROM entities
             WHERE layer = $1
               AND source_file IS NOT NULL
               AND source_file <> ''
               AND NOT (source_file = ANY($2))
               AND is_placeholder = FALSE",
        )
        .bind(layer)
        .bind(current_source_files)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_layer_hashes(&self, layer: &str) -> Result<HashMap<String, String>, LoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT source_file, source_hash FROM entities
             WHERE layer = $1
               AND source_file IS NOT NULL
               AND source_file <> ''
               AND is_placeholder = FALSE",
        )
        .bind(layer)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn find_entity_layer(
        &self,
        name: &str,
        layers: &[String],
    ) -> Result<Option<String>, LoreError> {
        let name_normalized = name.to_lowercase();
        for layer in layers {
            let found: Option<(String,)> = sqlx::query_as(
                "SELECT layer FROM entities WHERE name_normalized = $1 AND layer = $2 LIMIT 1",
            )
            .bind(&name_normalized)
            .bind(layer)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((layer,)) = found {
                return Ok(Some(layer));
            }
        }
        Ok(None)
    }

    async fn get_entity(
        &self,
        name: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<Entity>, LoreError> {
        let rows = sqlx::query(
            "SELECT name, entity_type, layer, source_file, source_hash, tags, properties, body
             FROM entities
             WHERE name_normalized = $1
               AND ($2 = '' OR entity_type = $2)
               AND is_placeholder = FALSE",
        )
        .bind(name.to_lowercase())
        .bind(filter_str(entity_type))
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(entity_from_row(&row)?);
        }

        match entities.len() {
            0 => Ok(None),
            1 => Ok(Some(entities.remove(0))),
            _ => Err(LoreError::Ambiguous(name.to_string())),
        }
    }

    async fn get_relationships(
        &self,
        name: &str,
        rel_type: Option<&str>,
        direction: &str,
        depth: i64,
    ) -> Result<Vec<Relationship>, LoreError> {
        let direction = check_traversal(rel_type, direction, depth)?;
        let rel_filter = filter_str(rel_type);

        let (start_id,): (i64,) =
            sqlx::query_as("SELECT id FROM entities WHERE name_normalized = $1")
                .bind(name.to_lowercase())
                .fetch_one(&self.pool)
                .await?;

        let mut visited: HashSet<i64> = HashSet::from([start_id]);
        let mut frontier = vec![start_id];
        let mut results = Vec::new();

        for current_depth in 1..=depth {
            if frontier.is_empty() {
                break;
            }

            let sql = match direction {
                Direction::Outgoing => {
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE e.src_id = ANY($1)
                       AND ($2 = '' OR e.rel_type = $2)"
                }
                Direction::Incoming => {
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE e.dst_id = ANY($1)
                       AND ($2 = '' OR e.rel_type = $2)"
                }
                Direction::Both => {
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE (e.src_id = ANY($1) OR e.dst_id = ANY($1))
                       AND ($2 = '' OR e.rel_type = $2)"
                }
            };

            let rows = sqlx::query(sql)
                .bind(&frontier)
                .bind(rel_filter)
                .fetch_all(&self.pool)
                .await?;

            let frontier_set: HashSet<i64> = frontier.iter().copied().collect();
            let mut next_frontier = Vec::new();

            for row in rows {
                let src_id: i64 = row.try_get(0)?;
                let dst_id: i64 = row.try_get(1)?;
                let edge_type: String = row.try_get(2)?;
                let from = EntityRef {
                    name: row.try_get(3)?,
                    entity_type: row.try_get(4)?,
                    layer: row.try_get(5)?,
                };
                let to = EntityRef {
                    name: row.try_get(6)?,
                    entity_type: row.try_get(7)?,
                    layer: row.try_get(8)?,
                };

                let outgoing = frontier_set.contains(&src_id);
                let other_id = if outgoing { dst_id } else { src_id };
                if visited.contains(&other_id) {
                    continue;
                }

                let rel = if outgoing {
                    Relationship {
                        from,
                        to,
                        rel_type: edge_type,
                        direction: Direction::Outgoing,
                        depth: current_depth as u32,
                    }
                } else {
                    Relationship {
                        from: to,
                        to: from,
                        rel_type: edge_type,
                        direction: Direction::Incoming,
                        depth: current_depth as u32,
                    }
                };

                results.push(rel);
                next_frontier.push(other_id);
                visited.insert(other_id);
            }

            frontier = next_frontier;
        }

        Ok(results)
    }

    async fn list_entities(
        &self,
        entity_type: Option<&str>,
        layer: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<EntitySummary>, LoreError> {
        let rows: Vec<(String, String, String, Vec<String>)> = sqlx::query_as(
            "SELECT name, entity_type, layer, tags
             FROM entities
             WHERE ($1 = '' OR entity_type = $1)
               AND ($2 = '' OR layer = $2)
               AND ($3 = '' OR $3 = ANY(tags))
               AND is_placeholder = FALSE
             ORDER BY name",
        )
        .bind(filter_str(entity_type))
        .bind(filter_str(layer))
        .bind(filter_str(tag))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, entity_type, layer, tags)| EntitySummary {
                name,
                entity_type,
                layer,
                tags,
            })
            .collect())
    }

    async fn list_entities_with_properties(&self) -> Result<Vec<Entity>, LoreError> {
        let rows = sqlx::query(
            "SELECT name, entity_type, layer, source_file, source_hash, tags, properties, body
             FROM entities
             WHERE is_placeholder = FALSE
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(entity_from_row(&row)?);
        }
        Ok(entities)
    }

    async fn search(
        &self,
        query: &str,
        layer: Option<&str>,
        entity_type: Option<&str>,
    ) -> Result<Vec<SearchResult>, LoreError> {
        if query.trim().is_empty() {
            return Err(LoreError::EmptyQuery);
        }

        let rows = sqlx::query(
            "SELECT name, entity_type, layer, tags,
                 ts_rank(search_vector, websearch_to_tsquery('english', $1))::float8 AS score,
                 CASE WHEN body <> '' THEN
                     ts_headline('english', body, websearch_to_tsquery('english', $1),
                         'MaxFragments=2, MaxWords=40, MinWords=20, StartSel=**, StopSel=**')
                 ELSE '' END AS snippet
             FROM entities
             WHERE search_vector @@ websearch_to_tsquery('english', $1)
               AND ($2 = '' OR layer = $2)
               AND ($3 = '' OR entity_type = $3)
               AND is_placeholder = FALSE
             ORDER BY score DESC, name ASC
             LIMIT $4",
        )
        .bind(query)
        .bind(filter_str(layer))
        .bind(filter_str(entity_type))
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(SearchResult {
                name: row.try_get(0)?,
                entity_type: row.try_get(1)?,
                layer: row.try_get(2)?,
                tags: row.try_get(3)?,
                score: row.try_get(4)?,
                snippet: row.try_get(5)?,
            });
        }
        Ok(results)
    }

    async fn get_current_state(
        &self,
        name: &str,
        layer: &str,
    ) -> Result<Option<CurrentState>, LoreError> {
        if layer.trim().is_empty() {
            return Err(LoreError::UnknownLayer(layer.to_string()));
        }

        let base_layer = self.dag.resolve_canonical(layer)?.to_string();
        let Some(base_properties) = self.fetch_entity_properties(name, &base_layer).await? else {
            return Ok(None);
        };

        let events = self.fetch_events_for_entity(name, layer).await?;

        let mut current_properties = base_properties.clone();
        for event in &events {
            apply_consequences(&mut current_properties, &event.consequences, name);
        }

        Ok(Some(CurrentState {
            base_properties,
            events,
            current_properties,
        }))
    }

    async fn get_timeline(
        &self,
        layer: &str,
        entity: Option<&str>,
        from_session: i64,
        to_session: i64,
    ) -> Result<Vec<Event>, LoreError> {
        if layer.trim().is_empty() {
            return Err(LoreError::UnknownLayer(layer.to_string()));
        }

        let entity_normalized = filter_str(entity).trim().to_lowercase();

        let rows = sqlx::query(
            "SELECT ent.id, ent.name, ev.layer, ev.session, ev.date_in_world, ev.consequences
             FROM events ev
             JOIN entities ent ON ev.entity_id = ent.id
             WHERE ev.layer = $1
               AND ($2 = '' OR EXISTS (
                   SELECT 1 FROM edges ea
                   JOIN entities t ON ea.dst_id = t.id
                   WHERE ea.src_id = ent.id
                     AND ea.rel_type IN ('AFFECTS', 'INVOLVES')
                     AND t.name_normalized = $2
               ))
               AND ($3 = 0 OR ev.session >= $3)
               AND ($4 = 0 OR ev.session <= $4)
             ORDER BY ev.session ASC, ev.id ASC",
        )
        .bind(layer)
        .bind(&entity_normalized)
        .bind(i32::try_from(from_session).unwrap_or(0))
        .bind(i32::try_from(to_session).unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_events(rows).await
    }

    async fn list_dangling_placeholders(&self) -> Result<Vec<EntitySummary>, LoreError> {
        let rows: Vec<(String, String, String, Vec<String>)> = sqlx::query_as(
            "SELECT name, entity_type, layer, tags FROM entities WHERE is_placeholder = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries_from_rows(rows))
    }

    async fn list_orphaned_entities(&self) -> Result<Vec<EntitySummary>, LoreError> {
        let rows: Vec<(String, String, String, Vec<String>)> = sqlx::query_as(
            "SELECT e.name, e.entity_type, e.layer, e.tags FROM entities e
             WHERE NOT EXISTS (SELECT 1 FROM edges WHERE src_id = e.id OR dst_id = e.id)
               AND e.is_placeholder = FALSE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries_from_rows(rows))
    }

    async fn list_cross_layer_violations(&self) -> Result<Vec<EntitySummary>, LoreError> {
        Ok(Vec::new())
    }

    async fn run_sql(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Vec<Properties>, LoreError> {
        let mut q = sqlx::query(query);
        for param in params {
            q = q.bind(param);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(row_to_map(row)?);
        }
        Ok(results)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// ROW DECODING
// =============================================================================

fn entity_from_row(row: &PgRow) -> Result<Entity, LoreError> {
    let properties: serde_json::Value = row.try_get(6)?;
    Ok(Entity {
        name: row.try_get(0)?,
        entity_type: row.try_get(1)?,
        layer: row.try_get(2)?,
        source_file: row.try_get::<Option<String>, _>(3)?.unwrap_or_default(),
        source_hash: row.try_get::<Option<String>, _>(4)?.unwrap_or_default(),
        tags: row.try_get(5)?,
        properties: json_object(properties),
        body: row.try_get(7)?,
    })
}

fn summaries_from_rows(rows: Vec<(String, String, String, Vec<String>)>) -> Vec<EntitySummary> {
    rows.into_iter()
        .map(|(name, entity_type, layer, tags)| EntitySummary {
            name,
            entity_type,
            layer,
            tags,
        })
        .collect()
}

fn json_object(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn row_to_map(row: &PgRow) -> Result<Properties, LoreError> {
    let mut map = Properties::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            match raw.type_info().name() {
                "INT2" => serde_json::Value::from(row.try_get::<i16, _>(i)?),
                "INT4" => serde_json::Value::from(row.try_get::<i32, _>(i)?),
                "INT8" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
                "FLOAT4" => serde_json::Number::from_f64(f64::from(row.try_get::<f32, _>(i)?))
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                "FLOAT8" => serde_json::Number::from_f64(row.try_get::<f64, _>(i)?)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                "BOOL" => serde_json::Value::from(row.try_get::<bool, _>(i)?),
                "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(i)?,
                "TEXT[]" | "VARCHAR[]" => {
                    serde_json::Value::from(row.try_get::<Vec<String>, _>(i)?)
                }
                // Timestamps and other exotic types fall back to text when
                // the driver allows it, otherwise null.
                _ => row
                    .try_get::<String, _>(i)
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}
