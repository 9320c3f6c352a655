//! # SQLite Backend
//!
//! File-backed (or in-memory) implementation of [`GraphStore`] on an
//! embedded SQLite database via sqlx.
//!
//! Mirrors the relational schema with SQLite types: integer primary keys,
//! JSON stored as text, tags as JSON-encoded text. Full-text search is an
//! external-content FTS5 virtual table over `(name, tags, body)` kept in
//! sync by three triggers. Connections run with `busy_timeout=30000`,
//! `journal_mode=WAL`, and `foreign_keys=ON`.
//!
//! User web-search queries are translated to FTS5 syntax by
//! [`convert_websearch_to_fts5`], a pure function with its own tests.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::LoreError;
use crate::layers::LayerDag;
use crate::store::{
    GraphStore, SEARCH_LIMIT, apply_consequences, check_rel_type, check_traversal, filter_str,
};
use crate::types::{
    Consequence, CurrentState, Direction, Entity, EntityInput, EntityRef, EntitySummary, Event,
    Properties, Relationship, SearchResult,
};

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    layer           TEXT NOT NULL,
    source_file     TEXT,
    source_hash     TEXT,
    tags            TEXT DEFAULT '[]',
    properties      TEXT DEFAULT '{}',
    body            TEXT DEFAULT '',
    is_placeholder  INTEGER DEFAULT 0,
    last_ingested   TEXT DEFAULT (datetime('now')),
    CONSTRAINT uq_entity_name_layer UNIQUE (name_normalized, layer)
);

CREATE TABLE IF NOT EXISTS edges (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    src_id   INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    dst_id   INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    CONSTRAINT uq_edge UNIQUE (src_id, dst_id, rel_type)
);

CREATE TABLE IF NOT EXISTS events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id     INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    layer         TEXT NOT NULL,
    session       INTEGER NOT NULL,
    date_in_world TEXT DEFAULT '',
    consequences  TEXT DEFAULT '[]',
    CONSTRAINT uq_event_entity UNIQUE (entity_id)
);

CREATE INDEX IF NOT EXISTS idx_entities_layer ON entities (layer);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities (entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_source_file ON entities (source_file);
CREATE INDEX IF NOT EXISTS idx_entities_type_layer ON entities (entity_type, layer);
CREATE INDEX IF NOT EXISTS idx_entities_name_norm ON entities (name_normalized);
CREATE INDEX IF NOT EXISTS idx_entities_placeholder ON entities (is_placeholder) WHERE is_placeholder = 1;
CREATE INDEX IF NOT EXISTS idx_edges_src ON edges (src_id);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges (dst_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges (rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_src_type ON edges (src_id, rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_dst_type ON edges (dst_id, rel_type);
CREATE INDEX IF NOT EXISTS idx_events_layer ON events (layer);
CREATE INDEX IF NOT EXISTS idx_events_layer_session ON events (layer, session);

CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name,
    tags,
    body,
    content=entities,
    content_rowid=id
);

CREATE TRIGGER IF NOT EXISTS entities_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, tags, body)
    VALUES (new.id, new.name, new.tags, new.body);
END;

CREATE TRIGGER IF NOT EXISTS entities_ad AFTER DELETE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, tags, body)
    VALUES ('delete', old.id, old.name, old.tags, old.body);
END;

CREATE TRIGGER IF NOT EXISTS entities_au AFTER UPDATE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, tags, body)
    VALUES ('delete', old.id, old.name, old.tags, old.body);
    INSERT INTO entities_fts(rowid, name, tags, body)
    VALUES (new.id, new.name, new.tags, new.body);
END;
"#;

/// The embedded-SQLite store.
pub struct SqliteGraph {
    pool: SqlitePool,
    dag: LayerDag,
}

impl std::fmt::Debug for SqliteGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraph").finish_non_exhaustive()
    }
}

impl SqliteGraph {
    /// Open a pool for the given `sqlite://` DSN.
    ///
    /// In-memory databases run on a single pinned connection; each pooled
    /// connection would otherwise see its own empty database.
    pub async fn connect(dsn: &str, dag: LayerDag) -> Result<Self, LoreError> {
        let driver_path = parse_dsn(dsn)?;
        let (path, pragmas) = split_query(&driver_path);
        let in_memory = path == ":memory:";

        let mut options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };
        options = options
            .busy_timeout(Duration::from_millis(30_000))
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        for (key, value) in pragmas {
            options = options.pragma(key, value);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        tracing::debug!(dsn, in_memory, "opened sqlite store");
        Ok(Self { pool, dag })
    }

    /// The underlying pool, exposed for tests.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_entity_properties(
        &self,
        name: &str,
        layer: &str,
    ) -> Result<Option<Properties>, LoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT properties FROM entities
             WHERE name_normalized = ? AND layer = ? AND is_placeholder = 0",
        )
        .bind(name.to_lowercase())
        .bind(layer)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((props,)) => Ok(Some(decode_properties(&props)?)),
        }
    }

    /// Events in `layer` whose `AFFECTS` edge points at `name`, ordered by
    /// `(session, id)`.
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
             WHERE target.name_normalized = ? AND ev.layer = ?
             ORDER BY ev.session ASC, ev.id ASC",
        )
        .bind(name.to_lowercase())
        .bind(layer)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_events(rows).await
    }

    async fn hydrate_events(&self, rows: Vec<SqliteRow>) -> Result<Vec<Event>, LoreError> {
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let entity_id: i64 = row.try_get(0)?;
            let consequences: String = row.try_get(5)?;
            events.push(Event {
                name: row.try_get(1)?,
                layer: row.try_get(2)?,
                session: row.try_get(3)?,
                date_in_world: row.try_get(4)?,
                participants: self.fetch_edge_names(entity_id, "INVOLVES").await?,
                location: self.fetch_edge_names(entity_id, "OCCURS_IN").await?,
                consequences: decode_consequences(&consequences)?,
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
             WHERE e.src_id = ? AND e.rel_type = ?",
        )
        .bind(entity_id)
        .bind(rel_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    async fn ensure_schema(&self) -> Result<(), LoreError> {
        sqlx::raw_sql(DDL).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_entity(&self, input: &EntityInput) -> Result<(), LoreError> {
        let tags_json = serde_json::to_string(&input.tags)?;
        let props_json = serde_json::to_string(&input.properties)?;

        let mut tx = self.pool.begin().await?;

        let (entity_id,): (i64,) = sqlx::query_as(
            "INSERT INTO entities (name, name_normalized, entity_type, layer, source_file,
                                   source_hash, tags, properties, body, is_placeholder, last_ingested)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, datetime('now'))
             ON CONFLICT (name_normalized, layer) DO UPDATE SET
                 name = excluded.name,
                 entity_type = excluded.entity_type,
                 source_file = excluded.source_file,
                 source_hash = excluded.source_hash,
                 tags = excluded.tags,
                 properties = excluded.properties,
                 body = excluded.body,
                 is_placeholder = 0,
                 last_ingested = datetime('now')
             RETURNING id",
        )
        .bind(&input.name)
        .bind(input.name.to_lowercase())
        .bind(&input.entity_type)
        .bind(&input.layer)
        .bind(&input.source_file)
        .bind(&input.source_hash)
        .bind(&tags_json)
        .bind(&props_json)
        .bind(&input.body)
        .fetch_one(&mut *tx)
        .await?;

        if input.entity_type.eq_ignore_ascii_case("event") {
            let (session, date_in_world, consequences) = event_columns(&input.properties);
            sqlx::query(
                "INSERT INTO events (entity_id, layer, session, date_in_world, consequences)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (entity_id) DO UPDATE SET
                     layer = excluded.layer,
                     session = excluded.session,
                     date_in_world = excluded.date_in_world,
                     consequences = excluded.consequences",
            )
            .bind(entity_id)
            .bind(&input.layer)
            .bind(session)
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
            sqlx::query_as("SELECT id FROM entities WHERE name_normalized = ? AND layer = ?")
                .bind(from_name.to_lowercase())
                .bind(from_layer)
                .fetch_one(&mut *tx)
                .await?;

        let (dst_id,): (i64,) = sqlx::query_as(
            "INSERT INTO entities (name, name_normalized, entity_type, layer, is_placeholder, tags, properties)
             VALUES (?, ?, '', ?, 1, '[]', '{}')
             ON CONFLICT (name_normalized, layer) DO UPDATE SET name = entities.name
             RETURNING id",
        )
        .bind(to_name)
        .bind(to_name.to_lowercase())
        .bind(to_layer)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO edges (src_id, dst_id, rel_type) VALUES (?, ?, ?)")
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
        if current_source_files.is_empty() {
            let result = sqlx::query(
                "DELETE FROM entities
                 WHERE layer = ?
                   AND source_file IS NOT NULL
                   AND source_file <> ''
                   AND is_placeholder = 0",
            )
            .bind(layer)
            .execute(&self.pool)
            .await?;
            return Ok(result.rows_affected());
        }

        let placeholders = vec!["?"; current_source_files.len()].join(", ");
        let sql = format!(
            "DELETE FROM entities
             WHERE layer = ?
               AND source_file IS NOT NULL
               AND source_file <> ''
               AND source_file NOT IN ({placeholders})
               AND is_placeholder = 0"
        );

        let mut query = sqlx::query(&sql).bind(layer);
        for file in current_source_files {
            query = query.bind(file);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn get_layer_hashes(&self, layer: &str) -> Result<HashMap<String, String>, LoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT source_file, source_hash FROM entities
             WHERE layer = ?
               AND source_file IS NOT NULL
               AND source_file <> ''
               AND is_placeholder = 0",
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
                "SELECT layer FROM entities WHERE name_normalized = ? AND layer = ? LIMIT 1",
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
             WHERE name_normalized = ?1
               AND (?2 = '' OR entity_type = ?2)
               AND is_placeholder = 0",
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
            sqlx::query_as("SELECT id FROM entities WHERE name_normalized = ?")
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

            let in_list = vec!["?"; frontier.len()].join(",");
            let sql = match direction {
                Direction::Outgoing => format!(
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE e.src_id IN ({in_list})
                       AND (? = '' OR e.rel_type = ?)"
                ),
                Direction::Incoming => format!(
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE e.dst_id IN ({in_list})
                       AND (? = '' OR e.rel_type = ?)"
                ),
                Direction::Both => format!(
                    "SELECT e.src_id, e.dst_id, e.rel_type,
                            s.name, s.entity_type, s.layer,
                            d.name, d.entity_type, d.layer
                     FROM edges e
                     JOIN entities s ON e.src_id = s.id
                     JOIN entities d ON e.dst_id = d.id
                     WHERE (e.src_id IN ({in_list}) OR e.dst_id IN ({in_list}))
                       AND (? = '' OR e.rel_type = ?)"
                ),
            };

            let mut query = sqlx::query(&sql);
            for id in &frontier {
                query = query.bind(id);
            }
            if direction == Direction::Both {
                for id in &frontier {
                    query = query.bind(id);
                }
            }
            query = query.bind(rel_filter).bind(rel_filter);

            let rows = query.fetch_all(&self.pool).await?;
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
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT name, entity_type, layer, tags
             FROM entities
             WHERE (?1 = '' OR entity_type = ?1)
               AND (?2 = '' OR layer = ?2)
               AND is_placeholder = 0
             ORDER BY name",
        )
        .bind(filter_str(entity_type))
        .bind(filter_str(layer))
        .fetch_all(&self.pool)
        .await?;

        let tag_filter = filter_str(tag);
        let mut summaries = Vec::with_capacity(rows.len());
        for (name, entity_type, layer, tags_json) in rows {
            let tags = decode_tags(&tags_json)?;
            if !tag_filter.is_empty()
                && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag_filter))
            {
                continue;
            }
            summaries.push(EntitySummary {
                name,
                entity_type,
                layer,
                tags,
            });
        }
        Ok(summaries)
    }

    async fn list_entities_with_properties(&self) -> Result<Vec<Entity>, LoreError> {
        let rows = sqlx::query(
            "SELECT name, entity_type, layer, source_file, source_hash, tags, properties, body
             FROM entities
             WHERE is_placeholder = 0
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

        let fts_query = convert_websearch_to_fts5(query);

        let rows = sqlx::query(
            "SELECT e.name, e.entity_type, e.layer, e.tags,
                    -bm25(entities_fts, 10.0, 4.0, 1.0) AS score,
                    snippet(entities_fts, 2, '**', '**', '...', 50) AS snippet
             FROM entities_fts
             JOIN entities e ON entities_fts.rowid = e.id
             WHERE entities_fts MATCH ?1
               AND (?2 = '' OR e.layer = ?2)
               AND (?3 = '' OR e.entity_type = ?3)
               AND e.is_placeholder = 0
             ORDER BY score DESC, e.name ASC
             LIMIT ?4",
        )
        .bind(&fts_query)
        .bind(filter_str(layer))
        .bind(filter_str(entity_type))
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let tags_json: String = row.try_get(3)?;
            results.push(SearchResult {
                name: row.try_get(0)?,
                entity_type: row.try_get(1)?,
                layer: row.try_get(2)?,
                tags: decode_tags(&tags_json)?,
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
             WHERE ev.layer = ?1
               AND (?2 = '' OR EXISTS (
                   SELECT 1 FROM edges ea
                   JOIN entities t ON ea.dst_id = t.id
                   WHERE ea.src_id = ent.id
                     AND ea.rel_type IN ('AFFECTS', 'INVOLVES')
                     AND t.name_normalized = ?2
               ))
               AND (?3 = 0 OR ev.session >= ?3)
               AND (?4 = 0 OR ev.session <= ?4)
             ORDER BY ev.session ASC, ev.id ASC",
        )
        .bind(layer)
        .bind(&entity_normalized)
        .bind(from_session)
        .bind(to_session)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_events(rows).await
    }

    async fn list_dangling_placeholders(&self) -> Result<Vec<EntitySummary>, LoreError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT name, entity_type, layer, tags FROM entities WHERE is_placeholder = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        summaries_from_rows(rows)
    }

    async fn list_orphaned_entities(&self) -> Result<Vec<EntitySummary>, LoreError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT e.name, e.entity_type, e.layer, e.tags FROM entities e
             WHERE NOT EXISTS (SELECT 1 FROM edges WHERE src_id = e.id OR dst_id = e.id)
               AND e.is_placeholder = 0",
        )
        .fetch_all(&self.pool)
        .await?;
        summaries_from_rows(rows)
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
// DSN PARSING
// =============================================================================

/// Parse a `sqlite://` DSN into the driver path.
///
/// `:memory:` stays as-is; absolute paths pass through; relative paths
/// without a `./` prefix get one; any `?query` suffix is preserved
/// unchanged and the path portion is URL-decoded.
pub fn parse_dsn(dsn: &str) -> Result<String, LoreError> {
    let Some(rest) = dsn.strip_prefix("sqlite://") else {
        return Err(LoreError::ConfigInvalid(
            "invalid sqlite DSN scheme, expected sqlite://".into(),
        ));
    };

    if rest == ":memory:" {
        return Ok(":memory:".into());
    }
    if rest.starts_with('/') || rest.starts_with("./") {
        return Ok(rest.to_string());
    }

    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut path = url_decode(path)?;
    if !path.starts_with('/') && !path.starts_with("./") {
        path = format!("./{path}");
    }

    match query {
        Some(query) => Ok(format!("{path}?{query}")),
        None => Ok(path),
    }
}

/// Split a parsed driver path into `(path, pragma pairs)`.
fn split_query(driver_path: &str) -> (&str, Vec<(String, String)>) {
    match driver_path.split_once('?') {
        None => (driver_path, Vec::new()),
        Some((path, query)) => {
            let pragmas = query
                .split('&')
                .filter_map(|pair| {
                    let (key, value) = pair.split_once('=')?;
                    if key.is_empty() {
                        return None;
                    }
                    Some((key.to_string(), value.to_string()))
                })
                .collect();
            (path, pragmas)
        }
    }
}

fn url_decode(input: &str) -> Result<String, LoreError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        LoreError::ConfigInvalid(format!("invalid percent escape in path: {input}"))
                    })?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out)
        .map_err(|_| LoreError::ConfigInvalid(format!("path is not valid UTF-8: {input}")))
}

// =============================================================================
// WEB-SEARCH -> FTS5 TRANSLATION
// =============================================================================

/// Translate a user web-search query into FTS5 match syntax.
///
/// Double-quoted phrases are preserved; bare tokens get an implicit `AND`;
/// literal `AND`/`OR`/`NOT` pass through; a leading `-` negates; a trailing
/// `*` prefix marker is preserved.
pub fn convert_websearch_to_fts5(query: &str) -> String {
    let mut result = String::new();
    let mut current = String::new();
    let mut in_quote = false;

    fn last_word(s: &str) -> &str {
        s.split_whitespace().next_back().unwrap_or("")
    }

    fn flush_token(result: &mut String, current: &mut String) {
        let token = std::mem::take(current);
        if token.is_empty() {
            return;
        }

        let upper = token.to_uppercase();
        if matches!(upper.as_str(), "AND" | "OR" | "NOT") {
            if !result.is_empty() {
                result.push(' ');
            }
            result.push_str(&upper);
            return;
        }

        if !result.is_empty() {
            match last_word(result) {
                "AND" | "OR" | "NOT" | "" => result.push(' '),
                _ => result.push_str(" AND "),
            }
        }

        if let Some(negated) = token.strip_prefix('-')
            && !negated.is_empty()
        {
            result.push_str("NOT ");
            result.push_str(negated);
        } else {
            result.push_str(&token);
        }
    }

    for ch in query.chars() {
        match ch {
            '"' => {
                if in_quote {
                    in_quote = false;
                    let phrase = std::mem::take(&mut current);
                    if !phrase.is_empty() {
                        if !result.is_empty() {
                            result.push_str(" AND ");
                        }
                        result.push('"');
                        result.push_str(&phrase);
                        result.push('"');
                    }
                } else {
                    flush_token(&mut result, &mut current);
                    in_quote = true;
                }
            }
            _ if in_quote => current.push(ch),
            ' ' | '\t' => flush_token(&mut result, &mut current),
            _ => current.push(ch),
        }
    }
    flush_token(&mut result, &mut current);

    result
}

// =============================================================================
// ROW DECODING
// =============================================================================

fn entity_from_row(row: &SqliteRow) -> Result<Entity, LoreError> {
    let tags_json: String = row.try_get(5)?;
    let props_json: String = row.try_get(6)?;
    Ok(Entity {
        name: row.try_get(0)?,
        entity_type: row.try_get(1)?,
        layer: row.try_get(2)?,
        source_file: row.try_get::<Option<String>, _>(3)?.unwrap_or_default(),
        source_hash: row.try_get::<Option<String>, _>(4)?.unwrap_or_default(),
        tags: decode_tags(&tags_json)?,
        properties: decode_properties(&props_json)?,
        body: row.try_get(7)?,
    })
}

fn summaries_from_rows(
    rows: Vec<(String, String, String, String)>,
) -> Result<Vec<EntitySummary>, LoreError> {
    rows.into_iter()
        .map(|(name, entity_type, layer, tags_json)| {
            Ok(EntitySummary {
                name,
                entity_type,
                layer,
                tags: decode_tags(&tags_json)?,
            })
        })
        .collect()
}

fn decode_tags(json: &str) -> Result<Vec<String>, LoreError> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

fn decode_properties(json: &str) -> Result<Properties, LoreError> {
    if json.is_empty() {
        return Ok(Properties::new());
    }
    Ok(serde_json::from_str(json)?)
}

fn decode_consequences(json: &str) -> Result<Vec<Consequence>, LoreError> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Event-table columns projected from an event entity's properties.
pub(crate) fn event_columns(properties: &Properties) -> (i64, String, String) {
    let session = properties
        .get("session")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    let date_in_world = properties
        .get("date_in_world")
        .or_else(|| properties.get("date"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_string();
    let consequences = properties
        .get("consequences_json")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("[]")
        .to_string();
    (session, date_in_world, consequences)
}

fn row_to_map(row: &SqliteRow) -> Result<Properties, LoreError> {
    let mut map = Properties::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(i)?)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                "BLOB" => serde_json::Value::String(hex::encode(row.try_get::<Vec<u8>, _>(i)?)),
                _ => serde_json::Value::String(row.try_get::<String, _>(i)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_memory() {
        assert_eq!(parse_dsn("sqlite://:memory:").unwrap(), ":memory:");
    }

    #[test]
    fn dsn_absolute_path_passthrough() {
        assert_eq!(
            parse_dsn("sqlite:///var/lib/lore.db").unwrap(),
            "/var/lib/lore.db"
        );
    }

    #[test]
    fn dsn_relative_gets_prefix() {
        assert_eq!(parse_dsn("sqlite://lore.db").unwrap(), "./lore.db");
        assert_eq!(parse_dsn("sqlite://./lore.db").unwrap(), "./lore.db");
        assert_eq!(
            parse_dsn("sqlite://data/lore.db").unwrap(),
            "./data/lore.db"
        );
    }

    #[test]
    fn dsn_query_preserved() {
        assert_eq!(
            parse_dsn("sqlite://lore.db?cache_size=-2000").unwrap(),
            "./lore.db?cache_size=-2000"
        );
    }

    #[test]
    fn dsn_path_url_decoded() {
        assert_eq!(
            parse_dsn("sqlite://my%20world.db").unwrap(),
            "./my world.db"
        );
    }

    #[test]
    fn dsn_wrong_scheme_rejected() {
        assert!(parse_dsn("postgres://localhost/db").is_err());
    }

    #[test]
    fn split_query_extracts_pragmas() {
        let (path, pragmas) = split_query("./lore.db?cache_size=-2000&synchronous=NORMAL");
        assert_eq!(path, "./lore.db");
        assert_eq!(
            pragmas,
            vec![
                ("cache_size".to_string(), "-2000".to_string()),
                ("synchronous".to_string(), "NORMAL".to_string()),
            ]
        );
    }

    #[test]
    fn fts_simple_term() {
        assert_eq!(convert_websearch_to_fts5("dragon"), "dragon");
    }

    #[test]
    fn fts_multiple_terms() {
        assert_eq!(convert_websearch_to_fts5("red dragon"), "red AND dragon");
    }

    #[test]
    fn fts_explicit_and() {
        assert_eq!(
            convert_websearch_to_fts5("dragon AND sword"),
            "dragon AND sword"
        );
    }

    #[test]
    fn fts_explicit_or() {
        assert_eq!(
            convert_websearch_to_fts5("dragon OR sword"),
            "dragon OR sword"
        );
    }

    #[test]
    fn fts_negation() {
        assert_eq!(
            convert_websearch_to_fts5("dragon -fire"),
            "dragon AND NOT fire"
        );
    }

    #[test]
    fn fts_phrase() {
        assert_eq!(convert_websearch_to_fts5("\"red dragon\""), "\"red dragon\"");
    }

    #[test]
    fn fts_phrase_with_other_term() {
        assert_eq!(
            convert_websearch_to_fts5("\"red dragon\" castle"),
            "\"red dragon\" AND castle"
        );
    }

    #[test]
    fn fts_prefix_search() {
        assert_eq!(convert_websearch_to_fts5("dragon*"), "dragon*");
    }

    #[test]
    fn fts_complex_query() {
        assert_eq!(
            convert_websearch_to_fts5("\"red dragon\" -fire castle OR tower"),
            "\"red dragon\" AND NOT fire AND castle OR tower"
        );
    }

    #[test]
    fn fts_not_operator() {
        assert_eq!(
            convert_websearch_to_fts5("dragon NOT fire"),
            "dragon NOT fire"
        );
    }

    #[test]
    fn event_columns_read_session_date_consequences() {
        let mut props = Properties::new();
        props.insert("session".into(), serde_json::json!(3));
        props.insert("date".into(), serde_json::json!("12 Harvestmoon"));
        props.insert(
            "consequences_json".into(),
            serde_json::json!("[{\"entity\":\"w\",\"property\":\"p\",\"value\":1}]"),
        );
        let (session, date, consequences) = event_columns(&props);
        assert_eq!(session, 3);
        assert_eq!(date, "12 Harvestmoon");
        assert!(consequences.contains("\"entity\""));
    }

    #[test]
    fn event_columns_defaults() {
        let (session, date, consequences) = event_columns(&Properties::new());
        assert_eq!(session, 0);
        assert!(date.is_empty());
        assert_eq!(consequences, "[]");
    }
}
