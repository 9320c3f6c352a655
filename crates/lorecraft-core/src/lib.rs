//! # lorecraft-core
//!
//! The layered knowledge graph engine - THE LOGIC.
//!
//! This crate maintains a typed, layered knowledge graph synchronised from a
//! tree of markdown source files and exposes it for programmatic
//! consultation. Markdown frontmatter declares entities; named layers form a
//! DAG in which canonical layers hold the authoritative setting and derived
//! layers hold events whose consequences project a current state over the
//! canonical baseline.
//!
//! ## Subsystems
//!
//! - **Ingestion pipeline** ([`ingest`]) - walk, hash, parse, filter,
//!   reconcile. Incremental by content hash, with placeholder creation and
//!   stale-node deletion.
//! - **Layered graph store** ([`store`]) - one contract, two backends
//!   (PostgreSQL and embedded SQLite with FTS5) with identical semantics.
//! - **State projection** - canonical-ancestor resolution plus ordered
//!   event-consequence application, served through the store contract.
//!
//! The parser, schema registry, and layer DAG are pure and never block; the
//! store operations are futures over a shared connection pool.

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod ingest;
pub mod layers;
pub mod parser;
pub mod schema;
pub mod store;
pub mod types;
pub mod validate;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use error::LoreError;
pub use types::{
    Consequence, CurrentState, Direction, Entity, EntityInput, EntityRef, EntitySummary, Event,
    Properties, Relationship, SearchResult,
};

// =============================================================================
// RE-EXPORTS: Configuration & Schema
// =============================================================================

pub use config::{DatabaseConfig, Layer, ProjectConfig, load_project_config};
pub use layers::LayerDag;
pub use schema::{EntityType, FieldMapping, Property, RelationshipType, Schema, load_schema};

// =============================================================================
// RE-EXPORTS: Parser, Store, Pipeline
// =============================================================================

pub use ingest::{IngestOptions, IngestResult};
pub use parser::Document;
pub use store::{GraphStore, PostgresGraph, SqliteGraph, open_store};
pub use validate::{Issue, Report, Severity};
