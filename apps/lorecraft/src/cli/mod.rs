//! # CLI Module
//!
//! Command-line surface of lorecraft.
//!
//! ## Available Commands
//!
//! - `ingest` - synchronise the graph with the markdown source tree
//! - `serve` - start the MCP tool server over stdio
//! - `validate` - run consistency checks against the database
//! - `query` - entity, relations, list, search, state, and raw SQL queries
//! - `init` - scaffold `config.yaml` and `schema.yaml`
//! - `version` - print the version

mod commands;
mod templates;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lorecraft_core::LoreError;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Graph-backed knowledge management system.
///
/// Markdown files with YAML frontmatter become a typed, layered knowledge
/// graph; campaign events project a current state over the canonical setting.
#[derive(Parser, Debug)]
#[command(name = "lorecraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the project configuration
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Path to the schema definition
    #[arg(short, long, global = true, default_value = "schema.yaml")]
    pub schema: PathBuf,

    /// Abort any command after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronise the graph with markdown source files
    Ingest {
        /// Force full re-ingestion (ignore incremental hashes)
        #[arg(long)]
        full: bool,
    },

    /// Start the MCP tool server over stdio
    Serve,

    /// Run consistency checks against the database
    Validate,

    /// Query the database from the CLI
    #[command(subcommand)]
    Query(QueryCommands),

    /// Scaffold a new lorecraft project
    Init {
        /// Project name
        #[arg(long)]
        name: String,

        /// Schema template name
        #[arg(long, default_value = "fantasy-rpg")]
        template: String,
    },

    /// Print the version
    Version,
}

/// Query subcommands.
#[derive(Subcommand, Debug)]
pub enum QueryCommands {
    /// Execute a raw SQL query
    Sql {
        /// The SQL statement, with positional $1…$N parameters
        stmt: String,

        /// Query parameter as key=value (repeatable, keys are 1…N)
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Execute a raw Cypher query (graph backends only)
    Cypher {
        /// The Cypher statement
        stmt: String,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Display an entity and its properties
    Entity {
        name: String,

        /// Entity type to disambiguate
        #[arg(long = "type")]
        entity_type: Option<String>,
    },

    /// Display relationships for an entity
    Relations {
        name: String,

        /// Relationship type to filter
        #[arg(long = "type")]
        rel_type: Option<String>,

        /// Direction: outgoing, incoming, or both
        #[arg(long, default_value = "both")]
        direction: String,

        /// Traversal depth (1-5)
        #[arg(long, default_value = "1")]
        depth: i64,
    },

    /// List entities with optional filters
    List {
        /// Entity type to filter
        #[arg(long = "type")]
        entity_type: Option<String>,

        /// Layer to filter
        #[arg(long)]
        layer: Option<String>,

        /// Tag to filter
        #[arg(long)]
        tag: Option<String>,
    },

    /// Search the graph using the full-text index
    Search {
        text: String,

        /// Entity type to filter
        #[arg(long = "type")]
        entity_type: Option<String>,

        /// Layer to filter
        #[arg(long)]
        layer: Option<String>,
    },

    /// Compute current state from campaign events
    State {
        name: String,

        /// Campaign layer to evaluate
        #[arg(long)]
        layer: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments, honoring the global timeout.
pub async fn execute(cli: Cli) -> Result<(), LoreError> {
    match cli.timeout {
        None => dispatch(cli).await,
        Some(secs) => {
            let deadline = std::time::Duration::from_secs(secs);
            match tokio::time::timeout(deadline, dispatch(cli)).await {
                Ok(result) => result,
                Err(_) => Err(LoreError::Cancelled),
            }
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), LoreError> {
    match cli.command {
        Commands::Ingest { full } => commands::cmd_ingest(&cli.config, &cli.schema, full).await,
        Commands::Serve => commands::cmd_serve(&cli.config, &cli.schema).await,
        Commands::Validate => commands::cmd_validate(&cli.config, &cli.schema).await,
        Commands::Query(query) => match query {
            QueryCommands::Sql { stmt, params } => {
                commands::cmd_query_sql(&cli.config, &stmt, &params).await
            }
            QueryCommands::Cypher { .. } => commands::cmd_query_cypher(),
            QueryCommands::Entity { name, entity_type } => {
                commands::cmd_query_entity(&cli.config, &name, entity_type.as_deref()).await
            }
            QueryCommands::Relations {
                name,
                rel_type,
                direction,
                depth,
            } => {
                commands::cmd_query_relations(
                    &cli.config,
                    &name,
                    rel_type.as_deref(),
                    &direction,
                    depth,
                )
                .await
            }
            QueryCommands::List {
                entity_type,
                layer,
                tag,
            } => {
                commands::cmd_query_list(
                    &cli.config,
                    entity_type.as_deref(),
                    layer.as_deref(),
                    tag.as_deref(),
                )
                .await
            }
            QueryCommands::Search {
                text,
                entity_type,
                layer,
            } => {
                commands::cmd_query_search(
                    &cli.config,
                    &text,
                    entity_type.as_deref(),
                    layer.as_deref(),
                )
                .await
            }
            QueryCommands::State { name, layer } => {
                commands::cmd_query_state(&cli.config, &name, &layer).await
            }
        },
        Commands::Init { name, template } => commands::cmd_init(&name, &template),
        Commands::Version => {
            println!("lorecraft {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
