//! Shared fixtures for the behavioral test suites.
#![allow(dead_code)]

use std::path::Path;

use lorecraft_core::config::{DatabaseConfig, Layer, ProjectConfig};
use lorecraft_core::schema::{
    EntityType, FieldMapping, Property, RelationshipType, Schema, finalize_schema,
};
use lorecraft_core::{LayerDag, SqliteGraph};

/// A fresh in-memory SQLite store over the given layer set.
pub async fn memory_store(layers: &[Layer]) -> SqliteGraph {
    let dag = LayerDag::new(layers).expect("valid layer dag");
    SqliteGraph::connect("sqlite://:memory:", dag)
        .await
        .expect("open in-memory store")
}

/// One canonical `setting` layer rooted at `path`.
pub fn single_layer(path: &Path) -> Vec<Layer> {
    vec![Layer {
        name: "setting".into(),
        paths: vec![path.to_string_lossy().into_owned()],
        canonical: true,
        depends_on: vec![],
    }]
}

/// Canonical `setting` plus a derived `campaign` layer depending on it.
pub fn layered(setting: &Path, campaign: &Path) -> Vec<Layer> {
    vec![
        Layer {
            name: "setting".into(),
            paths: vec![setting.to_string_lossy().into_owned()],
            canonical: true,
            depends_on: vec![],
        },
        Layer {
            name: "campaign".into(),
            paths: vec![campaign.to_string_lossy().into_owned()],
            canonical: false,
            depends_on: vec!["setting".into()],
        },
    ]
}

/// Project config wrapping the given layers; the DSN is unused because the
/// tests construct stores directly.
pub fn config(layers: Vec<Layer>) -> ProjectConfig {
    ProjectConfig {
        project: "test".into(),
        version: 1,
        database: DatabaseConfig {
            dsn: "sqlite://:memory:".into(),
        },
        layers,
        exclude: vec![],
    }
}

/// The schema used across the suites: npcs join factions, locations carry
/// status/features, events affect and involve things.
pub fn test_schema() -> Schema {
    let schema = Schema {
        version: 1,
        entity_types: vec![
            EntityType {
                name: "npc".into(),
                properties: vec![
                    prop("role", "string"),
                    Property {
                        name: "status".into(),
                        prop_type: "enum".into(),
                        values: vec!["alive".into(), "dead".into()],
                        ..Default::default()
                    },
                ],
                field_mappings: vec![FieldMapping {
                    field: "faction".into(),
                    relationship: "MEMBER_OF".into(),
                    target_type: vec!["faction".into()],
                }],
            },
            EntityType {
                name: "faction".into(),
                properties: vec![prop("alignment", "string")],
                field_mappings: vec![],
            },
            EntityType {
                name: "location".into(),
                properties: vec![prop("status", "string"), prop("features", "list")],
                field_mappings: vec![],
            },
            EntityType {
                name: "event".into(),
                properties: vec![prop("session", "int"), prop("date", "string")],
                field_mappings: vec![
                    FieldMapping {
                        field: "affects".into(),
                        relationship: "AFFECTS".into(),
                        target_type: vec![],
                    },
                    FieldMapping {
                        field: "participants".into(),
                        relationship: "INVOLVES".into(),
                        target_type: vec![],
                    },
                    FieldMapping {
                        field: "location".into(),
                        relationship: "OCCURS_IN".into(),
                        target_type: vec!["location".into()],
                    },
                ],
            },
        ],
        relationship_types: vec![
            rel("MEMBER_OF"),
            rel("AFFECTS"),
            rel("INVOLVES"),
            rel("OCCURS_IN"),
            rel("RELATED_TO"),
        ],
        ..Default::default()
    };
    finalize_schema(schema).expect("valid test schema")
}

fn prop(name: &str, prop_type: &str) -> Property {
    Property {
        name: name.into(),
        prop_type: prop_type.into(),
        ..Default::default()
    }
}

fn rel(name: &str) -> RelationshipType {
    RelationshipType {
        name: name.into(),
        ..Default::default()
    }
}

/// Write a markdown source file under `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("write source file");
}
