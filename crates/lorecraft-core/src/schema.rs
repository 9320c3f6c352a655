//! # Schema Registry
//!
//! In-memory index over the schema YAML: entity types with their property
//! definitions and field mappings, plus the declared relationship types.
//! Lookups are case-insensitive. The registry is read-only after load and
//! safe to share across tasks.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoreError;

/// The declared schema for a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub relationship_types: Vec<RelationshipType>,

    #[serde(skip)]
    pub entity_index: HashMap<String, usize>,
    #[serde(skip)]
    pub rel_index: HashMap<String, usize>,
}

/// An entity type with its typed properties and edge-producing fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}

/// A typed property declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type", default)]
    pub prop_type: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
}

/// A frontmatter field whose string values become edges of the named type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    pub relationship: String,
    #[serde(default)]
    pub target_type: Vec<String>,
}

/// A declared relationship type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipType {
    pub name: String,
    #[serde(default)]
    pub inverse: String,
    #[serde(default)]
    pub symmetric: bool,
}

impl EntityType {
    /// True if `key` is a declared property of this type.
    #[must_use]
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.iter().any(|p| p.name == key)
    }

    /// True if `key` is declared as a field mapping (and so becomes edges).
    #[must_use]
    pub fn has_field_mapping(&self, key: &str) -> bool {
        self.field_mappings.iter().any(|m| m.field == key)
    }
}

impl Schema {
    /// Look up an entity type by name, case-insensitively.
    #[must_use]
    pub fn entity_type_by_name(&self, name: &str) -> Option<&EntityType> {
        self.entity_index
            .get(&name.to_lowercase())
            .map(|&i| &self.entity_types[i])
    }

    /// Look up a relationship type by name, case-insensitively.
    #[must_use]
    pub fn relationship_type_by_name(&self, name: &str) -> Option<&RelationshipType> {
        self.rel_index
            .get(&name.to_lowercase())
            .map(|&i| &self.relationship_types[i])
    }

    #[must_use]
    pub fn is_valid_entity_type(&self, name: &str) -> bool {
        self.entity_type_by_name(name).is_some()
    }

    #[must_use]
    pub fn is_valid_relationship_type(&self, name: &str) -> bool {
        self.relationship_type_by_name(name).is_some()
    }

    /// Graph label for an entity type.
    #[must_use]
    pub fn node_label(&self, entity_type: &str) -> String {
        entity_type.to_uppercase()
    }

    fn build_indexes(&mut self) {
        self.entity_index = self
            .entity_types
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.to_lowercase(), i))
            .collect();
        self.rel_index = self
            .relationship_types
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.to_lowercase(), i))
            .collect();
    }
}

/// Load and validate the schema from a YAML file.
pub fn load_schema(path: &Path) -> Result<Schema, LoreError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| LoreError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
    let mut schema: Schema = serde_yaml::from_str(&data)
        .map_err(|e| LoreError::ConfigInvalid(format!("parsing {}: {e}", path.display())))?;
    validate(&schema)?;
    schema.build_indexes();
    Ok(schema)
}

/// Validate a schema built in memory and construct its lookup indexes.
pub fn finalize_schema(mut schema: Schema) -> Result<Schema, LoreError> {
    validate(&schema)?;
    schema.build_indexes();
    Ok(schema)
}

fn validate(s: &Schema) -> Result<(), LoreError> {
    if s.version != 1 {
        return Err(LoreError::ConfigInvalid(format!(
            "unsupported schema version: {}",
            s.version
        )));
    }
    if s.entity_types.is_empty() {
        return Err(LoreError::ConfigInvalid(
            "at least one entity type is required".into(),
        ));
    }

    let mut entity_names = HashMap::new();
    for (i, entity) in s.entity_types.iter().enumerate() {
        if entity.name.trim().is_empty() {
            return Err(LoreError::ConfigInvalid(format!(
                "entity type {i} name is required"
            )));
        }
        if entity_names
            .insert(entity.name.to_lowercase(), ())
            .is_some()
        {
            return Err(LoreError::ConfigInvalid(format!(
                "duplicate entity type name: {}",
                entity.name
            )));
        }

        let mut prop_names = HashMap::new();
        for prop in &entity.properties {
            let name = prop.name.trim().to_lowercase();
            if name.is_empty() {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} has property with empty name",
                    entity.name
                )));
            }
            if prop_names.insert(name, ()).is_some() {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} has duplicate property: {}",
                    entity.name, prop.name
                )));
            }
            if prop.prop_type.eq_ignore_ascii_case("enum") && prop.values.is_empty() {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} property {} enum has no values",
                    entity.name, prop.name
                )));
            }
        }
    }

    let mut rel_names = HashMap::new();
    for (i, rel) in s.relationship_types.iter().enumerate() {
        if rel.name.trim().is_empty() {
            return Err(LoreError::ConfigInvalid(format!(
                "relationship type {i} name is required"
            )));
        }
        if rel_names.insert(rel.name.to_lowercase(), ()).is_some() {
            return Err(LoreError::ConfigInvalid(format!(
                "duplicate relationship type name: {}",
                rel.name
            )));
        }
    }

    for entity in &s.entity_types {
        for mapping in &entity.field_mappings {
            if mapping.field.trim().is_empty() {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} has field mapping with empty field",
                    entity.name
                )));
            }
            if mapping.relationship.trim().is_empty() {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} has field mapping with empty relationship",
                    entity.name
                )));
            }
            if !rel_names.contains_key(&mapping.relationship.to_lowercase()) {
                return Err(LoreError::ConfigInvalid(format!(
                    "entity type {} field mapping references unknown relationship: {}",
                    entity.name, mapping.relationship
                )));
            }
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
