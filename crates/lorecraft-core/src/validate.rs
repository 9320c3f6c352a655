//! # Validation Engine
//!
//! Consistency checks over the stored graph: schema conformance (enum values,
//! required properties) plus graph-shape lints (dangling placeholders,
//! orphaned entities). Cross-layer rules are reserved; the code exists and
//! the detector returns nothing until rules are defined.

use serde::Serialize;

use crate::error::LoreError;
use crate::schema::{EntityType, Schema};
use crate::store::GraphStore;
use crate::types::{Entity, EntitySummary};

pub const CODE_ENUM_INVALID: &str = "enum_value_invalid";
pub const CODE_MISSING_REQUIRED: &str = "missing_required_property";
pub const CODE_DANGLING_PLACEHOLDER: &str = "dangling_placeholder";
pub const CODE_ORPHANED_ENTITY: &str = "orphaned_entity";
pub const CODE_CROSS_LAYER_VIOLATION: &str = "cross_layer_violation";

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub entity: String,
    pub layer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_path: String,
}

/// All findings from one validation run.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub issues: Vec<Issue>,
}

impl Report {
    /// Issues with [`Severity::Error`].
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Issues with [`Severity::Warning`].
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}

/// Run all checks against the store.
pub async fn run(schema: &Schema, store: &dyn GraphStore) -> Result<Report, LoreError> {
    let mut issues = Vec::new();

    for entity in store.list_entities_with_properties().await? {
        let Some(entity_type) = schema.entity_type_by_name(&entity.entity_type) else {
            continue;
        };
        check_enum_values(&entity, entity_type, &mut issues);
        check_required_properties(&entity, entity_type, &mut issues);
    }

    for summary in store.list_dangling_placeholders().await? {
        issues.push(issue_from_summary(
            summary,
            Severity::Error,
            CODE_DANGLING_PLACEHOLDER,
            "dangling placeholder entity",
        ));
    }

    for summary in store.list_orphaned_entities().await? {
        issues.push(issue_from_summary(
            summary,
            Severity::Warning,
            CODE_ORPHANED_ENTITY,
            "orphaned entity",
        ));
    }

    for summary in store.list_cross_layer_violations().await? {
        issues.push(issue_from_summary(
            summary,
            Severity::Error,
            CODE_CROSS_LAYER_VIOLATION,
            "cross-layer violation",
        ));
    }

    Ok(Report { issues })
}

/// Enum properties must hold one of the declared values, compared
/// case-insensitively.
fn check_enum_values(entity: &Entity, entity_type: &EntityType, issues: &mut Vec<Issue>) {
    for prop in &entity_type.properties {
        if !prop.prop_type.eq_ignore_ascii_case("enum") || prop.values.is_empty() {
            continue;
        }
        let Some(value) = entity.properties.get(&prop.name) else {
            continue;
        };
        let Some(value) = value.as_str() else {
            continue;
        };
        if !prop.values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
            issues.push(Issue {
                severity: Severity::Error,
                code: CODE_ENUM_INVALID,
                message: format!("invalid enum value for {}: {value}", prop.name),
                entity: entity.name.clone(),
                layer: entity.layer.clone(),
                file_path: entity.source_file.clone(),
            });
        }
    }
}

/// Required properties must be present, non-null, and not a blank string.
fn check_required_properties(entity: &Entity, entity_type: &EntityType, issues: &mut Vec<Issue>) {
    for prop in &entity_type.properties {
        if !prop.required {
            continue;
        }
        let missing = match entity.properties.get(&prop.name) {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            issues.push(Issue {
                severity: Severity::Error,
                code: CODE_MISSING_REQUIRED,
                message: format!("missing required property: {}", prop.name),
                entity: entity.name.clone(),
                layer: entity.layer.clone(),
                file_path: entity.source_file.clone(),
            });
        }
    }
}

fn issue_from_summary(
    summary: EntitySummary,
    severity: Severity,
    code: &'static str,
    message: &str,
) -> Issue {
    Issue {
        severity,
        code,
        message: message.to_string(),
        entity: summary.name,
        layer: summary.layer,
        file_path: String::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Property;
    use serde_json::json;

    fn entity_with(props: &[(&str, serde_json::Value)]) -> Entity {
        let mut entity = Entity {
            name: "Test".into(),
            entity_type: "npc".into(),
            layer: "setting".into(),
            source_file: "lore/test.md".into(),
            ..Default::default()
        };
        for (key, value) in props {
            entity.properties.insert((*key).into(), value.clone());
        }
        entity
    }

    fn npc_type() -> EntityType {
        EntityType {
            name: "npc".into(),
            properties: vec![
                Property {
                    name: "status".into(),
                    prop_type: "enum".into(),
                    values: vec!["alive".into(), "dead".into()],
                    ..Default::default()
                },
                Property {
                    name: "role".into(),
                    prop_type: "string".into(),
                    required: true,
                    ..Default::default()
                },
            ],
            field_mappings: vec![],
        }
    }

    #[test]
    fn enum_value_outside_declared_set_flagged() {
        let mut issues = Vec::new();
        check_enum_values(
            &entity_with(&[("status", json!("petrified"))]),
            &npc_type(),
            &mut issues,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, CODE_ENUM_INVALID);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].file_path, "lore/test.md");
    }

    #[test]
    fn enum_comparison_is_case_insensitive() {
        let mut issues = Vec::new();
        check_enum_values(
            &entity_with(&[("status", json!("Alive"))]),
            &npc_type(),
            &mut issues,
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn absent_enum_value_not_flagged() {
        let mut issues = Vec::new();
        check_enum_values(&entity_with(&[]), &npc_type(), &mut issues);
        assert!(issues.is_empty());
    }

    #[test]
    fn required_property_missing_flagged() {
        let mut issues = Vec::new();
        check_required_properties(&entity_with(&[]), &npc_type(), &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, CODE_MISSING_REQUIRED);
    }

    #[test]
    fn required_property_null_or_blank_flagged() {
        let mut issues = Vec::new();
        check_required_properties(
            &entity_with(&[("role", json!(null))]),
            &npc_type(),
            &mut issues,
        );
        check_required_properties(
            &entity_with(&[("role", json!("  "))]),
            &npc_type(),
            &mut issues,
        );
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn required_property_present_passes() {
        let mut issues = Vec::new();
        check_required_properties(
            &entity_with(&[("role", json!("guard"))]),
            &npc_type(),
            &mut issues,
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn report_splits_by_severity() {
        let report = Report {
            issues: vec![
                issue_from_summary(
                    EntitySummary::default(),
                    Severity::Error,
                    CODE_DANGLING_PLACEHOLDER,
                    "x",
                ),
                issue_from_summary(
                    EntitySummary::default(),
                    Severity::Warning,
                    CODE_ORPHANED_ENTITY,
                    "y",
                ),
            ],
        };
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }
}
