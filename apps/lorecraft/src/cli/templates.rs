//! # Project Templates
//!
//! Built-in scaffolds for `lorecraft init`.

/// Schema templates by name.
pub fn schema_template(name: &str) -> Option<&'static str> {
    match name {
        "fantasy-rpg" => Some(FANTASY_RPG),
        _ => None,
    }
}

/// Names accepted by [`schema_template`].
pub fn available() -> Vec<&'static str> {
    vec!["fantasy-rpg"]
}

/// The starter project configuration.
pub fn config_template(project_name: &str) -> String {
    format!(
        "project: {project_name}\n\
         version: 1\n\
         \n\
         database:\n\
         \x20 dsn: sqlite://{project_name}.db\n\
         \n\
         layers:\n\
         \x20 - name: setting\n\
         \x20   paths:\n\
         \x20     - ./lore/\n\
         \x20   canonical: true\n\
         \x20 - name: campaign\n\
         \x20   paths:\n\
         \x20     - ./campaign/\n\
         \x20   depends_on: [setting]\n\
         \n\
         exclude:\n\
         \x20 - ./assets/\n"
    )
}

const FANTASY_RPG: &str = r#"version: 1

entity_types:
  - name: npc
    properties:
      - name: role
        type: string
      - name: status
        type: enum
        values: [alive, dead, missing, unknown]
        default: alive
      - name: race
        type: string
    field_mappings:
      - field: faction
        relationship: MEMBER_OF
        target_type: [faction]
      - field: location
        relationship: LOCATED_IN
        target_type: [location]

  - name: location
    properties:
      - name: region
        type: string
      - name: status
        type: string
      - name: features
        type: list
    field_mappings:
      - field: part_of
        relationship: PART_OF
        target_type: [location]

  - name: faction
    properties:
      - name: alignment
        type: string
      - name: status
        type: string
    field_mappings:
      - field: headquarters
        relationship: LOCATED_IN
        target_type: [location]

  - name: item
    properties:
      - name: rarity
        type: enum
        values: [common, uncommon, rare, legendary]
    field_mappings:
      - field: owner
        relationship: OWNED_BY
        target_type: [npc, faction]

  - name: event
    properties:
      - name: session
        type: int
      - name: date
        type: string
    field_mappings:
      - field: affects
        relationship: AFFECTS
        target_type: [npc, location, faction, item]
      - field: participants
        relationship: INVOLVES
        target_type: [npc, faction]
      - field: location
        relationship: OCCURS_IN
        target_type: [location]

  - name: lore
    properties:
      - name: era
        type: string

relationship_types:
  - name: MEMBER_OF
    inverse: HAS_MEMBER
  - name: LOCATED_IN
    inverse: CONTAINS
  - name: PART_OF
    inverse: CONTAINS
  - name: OWNED_BY
    inverse: OWNS
  - name: AFFECTS
  - name: INVOLVES
  - name: OCCURS_IN
  - name: RELATED_TO
    symmetric: true
"#;

// =============================================================================
// TESTS
// =============================================================================
