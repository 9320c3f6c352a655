//! End-to-end ingestion scenarios against the embedded backend.

mod common;

use common::{config, layered, memory_store, single_layer, test_schema, write_file};
use lorecraft_core::{GraphStore, IngestOptions, ingest};
use serde_json::json;

const NPC_A: &str = "---\ntitle: A\ntype: npc\nfaction: F\n---\nA wary guard.\n";
const FACTION_F: &str = "---\ntitle: F\ntype: faction\n---\nThe watch.\n";

#[tokio::test]
async fn happy_path_ingest_and_idempotence() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a.md", NPC_A);
    write_file(dir.path(), "b.md", FACTION_F);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("first ingest");
    assert_eq!(result.nodes_upserted, 2);
    assert_eq!(result.edges_upserted, 1);
    assert_eq!(result.nodes_removed, 0);
    assert_eq!(result.files_skipped, 0);
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);

    let rels = store
        .get_relationships("A", None, "both", 1)
        .await
        .expect("relationships");
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].rel_type, "MEMBER_OF");
    assert_eq!(rels[0].to.name, "F");

    // Unchanged sources: incremental mode touches nothing.
    let again = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("second ingest");
    assert_eq!(again.nodes_upserted, 0);
    assert_eq!(again.edges_upserted, 0);
    assert_eq!(again.nodes_removed, 0);
    assert_eq!(again.files_skipped, 2);
}

#[tokio::test]
async fn full_mode_reingests_unchanged_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a.md", NPC_A);
    write_file(dir.path(), "b.md", FACTION_F);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("first ingest");
    let full = ingest::run(&cfg, &schema, &store, IngestOptions { full: true })
        .await
        .expect("full ingest");
    assert_eq!(full.nodes_upserted, 2);
    assert_eq!(full.files_skipped, 0);
}

#[tokio::test]
async fn placeholder_promotion() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a.md", NPC_A);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");
    assert_eq!(result.nodes_upserted, 1);
    assert_eq!(result.edges_upserted, 1);

    // F was materialised as a placeholder to satisfy the edge.
    let placeholders = store
        .list_dangling_placeholders()
        .await
        .expect("placeholders");
    assert_eq!(placeholders.len(), 1);
    assert_eq!(placeholders[0].name, "F");
    assert!(
        store.get_entity("F", None).await.expect("get").is_none(),
        "placeholders are hidden from reads"
    );

    // Supplying the real file promotes the placeholder in place.
    write_file(dir.path(), "b.md", FACTION_F);
    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("re-ingest");

    assert!(
        store
            .list_dangling_placeholders()
            .await
            .expect("placeholders")
            .is_empty()
    );
    let entity = store
        .get_entity("F", None)
        .await
        .expect("get")
        .expect("F is real now");
    assert_eq!(entity.entity_type, "faction");

    let rels = store
        .get_relationships("A", None, "both", 1)
        .await
        .expect("relationships");
    assert_eq!(rels.len(), 1, "the edge persisted through promotion");
}

#[tokio::test]
async fn stale_removal_keeps_referenced_target() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a.md", NPC_A);
    write_file(dir.path(), "b.md", FACTION_F);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");

    std::fs::remove_file(dir.path().join("a.md")).expect("delete a.md");
    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("re-ingest");
    assert_eq!(result.nodes_removed, 1);

    assert!(store.get_entity("A", None).await.expect("get").is_none());
    assert!(store.get_entity("F", None).await.expect("get").is_some());

    let rels = store
        .get_relationships("F", None, "both", 1)
        .await
        .expect("relationships");
    assert!(rels.is_empty(), "cascade removed the edge with A");
}

#[tokio::test]
async fn cross_layer_reference_targets_canonical_layer() {
    let setting = tempfile::tempdir().expect("tempdir");
    let campaign = tempfile::tempdir().expect("tempdir");
    write_file(setting.path(), "b.md", FACTION_F);
    write_file(
        campaign.path(),
        "c.md",
        "---\ntitle: C\ntype: npc\nfaction: F\n---\nA campaign recruit.\n",
    );

    let layers = layered(setting.path(), campaign.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);

    let rels = store
        .get_relationships("C", None, "outgoing", 1)
        .await
        .expect("relationships");
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].to.name, "F");
    assert_eq!(
        rels[0].to.layer, "setting",
        "the edge resolves into the canonical layer, not the current one"
    );
}

#[tokio::test]
async fn state_projection_applies_events_in_session_order() {
    let setting = tempfile::tempdir().expect("tempdir");
    let campaign = tempfile::tempdir().expect("tempdir");
    write_file(
        setting.path(),
        "westport.md",
        "---\ntitle: Westport\ntype: location\nstatus: intact\nfeatures: [coastal]\n---\nA port town.\n",
    );
    write_file(
        campaign.path(),
        "e1.md",
        "---\ntitle: Sacking of Westport\ntype: event\nsession: 1\naffects: Westport\nconsequences:\n  - entity: westport\n    property: status\n    value: damaged\n---\nThe raiders came at dawn.\n",
    );
    write_file(
        campaign.path(),
        "e2.md",
        "---\ntitle: Rebuilding Westport\ntype: event\nsession: 2\naffects: Westport\nconsequences:\n  - entity: westport\n    property: features\n    add: rebuilt\n---\nThe town recovers.\n",
    );

    let layers = layered(setting.path(), campaign.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);

    let state = store
        .get_current_state("Westport", "campaign")
        .await
        .expect("state")
        .expect("canonical base exists");

    assert_eq!(state.base_properties["status"], json!("intact"));
    assert_eq!(state.current_properties["status"], json!("damaged"));
    assert_eq!(
        state.current_properties["features"],
        json!(["coastal", "rebuilt"])
    );
    assert_eq!(state.events.len(), 2);
    assert_eq!(state.events[0].session, 1);
    assert_eq!(state.events[0].name, "Sacking of Westport");
    assert_eq!(state.events[1].session, 2);
}

#[tokio::test]
async fn timeline_filters_by_entity_and_session() {
    let setting = tempfile::tempdir().expect("tempdir");
    let campaign = tempfile::tempdir().expect("tempdir");
    write_file(
        setting.path(),
        "westport.md",
        "---\ntitle: Westport\ntype: location\nstatus: intact\n---\n",
    );
    write_file(
        campaign.path(),
        "e1.md",
        "---\ntitle: Sacking of Westport\ntype: event\nsession: 1\naffects: Westport\n---\n",
    );
    write_file(
        campaign.path(),
        "e2.md",
        "---\ntitle: Distant Coronation\ntype: event\nsession: 2\n---\n",
    );

    let layers = layered(setting.path(), campaign.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;
    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");

    let all = store
        .get_timeline("campaign", None, 0, 0)
        .await
        .expect("timeline");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].session, 1);

    let westport_only = store
        .get_timeline("campaign", Some("Westport"), 0, 0)
        .await
        .expect("timeline");
    assert_eq!(westport_only.len(), 1);
    assert_eq!(westport_only[0].name, "Sacking of Westport");

    let late = store
        .get_timeline("campaign", None, 2, 0)
        .await
        .expect("timeline");
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].session, 2);
}

#[tokio::test]
async fn files_without_frontmatter_or_unknown_type_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "plain.md", "No frontmatter here.\n");
    write_file(
        dir.path(),
        "dragon.md",
        "---\ntitle: Smok\ntype: dragon\n---\n",
    );
    write_file(dir.path(), "broken.md", "---\ntitle: [\n---\n");
    write_file(dir.path(), "good.md", FACTION_F);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    let result = ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");
    assert_eq!(result.nodes_upserted, 1);
    assert_eq!(result.files_skipped, 2, "no-frontmatter and unknown type");
    assert_eq!(result.errors.len(), 1, "broken YAML is a per-file error");
    assert!(result.errors[0].contains("broken.md"));
}

#[tokio::test]
async fn related_field_becomes_related_to_edges() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        dir.path(),
        "a.md",
        "---\ntitle: A\ntype: npc\nrelated: [F]\n---\n",
    );
    write_file(dir.path(), "b.md", FACTION_F);

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;

    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");

    let rels = store
        .get_relationships("A", Some("RELATED_TO"), "outgoing", 1)
        .await
        .expect("relationships");
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].rel_type, "RELATED_TO");
}

#[tokio::test]
async fn undeclared_fields_do_not_become_properties() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        dir.path(),
        "a.md",
        "---\ntitle: A\ntype: npc\nrole: guard\nheight: tall\nfaction: F\n---\n",
    );

    let layers = single_layer(dir.path());
    let cfg = config(layers.clone());
    let schema = test_schema();
    let store = memory_store(&layers).await;
    ingest::run(&cfg, &schema, &store, IngestOptions::default())
        .await
        .expect("ingest");

    let entity = store
        .get_entity("A", None)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(entity.properties.get("role"), Some(&json!("guard")));
    assert!(entity.properties.get("height").is_none());
    assert!(
        entity.properties.get("faction").is_none(),
        "mapped fields become edges, not properties"
    );
}
