//! Text/model reconciliation under paused tokio time

use hitedit_editor::{
    Mutation, OpaqueId, ReconciliationEngine, SchemaCatalog, SyncConfig, SyncEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const SOURCE: &str = r#"[Mesh]
  type = GeneratedMesh
  dim = 2
  nx = 5
[]

[Variables]
  [u]
  []
[]

[Kernels]
  [diff]
    type = Diffusion
    variable = u
  []
[]
"#;

fn engine() -> ReconciliationEngine {
    let schema = Arc::new(SchemaCatalog::from_json(include_str!("fixtures/schema.json")).unwrap());
    ReconciliationEngine::from_source(PathBuf::from("test.i"), SOURCE, schema, SyncConfig::default())
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn set_nx(text: &str) -> Mutation {
    Mutation::SetValueText {
        path: "/Mesh".to_string(),
        parameter: "nx".to_string(),
        text: text.to_string(),
    }
}

fn id_of(engine: &ReconciliationEngine, path: &str) -> OpaqueId {
    engine
        .with_document(|doc| doc.identity().id_for(path).cloned())
        .unwrap()
}

fn nx_of(engine: &ReconciliationEngine) -> String {
    engine.with_document(|doc| {
        doc.root()
            .find("/Mesh")
            .unwrap()
            .parameter("nx")
            .unwrap()
            .input_file_value()
    })
}

#[tokio::test(start_paused = true)]
async fn test_structured_edits_coalesce_into_one_serialize() {
    let engine = engine();
    let mut rx = engine.subscribe();

    for nx in ["10", "11", "12"] {
        engine.apply(set_nx(nx)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(engine.stats().serialize_runs, 0);
    assert!(engine.is_pending());

    settle().await;
    assert_eq!(engine.stats().serialize_runs, 1);
    assert!(!engine.is_pending());
    assert!(engine.text().contains("  nx = 12\n"));

    let events = drain(&mut rx);
    let model_changes = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::ModelChanged { .. }))
        .count();
    assert_eq!(model_changes, 3);
    assert_eq!(
        events.last(),
        Some(&SyncEvent::TextChanged {
            text: engine.text(),
            version: 3
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_text_edit_rebuilds_model_without_serializing() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let edited = SOURCE.replace("nx = 5", "nx = 7");

    assert!(engine.text_edited(edited.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.stats().parse_runs, 0);

    settle().await;
    let stats = engine.stats();
    assert_eq!(stats.parse_runs, 1);
    assert_eq!(stats.serialize_runs, 0);
    assert_eq!(nx_of(&engine), "7");
    assert_eq!(engine.text(), edited);
    assert!(!engine.is_pending());

    let events = drain(&mut rx);
    assert!(matches!(events.as_slice(), [SyncEvent::ModelChanged { ids }] if ids.len() == 5));
}

#[tokio::test(start_paused = true)]
async fn test_parse_failure_keeps_last_good_state() {
    let engine = engine();
    let mut rx = engine.subscribe();

    engine.text_edited("[Mesh]\n  nx = 3\n");
    settle().await;

    assert_eq!(engine.stats().parse_failures, 1);
    assert_eq!(nx_of(&engine), "5");
    assert_eq!(engine.text(), SOURCE);
    assert_eq!(engine.with_document(|doc| doc.version), 0);

    let events = drain(&mut rx);
    assert!(matches!(events.as_slice(), [SyncEvent::ParseFailed { .. }]));
}

#[tokio::test(start_paused = true)]
async fn test_renamed_block_in_text_resolves_to_nearest() {
    let engine = engine();
    let diff = id_of(&engine, "/Kernels/diff");
    assert!(engine.select(&diff));
    let mut rx = engine.subscribe();

    engine.text_edited(SOURCE.replace("[diff]", "[diffusion]"));
    settle().await;

    let expected = OpaqueId::new("/Kernels/diffusion", Some("/Kernels/diffusion/Diffusion"));
    assert_eq!(engine.active_id(), Some(expected.clone()));

    let events = drain(&mut rx);
    assert!(events.contains(&SyncEvent::ActiveIdChanged {
        previous: Some(diff),
        current: Some(expected),
        exact: false,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_path_keeps_selection_quietly() {
    let engine = engine();
    let mesh = id_of(&engine, "/Mesh");
    engine.select(&mesh);
    let mut rx = engine.subscribe();

    engine.text_edited(SOURCE.replace("nx = 5", "nx = 6"));
    settle().await;

    assert_eq!(engine.active_id(), Some(mesh));
    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SyncEvent::ActiveIdChanged { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_structured_rename_moves_selection() {
    let engine = engine();
    let diff = id_of(&engine, "/Kernels/diff");
    engine.select(&diff);
    let mut rx = engine.subscribe();

    engine
        .apply(Mutation::Rename {
            path: "/Kernels/diff".to_string(),
            new_name: "heat".to_string(),
        })
        .unwrap();

    let heat = OpaqueId::new("/Kernels/heat", Some("/Kernels/heat/Diffusion"));
    assert_eq!(engine.active_id(), Some(heat.clone()));
    let events = drain(&mut rx);
    assert_eq!(
        events.first(),
        Some(&SyncEvent::ActiveIdChanged {
            previous: Some(diff),
            current: Some(heat),
            exact: true,
        })
    );

    settle().await;
    assert!(engine.text().contains("  [heat]\n"));
}

#[tokio::test(start_paused = true)]
async fn test_removing_selected_block_clears_selection() {
    let engine = engine();
    let diff = id_of(&engine, "/Kernels/diff");
    engine.select(&diff);

    engine
        .apply(Mutation::Remove {
            path: "/Kernels/diff".to_string(),
        })
        .unwrap();
    assert_eq!(engine.active_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_text_edit_supersedes_pending_structured_edit() {
    let engine = engine();
    engine.apply(set_nx("10")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let typed = SOURCE.replace("nx = 5", "nx = 8");
    engine.text_edited(typed.clone());
    settle().await;

    let stats = engine.stats();
    assert_eq!(stats.serialize_runs, 0);
    assert_eq!(stats.parse_runs, 1);
    assert_eq!(nx_of(&engine), "8");
    assert_eq!(engine.text(), typed);
}

#[tokio::test(start_paused = true)]
async fn test_structured_edit_supersedes_pending_text_edit() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let typed = SOURCE.replace("nx = 5", "nx = 8");
    engine.text_edited(typed.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    engine.apply(set_nx("10")).unwrap();
    let events = drain(&mut rx);
    assert!(events.contains(&SyncEvent::TextDiscarded { text: typed }));
    settle().await;

    let stats = engine.stats();
    assert_eq!(stats.parse_runs, 0);
    assert_eq!(stats.serialize_runs, 1);
    assert_eq!(nx_of(&engine), "10");
    assert!(engine.text().contains("  nx = 10\n"));
}

#[tokio::test(start_paused = true)]
async fn test_published_text_echo_is_ignored() {
    let engine = engine();
    engine.apply(set_nx("10")).unwrap();
    settle().await;

    assert!(!engine.text_edited(engine.text()));
    assert!(!engine.is_pending());
    settle().await;
    assert_eq!(engine.stats().parse_runs, 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_delays_and_flush() {
    let schema = Arc::new(SchemaCatalog::from_json(include_str!("fixtures/schema.json")).unwrap());
    let config = SyncConfig {
        serialize_delay: Duration::from_secs(10),
        parse_delay: Duration::from_secs(10),
        indent: "    ".to_string(),
    };
    let engine =
        ReconciliationEngine::from_source(PathBuf::from("test.i"), SOURCE, schema, config).unwrap();

    engine.apply(set_nx("9")).unwrap();
    settle().await;
    assert_eq!(engine.stats().serialize_runs, 0);

    engine.flush();
    assert_eq!(engine.stats().serialize_runs, 1);
    assert!(engine.text().contains("\n    nx = 9\n"));
}
