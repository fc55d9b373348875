//! Batch coordinator behavior across processes and tools.

use serde_json::json;
use std::sync::Arc;
use strata_core::{BatchRequest, Package, RandomIdGenerator, Status, Tool};
use strata_test_utils::assertions::{assert_contiguous, assert_success};
use strata_test_utils::TestStore;
use strata_tools::{BatchCoordinator, ToolRegistry};

fn coordinator(store: &TestStore) -> BatchCoordinator {
    BatchCoordinator::new(
        store.db(),
        Arc::new(ToolRegistry::standard(Arc::new(RandomIdGenerator))),
    )
}

#[test]
fn test_create_and_delete_in_one_batch() {
    let store = TestStore::new();
    store.seed("U1", "Notes", &["subject"], &[vec![json!("old")]]);

    let request = BatchRequest::new()
        .with_process(
            "batch_1",
            "process_1",
            Package::new().with(
                Tool::Create,
                json!({"g": {"table": ["Notes"], "field": [["subject"]], "value": [["new"]], "_UUID": "U2"}}),
            ),
        )
        .with_process(
            "batch_1",
            "process_2",
            Package::new().with(Tool::Delete, json!({"U1": {"where": ["all"]}})),
        );

    let env = coordinator(&store).handle_batch(&request).unwrap();
    assert_success(&env);
    assert!(store.owner_exists("U2"));
    assert!(!store.owner_exists("U1"));
    assert_eq!(store.row_count("Notes", "U1"), 0);
    assert_eq!(store.row_count("Notes", "U2"), 1);
}

#[test]
fn test_writes_apply_before_later_reads_see_them() {
    let store = TestStore::new();
    store.seed("u1", "Notes", &["subject"], &[vec![json!("a")], vec![json!("b")], vec![json!("c")]]);

    let request: BatchRequest = serde_json::from_value(json!({
        "b1": {
            "p1": {"delete": {"u1": {"where": ["Notes"], "IND": [1]}}}
        },
        "b2": {
            "p1": {"update": {"u1": {"table": ["Notes"], "field": [["subject"]], "IND": [["new_x"]], "value": [["d"]]}}}
        }
    }))
    .unwrap();

    let env = coordinator(&store).handle_batch(&request).unwrap();
    assert_success(&env);
    assert_contiguous(&store, "Notes", "u1");
    assert_eq!(store.row_count("Notes", "u1"), 3);
    assert!(env.action.delete.is_some());
    assert!(env.action.update.is_some());
}

#[test]
fn test_partial_batch_keeps_good_work() {
    let store = TestStore::new();
    let request: BatchRequest = serde_json::from_value(json!({
        "b": {
            "p1": {"create": {"g": {
                "table": ["Ghosts", "Notes"],
                "field": [["x"], ["subject"]],
                "value": [["y"], ["kept note"]],
                "_UUID": "kept"
            }}},
            "p2": {"read": {"UUID": "kept"}}
        }
    }))
    .unwrap();

    let env = coordinator(&store).handle_batch(&request).unwrap();
    assert_eq!(env.status, Status::Partial, "{:?}", env);
    assert!(store.owner_exists("kept"));
    assert_eq!(store.row_count("Notes", "kept"), 1);
    let create = env.action.create.as_ref().unwrap();
    assert_eq!(create.status, Status::Partial);
    assert_eq!(create.errors.len(), 1);
    // Reads run when their process is absorbed, before merged writes
    assert_eq!(env.action.read.len(), 1);
}
