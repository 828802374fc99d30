use super::{call, content, dispatcher, ok, revision};
use marktree::protocol::{is_read_only_operation, OPERATIONS};
use marktree::ErrorCode;
use serde_json::{json, Value};

#[test]
fn reads_never_move_the_revision() {
    let mut d = dispatcher("# A\n\nbody\n\n## B\n");
    for op in OPERATIONS.iter().filter(|op| is_read_only_operation(op)) {
        let before = revision(&mut d);
        let _ = call(&mut d, op, json!({ "heading": "A", "query": { "text": "A" }, "pos": 1, "offset": 1 }));
        assert_eq!(revision(&mut d), before, "{op} moved the revision");
    }
}

#[test]
fn every_commit_moves_the_revision_once() {
    let mut d = dispatcher("one\n");
    let data = ok(
        &mut d,
        "mutation.batchEdit",
        json!({
            "baseRevision": "r1",
            "operations": [
                { "op": "update", "target": "p-0", "content": "uno" },
                { "op": "insert", "target": "p-0", "content": "dos" },
            ],
        }),
    );
    assert_eq!(data["revision"], "r2");
    assert_eq!(content(&mut d), "uno\n\ndos\n");
}

#[test]
fn stale_base_revision_conflicts_and_leaves_the_tree() {
    let mut d = dispatcher("one\n");
    ok(
        &mut d,
        "mutation.applyDiff",
        json!({ "baseRevision": "r1", "find": "one", "replace": "two" }),
    );
    let response = call(
        &mut d,
        "mutation.batchEdit",
        json!({
            "baseRevision": "r1",
            "operations": [{ "op": "update", "target": "p-0", "content": "three" }],
        }),
    );
    assert!(!response.success);
    assert_eq!(response.error_code(), Some(ErrorCode::Conflict));
    assert_eq!(response.details.unwrap()["currentRevision"], "r2");
    assert_eq!(content(&mut d), "two\n");
}

#[test]
fn no_op_edits_do_not_commit() {
    let mut d = dispatcher("same\n");
    let data = ok(
        &mut d,
        "mutation.batchEdit",
        json!({
            "baseRevision": "r1",
            "operations": [{ "op": "update", "target": "p-0", "content": "same" }],
        }),
    );
    assert_eq!(data["applied"], false);
    assert_eq!(revision(&mut d), "r1");
}

#[test]
fn external_changes_keep_the_last_good_tree_on_failure() {
    let settings = marktree::session::SessionSettings {
        markdown: marktree::MarkdownOptions {
            max_nesting_depth: 3,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut d = super::dispatcher_with("ok\n", settings, Default::default());
    let response = call(&mut d, "document.setContent", json!({ "content": "> > > > > deep\n" }));
    assert!(!response.success);
    assert_eq!(content(&mut d), "ok\n");
    assert_eq!(revision(&mut d), "r1");

    let data = ok(&mut d, "document.setContent", json!({ "content": "fresh\n" }));
    assert_eq!(data, json!({ "changed": true, "revision": "r2" }));
    assert_eq!(ok(&mut d, "document.retry", Value::Null)["changed"], false);
}
