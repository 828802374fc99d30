use crate::protocol::{content, dispatcher, ok, revision};
use insta::assert_snapshot;
use serde_json::json;

#[test]
fn table_batch_applies_valid_ops_and_warns_about_the_rest() {
    let mut d = dispatcher("| a | b |\n| --- | --- |\n| 1 | 2 |\n");
    let data = ok(
        &mut d,
        "table.batchModify",
        json!({
            "baseRevision": "r1",
            "table": "table-0",
            "operations": [
                { "op": "add_row", "cells": ["3", "4"] },
                { "op": "update_cell", "row": 9, "column": 9, "content": "x" },
            ],
        }),
    );
    assert_eq!(data["applied"], true);
    assert_eq!(data["revision"], "r2");
    let warnings = data["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().starts_with("operations[1] (update_cell)"));
    assert_snapshot!(content(&mut d), @r"
    | a | b |
    | --- | --- |
    | 1 | 2 |
    | 3 | 4 |
    ");
}

#[test]
fn list_batch_by_item_target() {
    let mut d = dispatcher("Shopping:\n\n- milk\n- eggs\n");
    ok(
        &mut d,
        "list.batchModify",
        json!({
            "baseRevision": "r1",
            "list": { "text": "eggs" },
            "operations": [
                { "op": "add_item", "content": "bread" },
                { "op": "set_type", "listType": "task" },
                { "op": "toggle_check", "index": 1 },
            ],
        }),
    );
    assert_eq!(content(&mut d), "Shopping:\n\n- [ ] milk\n- [x] eggs\n- [ ] bread\n");
}

#[test]
fn sections_insert_and_move() {
    let mut d = dispatcher("# Intro\n\nhi\n\n# Outro\n\nbye\n");
    ok(
        &mut d,
        "section.insert",
        json!({ "baseRevision": "r1", "title": "Middle", "level": 1, "content": "mid", "anchor": "Intro" }),
    );
    ok(
        &mut d,
        "section.move",
        json!({ "baseRevision": "r2", "heading": "Outro", "target": "Intro", "position": "before" }),
    );
    assert_snapshot!(content(&mut d), @r"
    # Outro

    bye

    # Intro

    hi

    # Middle

    mid
    ");
    assert_eq!(revision(&mut d), "r3");
}

#[test]
fn apply_diff_all_matches_keeps_marks() {
    let mut d = dispatcher("**cat** and cat\n");
    let data = ok(
        &mut d,
        "mutation.applyDiff",
        json!({ "baseRevision": "r1", "find": "cat", "replace": "dog", "matchPolicy": "all" }),
    );
    assert_eq!(data["applied"], true);
    assert_eq!(content(&mut d), "**dog** and dog\n");
}

#[test]
fn ambiguous_diff_lists_candidates() {
    let mut d = dispatcher("cat\n\ncat\n");
    let response = crate::protocol::call(
        &mut d,
        "mutation.applyDiff",
        json!({ "baseRevision": "r1", "find": "cat", "replace": "dog", "matchPolicy": "error_if_multiple" }),
    );
    assert_eq!(response.error.as_deref(), Some("ambiguous_target"));
    assert_eq!(response.details.unwrap()["candidates"].as_array().unwrap().len(), 2);
}

#[test]
fn anchored_replace_uses_context() {
    let mut d = dispatcher("the value is 10\n\nthe limit is 10\n");
    ok(
        &mut d,
        "mutation.replaceAnchored",
        json!({
            "baseRevision": "r1",
            "anchor": { "text": "10", "beforeContext": "limit is " },
            "replacement": "20",
        }),
    );
    assert_eq!(content(&mut d), "the value is 10\n\nthe limit is 20\n");
}

#[test]
fn dry_run_previews_without_committing() {
    let mut d = dispatcher("keep\n");
    let data = ok(
        &mut d,
        "mutation.batchEdit",
        json!({
            "baseRevision": "r1",
            "mode": "dryRun",
            "operations": [{ "op": "update", "target": "p-0", "content": "changed" }],
        }),
    );
    assert_eq!(data["applied"], false);
    assert!(data["preview"]["diff"].as_str().unwrap().contains("+changed"));
    assert_eq!(revision(&mut d), "r1");
}
