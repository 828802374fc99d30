use crate::protocol::{content, dispatcher, dispatcher_with, ok, revision};
use marktree::session::SessionSettings;
use serde_json::{json, Value};

const DOC: &str = "# Plan\n\nOld\n\n# Notes\n\nkeep\n";

fn suggest_section(d: &mut marktree::Dispatcher) -> String {
    let data = ok(
        d,
        "section.update",
        json!({ "baseRevision": "r1", "mode": "suggest", "heading": "Plan", "content": "New" }),
    );
    data["suggestionIds"][0].as_str().unwrap().to_string()
}

#[test]
fn rejecting_a_section_suggestion_restores_the_original() {
    let mut d = dispatcher(DOC);
    let id = suggest_section(&mut d);
    assert_eq!(revision(&mut d), "r1");

    ok(&mut d, "suggestion.reject", json!({ "id": id }));
    let section = ok(&mut d, "structure.getSection", json!({ "heading": "Plan" }));
    assert_eq!(section["content"], "Old");
    assert_eq!(revision(&mut d), "r1");
    let pending = ok(&mut d, "suggestion.list", Value::Null);
    assert!(pending["suggestions"].as_array().unwrap().is_empty());
}

#[test]
fn accepting_a_section_suggestion_commits_it() {
    let mut d = dispatcher(DOC);
    let id = suggest_section(&mut d);
    let data = ok(&mut d, "suggestion.accept", json!({ "id": id }));
    assert_eq!(data["revision"], "r2");
    assert_eq!(content(&mut d), "# Plan\n\nNew\n\n# Notes\n\nkeep\n");
}

#[test]
fn unknown_suggestions_are_not_found() {
    let mut d = dispatcher(DOC);
    let response = crate::protocol::call(&mut d, "suggestion.accept", json!({ "id": "nope" }));
    assert_eq!(response.error.as_deref(), Some("not_found"));
}

#[test]
fn auto_approve_off_turns_edits_into_suggestions() {
    let settings = SessionSettings {
        auto_approve_edits: false,
        ..SessionSettings::default()
    };
    let mut d = dispatcher_with("one\n\nmiddle\n\nthree\n", settings, Default::default());
    let data = ok(
        &mut d,
        "mutation.batchEdit",
        json!({
            "baseRevision": "r1",
            "operations": [
                { "op": "update", "target": "p-0", "content": "uno" },
                { "op": "delete", "target": "p-2" },
            ],
        }),
    );
    assert_eq!(data["mode"], "suggest");
    assert_eq!(data["applied"], false);
    assert_eq!(data["suggestionIds"].as_array().unwrap().len(), 2);
    assert_eq!(content(&mut d), "one\n\nmiddle\n\nthree\n");

    let first = ok(&mut d, "suggestion.focusNext", Value::Null);
    let second = ok(&mut d, "suggestion.focusNext", Value::Null);
    assert_ne!(first["id"], second["id"]);

    let bulk = ok(&mut d, "suggestion.acceptAll", Value::Null);
    assert_eq!(bulk["ids"].as_array().unwrap().len(), 2);
    assert_eq!(content(&mut d), "uno\n\nmiddle\n");
    assert_eq!(revision(&mut d), bulk["revision"].as_str().unwrap());
}

#[test]
fn reject_all_leaves_the_tree_and_revision() {
    let settings = SessionSettings {
        auto_approve_edits: false,
        ..SessionSettings::default()
    };
    let mut d = dispatcher_with("alpha beta\n", settings, Default::default());
    ok(
        &mut d,
        "mutation.applyDiff",
        json!({ "baseRevision": "r1", "find": "beta", "replace": "gamma" }),
    );
    let bulk = ok(&mut d, "suggestion.rejectAll", Value::Null);
    assert_eq!(bulk["ids"].as_array().unwrap().len(), 1);
    assert_eq!(bulk["revision"], "r1");
    assert_eq!(content(&mut d), "alpha beta\n");
}
