use crate::protocol::{dispatcher, ok};
use marktree::ids::identify;
use serde_json::json;

const GUIDE: &str = "\
# Setup

Install the tool.

## Install

Run the installer.

## Configure

Edit the file.

# Usage

Run it.
";

#[test]
fn ids_are_deterministic_per_snapshot() {
    let doc = crate::markdown::parse(GUIDE);
    let first: Vec<String> = identify(&doc).into_iter().map(|n| n.id).collect();
    let second: Vec<String> = identify(&doc).into_iter().map(|n| n.id).collect();
    assert_eq!(first, second);
    assert_eq!(&first[..3], ["h-0", "p-0", "h-1"]);
}

#[test]
fn ambiguous_headings_are_flagged() {
    let mut d = dispatcher("# Notes\n\ntext\n\n# Notes\n");
    let data = ok(
        &mut d,
        "structure.resolveTargets",
        json!({ "query": { "text": "Notes", "type": "heading" } }),
    );
    assert_eq!(data["isAmbiguous"], true);
    let strong = data["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["score"].as_f64().unwrap() >= 0.9)
        .count();
    assert!(strong >= 2);
}

#[test]
fn sections_by_text_and_ordinal() {
    let mut d = dispatcher(GUIDE);
    let nested = ok(&mut d, "structure.getSection", json!({ "heading": "Setup" }));
    assert_eq!(nested["heading"]["id"], "h-0");
    assert!(nested["content"].as_str().unwrap().contains("## Configure"));

    let flat = ok(
        &mut d,
        "structure.getSection",
        json!({ "heading": "Setup", "includeNested": false }),
    );
    assert_eq!(flat["content"], "Install the tool.");

    let second_h2 = ok(
        &mut d,
        "structure.getSection",
        json!({ "heading": { "level": 2, "index": 1 } }),
    );
    assert_eq!(second_h2["heading"]["text"], "Configure");
    assert_eq!(second_h2["content"], "Edit the file.");
}

#[test]
fn ast_pages_resume_after_the_cursor() {
    let mut d = dispatcher(GUIDE);
    let first = ok(
        &mut d,
        "structure.getAst",
        json!({ "filter": { "type": "heading" }, "limit": 2 }),
    );
    assert_eq!(first["hasMore"], true);
    let cursor = first["nextCursor"].as_str().unwrap().to_string();
    assert_eq!(cursor, "h-1");

    let rest = ok(
        &mut d,
        "structure.getAst",
        json!({ "filter": { "type": "heading" }, "limit": 10, "afterCursor": cursor }),
    );
    let ids: Vec<&str> = rest["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["h-2", "h-3"]);
    assert_eq!(rest["hasMore"], false);
}

#[test]
fn projection_keeps_only_requested_fields() {
    let mut d = dispatcher(GUIDE);
    let page = ok(
        &mut d,
        "structure.getAst",
        json!({ "filter": { "type": "heading", "level": 1 }, "projection": ["id", "text"] }),
    );
    assert_eq!(
        page["nodes"],
        json!([{ "id": "h-0", "text": "Setup" }, { "id": "h-3", "text": "Usage" }])
    );
}

#[test]
fn digest_outline_and_counts() {
    let mut d = dispatcher(GUIDE);
    let digest = ok(&mut d, "structure.getDigest", json!({}));
    assert_eq!(digest["title"], "Setup");
    assert_eq!(digest["outline"][0]["children"][1]["text"], "Configure");
    assert_eq!(digest["blockCounts"]["heading"], 4);
    assert_eq!(digest["hasTables"], false);
}

#[test]
fn cursor_mapping_round_trips() {
    let mut d = dispatcher("**ab** c\n");
    let offset = ok(&mut d, "cursor.toOffset", json!({ "pos": 2 }));
    assert_eq!(offset["offset"], 3);
    let pos = ok(&mut d, "cursor.toPosition", json!({ "offset": 3 }));
    assert_eq!(pos["pos"], 2);
}
