use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn run(source: &str, args: &[&str]) -> Value {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.md");
    fs::write(&input, source).unwrap();

    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.arg(args[0]).arg(&input).args(&args[1..]);
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn digest_reports_title_and_counts() {
    let digest = run("# Guide\n\nHello world.\n\n```rust\nfn x() {}\n```\n", &["inspect", "digest"]);
    assert_eq!(digest["title"], "Guide");
    assert_eq!(digest["hasCodeBlocks"], true);
    assert_eq!(digest["languages"][0], "rust");
}

#[test]
fn blocks_view_lists_every_textblock() {
    let page = run("# A\n\none\n\ntwo\n", &["inspect", "blocks"]);
    let ids: Vec<&str> = page["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["h-0", "p-0", "p-1"]);
    assert_eq!(page["hasMore"], false);
}

#[test]
fn ast_is_the_default_view() {
    let page = run("para\n", &["inspect"]);
    assert!(page["nodes"].as_array().is_some());
}

#[test]
fn detect_reports_conventions() {
    let style = run("a  \r\nb\r\n", &["detect"]);
    assert_eq!(style["lineEnding"], "crlf");
    assert_eq!(style["hardBreakStyle"], "twoSpaces");
}

#[test]
fn unknown_view_is_rejected_by_clap() {
    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.arg("inspect").arg("doc.md").arg("tokens");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
