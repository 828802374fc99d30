use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

fn lines(requests: &[Value]) -> String {
    requests
        .iter()
        .map(|r| format!("{r}\n"))
        .collect()
}

fn responses(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn answers_each_request_in_order() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.md");
    fs::write(&input, "# Title\n\nBody\n").unwrap();

    let stdin = lines(&[
        json!({ "id": "hello", "type": "identify", "payload": {} }),
        json!({ "id": "1", "type": "request", "payload": { "type": "protocol.getRevision" } }),
        json!({ "id": "2", "type": "request", "payload": { "type": "structure.nope" } }),
    ]);
    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.arg("serve").arg(&input).write_stdin(stdin);
    let output = cmd.assert().success().get_output().stdout.clone();

    let responses = responses(&output);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], "1");
    assert_eq!(responses[0]["data"]["revision"], "r1");
    assert_eq!(responses[1]["success"], false);
    assert_eq!(responses[1]["error"], "invalid_operation");
}

#[test]
fn write_back_saves_applied_edits() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.md");
    fs::write(&input, "Hello world\n").unwrap();

    let stdin = lines(&[json!({
        "id": "1",
        "type": "request",
        "payload": {
            "type": "mutation.applyDiff",
            "baseRevision": "r1",
            "find": "world",
            "replace": "there"
        }
    })]);
    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.arg("serve").arg(&input).arg("--write-back").write_stdin(stdin);
    let output = cmd.assert().success().get_output().stdout.clone();

    let responses = responses(&output);
    assert_eq!(responses[0]["success"], true);
    assert_eq!(fs::read_to_string(&input).unwrap(), "Hello there\n");
}

#[test]
fn without_write_back_the_file_is_untouched() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.md");
    fs::write(&input, "Hello world\n").unwrap();

    let stdin = lines(&[json!({
        "id": "1",
        "type": "request",
        "payload": { "type": "mutation.applyDiff", "baseRevision": "r1", "find": "world", "replace": "there" }
    })]);
    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.arg("serve").arg(&input).write_stdin(stdin);
    cmd.assert().success();

    assert_eq!(fs::read_to_string(&input).unwrap(), "Hello world\n");
}

#[test]
fn project_config_disables_auto_approve() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.md");
    fs::write(&input, "Hello world\n").unwrap();
    fs::write(dir.path().join("marktree.toml"), "[protocol]\nauto_approve_edits = false\n").unwrap();

    let stdin = lines(&[
        json!({
            "id": "1",
            "type": "request",
            "payload": { "type": "mutation.applyDiff", "baseRevision": "r1", "find": "world", "replace": "there" }
        }),
        json!({ "id": "2", "type": "request", "payload": { "type": "suggestion.list" } }),
    ]);
    let mut cmd = cargo_bin_cmd!("marktree");
    cmd.current_dir(dir.path())
        .arg("serve")
        .arg(&input)
        .write_stdin(stdin);
    let output = cmd.assert().success().get_output().stdout.clone();

    let responses = responses(&output);
    assert_eq!(responses[1]["data"]["suggestions"].as_array().unwrap().len(), 1);
}
