use super::{call, dispatcher, dispatcher_with, ok};
use marktree::protocol::{is_read_only_operation, OPERATIONS};
use marktree::session::SessionSettings;
use marktree::{ErrorCode, Limits};
use serde_json::{json, Value};

#[test]
fn capabilities_advertise_limits_and_vocabulary() {
    let mut d = dispatcher("x\n");
    let caps = ok(&mut d, "protocol.getCapabilities", Value::Null);
    assert_eq!(caps["version"], "1.0");
    assert_eq!(caps["limits"]["maxBatchSize"], 100);
    assert_eq!(caps["limits"]["maxPayloadBytes"], 1_048_576);
    assert_eq!(caps["limits"]["maxRequestsPerSecond"], 50);
    assert_eq!(caps["limits"]["maxConcurrentRequests"], 4);
    let node_types: Vec<&str> = caps["nodeTypes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(node_types.contains(&"taskItem"));
    assert!(node_types.contains(&"mathBlock"));
    assert_eq!(caps["operations"].as_array().unwrap().len(), OPERATIONS.len());
    assert_eq!(caps["queryOperators"], json!(["type", "level", "contains", "hasMarks"]));
}

#[test]
fn every_advertised_operation_is_routed() {
    let mut d = dispatcher("# A\n\ntext\n");
    for op in OPERATIONS {
        let response = call(&mut d, op, json!({}));
        if let Some(message) = &response.message {
            assert!(!message.starts_with("unknown operation"), "{op} is not routed");
        }
    }
}

#[test]
fn line_transport_round_trip() {
    let mut d = dispatcher("x\n");
    let reply = d
        .handle_line(r#"{"id":"42","type":"request","payload":{"type":"protocol.getRevision"}}"#)
        .unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply, json!({ "id": "42", "success": true, "data": { "revision": "r1" } }));
}

#[test]
fn payloads_over_the_limit_are_refused() {
    let limits = Limits {
        max_payload_bytes: 64,
        ..Limits::default()
    };
    let mut d = dispatcher_with("x\n", SessionSettings::default(), limits);
    let response = call(
        &mut d,
        "mutation.applyDiff",
        json!({ "baseRevision": "r1", "find": "x", "replace": "y".repeat(100) }),
    );
    assert_eq!(response.error_code(), Some(ErrorCode::TooLarge));
    assert!(response.recovery.is_some());
}

#[test]
fn failures_carry_recovery_hints() {
    let mut d = dispatcher("x\n");
    let response = call(
        &mut d,
        "mutation.batchEdit",
        json!({ "baseRevision": "r1", "operations": [{ "op": "delete", "target": "p-7" }] }),
    );
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("not_found"));
    assert!(response.recovery.is_some());
    assert!(response.data.is_none());
}

#[test]
fn missing_base_revision_is_rejected_before_anything_runs() {
    let mut d = dispatcher("x\n");
    let response = call(&mut d, "mutation.applyDiff", json!({ "find": "x", "replace": "y" }));
    assert_eq!(response.error_code(), Some(ErrorCode::InvalidOperation));
    assert_eq!(super::content(&mut d), "x\n");
}

#[test]
fn read_only_classification() {
    for op in OPERATIONS {
        let writes = op.starts_with("mutation.")
            || op.starts_with("section.")
            || op.starts_with("table.")
            || op.starts_with("list.");
        if writes {
            assert!(!is_read_only_operation(op), "{op}");
        }
    }
    assert!(is_read_only_operation("cursor.toOffset"));
}
