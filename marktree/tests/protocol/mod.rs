mod envelope;
mod revisions;

use marktree::protocol::{Request, Response};
use marktree::session::SessionSettings;
use marktree::{Dispatcher, DocumentSession, Limits};
use serde_json::Value;

pub fn dispatcher(text: &str) -> Dispatcher {
    dispatcher_with(text, SessionSettings::default(), Limits::default())
}

pub fn dispatcher_with(text: &str, settings: SessionSettings, limits: Limits) -> Dispatcher {
    let session = DocumentSession::load(text, settings).expect("document to load");
    Dispatcher::new(session, limits)
}

/// Run one request and return `data`, panicking with the error on failure.
pub fn ok(d: &mut Dispatcher, op: &str, args: Value) -> Value {
    match d.dispatch(Request::new(op, args)) {
        Ok(data) => data,
        Err(err) => panic!("{op} failed: {err}"),
    }
}

/// Run one request through the envelope layer.
pub fn call(d: &mut Dispatcher, op: &str, args: Value) -> Response {
    let mut payload = match args {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    payload.insert("type".to_string(), Value::String(op.to_string()));
    d.handle_envelope(marktree::protocol::Envelope {
        id: "t".to_string(),
        msg_type: "request".to_string(),
        payload: Value::Object(payload),
    })
    .expect("requests always get a response")
}

pub fn content(d: &mut Dispatcher) -> String {
    ok(d, "document.getContent", Value::Null)["content"]
        .as_str()
        .expect("content is a string")
        .to_string()
}

pub fn revision(d: &mut Dispatcher) -> String {
    ok(d, "protocol.getRevision", Value::Null)["revision"]
        .as_str()
        .expect("revision is a string")
        .to_string()
}
