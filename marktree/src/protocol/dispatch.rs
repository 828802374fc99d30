//! Operation dispatch.

use super::{is_read_only_operation, Envelope, Limits, RateLimiter, Request, Response, OPERATIONS, PROTOCOL_VERSION};
use crate::cursor::{offset_to_tree_pos, tree_pos_to_offset};
use crate::error::ProtocolError;
use crate::mutation::{self, Mode, MutationOutcome};
use crate::query::{self, AstArgs, ListBlocksArgs, ResolveArgs, SectionArgs, AST_FIELDS};
use crate::session::{BulkOutcome, DocumentSession};
use crate::tree::{MarkType, NodeType};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Arguments naming a single suggestion.
#[derive(Debug, Deserialize)]
struct SuggestionId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PosArgs {
    pos: usize,
}

#[derive(Debug, Deserialize)]
struct OffsetArgs {
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct ContentArgs {
    content: String,
}

/// Routes requests to the session that owns the document.
#[derive(Debug)]
pub struct Dispatcher {
    session: DocumentSession,
    limits: Limits,
    limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(session: DocumentSession, limits: Limits) -> Self {
        Dispatcher {
            session,
            limiter: RateLimiter::new(limits.max_requests_per_second),
            limits,
        }
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DocumentSession {
        &mut self.session
    }

    pub fn into_session(self) -> DocumentSession {
        self.session
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Handle one line of the JSON-lines transport. Returns the serialized response, or `None`
    /// for envelopes that are not requests.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => self.handle_envelope(envelope)?,
            Err(err) => Response::failure(
                "",
                ProtocolError::invalid_operation(format!("malformed envelope: {err}")),
            ),
        };
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(error = %err, "response could not be serialized");
                None
            }
        }
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) -> Option<Response> {
        if envelope.msg_type != "request" {
            debug!(kind = %envelope.msg_type, "ignoring non-request envelope");
            return None;
        }
        let result = self
            .check_payload_size(&envelope.payload)
            .and_then(|()| Request::from_payload(envelope.payload))
            .and_then(|request| self.dispatch(request));
        Some(match result {
            Ok(data) => Response::success(envelope.id, data),
            Err(err) => Response::failure(envelope.id, err),
        })
    }

    fn check_payload_size(&self, payload: &Value) -> Result<(), ProtocolError> {
        let size = serde_json::to_string(payload).map_or(0, |text| text.len());
        if size > self.limits.max_payload_bytes {
            return Err(ProtocolError::too_large(format!(
                "payload is {size} bytes; the limit is {}",
                self.limits.max_payload_bytes
            )));
        }
        Ok(())
    }

    fn check_batch_size(&self, args: &Value) -> Result<(), ProtocolError> {
        let count = args
            .get("operations")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if count > self.limits.max_batch_size {
            return Err(ProtocolError::too_large(format!(
                "batch has {count} operations; the limit is {}",
                self.limits.max_batch_size
            )));
        }
        Ok(())
    }

    /// Run one request against the session.
    pub fn dispatch(&mut self, request: Request) -> Result<Value, ProtocolError> {
        if !self.limiter.try_acquire() {
            return Err(ProtocolError::rate_limited(self.limits.max_requests_per_second));
        }
        let op = request.request_type.as_str();
        let started = Instant::now();
        debug!(op, read_only = is_read_only_operation(op), "dispatching");
        self.check_batch_size(&request.args)?;
        let args = request.args;
        let result = self.route(op, args);
        match &result {
            Ok(_) => debug!(op, elapsed = ?started.elapsed(), "request handled"),
            Err(err) => debug!(op, code = %err.code, message = %err.message, "request failed"),
        }
        result
    }

    fn route(&mut self, op: &str, args: Value) -> Result<Value, ProtocolError> {
        let page_size = self.session.settings().default_page_size;
        match op {
            "protocol.getCapabilities" => Ok(self.capabilities()),
            "protocol.getRevision" => Ok(json!({ "revision": self.session.revision() })),
            "document.getContent" => Ok(json!({
                "content": self.session.content()?,
                "revision": self.session.revision(),
            })),
            "structure.getAst" => {
                let args: AstArgs = parse_args(op, args)?;
                to_value(query::get_ast(self.session.doc(), &args, page_size)?)
            }
            "structure.getDigest" => to_value(query::get_digest(self.session.doc())),
            "structure.listBlocks" => {
                let args: ListBlocksArgs = parse_args(op, args)?;
                to_value(query::list_blocks(self.session.doc(), &args, page_size)?)
            }
            "structure.resolveTargets" => {
                let args: ResolveArgs = parse_args(op, args)?;
                let max = args.max_results.unwrap_or(query::targets::DEFAULT_MAX_RESULTS);
                to_value(query::resolve_targets(self.session.doc(), &args.query, max))
            }
            "structure.getSection" => {
                let args: SectionArgs = parse_args(op, args)?;
                let options = self.session.serialize_options();
                to_value(query::get_section(self.session.doc(), &args, &options)?)
            }
            "cursor.toOffset" => {
                let args: PosArgs = parse_args(op, args)?;
                let options = self.session.serialize_options();
                let offset = tree_pos_to_offset(self.session.doc(), args.pos, &options)?;
                Ok(json!({ "offset": offset }))
            }
            "cursor.toPosition" => {
                let args: OffsetArgs = parse_args(op, args)?;
                let options = self.session.serialize_options();
                let pos = offset_to_tree_pos(self.session.doc(), args.offset, &options)?;
                Ok(json!({ "pos": pos }))
            }

            "mutation.batchEdit" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::batch::batch_edit(&mut self.session, &args)?)
            }
            "mutation.applyDiff" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::text::apply_diff(&mut self.session, &args)?)
            }
            "mutation.replaceAnchored" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::text::replace_anchored(&mut self.session, &args)?)
            }
            "section.update" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::section::update_section(&mut self.session, &args)?)
            }
            "section.insert" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::section::insert_section(&mut self.session, &args)?)
            }
            "section.move" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::section::move_section(&mut self.session, &args)?)
            }
            "table.batchModify" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::table::modify_table(&mut self.session, &args)?)
            }
            "list.batchModify" => {
                let args = parse_args(op, args)?;
                mutated(op, mutation::list::modify_list(&mut self.session, &args)?)
            }

            "document.setContent" => {
                let args: ContentArgs = parse_args(op, args)?;
                let revision = self.session.set_content(&args.content)?;
                Ok(json!({ "changed": revision.is_some(), "revision": self.session.revision() }))
            }
            "document.retry" => {
                let revision = self.session.retry()?;
                Ok(json!({ "changed": revision.is_some(), "revision": self.session.revision() }))
            }

            "suggestion.list" => {
                let store = self.session.suggestions();
                Ok(json!({
                    "suggestions": store.list(),
                    "focused": store.focused().map(|s| s.id.clone()),
                }))
            }
            "suggestion.accept" => {
                let args: SuggestionId = parse_args(op, args)?;
                let revision = self.session.accept_suggestion(&args.id)?;
                info!(suggestion = %args.id, %revision, "suggestion accepted");
                Ok(json!({ "id": args.id, "revision": revision }))
            }
            "suggestion.reject" => {
                let args: SuggestionId = parse_args(op, args)?;
                self.session.reject_suggestion(&args.id)?;
                Ok(json!({ "id": args.id, "revision": self.session.revision() }))
            }
            "suggestion.acceptAll" => Ok(bulk(self.session.accept_all(), self.session.revision())),
            "suggestion.rejectAll" => Ok(bulk(self.session.reject_all(), self.session.revision())),
            "suggestion.focus" => {
                let args: SuggestionId = parse_args(op, args)?;
                let focused = self
                    .session
                    .suggestions_mut()
                    .focus(&args.id)
                    .cloned()
                    .ok_or_else(|| ProtocolError::not_found(format!("no pending suggestion '{}'", args.id)))?;
                to_value(focused)
            }
            "suggestion.focusNext" => Ok(json!(self.session.suggestions_mut().focus_next().cloned())),
            "suggestion.focusPrev" => Ok(json!(self.session.suggestions_mut().focus_prev().cloned())),

            other => Err(ProtocolError::invalid_operation(format!("unknown operation '{other}'"))
                .with_recovery("Call protocol.getCapabilities for the supported operations")),
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "version": PROTOCOL_VERSION,
            "operations": OPERATIONS,
            "nodeTypes": NodeType::ALL.iter().map(NodeType::name).collect::<Vec<_>>(),
            "markTypes": MarkType::ALL,
            "queryOperators": ["type", "level", "contains", "hasMarks"],
            "projectionFields": AST_FIELDS,
            "mutationModes": [Mode::Apply, Mode::Suggest, Mode::DryRun],
            "autoApproveEdits": self.session.settings().auto_approve_edits,
            "limits": self.limits,
        })
    }
}

/// Deserialize request arguments, reporting bad shapes before anything reads the tree.
fn parse_args<T: DeserializeOwned>(op: &str, args: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(args)
        .map_err(|err| ProtocolError::invalid_operation(format!("invalid arguments for {op}: {err}")))
}

fn to_value(value: impl serde::Serialize) -> Result<Value, ProtocolError> {
    serde_json::to_value(value)
        .map_err(|err| ProtocolError::invalid_operation(format!("response could not be encoded: {err}")))
}

fn mutated(op: &str, outcome: MutationOutcome) -> Result<Value, ProtocolError> {
    if outcome.applied {
        info!(op, revision = %outcome.revision, "mutation applied");
    }
    for warning in &outcome.warnings {
        warn!(op, %warning, "batch operation skipped");
    }
    to_value(outcome)
}

fn bulk(outcome: BulkOutcome, current: crate::revision::Revision) -> Value {
    json!({
        "ids": outcome.ids,
        "warnings": outcome.warnings,
        "revision": outcome.revision.unwrap_or(current),
    })
}
