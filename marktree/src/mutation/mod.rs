//! Mutation engine
//!
//!     Every mutating call runs the same three stages without yielding in between:
//!
//!         validate        baseRevision present and current, payload already deserialized
//!         resolve-target  the node, section, table or list the call names
//!         execute         gated by mode
//!
//!     A missing `baseRevision` is an `invalid_operation`; a stale one is a `conflict` carrying
//!     the current revision. Neither is retried or merged here: the caller re-reads and tries
//!     again.
//!
//!     Modes
//!
//!         apply    commit the new tree and bump the revision once. When auto-approve is off,
//!                  apply quietly becomes suggest.
//!         suggest  leave the committed tree alone and register suggestions (section updates
//!                  stage their new content so it can be shown in place).
//!         dryRun   touch nothing; return a preview of what apply would do.
//!
//!     Each operation builds the tree it wants on a copy of the current one and hands that copy
//!     to [`finish`], which owns the mode logic. Batch operations are best-effort per
//!     sub-operation: an operation that cannot be carried out is skipped and reported in
//!     `warnings`, and the rest of the batch still applies.

pub mod batch;
pub mod list;
pub mod section;
pub mod table;
pub mod text;

use crate::error::ProtocolError;
use crate::formats::markdown::{serialize_blocks, SerializeOptions};
use crate::ids::{find_by_id, identify};
use crate::query::targets::{score_candidates, TargetQuery, AMBIGUITY_FLOOR};
use crate::revision::Revision;
use crate::session::DocumentSession;
use crate::suggestion::{Proposal, SuggestionScope, SuggestionType};
use crate::tree::Node;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{capture_diff_slices, Algorithm, DiffTag, TextDiff};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Apply,
    Suggest,
    DryRun,
}

/// Where new content goes relative to a reference block or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    Before,
    #[default]
    After,
}

/// Fields every mutating request carries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationHeader {
    pub base_revision: Option<String>,
    #[serde(default)]
    pub mode: Mode,
}

/// What a mutation call reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// The mode that actually ran, after any auto-approve downgrade.
    pub mode: Mode,
    pub applied: bool,
    pub revision: Revision,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestion_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Value>,
}

impl MutationOutcome {
    pub(crate) fn new(mode: Mode, revision: Revision) -> Self {
        MutationOutcome {
            mode,
            applied: false,
            revision,
            changed: Vec::new(),
            added: Vec::new(),
            deleted: Vec::new(),
            suggestion_ids: Vec::new(),
            warnings: Vec::new(),
            preview: None,
        }
    }
}

/// Validate stage: check the revision and settle the mode that will run.
pub fn begin(session: &DocumentSession, header: &MutationHeader) -> Result<Mode, ProtocolError> {
    let base = header.base_revision.as_deref().ok_or_else(|| {
        ProtocolError::invalid_operation("baseRevision is required for mutations")
            .with_recovery("Call protocol.getRevision and pass the result as baseRevision")
    })?;
    if !session.revisions().is_current(base) {
        return Err(ProtocolError::conflict(&session.revision().to_string()));
    }
    if header.mode == Mode::Apply && !session.settings().auto_approve_edits {
        debug!("auto-approve is off; running apply as suggest");
        return Ok(Mode::Suggest);
    }
    Ok(header.mode)
}

/// Execute stage for operations that produce a whole new tree.
pub fn finish(
    session: &mut DocumentSession,
    mode: Mode,
    after: Node,
    warnings: Vec<String>,
) -> Result<MutationOutcome, ProtocolError> {
    let options = session.serialize_options();
    let ids = id_changes(session.doc(), &after);
    let mut outcome = MutationOutcome::new(mode, session.revision());
    outcome.warnings = warnings;
    match mode {
        Mode::DryRun => {
            outcome.preview = Some(preview(session.doc(), &after, &options, &ids)?);
        }
        Mode::Apply => {
            if let Some(revision) = session.commit(after) {
                outcome.applied = true;
                outcome.revision = revision;
                outcome.changed = ids.changed;
                outcome.added = ids.added;
                outcome.deleted = ids.deleted;
            }
        }
        Mode::Suggest => {
            for proposal in block_proposals(session.doc(), &after, &options)? {
                outcome.suggestion_ids.push(session.suggest(proposal));
            }
        }
    }
    Ok(outcome)
}

/// Top-level IDs that a change from `before` to `after` touches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdChanges {
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

/// Compare top-level blocks with a sequence diff. Replaced runs pair up old and new blocks
/// one to one (reported as changed, under the new IDs); leftovers are deletions or additions.
pub fn id_changes(before: &Node, after: &Node) -> IdChanges {
    let old_ids = top_level_ids(before);
    let new_ids = top_level_ids(after);
    let old_prints: Vec<String> = before.content.iter().map(fingerprint).collect();
    let new_prints: Vec<String> = after.content.iter().map(fingerprint).collect();

    let mut out = IdChanges::default();
    for op in capture_diff_slices(Algorithm::Myers, &old_prints, &new_prints) {
        let (tag, old, new) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {}
            DiffTag::Delete => out.deleted.extend_from_slice(&old_ids[old]),
            DiffTag::Insert => out.added.extend_from_slice(&new_ids[new]),
            DiffTag::Replace => {
                let paired = old.len().min(new.len());
                out.changed
                    .extend_from_slice(&new_ids[new.start..new.start + paired]);
                out.deleted
                    .extend_from_slice(&old_ids[old.start + paired..old.end]);
                out.added
                    .extend_from_slice(&new_ids[new.start + paired..new.end]);
            }
        }
    }
    out
}

fn top_level_ids(doc: &Node) -> Vec<String> {
    identify(doc)
        .into_iter()
        .filter(|n| n.depth == 0)
        .map(|n| n.id)
        .collect()
}

fn fingerprint(node: &Node) -> String {
    format!("{node:?}")
}

/// Block-scope suggestions turning `before` into `after`, one per differing run of top-level
/// blocks. Ranges are positions in `before`.
pub fn block_proposals(
    before: &Node,
    after: &Node,
    options: &SerializeOptions,
) -> Result<Vec<Proposal>, ProtocolError> {
    let old_prints: Vec<String> = before.content.iter().map(fingerprint).collect();
    let new_prints: Vec<String> = after.content.iter().map(fingerprint).collect();
    let offset_of = |index: usize| -> usize { before.content[..index].iter().map(Node::node_size).sum() };

    let mut out = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, &old_prints, &new_prints) {
        let (tag, old, new) = op.as_tag_tuple();
        let from = offset_of(old.start);
        let to = offset_of(old.end);
        let original = || serialize_blocks(&before.content[old.clone()], options);
        let replacement = || serialize_blocks(&after.content[new.clone()], options);
        let proposal = match tag {
            DiffTag::Equal => continue,
            DiffTag::Delete => Proposal {
                kind: SuggestionType::Delete,
                scope: SuggestionScope::Block,
                from,
                to,
                new_content: None,
                original_content: Some(original()?),
                staged: false,
            },
            DiffTag::Insert => Proposal {
                kind: SuggestionType::Insert,
                scope: SuggestionScope::Block,
                from,
                to: from,
                new_content: Some(replacement()?),
                original_content: None,
                staged: false,
            },
            DiffTag::Replace => Proposal {
                kind: SuggestionType::Replace,
                scope: SuggestionScope::Block,
                from,
                to,
                new_content: Some(replacement()?),
                original_content: Some(original()?),
                staged: false,
            },
        };
        out.push(proposal);
    }
    Ok(out)
}

/// Preview payload for `dryRun`: the IDs that would change and a unified diff of the markdown.
pub fn preview(
    before: &Node,
    after: &Node,
    options: &SerializeOptions,
    ids: &IdChanges,
) -> Result<Value, ProtocolError> {
    let old = serialize_blocks(&before.content, options)?;
    let new = serialize_blocks(&after.content, options)?;
    let diff = TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(2)
        .header("current", "proposed")
        .to_string();
    Ok(serde_json::json!({
        "changed": ids.changed,
        "added": ids.added,
        "deleted": ids.deleted,
        "diff": diff,
    }))
}

/// How a mutation names a block.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Id { id: String },
    Query(TargetQuery),
    Bare(String),
}

/// A resolved target: its ID and path in the snapshot it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: String,
    pub path: Vec<usize>,
}

/// Resolve-target stage.
///
/// Text queries are narrowed by their type and level hints, then must single out one node:
/// several candidates at the ambiguity floor, or a tie at the top score, are refused.
pub fn resolve(doc: &Node, target: &Target) -> Result<Resolved, ProtocolError> {
    let query = match target {
        Target::Id { id } | Target::Bare(id) => {
            return find_by_id(doc, id)
                .map(|n| Resolved { id: n.id, path: n.path })
                .ok_or_else(|| ProtocolError::not_found(format!("no block with id '{id}'")));
        }
        Target::Query(query) => query,
    };

    let candidates: Vec<_> = score_candidates(doc, query)
        .into_iter()
        .filter(|c| query.types.as_ref().map_or(true, |t| t.contains(&c.kind)))
        .filter(|c| query.level.is_none() || doc.node_at(&c.path).and_then(Node::level) == query.level)
        .collect();
    let Some(best) = candidates.first() else {
        return Err(ProtocolError::not_found(format!("no block matches '{}'", query.text)));
    };
    let strong = candidates.iter().filter(|c| c.score >= AMBIGUITY_FLOOR).count();
    let tied = candidates.iter().filter(|c| c.score == best.score).count();
    if strong > 1 || tied > 1 {
        let listed = serde_json::to_value(&candidates).unwrap_or(Value::Null);
        return Err(ProtocolError::ambiguous(
            format!("{} blocks match '{}'", candidates.len(), query.text),
            listed,
        ));
    }
    Ok(Resolved {
        id: best.id.clone(),
        path: best.path.clone(),
    })
}

/// Resolve a target and walk up to the nearest ancestor-or-self accepted by `want`.
pub fn resolve_enclosing(
    doc: &Node,
    target: &Target,
    what: &str,
    want: impl Fn(&Node) -> bool,
) -> Result<Vec<usize>, ProtocolError> {
    let resolved = resolve(doc, target)?;
    let mut path = resolved.path;
    loop {
        if doc.node_at(&path).is_some_and(&want) {
            return Ok(path);
        }
        if path.pop().is_none() {
            return Err(ProtocolError::not_found(format!(
                "'{}' is not inside a {what}",
                resolved.id
            )));
        }
    }
}
