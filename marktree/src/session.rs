//! Document session
//!
//!     The session is the single owner of one open document: its tree, the revision tracker, the
//!     suggestion store, the style detected in the source text and the settings that drive
//!     parsing and serialization. Queries borrow the tree; every change to it goes through
//!     [`DocumentSession::commit`] or [`DocumentSession::stage`] so that pending suggestions are
//!     remapped and the revision moves exactly once per committed transaction.
//!
//!     External changes (the file changed on disk, the user edited the raw text) arrive through
//!     [`DocumentSession::set_content`]. A parse failure never replaces the tree: the last good
//!     tree stays current, the failure is recorded and logged, and [`DocumentSession::retry`]
//!     tries the same text again later.

use crate::cursor::{map_offset_through, CoordinateMapper, Selection};
use crate::error::{FormatError, ProtocolError};
use crate::formats::markdown::{
    detect_style, parse_blocks, parse_markdown, serialize_markdown, MarkdownOptions, SerializeOptions,
    SourceStyle,
};
use crate::revision::{Revision, RevisionTracker};
use crate::suggestion::{
    Proposal, Suggestion, SuggestionEvent, SuggestionScope, SuggestionStore, SuggestionType,
};
use crate::tree::edit::{replace_block_range, replace_inline_range};
use crate::tree::pos::diff_range;
use crate::tree::Node;
use std::time::Instant;
use tracing::{debug, warn};

/// Tunables for anchored replacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSettings {
    /// Minimum context similarity (0.0 to 1.0) a drifted anchor must reach.
    pub context_similarity_threshold: f64,
    /// How far, in characters, an anchor may drift from its expected offset.
    pub max_distance: usize,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        AnchorSettings {
            context_similarity_threshold: 0.8,
            max_distance: 200,
        }
    }
}

/// Settings a session reads; the session never changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub markdown: MarkdownOptions,
    /// When off, `apply` mutations are downgraded to `suggest`.
    pub auto_approve_edits: bool,
    pub default_page_size: usize,
    pub anchoring: AnchorSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            markdown: MarkdownOptions::default(),
            auto_approve_edits: true,
            default_page_size: 50,
            anchoring: AnchorSettings::default(),
        }
    }
}

/// Result of accepting or rejecting every pending suggestion at once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkOutcome {
    pub ids: Vec<String>,
    pub warnings: Vec<String>,
    pub revision: Option<Revision>,
}

#[derive(Debug)]
pub struct DocumentSession {
    doc: Node,
    style: SourceStyle,
    settings: SessionSettings,
    revisions: RevisionTracker,
    suggestions: SuggestionStore,
    last_error: Option<FormatError>,
    pending_text: Option<String>,
}

impl DocumentSession {
    /// Parse `text` into a fresh session at the initial revision.
    pub fn load(text: &str, settings: SessionSettings) -> Result<Self, FormatError> {
        let started = Instant::now();
        let doc = parse_markdown(text, &settings.markdown)?;
        debug!(
            chars = text.len(),
            blocks = doc.content.len(),
            elapsed = ?started.elapsed(),
            "document loaded"
        );
        Ok(DocumentSession {
            doc,
            style: detect_style(text),
            settings,
            revisions: RevisionTracker::new(),
            suggestions: SuggestionStore::new(),
            last_error: None,
            pending_text: None,
        })
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn revision(&self) -> Revision {
        self.revisions.current()
    }

    pub fn revisions(&self) -> &RevisionTracker {
        &self.revisions
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn style(&self) -> SourceStyle {
        self.style
    }

    pub fn suggestions(&self) -> &SuggestionStore {
        &self.suggestions
    }

    pub fn suggestions_mut(&mut self) -> &mut SuggestionStore {
        &mut self.suggestions
    }

    /// The failure of the most recent external change, if it did not parse.
    pub fn last_error(&self) -> Option<&FormatError> {
        self.last_error.as_ref()
    }

    /// Serializer settings resolved against the detected source style.
    pub fn serialize_options(&self) -> SerializeOptions {
        self.settings.markdown.serialize_options(&self.style)
    }

    /// The document as markdown, in the style it will be saved with.
    pub fn content(&self) -> Result<String, FormatError> {
        serialize_markdown(&self.doc, &self.serialize_options())
    }

    /// Replace the document after an external change.
    ///
    /// On a parse failure the current tree is kept, the error is recorded and the text is kept
    /// for [`DocumentSession::retry`].
    pub fn set_content(&mut self, text: &str) -> Result<Option<Revision>, FormatError> {
        match parse_markdown(text, &self.settings.markdown) {
            Ok(doc) => {
                self.style = detect_style(text);
                self.last_error = None;
                self.pending_text = None;
                Ok(self.commit(doc))
            }
            Err(err) => {
                warn!(error = %err, "external change did not parse; keeping last good document");
                self.last_error = Some(err.clone());
                self.pending_text = Some(text.to_string());
                Err(err)
            }
        }
    }

    /// Parse the text of the last failed external change again. `Ok(None)` when nothing is
    /// pending.
    pub fn retry(&mut self) -> Result<Option<Revision>, FormatError> {
        match self.pending_text.take() {
            Some(text) => self.set_content(&text),
            None => Ok(None),
        }
    }

    /// Like [`DocumentSession::set_content`], carrying a selection across the reparse.
    pub fn set_content_preserving_cursor(
        &mut self,
        text: &str,
        selection: Selection,
    ) -> Result<Selection, FormatError> {
        let options = self.serialize_options();
        let old = CoordinateMapper::new(&self.doc, &options)?;
        let (anchor, head) = old.selection_to_offsets(selection);
        let anchor = map_offset_through(old.text(), text, anchor);
        let head = map_offset_through(old.text(), text, head);

        self.set_content(text)?;

        let new = CoordinateMapper::new(&self.doc, &self.serialize_options())?;
        // The raw text and its canonical serialization may differ.
        let anchor = map_offset_through(text, new.text(), anchor);
        let head = map_offset_through(text, new.text(), head);
        Ok(new.offsets_to_selection(anchor, head))
    }

    /// Make `doc` the committed document. Returns the new revision, or `None` when `doc` equals
    /// the current tree and nothing was committed.
    pub fn commit(&mut self, doc: Node) -> Option<Revision> {
        let change = diff_range(&self.doc, &doc)?;
        self.doc = doc;
        self.suggestions.remap(&change);
        Some(self.revisions.bump())
    }

    /// Put `doc` in place without committing it: used for suggestion content that must be
    /// visible before it is accepted, and for undoing such content on reject.
    pub fn stage(&mut self, doc: Node) {
        if let Some(change) = diff_range(&self.doc, &doc) {
            self.doc = doc;
            self.suggestions.remap(&change);
        }
    }

    pub fn suggest(&mut self, proposal: Proposal) -> String {
        self.suggestions.add(proposal)
    }

    /// Accept a pending suggestion. Returns the revision the acceptance produced.
    pub fn accept_suggestion(&mut self, id: &str) -> Result<Revision, ProtocolError> {
        let suggestion = self
            .suggestions
            .take(id)
            .ok_or_else(|| ProtocolError::not_found(format!("no pending suggestion '{id}'")))?;
        let revision = if suggestion.staged {
            self.revisions.bump()
        } else {
            let mut doc = self.doc.clone();
            if let Err(err) = materialize(&mut doc, &suggestion, &self.settings.markdown) {
                self.suggestions.add(proposal_of(&suggestion));
                return Err(err);
            }
            self.commit(doc).unwrap_or_else(|| self.revisions.bump())
        };
        self.suggestions.publish(SuggestionEvent::Accepted(id.to_string()));
        Ok(revision)
    }

    /// Reject a pending suggestion, undoing any staged content. Never bumps the revision.
    pub fn reject_suggestion(&mut self, id: &str) -> Result<(), ProtocolError> {
        let suggestion = self
            .suggestions
            .take(id)
            .ok_or_else(|| ProtocolError::not_found(format!("no pending suggestion '{id}'")))?;
        if suggestion.staged {
            let mut doc = self.doc.clone();
            revert(&mut doc, &suggestion, &self.settings.markdown)?;
            self.stage(doc);
        }
        self.suggestions.publish(SuggestionEvent::Rejected(id.to_string()));
        Ok(())
    }

    /// Accept everything pending as one transaction.
    pub fn accept_all(&mut self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let mut doc = self.doc.clone();
        let mut any_staged = false;
        for suggestion in self.drain_descending() {
            if suggestion.staged {
                any_staged = true;
            } else if let Err(err) = materialize(&mut doc, &suggestion, &self.settings.markdown) {
                outcome.warnings.push(format!("{}: {}", suggestion.id, err.message));
                continue;
            }
            outcome.ids.push(suggestion.id);
        }
        outcome.revision = match self.commit(doc) {
            Some(revision) => Some(revision),
            None if any_staged => Some(self.revisions.bump()),
            None => None,
        };
        for id in &outcome.ids {
            self.suggestions.publish(SuggestionEvent::Accepted(id.clone()));
        }
        outcome
    }

    /// Reject everything pending, restoring staged content.
    pub fn reject_all(&mut self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let mut doc = self.doc.clone();
        for suggestion in self.drain_descending() {
            if suggestion.staged {
                if let Err(err) = revert(&mut doc, &suggestion, &self.settings.markdown) {
                    outcome.warnings.push(format!("{}: {}", suggestion.id, err.message));
                }
            }
            outcome.ids.push(suggestion.id);
        }
        self.stage(doc);
        for id in &outcome.ids {
            self.suggestions.publish(SuggestionEvent::Rejected(id.clone()));
        }
        outcome
    }

    /// Remove every suggestion, last position first so earlier ranges stay valid while the
    /// later ones are applied.
    fn drain_descending(&mut self) -> Vec<Suggestion> {
        let ids: Vec<String> = self.suggestions.list().iter().rev().map(|s| s.id.clone()).collect();
        ids.iter().filter_map(|id| self.suggestions.take(id)).collect()
    }
}

fn proposal_of(s: &Suggestion) -> Proposal {
    Proposal {
        kind: s.kind,
        scope: s.scope,
        from: s.from,
        to: s.to,
        new_content: s.new_content.clone(),
        original_content: s.original_content.clone(),
        staged: s.staged,
    }
}

/// Write `content` over `from..to`: markdown blocks for block scope, plain text for inline.
pub(crate) fn replace_range(
    doc: &mut Node,
    scope: SuggestionScope,
    from: usize,
    to: usize,
    content: Option<&str>,
    options: &MarkdownOptions,
) -> Result<(), ProtocolError> {
    match scope {
        SuggestionScope::Block => {
            let blocks = match content {
                Some(markdown) if !markdown.trim().is_empty() => parse_blocks(markdown, options)?,
                _ => Vec::new(),
            };
            replace_block_range(doc, from, to, blocks).map_err(ProtocolError::invalid_operation)
        }
        SuggestionScope::Inline => replace_inline_range(doc, from, to, content.unwrap_or(""))
            .map_err(ProtocolError::invalid_operation),
    }
}

/// Apply an unstaged suggestion to `doc`.
fn materialize(doc: &mut Node, s: &Suggestion, options: &MarkdownOptions) -> Result<(), ProtocolError> {
    match s.kind {
        SuggestionType::Insert | SuggestionType::Replace => {
            replace_range(doc, s.scope, s.from, s.to, s.new_content.as_deref(), options)
        }
        SuggestionType::Delete => replace_range(doc, s.scope, s.from, s.to, None, options),
    }
}

/// Undo a staged suggestion in `doc`.
fn revert(doc: &mut Node, s: &Suggestion, options: &MarkdownOptions) -> Result<(), ProtocolError> {
    match s.kind {
        SuggestionType::Insert => replace_range(doc, s.scope, s.from, s.to, None, options),
        SuggestionType::Replace => {
            replace_range(doc, s.scope, s.from, s.to, s.original_content.as_deref(), options)
        }
        SuggestionType::Delete => Ok(()),
    }
}
