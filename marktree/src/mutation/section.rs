//! Section operations: `section.update`, `section.insert`, `section.move`
//!
//! Sections are resolved with the same rules as `structure.getSection` and always refer to
//! top-level headings.
//!
//! In suggest mode `section.update` is the one operation that puts its content in the tree
//! before a decision is made: the new body is staged and the suggestion remembers the old body
//! so rejecting it can put that back.

use super::{begin, finish, MutationHeader, MutationOutcome, Mode, Placement};
use crate::error::ProtocolError;
use crate::formats::markdown::{parse_blocks, parse_inline, serialize_blocks};
use crate::query::section::{find_section, HeadingSelector, Section};
use crate::session::DocumentSession;
use crate::suggestion::{Proposal, SuggestionScope, SuggestionType};
use crate::tree::Node;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSectionArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub heading: HeadingSelector,
    /// Markdown for the new body.
    pub content: String,
    /// Replace the subsections too. Off by default, so only the text directly under the
    /// heading is replaced.
    #[serde(default)]
    pub include_nested: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSectionArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub title: String,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub content: String,
    /// Section to insert next to; without one the section goes at the end (or start) of the
    /// document.
    pub anchor: Option<HeadingSelector>,
    #[serde(default)]
    pub position: Placement,
}

fn default_level() -> u8 {
    2
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSectionArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub heading: HeadingSelector,
    pub target: HeadingSelector,
    #[serde(default)]
    pub position: Placement,
}

/// `section.update`
pub fn update_section(
    session: &mut DocumentSession,
    args: &UpdateSectionArgs,
) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    let section = find_section(session.doc(), &args.heading, args.include_nested)?;
    let blocks = parse_blocks(&args.content, &session.settings().markdown)?;
    let mut doc = session.doc().clone();
    doc.content
        .splice(section.heading_index + 1..section.end_index, blocks.clone());

    if mode != Mode::Suggest {
        return finish(session, mode, doc, Vec::new());
    }
    stage_update(session, &section, doc, &blocks)
}

fn stage_update(
    session: &mut DocumentSession,
    section: &Section,
    staged: Node,
    blocks: &[Node],
) -> Result<MutationOutcome, ProtocolError> {
    let options = session.serialize_options();
    let old_body = section.body_blocks(session.doc());
    let original = serialize_blocks(old_body, &options)?;
    let replacement = serialize_blocks(blocks, &options)?;
    let new_size: usize = blocks.iter().map(Node::node_size).sum();
    let from = section.body.from;

    let proposal = match (old_body.is_empty(), blocks.is_empty()) {
        (true, true) => None,
        (false, true) => Some(Proposal {
            kind: SuggestionType::Delete,
            scope: SuggestionScope::Block,
            from,
            to: section.body.to,
            new_content: None,
            original_content: Some(original),
            staged: false,
        }),
        (true, false) => Some(Proposal {
            kind: SuggestionType::Insert,
            scope: SuggestionScope::Block,
            from,
            to: from + new_size,
            new_content: Some(replacement),
            original_content: None,
            staged: true,
        }),
        (false, false) => Some(Proposal {
            kind: SuggestionType::Replace,
            scope: SuggestionScope::Block,
            from,
            to: from + new_size,
            new_content: Some(replacement),
            original_content: Some(original),
            staged: true,
        }),
    };

    let mut outcome = MutationOutcome::new(Mode::Suggest, session.revision());
    if let Some(proposal) = proposal {
        if proposal.staged {
            session.stage(staged);
        }
        debug!(section = %section.heading_id, staged = proposal.staged, "section update suggested");
        outcome.suggestion_ids.push(session.suggest(proposal));
    }
    Ok(outcome)
}

/// `section.insert`
pub fn insert_section(
    session: &mut DocumentSession,
    args: &InsertSectionArgs,
) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    if !(1..=6).contains(&args.level) {
        return Err(ProtocolError::invalid_operation(format!(
            "heading level must be 1 to 6, got {}",
            args.level
        )));
    }
    let at = match &args.anchor {
        Some(anchor) => {
            let section = find_section(session.doc(), anchor, true)?;
            match args.position {
                Placement::Before => section.heading_index,
                Placement::After => section.end_index,
            }
        }
        None => match args.position {
            Placement::Before => 0,
            Placement::After => session.doc().content.len(),
        },
    };

    let options = &session.settings().markdown;
    let title = parse_inline(&args.title, options)?;
    let mut blocks = vec![Node::heading(args.level, title)];
    blocks.extend(parse_blocks(&args.content, options)?);

    let mut doc = session.doc().clone();
    doc.content.splice(at..at, blocks);
    finish(session, mode, doc, Vec::new())
}

/// `section.move`
pub fn move_section(session: &mut DocumentSession, args: &MoveSectionArgs) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    let source = find_section(session.doc(), &args.heading, true)?;
    let target = find_section(session.doc(), &args.target, true)?;
    if (source.heading_index..source.end_index).contains(&target.heading_index) {
        return Err(ProtocolError::invalid_operation(
            "a section cannot be moved relative to itself or one of its subsections",
        ));
    }
    let at = match args.position {
        Placement::Before => target.heading_index,
        Placement::After => target.end_index,
    };

    if mode == Mode::Suggest {
        return suggest_move(session, &source, at);
    }

    let mut doc = session.doc().clone();
    let moved: Vec<Node> = doc.content[source.heading_index..source.end_index].to_vec();
    // The later of the two edits goes first so the earlier index stays valid.
    if at >= source.end_index {
        doc.content.splice(at..at, moved);
        doc.content.drain(source.heading_index..source.end_index);
    } else {
        doc.content.drain(source.heading_index..source.end_index);
        doc.content.splice(at..at, moved);
    }
    finish(session, mode, doc, Vec::new())
}

/// A move as a delete of the source paired with an insert at the destination, both in current
/// positions.
fn suggest_move(session: &mut DocumentSession, source: &Section, at: usize) -> Result<MutationOutcome, ProtocolError> {
    let options = session.serialize_options();
    let doc = session.doc();
    let markdown = serialize_blocks(&doc.content[source.heading_index..source.end_index], &options)?;
    let insert_at: usize = doc.content[..at].iter().map(Node::node_size).sum();

    let delete = Proposal {
        kind: SuggestionType::Delete,
        scope: SuggestionScope::Block,
        from: source.range.from,
        to: source.range.to,
        new_content: None,
        original_content: Some(markdown.clone()),
        staged: false,
    };
    let insert = Proposal {
        kind: SuggestionType::Insert,
        scope: SuggestionScope::Block,
        from: insert_at,
        to: insert_at,
        new_content: Some(markdown),
        original_content: None,
        staged: false,
    };
    let mut outcome = MutationOutcome::new(Mode::Suggest, session.revision());
    outcome.suggestion_ids.push(session.suggest(delete));
    outcome.suggestion_ids.push(session.suggest(insert));
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::session::SessionSettings;
    use serde_json::json;

    fn session(text: &str) -> DocumentSession {
        DocumentSession::load(text, SessionSettings::default()).unwrap()
    }

    fn update(heading: &str, content: &str, mode: &str) -> UpdateSectionArgs {
        serde_json::from_value(json!({
            "baseRevision": "r1",
            "mode": mode,
            "heading": heading,
            "content": content,
        }))
        .unwrap()
    }

    #[test]
    fn update_replaces_direct_body_only() {
        let mut s = session("# A\n\nold\n\n## B\n\nkeep\n");
        update_section(&mut s, &update("A", "new\n\nlines", "apply")).unwrap();
        assert_eq!(s.content().unwrap(), "# A\n\nnew\n\nlines\n\n## B\n\nkeep\n");
    }

    #[test]
    fn suggested_update_is_staged_and_reject_restores() {
        let mut s = session("# Title\n\nOld\n");
        let outcome = update_section(&mut s, &update("Title", "New", "suggest")).unwrap();
        assert_eq!(outcome.suggestion_ids.len(), 1);
        assert_eq!(s.content().unwrap(), "# Title\n\nNew\n");
        assert_eq!(s.revision().to_string(), "r1");

        s.reject_suggestion(&outcome.suggestion_ids[0]).unwrap();
        assert_eq!(s.content().unwrap(), "# Title\n\nOld\n");
        assert_eq!(s.revision().to_string(), "r1");
    }

    #[test]
    fn accepting_a_staged_update_commits_it() {
        let mut s = session("# Title\n\nOld\n");
        let outcome = update_section(&mut s, &update("Title", "New", "suggest")).unwrap();
        let revision = s.accept_suggestion(&outcome.suggestion_ids[0]).unwrap();
        assert_eq!(revision.to_string(), "r2");
        assert_eq!(s.content().unwrap(), "# Title\n\nNew\n");
    }

    #[test]
    fn suggested_update_of_empty_section_is_a_staged_insert() {
        let mut s = session("# Empty\n\n# Next\n");
        let outcome = update_section(&mut s, &update("Empty", "filled", "suggest")).unwrap();
        let id = &outcome.suggestion_ids[0];
        assert_eq!(s.suggestions().get(id).unwrap().kind, SuggestionType::Insert);
        s.reject_suggestion(id).unwrap();
        assert_eq!(s.content().unwrap(), "# Empty\n\n# Next\n");
    }

    #[test]
    fn insert_after_anchor_section() {
        let mut s = session("# A\n\na\n\n## A1\n\n# B\n");
        let args: InsertSectionArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "title": "New",
            "content": "text",
            "anchor": "A",
        }))
        .unwrap();
        insert_section(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "# A\n\na\n\n## A1\n\n## New\n\ntext\n\n# B\n");
    }

    #[test]
    fn move_before_and_after() {
        let mut s = session("# A\n\na\n\n# B\n\nb\n\n# C\n");
        let args: MoveSectionArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "heading": "A",
            "target": "C",
        }))
        .unwrap();
        move_section(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "# B\n\nb\n\n# C\n\n# A\n\na\n");

        let args: MoveSectionArgs = serde_json::from_value(json!({
            "baseRevision": "r2",
            "heading": "C",
            "target": "B",
            "position": "before",
        }))
        .unwrap();
        move_section(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "# C\n\n# B\n\nb\n\n# A\n\na\n");
    }

    #[test]
    fn move_into_own_subsection_is_refused() {
        let mut s = session("# A\n\n## A1\n\n# B\n");
        let args: MoveSectionArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "heading": "A",
            "target": "A1",
        }))
        .unwrap();
        assert_eq!(move_section(&mut s, &args).unwrap_err().code, ErrorCode::InvalidOperation);
    }

    #[test]
    fn suggested_move_pairs_delete_and_insert() {
        let mut s = session("# A\n\na\n\n# B\n");
        let args: MoveSectionArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "mode": "suggest",
            "heading": "A",
            "target": "B",
        }))
        .unwrap();
        let outcome = move_section(&mut s, &args).unwrap();
        assert_eq!(outcome.suggestion_ids.len(), 2);
        s.accept_all();
        assert_eq!(s.content().unwrap(), "# B\n\n# A\n\na\n");
    }
}
