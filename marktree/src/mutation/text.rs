//! Text replacement: `mutation.applyDiff` and `mutation.replaceAnchored`
//!
//! `applyDiff` finds literal text inside textblocks and swaps it, keeping the marks of the text
//! it replaces. `replaceAnchored` works on the serialized markdown instead: it relocates an
//! anchor that may have drifted since the caller read the document by comparing the text around
//! each occurrence with the context the caller remembered.

use super::batch::find_all;
use super::{begin, finish, resolve, MutationHeader, MutationOutcome, Mode, Target};
use crate::error::ProtocolError;
use crate::formats::markdown::parse_markdown;
use crate::ids::id_at_path;
use crate::session::DocumentSession;
use crate::suggestion::{Proposal, SuggestionScope, SuggestionType};
use crate::tree::edit::splice_text;
use crate::tree::pos::textblocks;
use serde::Deserialize;
use serde_json::json;
use similar::TextDiff;
use tracing::debug;

/// Characters of surrounding text reported with each match.
const CONTEXT_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    #[default]
    First,
    All,
    Nth,
    ErrorIfMultiple,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDiffArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub match_policy: MatchPolicy,
    /// Zero-based match index for [`MatchPolicy::Nth`].
    pub nth: Option<usize>,
    /// Restrict matching to the textblocks inside this node.
    pub target: Option<Target>,
}

/// One occurrence of the search text.
#[derive(Debug, Clone)]
struct Match {
    path: Vec<usize>,
    /// Position where the textblock's content starts.
    content_pos: usize,
    start: usize,
    end: usize,
}

/// `mutation.applyDiff`
pub fn apply_diff(session: &mut DocumentSession, args: &ApplyDiffArgs) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    if args.find.is_empty() {
        return Err(ProtocolError::invalid_operation("find must not be empty"));
    }
    let scope = match &args.target {
        Some(target) => Some(resolve(session.doc(), target)?.path),
        None => None,
    };

    let mut matches = Vec::new();
    for (path, content_pos, block) in textblocks(session.doc()) {
        if scope.as_ref().is_some_and(|s| !path.starts_with(s)) {
            continue;
        }
        let chars: Vec<char> = block.inline_text().chars().collect();
        for (start, end) in find_all(&chars, &args.find) {
            matches.push(Match {
                path: path.clone(),
                content_pos,
                start,
                end,
            });
        }
    }
    if matches.is_empty() {
        return Err(ProtocolError::not_found(format!("'{}' does not occur in the document", args.find)));
    }

    let selected: Vec<Match> = match args.match_policy {
        MatchPolicy::First => matches.into_iter().take(1).collect(),
        MatchPolicy::All => matches,
        MatchPolicy::Nth => {
            let n = args
                .nth
                .ok_or_else(|| ProtocolError::invalid_operation("matchPolicy 'nth' needs nth"))?;
            let count = matches.len();
            let chosen = matches.into_iter().nth(n).ok_or_else(|| {
                ProtocolError::not_found(format!("match {n} requested but only {count} found"))
            })?;
            vec![chosen]
        }
        MatchPolicy::ErrorIfMultiple if matches.len() > 1 => {
            let contexts: Vec<_> = matches.iter().map(|m| match_context(session, m)).collect();
            return Err(ProtocolError::ambiguous(
                format!("'{}' occurs {} times", args.find, matches.len()),
                json!(contexts),
            ));
        }
        MatchPolicy::ErrorIfMultiple => matches,
    };
    debug!(find = %args.find, count = selected.len(), ?mode, "applying text diff");

    if mode == Mode::Suggest {
        return Ok(suggest_matches(session, &selected, &args.replace));
    }
    let mut doc = session.doc().clone();
    for m in selected.iter().rev() {
        if let Some(block) = doc.node_at_mut(&m.path) {
            splice_text(&mut block.content, m.start, m.end, &args.replace);
        }
    }
    finish(session, mode, doc, Vec::new())
}

fn match_context(session: &DocumentSession, m: &Match) -> serde_json::Value {
    let doc = session.doc();
    let text: Vec<char> = doc
        .node_at(&m.path)
        .map(|n| n.inline_text().chars().collect())
        .unwrap_or_default();
    let lo = m.start.saturating_sub(CONTEXT_CHARS);
    let hi = (m.end + CONTEXT_CHARS).min(text.len());
    json!({
        "id": id_at_path(doc, &m.path),
        "from": m.content_pos + m.start,
        "to": m.content_pos + m.end,
        "context": text[lo..hi].iter().collect::<String>(),
    })
}

fn suggest_matches(session: &mut DocumentSession, matches: &[Match], replace: &str) -> MutationOutcome {
    let mut outcome = MutationOutcome::new(Mode::Suggest, session.revision());
    for m in matches {
        let original: String = session
            .doc()
            .node_at(&m.path)
            .map(|n| n.inline_text().chars().skip(m.start).take(m.end - m.start).collect())
            .unwrap_or_default();
        let (kind, new_content) = if replace.is_empty() {
            (SuggestionType::Delete, None)
        } else {
            (SuggestionType::Replace, Some(replace.to_string()))
        };
        let id = session.suggest(Proposal {
            kind,
            scope: SuggestionScope::Inline,
            from: m.content_pos + m.start,
            to: m.content_pos + m.end,
            new_content,
            original_content: Some(original),
            staged: false,
        });
        outcome.suggestion_ids.push(id);
    }
    outcome
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub text: String,
    #[serde(default)]
    pub before_context: String,
    #[serde(default)]
    pub after_context: String,
    /// How far the anchor may have drifted from `expected_offset`.
    pub max_distance: Option<usize>,
    /// Character offset in the markdown where the caller last saw the anchor.
    pub expected_offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAnchoredArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub anchor: Anchor,
    pub replacement: String,
    /// Overrides the session's context similarity threshold.
    pub threshold: Option<f64>,
}

/// A scored anchor occurrence, in character offsets of the markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorMatch {
    pub start: usize,
    pub end: usize,
    pub similarity: f64,
    pub distance: usize,
}

/// Similarity of two strings from 0.0 to 1.0; an empty expectation always matches.
fn similarity(expected: &str, actual: &str) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(expected, actual).ratio())
}

/// Score every occurrence of the anchor text in `text`. Occurrences further than
/// `max_distance` from the expected offset are left out; without an expected offset every
/// occurrence is a candidate.
pub fn locate_anchor(text: &str, anchor: &Anchor, max_distance: usize) -> Vec<AnchorMatch> {
    let chars: Vec<char> = text.chars().collect();
    let before_len = anchor.before_context.chars().count();
    let after_len = anchor.after_context.chars().count();
    let mut out = Vec::new();
    for (start, end) in find_all_overlapping(&chars, &anchor.text) {
        let distance = anchor.expected_offset.map_or(0, |e| e.abs_diff(start));
        if distance > max_distance {
            continue;
        }
        let before: String = chars[start.saturating_sub(before_len)..start].iter().collect();
        let after: String = chars[end..(end + after_len).min(chars.len())].iter().collect();
        let scores = [
            (!anchor.before_context.is_empty()).then(|| similarity(&anchor.before_context, &before)),
            (!anchor.after_context.is_empty()).then(|| similarity(&anchor.after_context, &after)),
        ];
        let supplied: Vec<f64> = scores.into_iter().flatten().collect();
        let similarity = if supplied.is_empty() {
            1.0
        } else {
            supplied.iter().sum::<f64>() / supplied.len() as f64
        };
        out.push(AnchorMatch {
            start,
            end,
            similarity,
            distance,
        });
    }
    out
}

fn find_all_overlapping(haystack: &[char], needle: &str) -> Vec<(usize, usize)> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle.as_slice())
        .map(|(i, _)| (i, i + needle.len()))
        .collect()
}

/// Explain why no occurrence qualified: missing text, weak context, or too far away.
fn anchor_not_found(
    anchor: &Anchor,
    found: &[AnchorMatch],
    threshold: f64,
    max_distance: usize,
) -> ProtocolError {
    let nearest = found
        .iter()
        .filter(|m| m.similarity >= threshold)
        .min_by_key(|m| m.distance);
    if let Some(nearest) = nearest {
        return ProtocolError::not_found(format!(
            "anchor '{}' matches at offset {}, {} characters from expectedOffset (maxDistance {max_distance})",
            anchor.text, nearest.start, nearest.distance
        ))
        .with_details(json!({
            "nearestOffset": nearest.start,
            "distance": nearest.distance,
            "maxDistance": max_distance,
        }))
        .with_recovery("Retry with a larger maxDistance or an updated expectedOffset");
    }
    if let Some(best) = found.iter().max_by(|a, b| a.similarity.total_cmp(&b.similarity)) {
        return ProtocolError::not_found(format!(
            "anchor '{}' not found with context similarity >= {threshold}",
            anchor.text
        ))
        .with_details(json!({ "bestSimilarity": best.similarity, "threshold": threshold }))
        .with_recovery("Re-read the document and retry with fresh context");
    }
    ProtocolError::not_found(format!("anchor text '{}' does not occur in the document", anchor.text))
        .with_recovery("Re-read the document and retry with text that is present")
}

/// `mutation.replaceAnchored`
pub fn replace_anchored(
    session: &mut DocumentSession,
    args: &ReplaceAnchoredArgs,
) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    if args.anchor.text.is_empty() {
        return Err(ProtocolError::invalid_operation("anchor.text must not be empty"));
    }
    let settings = session.settings().anchoring;
    let threshold = args.threshold.unwrap_or(settings.context_similarity_threshold);
    let max_distance = if args.anchor.expected_offset.is_some() {
        args.anchor.max_distance.unwrap_or(settings.max_distance)
    } else {
        usize::MAX
    };

    let text = session.content()?;
    let found = locate_anchor(&text, &args.anchor, usize::MAX);
    let mut candidates: Vec<AnchorMatch> = found
        .iter()
        .filter(|m| m.similarity >= threshold && m.distance <= max_distance)
        .cloned()
        .collect();
    candidates.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.distance.cmp(&b.distance))
    });
    let Some(best) = candidates.first().cloned() else {
        return Err(anchor_not_found(&args.anchor, &found, threshold, max_distance));
    };
    let tied = candidates
        .iter()
        .filter(|m| m.similarity == best.similarity && m.distance == best.distance)
        .count();
    if tied > 1 {
        let listed: Vec<_> = candidates
            .iter()
            .map(|m| json!({ "offset": m.start, "similarity": m.similarity }))
            .collect();
        return Err(ProtocolError::ambiguous(
            format!("anchor '{}' matches {tied} places equally well", args.anchor.text),
            json!(listed),
        ));
    }
    debug!(offset = best.start, similarity = best.similarity, "anchor located");

    let mut edited: String = text.chars().take(best.start).collect();
    edited.push_str(&args.replacement);
    edited.extend(text.chars().skip(best.end));
    let after = parse_markdown(&edited, &session.settings().markdown)?;
    finish(session, mode, after, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::session::SessionSettings;

    fn session(text: &str) -> DocumentSession {
        DocumentSession::load(text, SessionSettings::default()).unwrap()
    }

    fn diff(find: &str, replace: &str, policy: &str) -> ApplyDiffArgs {
        serde_json::from_value(json!({
            "baseRevision": "r1",
            "find": find,
            "replace": replace,
            "matchPolicy": policy,
        }))
        .unwrap()
    }

    #[test]
    fn first_replaces_only_the_earliest_match() {
        let mut s = session("cat and cat\n\ncat\n");
        apply_diff(&mut s, &diff("cat", "dog", "first")).unwrap();
        assert_eq!(s.content().unwrap(), "dog and cat\n\ncat\n");
    }

    #[test]
    fn all_replaces_every_match_once() {
        let mut s = session("cat and cat\n\ncat\n");
        let outcome = apply_diff(&mut s, &diff("cat", "dog", "all")).unwrap();
        assert_eq!(s.content().unwrap(), "dog and dog\n\ndog\n");
        assert_eq!(outcome.revision.to_string(), "r2");
    }

    #[test]
    fn nth_is_zero_based_and_checked() {
        let mut s = session("a1 a2 a3\n");
        let mut args = diff("a", "b", "nth");
        args.nth = Some(1);
        apply_diff(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "a1 b2 a3\n");

        let mut args = diff("a", "b", "nth");
        args.header.base_revision = Some("r2".into());
        args.nth = Some(5);
        assert_eq!(apply_diff(&mut s, &args).unwrap_err().code, ErrorCode::NotFound);
    }

    #[test]
    fn error_if_multiple_reports_contexts_without_mutating() {
        let mut s = session("x one x\n");
        let err = apply_diff(&mut s, &diff("x", "y", "error_if_multiple")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousTarget);
        assert_eq!(err.details.unwrap()["candidates"].as_array().unwrap().len(), 2);
        assert_eq!(s.content().unwrap(), "x one x\n");
        assert_eq!(s.revision().to_string(), "r1");
    }

    #[test]
    fn replacement_keeps_marks() {
        let mut s = session("**Old** text\n");
        apply_diff(&mut s, &diff("Old", "New", "first")).unwrap();
        assert_eq!(s.content().unwrap(), "**New** text\n");
    }

    #[test]
    fn suggest_registers_inline_suggestions() {
        let mut s = session("cat and cat\n");
        let mut args = diff("cat", "dog", "all");
        args.header.mode = Mode::Suggest;
        let outcome = apply_diff(&mut s, &args).unwrap();
        assert_eq!(outcome.suggestion_ids.len(), 2);
        assert_eq!(s.content().unwrap(), "cat and cat\n");
        let outcome = s.accept_all();
        assert_eq!(outcome.ids.len(), 2);
        assert_eq!(s.content().unwrap(), "dog and dog\n");
    }

    fn anchored(anchor: serde_json::Value, replacement: &str) -> ReplaceAnchoredArgs {
        serde_json::from_value(json!({
            "baseRevision": "r1",
            "anchor": anchor,
            "replacement": replacement,
        }))
        .unwrap()
    }

    #[test]
    fn anchor_context_picks_the_right_occurrence() {
        let mut s = session("the value is 10\n\nthe limit is 10\n");
        let args = anchored(json!({ "text": "10", "beforeContext": "limit is " }), "20");
        replace_anchored(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "the value is 10\n\nthe limit is 20\n");
    }

    #[test]
    fn drifted_anchor_is_relocated_within_distance() {
        let mut s = session("intro added later\n\nset retries to 3 now\n");
        let args = anchored(
            json!({
                "text": "3",
                "beforeContext": "retries to ",
                "afterContext": " now",
                "expectedOffset": 15,
                "maxDistance": 50,
            }),
            "5",
        );
        replace_anchored(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "intro added later\n\nset retries to 5 now\n");
    }

    #[test]
    fn anchor_beyond_max_distance_is_not_found() {
        let mut s = session("padding padding padding padding\n\nfind me\n");
        let args = anchored(json!({ "text": "find", "expectedOffset": 0, "maxDistance": 5 }), "got");
        let err = replace_anchored(&mut s, &args).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.message.contains("maxDistance 5"), "{}", err.message);
        let details = err.details.unwrap();
        assert_eq!(details["nearestOffset"], 33);
        assert_eq!(details["distance"], 33);
        assert!(err.recovery.unwrap().contains("maxDistance"));
    }

    #[test]
    fn missing_anchor_text_and_weak_context_are_told_apart() {
        let mut s = session("alpha beta\n");
        let args = anchored(json!({ "text": "gamma" }), "x");
        let err = replace_anchored(&mut s, &args).unwrap_err();
        assert!(err.message.contains("does not occur"), "{}", err.message);

        let args = anchored(json!({ "text": "beta", "beforeContext": "zzzzzz" }), "x");
        let err = replace_anchored(&mut s, &args).unwrap_err();
        assert!(err.message.contains("context similarity"), "{}", err.message);
        assert!(err.details.unwrap()["bestSimilarity"].as_f64().unwrap() < 0.8);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let text = "abcd X\n";
        let anchor = Anchor {
            text: "X".into(),
            before_context: "abxd ".into(),
            after_context: String::new(),
            max_distance: None,
            expected_offset: None,
        };
        let found = locate_anchor(text, &anchor, usize::MAX);
        let score = found[0].similarity;
        assert!(score > 0.0 && score < 1.0);

        let mut s = session(text);
        let mut args = anchored(json!({ "text": "X", "beforeContext": "abxd " }), "Y");
        args.threshold = Some(score);
        replace_anchored(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "abcd Y\n");

        let mut s = session(text);
        args.threshold = Some(score + 0.01);
        assert_eq!(replace_anchored(&mut s, &args).unwrap_err().code, ErrorCode::NotFound);
    }

    #[test]
    fn equal_candidates_are_ambiguous() {
        let mut s = session("x\n\nx\n");
        let args = anchored(json!({ "text": "x" }), "y");
        assert_eq!(replace_anchored(&mut s, &args).unwrap_err().code, ErrorCode::AmbiguousTarget);
    }
}
