//! Fuzzy target resolution
//!
//! Scores text-bearing blocks against a query string: an exact match scores 1.0, a prefix
//! match 0.9 and a substring match 0.7 (all case-insensitive, ignoring surrounding
//! whitespace). Type and level hints only add a reason; they never change the score. Two or
//! more candidates at 0.9 or above make the resolution ambiguous, which mutations refuse to
//! act on.

use super::{preview, OneOrMany, Range, PREVIEW_CHARS};
use crate::ids::identify;
use crate::tree::{Node, NodeType};
use serde::{Deserialize, Serialize};

pub const EXACT: f64 = 1.0;
pub const PREFIX: f64 = 0.9;
pub const SUBSTRING: f64 = 0.7;
/// Candidates at or above this score count towards ambiguity.
pub const AMBIGUITY_FLOOR: f64 = 0.9;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetQuery {
    #[serde(alias = "contains")]
    pub text: String,
    #[serde(rename = "type")]
    pub types: Option<OneOrMany<NodeType>>,
    pub level: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveArgs {
    pub query: TargetQuery,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub score: f64,
    pub preview: String,
    pub range: Range,
    pub reasons: Vec<String>,
    #[serde(skip)]
    pub path: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    pub is_ambiguous: bool,
}

pub const DEFAULT_MAX_RESULTS: usize = 5;

fn score(text: &str, query: &str) -> Option<(f64, &'static str)> {
    let text = text.trim().to_lowercase();
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        None
    } else if text == query {
        Some((EXACT, "exact text match"))
    } else if text.starts_with(&query) {
        Some((PREFIX, "prefix match"))
    } else if text.contains(&query) {
        Some((SUBSTRING, "substring match"))
    } else {
        None
    }
}

/// Every scored candidate, best first, ties in document order.
pub fn score_candidates(doc: &Node, query: &TargetQuery) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = identify(doc)
        .into_iter()
        .filter(|n| n.node.kind.is_textblock())
        .filter_map(|n| {
            let text = n.node.text_content();
            let (score, reason) = score(&text, &query.text)?;
            let mut reasons = vec![reason.to_string()];
            if query.types.as_ref().is_some_and(|t| t.contains(&n.node.kind)) {
                reasons.push(format!("type is {}", n.node.kind));
            }
            if query.level.is_some() && n.node.level() == query.level {
                reasons.push(format!("heading level {}", n.node.level().unwrap_or(0)));
            }
            Some(Candidate {
                range: Range {
                    from: n.pos,
                    to: n.end(),
                },
                id: n.id,
                kind: n.node.kind,
                score,
                preview: preview(&text, PREVIEW_CHARS),
                reasons,
                path: n.path,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// `structure.resolveTargets`
pub fn resolve_targets(doc: &Node, query: &TargetQuery, max_results: usize) -> Resolution {
    let mut candidates = score_candidates(doc, query);
    let is_ambiguous = candidates.iter().filter(|c| c.score >= AMBIGUITY_FLOOR).count() > 1;
    candidates.truncate(max_results.max(1));
    Resolution {
        candidates,
        is_ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::markdown::{parse_markdown, MarkdownOptions};

    fn query(text: &str) -> TargetQuery {
        TargetQuery {
            text: text.to_string(),
            types: None,
            level: None,
        }
    }

    #[test]
    fn scores_rank_exact_prefix_substring() {
        let doc = parse_markdown(
            "in the Setup guide\n\nsetup steps\n\nSetup\n",
            &MarkdownOptions::default(),
        )
        .unwrap();
        let resolution = resolve_targets(&doc, &query("setup"), 5);
        let scores: Vec<f64> = resolution.candidates.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![1.0, 0.9, 0.7]);
        assert_eq!(resolution.candidates[0].id, "p-2");
        assert!(resolution.is_ambiguous);
    }

    #[test]
    fn duplicate_headings_are_ambiguous() {
        let doc = parse_markdown("# Notes\n\ntext\n\n# Notes\n", &MarkdownOptions::default()).unwrap();
        let q: TargetQuery =
            serde_json::from_value(serde_json::json!({ "contains": "Notes", "type": "heading" })).unwrap();
        let resolution = resolve_targets(&doc, &q, 5);
        assert!(resolution.is_ambiguous);
        assert!(resolution.candidates.iter().filter(|c| c.score >= 0.9).count() >= 2);
        assert!(resolution.candidates[0].reasons.contains(&"type is heading".to_string()));
    }

    #[test]
    fn single_strong_match_is_not_ambiguous() {
        let doc = parse_markdown("# Notes\n\nsome notes here\n", &MarkdownOptions::default()).unwrap();
        let resolution = resolve_targets(&doc, &query("notes"), 1);
        assert!(!resolution.is_ambiguous);
        assert_eq!(resolution.candidates.len(), 1);
        assert!(resolve_targets(&doc, &query("absent"), 5).candidates.is_empty());
    }
}
