//! Pending suggestions
//!
//!     The store is the authoritative list of proposed edits waiting for a human decision. It
//!     never touches the tree itself: [`crate::session::DocumentSession`] performs the tree side
//!     of accept and reject and then tells the store what happened.
//!
//!     Ranges are tree positions in the current document. A `staged` suggestion's new content is
//!     already in the tree and its range covers that content; for every other suggestion the
//!     range covers the text it would replace or delete (empty for inserts).
//!
//!     Whenever the tree changes, pending ranges are carried through the changed range. A
//!     suggestion whose range overlaps the change can no longer be trusted and is dropped with
//!     an `Invalidated` event.
//!
//!     Rendering hosts follow the store through [`SuggestionStore::subscribe`]. Events are sent
//!     after the tree change they describe has been made, never before.

use crate::tree::pos::ChangedRange;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Insert,
    Replace,
    Delete,
}

/// Whether a suggestion spans whole blocks (markdown content) or characters inside one
/// textblock (plain text content).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionScope {
    Inline,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub scope: SuggestionScope,
    pub from: usize,
    pub to: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub staged: bool,
}

/// What a new suggestion proposes; the store fills in id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kind: SuggestionType,
    pub scope: SuggestionScope,
    pub from: usize,
    pub to: usize,
    pub new_content: Option<String>,
    pub original_content: Option<String>,
    pub staged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "camelCase")]
pub enum SuggestionEvent {
    Added(String),
    Accepted(String),
    Rejected(String),
    Invalidated(String),
    Focused(String),
    Cleared,
}

#[derive(Debug, Default)]
pub struct SuggestionStore {
    items: Vec<Suggestion>,
    next_id: u64,
    focused: Option<String>,
    subscribers: Vec<Sender<SuggestionEvent>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel that receives every subsequent event.
    pub fn subscribe(&mut self) -> Receiver<SuggestionEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn publish(&mut self, event: SuggestionEvent) {
        debug!(?event, "suggestion event");
        // A failed send means the receiver is gone.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn add(&mut self, proposal: Proposal) -> String {
        self.next_id += 1;
        let id = format!("s-{}", self.next_id);
        self.items.push(Suggestion {
            id: id.clone(),
            kind: proposal.kind,
            scope: proposal.scope,
            from: proposal.from,
            to: proposal.to,
            new_content: proposal.new_content,
            original_content: proposal.original_content,
            created_at: now_ms(),
            staged: proposal.staged,
        });
        self.items.sort_by_key(|s| (s.from, s.to));
        self.publish(SuggestionEvent::Added(id.clone()));
        id
    }

    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.items.iter().find(|s| s.id == id)
    }

    /// Pending suggestions ordered by position.
    pub fn list(&self) -> &[Suggestion] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take a suggestion out of the store without announcing anything.
    pub(crate) fn take(&mut self, id: &str) -> Option<Suggestion> {
        let at = self.items.iter().position(|s| s.id == id)?;
        if self.focused.as_deref() == Some(id) {
            self.focused = None;
        }
        Some(self.items.remove(at))
    }

    /// Drop everything, as on document load.
    pub fn clear(&mut self) {
        self.items.clear();
        self.focused = None;
        self.publish(SuggestionEvent::Cleared);
    }

    /// Carry pending ranges through a tree change, returning the ids that were invalidated.
    pub fn remap(&mut self, change: &ChangedRange) -> Vec<String> {
        let delta = change.delta();
        let mut invalidated = Vec::new();
        self.items.retain_mut(|s| {
            if s.to <= change.from {
                true
            } else if s.from >= change.old_to {
                s.from = (s.from as isize + delta) as usize;
                s.to = (s.to as isize + delta) as usize;
                true
            } else {
                invalidated.push(s.id.clone());
                false
            }
        });
        for id in &invalidated {
            warn!(suggestion = %id, "suggestion invalidated by overlapping edit");
            if self.focused.as_deref() == Some(id) {
                self.focused = None;
            }
            self.publish(SuggestionEvent::Invalidated(id.clone()));
        }
        invalidated
    }

    pub fn focused(&self) -> Option<&Suggestion> {
        self.focused.as_deref().and_then(|id| self.get(id))
    }

    pub fn focus(&mut self, id: &str) -> Option<&Suggestion> {
        self.get(id)?;
        self.focused = Some(id.to_string());
        self.publish(SuggestionEvent::Focused(id.to_string()));
        self.get(id)
    }

    /// Move focus forward in document order, wrapping around.
    pub fn focus_next(&mut self) -> Option<&Suggestion> {
        self.step(1)
    }

    /// Move focus backward in document order, wrapping around.
    pub fn focus_prev(&mut self) -> Option<&Suggestion> {
        self.step(-1)
    }

    fn step(&mut self, dir: isize) -> Option<&Suggestion> {
        if self.items.is_empty() {
            return None;
        }
        let len = self.items.len() as isize;
        let current = self
            .focused
            .as_deref()
            .and_then(|id| self.items.iter().position(|s| s.id == id));
        let next = match current {
            Some(at) => (at as isize + dir).rem_euclid(len) as usize,
            None if dir > 0 => 0,
            None => self.items.len() - 1,
        };
        let id = self.items[next].id.clone();
        self.focus(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(from: usize, to: usize) -> Proposal {
        Proposal {
            kind: SuggestionType::Replace,
            scope: SuggestionScope::Inline,
            from,
            to,
            new_content: Some("x".into()),
            original_content: Some("y".into()),
            staged: false,
        }
    }

    #[test]
    fn ids_are_unique_and_list_is_ordered() {
        let mut store = SuggestionStore::new();
        let b = store.add(proposal(10, 12));
        let a = store.add(proposal(2, 4));
        assert_ne!(a, b);
        assert_eq!(store.list()[0].id, a);
    }

    #[test]
    fn remap_shifts_and_invalidates() {
        let mut store = SuggestionStore::new();
        let before = store.add(proposal(1, 3));
        let after = store.add(proposal(20, 22));
        let overlapping = store.add(proposal(8, 12));
        let rx = store.subscribe();
        let dropped = store.remap(&ChangedRange {
            from: 10,
            old_to: 11,
            new_to: 14,
        });
        assert_eq!(dropped, vec![overlapping.clone()]);
        assert_eq!(store.get(&before).unwrap().from, 1);
        assert_eq!(store.get(&after).unwrap().from, 23);
        assert_eq!(rx.try_recv().unwrap(), SuggestionEvent::Invalidated(overlapping));
    }

    #[test]
    fn focus_wraps_around() {
        let mut store = SuggestionStore::new();
        let a = store.add(proposal(1, 2));
        let b = store.add(proposal(5, 6));
        assert_eq!(store.focus_next().unwrap().id, a);
        assert_eq!(store.focus_next().unwrap().id, b);
        assert_eq!(store.focus_next().unwrap().id, a);
        assert_eq!(store.focus_prev().unwrap().id, b);
        assert!(store.focus("s-99").is_none());
        assert_eq!(store.focused().unwrap().id, b);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut store = SuggestionStore::new();
        drop(store.subscribe());
        let rx = store.subscribe();
        store.add(proposal(0, 1));
        assert_eq!(store.subscribers.len(), 1);
        assert!(matches!(rx.try_recv().unwrap(), SuggestionEvent::Added(_)));
    }
}
