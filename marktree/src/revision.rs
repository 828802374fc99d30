//! Revision tracking
//!
//! A revision names one committed state of the document. The tracker holds exactly one current
//! value and moves it forward once per committed transaction; reads never touch it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Opaque revision token, written as `r{n}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub const INITIAL: Revision = Revision(1);

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl FromStr for Revision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('r')
            .and_then(|n| n.parse::<u64>().ok())
            .map(Revision)
            .ok_or_else(|| format!("'{s}' is not a revision"))
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct RevisionTracker {
    current: Revision,
}

impl Default for RevisionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionTracker {
    pub fn new() -> Self {
        RevisionTracker {
            current: Revision::INITIAL,
        }
    }

    pub fn current(&self) -> Revision {
        self.current
    }

    /// Whether a client-supplied token names the current revision. Unparseable tokens never do.
    pub fn is_current(&self, token: &str) -> bool {
        token.parse::<Revision>().is_ok_and(|r| r == self.current)
    }

    /// Advance to a new revision. Called once per committed transaction.
    pub fn bump(&mut self) -> Revision {
        let previous = self.current;
        self.current = Revision(previous.0 + 1);
        info!(from = %previous, to = %self.current, "revision bumped");
        self.current
    }

    /// Back to the initial revision, for a freshly loaded document.
    pub fn reset(&mut self) {
        self.current = Revision::INITIAL;
    }
}
