//! Change-sequence positions reported by the mailbox provider

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Opaque position in a mailbox's change stream.
///
/// The provider reports these as decimal strings with no documented upper
/// bound, so they are never parsed into a native integer. Ordering is
/// numeric: leading zeros are ignored, then longer strings are larger, then
/// ties fall to a lexicographic digit comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencePosition(pub String);

impl SequencePosition {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits with leading zeros stripped ("0" for an all-zero or empty value)
    fn canonical(&self) -> &str {
        let trimmed = self.0.trim().trim_start_matches('0');
        if trimmed.is_empty() { "0" } else { trimmed }
    }
}

impl PartialEq for SequencePosition {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SequencePosition {}

impl PartialOrd for SequencePosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequencePosition {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.canonical();
        let b = other.canonical();
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl std::hash::Hash for SequencePosition {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl std::fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SequencePosition {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SequencePosition {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
