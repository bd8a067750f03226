//! Bounded, most-recent-first history of fused results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 5;
pub const DEFAULT_TEXT_LIMIT: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    /// Prefix of the analyzed text, at most `text_limit` characters
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    text_limit: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HISTORY_CAPACITY, DEFAULT_TEXT_LIMIT)
    }

    pub fn with_limits(capacity: usize, text_limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            text_limit,
        }
    }

    /// Prepend an entry, evicting the oldest beyond capacity
    pub fn push(&mut self, label: &str, text: &str) {
        let entry = HistoryEntry {
            label: label.to_string(),
            text: text.chars().take(self.text_limit).collect(),
            recorded_at: Utc::now(),
        };
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
