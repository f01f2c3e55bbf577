use std::collections::VecDeque;

use crate::MAX_HISTORY_ENTRIES;

/// Newest-first list of delivered snippets, de-duplicated by exact text.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(MAX_HISTORY_ENTRIES)
    }
}

impl History {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Returns false when `text` is already present; the list is left untouched.
    pub fn append(&mut self, text: &str) -> bool {
        if self.entries.iter().any(|entry| entry == text) {
            return false;
        }
        self.entries.push_front(text.to_owned());
        self.entries.truncate(self.limit);
        true
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
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
