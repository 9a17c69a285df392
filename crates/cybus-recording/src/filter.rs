// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic filtering for recording and replay.
//!
//! An empty allow-list means "everything"; the deny-list always wins.

use std::collections::HashSet;

/// Combined allow/deny filter over exact topic names.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl TopicFilter {
    /// Build from allow and deny lists.
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self {
            allow: allow.into_iter().collect(),
            deny: deny.into_iter().collect(),
        }
    }

    /// A filter that passes everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether a topic passes the filter.
    pub fn matches(&self, topic: &str) -> bool {
        if self.deny.contains(topic) {
            return false;
        }
        self.allow.is_empty() || self.allow.contains(topic)
    }

    /// True when neither list has entries.
    pub fn is_pass_through(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}
