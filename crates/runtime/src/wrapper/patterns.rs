//! Failure-pattern table
//!
//! Counters only ever grow; entries are never removed.

use chrono::Utc;
use std::collections::HashMap;

use super::classify::truncate_chars;
use super::types::{ErrorCategory, FailurePattern};

/// Characters of the error summary that take part in the fingerprint
pub const FINGERPRINT_MESSAGE_CHARS: usize = 100;

/// Characters of failing code kept as an example
pub const CODE_SNIPPET_CHARS: usize = 200;

/// Aggregation key for a failure
pub fn fingerprint(category: ErrorCategory, message: &str) -> String {
    format!(
        "{}:{}",
        category,
        truncate_chars(message, FINGERPRINT_MESSAGE_CHARS)
    )
}

#[derive(Debug, Clone, Default)]
pub struct FailurePatternTable {
    patterns: HashMap<String, FailurePattern>,
}

impl FailurePatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failure, inserting its pattern on first sight
    pub fn record(&mut self, category: ErrorCategory, message: &str, code: &str) -> &FailurePattern {
        let now = Utc::now();
        let key = fingerprint(category, message);
        let pattern = self
            .patterns
            .entry(key)
            .and_modify(|p| {
                p.frequency += 1;
                p.last_seen = now;
            })
            .or_insert_with(|| FailurePattern {
                category,
                message: truncate_chars(message, FINGERPRINT_MESSAGE_CHARS),
                code_snippet: truncate_chars(code, CODE_SNIPPET_CHARS),
                frequency: 1,
                first_seen: now,
                last_seen: now,
            });
        tracing::debug!(
            "Failure pattern {}:{} seen {} time(s)",
            pattern.category,
            pattern.message,
            pattern.frequency
        );
        pattern
    }

    pub fn get(&self, category: ErrorCategory, message: &str) -> Option<&FailurePattern> {
        self.patterns.get(&fingerprint(category, message))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The `n` most frequent patterns, most recent first on ties
    pub fn top(&self, n: usize) -> Vec<FailurePattern> {
        let mut ranked: Vec<&FailurePattern> = self.patterns.values().collect();
        ranked.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.message.cmp(&b.message))
        });
        ranked.into_iter().take(n).cloned().collect()
    }
}
