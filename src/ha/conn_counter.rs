//! Per-endpoint monotonic connection counter used by the
//! `least_connection` selection policy (C8).
//!
//! Grounded in `original_source/src/ha_manager.cpp`'s `add_conn_count` /
//! `drop_conn_count`. Per the design notes' ambiguity callout: counts are
//! never clamped at zero and entries are never garbage-collected even
//! after an endpoint disappears from the topology — preserved here
//! deliberately rather than "fixed", since the original's intent is
//! unclear and a silent behavior change would be an invented feature.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ConnCounter {
    counts: HashMap<String, i64>,
}

impl ConnCounter {
    pub fn new() -> Self {
        ConnCounter { counts: HashMap::new() }
    }

    pub fn get(&self, tag: &str) -> i64 {
        self.counts.get(tag).copied().unwrap_or(0)
    }

    pub fn add(&mut self, tag: &str) {
        *self.counts.entry(tag.to_string()).or_insert(0) += 1;
    }

    pub fn drop(&mut self, tag: &str) {
        *self.counts.entry(tag.to_string()).or_insert(0) -= 1;
    }

    /// The endpoint among `candidates` with the lowest count, first-seen
    /// on ties. `None` if `candidates` is empty.
    pub fn least_loaded<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .min_by_key(|tag| self.get(tag))
    }
}
