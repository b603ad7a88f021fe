//! Last-sent value cache.
//!
//! Suppresses re-sending a measurement whose value has not changed since the
//! last send. Process-lifetime state only: a restart re-sends everything once,
//! which is idempotent at the sinks.

use std::collections::HashMap;
use tracing::debug;

use crate::reading::FieldValue;

/// In-memory map from measurement key to the last value handed to the fanout.
///
/// Never evicts. A node produces a fixed, small set of measurement kinds, so
/// growth is bounded in practice.
#[derive(Debug, Default)]
pub struct DedupCache {
    last_sent: HashMap<String, FieldValue>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `value` must be sent, recording it as the new
    /// last-known value in the same step. First sight of a key always sends.
    ///
    /// The record happens before the caller's write, so a failed write is not
    /// retried next cycle if the value stays unchanged.
    pub fn should_send(&mut self, key: &str, value: &FieldValue) -> bool {
        if let Some(last) = self.last_sent.get(key) {
            if last == value {
                return false;
            }
            debug!("{key} changed from {last} to {value}, sending");
        }
        self.last_sent.insert(key.to_string(), value.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}
