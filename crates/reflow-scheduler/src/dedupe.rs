//! Run-key registry: turns the window overlap's at-least-once firing into
//! at-most-once observed dispatch.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Remembers which dedupe keys have already been handed off, for at least
/// the retention horizon. The horizon must exceed the maximum overlap
/// between consecutive evaluation windows; several window lengths is the
/// safe choice.
pub struct DedupeRegistry {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    retention: Duration,
}

impl DedupeRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Read-only check: has this key not been dispatched yet?
    pub fn should_dispatch(&self, key: &str) -> bool {
        !self.seen.lock().unwrap().contains_key(key)
    }

    /// Record a dispatched key. All subsequent `should_dispatch` calls for
    /// it return false until the retention horizon expires.
    pub fn mark_dispatched(&self, key: &str) {
        self.mark_at(key, Utc::now());
    }

    /// Atomic test-and-set under one lock: returns true exactly once per
    /// key. Two concurrent cycles racing on the same firing cannot both win.
    pub fn claim(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap();
        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), Utc::now());
        true
    }

    /// Undo a claim whose hand-off failed, so the firing recomputes as due
    /// next cycle.
    pub fn release(&self, key: &str) {
        self.seen.lock().unwrap().remove(key);
    }

    /// Drop keys older than the retention horizon. By then their fire times
    /// have slid out of every overlapping window, so they can never re-fire.
    pub fn prune(&self, now: DateTime<Utc>) {
        let mut seen = self.seen.lock().unwrap();
        let before = seen.len();
        seen.retain(|_, marked| now - *marked < self.retention);
        let dropped = before - seen.len();
        if dropped > 0 {
            debug!(dropped, retained = seen.len(), "pruned dedupe registry");
        }
    }

    fn mark_at(&self, key: &str, at: DateTime<Utc>) {
        self.seen.lock().unwrap().insert(key.to_string(), at);
    }
}
