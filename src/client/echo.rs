// ABOUTME: Tracks filenames the listener is currently writing or deleting,
// ABOUTME: so the watcher can swallow the resulting local filesystem event.

use crate::model::filename::Filename;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries older than the TTL are evicted rather than kept forever, since
/// the OS may coalesce or simply never deliver the event a marker was
/// waiting to swallow.
pub struct EchoSet {
    inner: Mutex<HashMap<Filename, Instant>>,
    ttl: Duration,
}

impl EchoSet {
    pub fn new(ttl: Duration) -> Self {
        EchoSet { inner: Mutex::new(HashMap::new()), ttl }
    }

    pub fn mark(&self, name: Filename) {
        self.inner.lock().unwrap().insert(name, Instant::now());
    }

    /// `true` if `name` was marked and not yet expired; consumes the entry
    /// either way.
    pub fn take(&self, name: &Filename) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.retain(|_, marked_at| now.duration_since(*marked_at) < self.ttl);
        inner.remove(name).is_some()
    }
}
