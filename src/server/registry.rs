// ABOUTME: Per-user session registry mapping a username to its active
// ABOUTME: connection handles, guarded by a single lock.

use crate::model::change::Change;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Work sent to a connection's own engine task — never performed by the
/// fan-out worker directly, since only the owning task may read or write
/// that connection's transport.
#[derive(Debug, Clone)]
pub enum FanoutJob {
    Push(Change),
}

/// A handle to one connection's owning task. Cloning a handle clones the
/// channel sender only: no socket reference ever leaves the task that owns
/// it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    tx: mpsc::Sender<FanoutJob>,
}

impl ConnectionHandle {
    /// Enqueues a push for the owning task to perform. Never blocks on the
    /// peer's I/O: a full channel (a peer already buried in pushes) simply
    /// drops this one rather than stalling the fan-out worker for every
    /// other peer.
    pub fn try_push(&self, change: Change) {
        let _ = self.tx.try_send(FanoutJob::Push(change));
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn push_channel() -> (mpsc::Sender<FanoutJob>, mpsc::Receiver<FanoutJob>) {
    mpsc::channel(32)
}

#[derive(Debug, PartialEq, Eq)]
pub enum AttachResult {
    Ok,
    Full,
}

#[derive(Default)]
struct UserSession {
    connections: Vec<ConnectionHandle>,
}

/// Maps username -> active connections. Entries are never
/// removed from the outer map on last-disconnect:
/// the small leak keeps lookup simple and matches the prototype's behavior.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, UserSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry { sessions: Mutex::new(HashMap::new()) }
    }

    /// Appends `handle` to `user`'s connections if under the cap, else
    /// refuses.
    pub fn attach(&self, user: &str, handle: ConnectionHandle) -> AttachResult {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(user.to_string()).or_default();
        if session.connections.len() >= crate::MAX_CONNS_PER_USER {
            return AttachResult::Full;
        }
        session.connections.push(handle);
        AttachResult::Ok
    }

    pub fn detach(&self, user: &str, id: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(user) {
            session.connections.retain(|h| h.id != id);
        }
    }

    /// Snapshot of every other connection for `user`, taken under the lock
    /// and used after releasing it: no I/O is ever performed while the lock
    /// is held.
    pub fn peers(&self, user: &str, except: u64) -> Vec<ConnectionHandle> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(user)
            .map(|session| session.connections.iter().filter(|h| h.id != except).cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, user: &str) -> usize {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(user).map(|s| s.connections.len()).unwrap_or(0)
    }
}

pub(crate) fn new_handle(tx: mpsc::Sender<FanoutJob>) -> ConnectionHandle {
    ConnectionHandle { id: next_connection_id(), tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<FanoutJob>) {
        let (tx, rx) = push_channel();
        (new_handle(tx), rx)
    }

    #[test]
    fn third_connection_for_same_user_is_refused() {
        let registry = SessionRegistry::new();
        let (h1, _r1) = handle();
        let (h2, _r2) = handle();
        let (h3, _r3) = handle();

        assert_eq!(registry.attach("alice", h1.clone()), AttachResult::Ok);
        assert_eq!(registry.attach("alice", h2.clone()), AttachResult::Ok);
        assert_eq!(registry.attach("alice", h3.clone()), AttachResult::Full);
        assert_eq!(registry.connection_count("alice"), 2);
    }

    #[test]
    fn peers_excludes_the_originator() {
        let registry = SessionRegistry::new();
        let (h1, _r1) = handle();
        let (h2, _r2) = handle();
        assert_eq!(registry.attach("bob", h1.clone()), AttachResult::Ok);
        assert_eq!(registry.attach("bob", h2.clone()), AttachResult::Ok);

        let peers = registry.peers("bob", h1.id);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, h2.id);
    }

    #[test]
    fn detach_removes_only_the_named_connection() {
        let registry = SessionRegistry::new();
        let (h1, _r1) = handle();
        let (h2, _r2) = handle();
        registry.attach("carol", h1.clone());
        registry.attach("carol", h2.clone());

        registry.detach("carol", h1.id);
        assert_eq!(registry.connection_count("carol"), 1);
        assert_eq!(registry.peers("carol", 0)[0].id, h2.id);
    }
}
