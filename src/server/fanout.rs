// ABOUTME: Server-side fan-out: given a change observed on one connection,
// ABOUTME: dispatch it to every other connection of the same user.

use crate::model::change::Change;
use crate::server::registry::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One submission to the fan-out queue: a change plus the connection id it
/// originated from, so that connection is excluded from delivery.
#[derive(Debug, Clone)]
pub struct FanoutSubmission {
    pub change: Change,
    pub origin: u64,
}

/// A fan-out worker pool, with submissions routed so that every change from
/// one originating connection always lands on the same worker. A shared
/// queue drained by several workers would let two changes from the same
/// origin race each other to different peers out of order; pinning an
/// origin to one worker keeps that origin's changes strictly FIFO while
/// still spreading unrelated origins across the pool.
#[derive(Clone)]
pub struct FanoutEngine {
    senders: Arc<Vec<mpsc::Sender<FanoutSubmission>>>,
}

impl FanoutEngine {
    /// Spawns `workers` tasks, each draining its own queue. Each worker only
    /// looks up peers and hands off a `FanoutJob` to each one — the actual
    /// push I/O happens on the peer's own connection task, so a worker never
    /// blocks on a slow peer.
    pub fn spawn(registry: Arc<SessionRegistry>, workers: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (tx, mut rx) = mpsc::channel::<FanoutSubmission>(256);
            senders.push(tx);
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                while let Some(submission) = rx.recv().await {
                    debug!(worker_id, user = %submission.change.user, "fan-out dispatch");
                    let peers = registry.peers(&submission.change.user, submission.origin);
                    for peer in peers {
                        peer.try_push(submission.change.clone());
                    }
                }
            });
        }

        FanoutEngine { senders: Arc::new(senders) }
    }

    pub async fn submit(&self, change: Change, origin: u64) {
        let worker = (origin as usize) % self.senders.len();
        let _ = self.senders[worker].send(FanoutSubmission { change, origin }).await;
    }
}
