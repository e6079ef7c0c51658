use crate::replication::backbone::Backbone;
use crate::replication::{BroadcastInstruction, PresenceBeat, Subjects};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

struct Outgoing {
    subject: String,
    payload: Vec<u8>,
}

/// Fire-and-forget publisher onto the backbone.
///
/// Callers enqueue without waiting; a single task drains the queue in order,
/// which keeps per-subject ordering for this publisher. Failures are logged
/// and dropped, never retried.
#[derive(Clone)]
pub struct ReplicationPublisher {
    tx: mpsc::Sender<Outgoing>,
    subjects: Subjects,
}

impl ReplicationPublisher {
    /// Start the drain task. Must be called inside a Tokio runtime.
    pub fn spawn(
        backbone: Arc<dyn Backbone>,
        subjects: Subjects,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_publisher(backbone, rx));
        (Self { tx, subjects }, handle)
    }

    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    /// Queue a broadcast instruction. Returns false if it was dropped.
    pub fn publish_broadcast(&self, instruction: &BroadcastInstruction) -> bool {
        match serde_json::to_vec(instruction) {
            Ok(payload) => self.enqueue(self.subjects.broadcast(), payload),
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast instruction");
                false
            }
        }
    }

    /// Queue a presence heartbeat. Returns false if it was dropped.
    pub fn publish_presence(&self, beat: &PresenceBeat) -> bool {
        match serde_json::to_vec(beat) {
            Ok(payload) => self.enqueue(self.subjects.presence(&beat.origin), payload),
            Err(e) => {
                error!(error = %e, "Failed to serialize presence beat");
                false
            }
        }
    }

    fn enqueue(&self, subject: String, payload: Vec<u8>) -> bool {
        match self.tx.try_send(Outgoing { subject, payload }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(out)) => {
                warn!(subject = %out.subject, "Replication queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(out)) => {
                debug!(subject = %out.subject, "Replication publisher stopped, dropping message");
                false
            }
        }
    }
}

async fn run_publisher(backbone: Arc<dyn Backbone>, mut rx: mpsc::Receiver<Outgoing>) {
    while let Some(out) = rx.recv().await {
        if let Err(e) = backbone.publish(out.subject.clone(), out.payload).await {
            warn!(
                subject = %out.subject,
                error = %e,
                "Backbone publish failed, dropping message"
            );
        }
    }
    debug!("Replication publisher stopped");
}
