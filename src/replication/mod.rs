// Cross-instance replication over a pub/sub backbone

mod backbone;
mod client;
mod presence;
mod publisher;

pub use backbone::{subject_matches, Backbone, BackboneMessage, MemoryBackbone};
pub use client::{NatsBackbone, NatsConfig};
pub use presence::PresenceTracker;
pub use publisher::ReplicationPublisher;

use crate::subscription::Topic;
use serde::{Deserialize, Serialize};

/// "Deliver `payload` once to every local member of any of `topics`"
///
/// The whole topic set travels together so each instance dedupes exactly as
/// the origin did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastInstruction {
    /// Instance that produced the message
    pub origin: String,
    pub topics: Vec<Topic>,
    /// Already-serialized outbound message
    pub payload: String,
}

/// Periodic connection-count announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceBeat {
    pub origin: String,
    pub connections: usize,
}

/// Decoded backbone traffic
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    Broadcast(BroadcastInstruction),
    Presence(PresenceBeat),
}

/// Subject layout under a common prefix
#[derive(Debug, Clone, PartialEq)]
pub struct Subjects {
    prefix: String,
}

impl Subjects {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<prefix>.broadcast`
    pub fn broadcast(&self) -> String {
        format!("{}.broadcast", self.prefix)
    }

    /// `<prefix>.presence.<instance>`
    pub fn presence(&self, instance_id: &str) -> String {
        format!("{}.presence.{}", self.prefix, instance_id)
    }

    /// Pattern covering everything this service publishes
    pub fn all(&self) -> String {
        format!("{}.>", self.prefix)
    }

    /// Classify and decode a backbone message. Unknown subjects yield `None`.
    ///
    /// Presence is matched on the `<prefix>.presence.` prefix alone; the
    /// instance is taken from the beat's `origin`, since an id may span
    /// several subject tokens.
    pub fn decode(
        &self,
        msg: &BackboneMessage,
    ) -> Result<Option<ReplicationEvent>, serde_json::Error> {
        if msg.subject == self.broadcast() {
            let instruction = serde_json::from_slice(&msg.payload)?;
            return Ok(Some(ReplicationEvent::Broadcast(instruction)));
        }
        let presence_prefix = format!("{}.presence.", self.prefix);
        match msg.subject.strip_prefix(&presence_prefix) {
            Some(instance) if !instance.is_empty() => {
                let beat = serde_json::from_slice(&msg.payload)?;
                Ok(Some(ReplicationEvent::Presence(beat)))
            }
            _ => Ok(None),
        }
    }
}
