//! Fan-out of asset events to interested connections.
//!
//! Every outbound event names a set of topics. The [`Broadcaster`] resolves
//! that set against the [`InterestIndex`] in one lookup, so a connection that
//! matches several topics still gets the message once. The same instruction is
//! queued onto the replication backbone for other instances, which repeat only
//! the local half (resolve + deliver) against their own index.

use crate::asset::{AssetUpdate, BulkUpdate, StatusChange};
use crate::replication::{
    BackboneMessage, BroadcastInstruction, PresenceBeat, PresenceTracker, ReplicationEvent,
    ReplicationPublisher,
};
use crate::subscription::{ConnectionId, InterestIndex, ServerMessage, Topic};
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
mod tests;

/// Serialized outbound message, shared by every recipient
pub type Payload = Arc<str>;

/// Resolves topic sets to connections and hands each one its copy
pub struct Broadcaster {
    instance_id: String,
    index: Arc<InterestIndex>,
    /// Outbound queue per live connection
    connections: DashMap<ConnectionId, mpsc::Sender<Payload>>,
    outbound_buffer: usize,
    replication: Option<ReplicationPublisher>,
    presence: Arc<PresenceTracker>,
}

impl Broadcaster {
    pub fn new(
        instance_id: impl Into<String>,
        index: Arc<InterestIndex>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            index,
            connections: DashMap::new(),
            outbound_buffer: outbound_buffer.max(1),
            replication: None,
            presence: Arc::new(PresenceTracker::default()),
        }
    }

    /// Mirror every broadcast onto the backbone
    pub fn with_replication(mut self, publisher: ReplicationPublisher) -> Self {
        self.replication = Some(publisher);
        self
    }

    pub fn with_presence(mut self, presence: Arc<PresenceTracker>) -> Self {
        self.presence = presence;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn index(&self) -> &Arc<InterestIndex> {
        &self.index
    }

    /// Register a live connection and return its outbound queue
    pub fn register(&self, connection: ConnectionId) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        self.connections.insert(connection, tx);
        debug!(connection_id = %connection, "Connection registered");
        rx
    }

    /// Drop a connection from every topic and close its queue.
    ///
    /// Safe to call concurrently with an in-flight broadcast; anything still
    /// addressed to the connection is discarded.
    pub fn unregister(&self, connection: ConnectionId) {
        let topics = self.index.leave_all(connection);
        self.connections.remove(&connection);
        debug!(
            connection_id = %connection,
            topics = topics.len(),
            "Connection unregistered"
        );
    }

    /// Connections attached to this instance
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Local connections plus the last-known counts of other instances
    pub fn observer_count(&self) -> usize {
        self.connection_count() + self.presence.remote_observers()
    }

    /// Send directly to one connection (acks, handshake status, initial sync)
    pub fn send_to(&self, connection: ConnectionId, message: &ServerMessage) -> bool {
        match message.to_payload() {
            Ok(payload) => self.deliver(connection, payload),
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    /// Resolve `topics` locally and deliver `payload` once per connection.
    ///
    /// Returns the number of connections that accepted the message.
    pub fn deliver_local(&self, topics: &[Topic], payload: Payload) -> usize {
        let recipients = self.index.resolve(topics);
        let mut delivered = 0;
        for connection in recipients {
            if self.deliver(connection, Arc::clone(&payload)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver locally and replicate to other instances
    pub fn broadcast(&self, topics: &[Topic], message: &ServerMessage) -> usize {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast message");
                return 0;
            }
        };

        let delivered = self.deliver_local(topics, Arc::clone(&payload));

        if let Some(publisher) = &self.replication {
            publisher.publish_broadcast(&BroadcastInstruction {
                origin: self.instance_id.clone(),
                topics: topics.to_vec(),
                payload: payload.to_string(),
            });
        }

        delivered
    }

    /// Per-tick position update: `{all, asset:<id>, type:<t>, status:<s>}`
    pub fn broadcast_update(&self, update: &AssetUpdate) -> usize {
        let topics = Topic::touched_by(update);
        self.broadcast(&topics, &ServerMessage::AssetUpdate(update.clone()))
    }

    /// Status transition: `{all, asset:<id>}`
    pub fn broadcast_status_change(&self, change: &StatusChange) -> usize {
        let topics = [Topic::All, Topic::Asset(change.id.clone())];
        self.broadcast(&topics, &ServerMessage::StatusChange(change.clone()))
    }

    /// Full-fleet snapshot to `all`
    pub fn broadcast_bulk(&self, updates: Vec<AssetUpdate>) -> usize {
        let bulk = BulkUpdate {
            updates,
            timestamp: Utc::now(),
        };
        self.broadcast(&[Topic::All], &ServerMessage::BulkUpdate(bulk))
    }

    /// Apply one message received from the backbone
    pub fn handle_replicated(&self, msg: &BackboneMessage) {
        let Some(publisher) = &self.replication else {
            return;
        };

        let event = match publisher.subjects().decode(msg) {
            Ok(Some(event)) => event,
            Ok(None) => {
                trace!(subject = %msg.subject, "Ignoring unrelated backbone subject");
                return;
            }
            Err(e) => {
                warn!(subject = %msg.subject, error = %e, "Malformed backbone message, skipping");
                return;
            }
        };

        match event {
            // Own instructions were already delivered locally
            ReplicationEvent::Broadcast(instruction) if instruction.origin == self.instance_id => {}
            ReplicationEvent::Broadcast(instruction) => {
                let delivered =
                    self.deliver_local(&instruction.topics, Arc::from(instruction.payload));
                trace!(
                    origin = %instruction.origin,
                    delivered,
                    "Delivered replicated broadcast"
                );
            }
            ReplicationEvent::Presence(beat) if beat.origin == self.instance_id => {}
            ReplicationEvent::Presence(beat) => {
                self.presence.record(&beat.origin, beat.connections);
            }
        }
    }

    /// Consume the backbone subscription until it ends
    pub async fn run_replication_listener(
        self: Arc<Self>,
        mut messages: BoxStream<'static, BackboneMessage>,
    ) {
        info!(instance_id = %self.instance_id, "Replication listener started");
        while let Some(msg) = messages.next().await {
            self.handle_replicated(&msg);
        }
        warn!("Replication subscription ended; serving local connections only");
    }

    /// Announce this instance's connection count every `every`
    pub async fn run_presence_heartbeat(self: Arc<Self>, every: Duration) {
        let Some(publisher) = self.replication.clone() else {
            return;
        };

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            publisher.publish_presence(&PresenceBeat {
                origin: self.instance_id.clone(),
                connections: self.connection_count(),
            });
        }
    }

    fn deliver(&self, connection: ConnectionId, payload: Payload) -> bool {
        let Some(tx) = self.connections.get(&connection) else {
            // Closed between resolve and delivery
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(connection_id = %connection, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
