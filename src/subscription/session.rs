use crate::asset::{AssetStatus, AssetType, BulkUpdate};
use crate::auth::Identity;
use crate::broadcast::{Broadcaster, Payload};
use crate::simulation::FleetSnapshot;
use crate::subscription::index::ConnectionId;
use crate::subscription::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::subscription::topic::Topic;
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// One authenticated observer session.
///
/// Created only after a successful handshake. Dropping the session removes
/// the connection from every topic and closes its outbound queue.
pub struct ConnectionSession {
    id: ConnectionId,
    identity: Identity,
    broadcaster: Arc<Broadcaster>,
    snapshots: Option<watch::Receiver<FleetSnapshot>>,
}

impl ConnectionSession {
    /// Register a new connection and queue its `connection:status` message
    pub fn open(
        identity: Identity,
        broadcaster: Arc<Broadcaster>,
        snapshots: Option<watch::Receiver<FleetSnapshot>>,
    ) -> (Self, mpsc::Receiver<Payload>) {
        let id = ConnectionId::new();
        let outbound = broadcaster.register(id);

        info!(
            connection_id = %id,
            user = %identity.email,
            role = %identity.role,
            "Observer connected"
        );

        broadcaster.send_to(
            id,
            &ServerMessage::ConnectionStatus {
                connected: true,
                connection_id: id,
            },
        );

        let session = Self {
            id,
            identity,
            broadcaster,
            snapshots,
        };
        (session, outbound)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Apply one inbound text frame and queue the (n)ack for this connection
    pub fn handle_text(&self, text: &str) {
        let reply = match ClientMessage::parse(text).and_then(|msg| self.apply(msg)) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "Rejected client message");
                ServerMessage::error(e)
            }
        };
        let initial_sync = matches!(reply, ServerMessage::AssetsSubscribed { .. });

        self.broadcaster.send_to(self.id, &reply);

        if initial_sync {
            self.send_initial_sync();
        }
    }

    /// Translate a client request into index changes
    pub fn apply(&self, msg: ClientMessage) -> Result<ServerMessage, ProtocolError> {
        let index = self.broadcaster.index();

        match msg {
            ClientMessage::SubscribeAssets { types, statuses } => {
                // Validate everything before touching the index
                let mut topics = vec![Topic::All];
                for name in types.unwrap_or_default() {
                    let t: AssetType = name
                        .parse()
                        .map_err(|_| ProtocolError::UnknownAssetType(name.clone()))?;
                    topics.push(Topic::Type(t));
                }
                for name in statuses.unwrap_or_default() {
                    let s: AssetStatus = name
                        .parse()
                        .map_err(|_| ProtocolError::UnknownAssetStatus(name.clone()))?;
                    topics.push(Topic::Status(s));
                }

                for topic in &topics {
                    index.join(self.id, topic.clone());
                }

                info!(
                    connection_id = %self.id,
                    user = %self.identity.email,
                    topics = topics.len(),
                    "Subscribed to fleet"
                );

                Ok(ServerMessage::AssetsSubscribed {
                    subscribed: true,
                    topics: self.held_topics(),
                })
            }
            ClientMessage::UnsubscribeAssets => {
                let mut left = Vec::new();
                for topic in index.topics_of(self.id) {
                    if topic.is_fleet_filter() && index.leave(self.id, &topic) {
                        left.push(topic);
                    }
                }

                info!(connection_id = %self.id, topics = left.len(), "Unsubscribed from fleet");

                Ok(ServerMessage::AssetsUnsubscribed {
                    unsubscribed: true,
                    topics: left,
                })
            }
            ClientMessage::SubscribeAsset { asset_id } => {
                if asset_id.is_empty() {
                    return Err(ProtocolError::EmptyAssetId);
                }
                index.join(self.id, Topic::Asset(asset_id.clone()));

                info!(connection_id = %self.id, asset_id = %asset_id, "Subscribed to asset");

                Ok(ServerMessage::AssetSubscribed {
                    subscribed: true,
                    asset_id,
                })
            }
            ClientMessage::UnsubscribeAsset { asset_id } => {
                if asset_id.is_empty() {
                    return Err(ProtocolError::EmptyAssetId);
                }
                index.leave(self.id, &Topic::Asset(asset_id.clone()));

                info!(connection_id = %self.id, asset_id = %asset_id, "Unsubscribed from asset");

                Ok(ServerMessage::AssetUnsubscribed {
                    unsubscribed: true,
                    asset_id,
                })
            }
        }
    }

    /// Drive the socket until either side closes
    pub async fn run(self, mut socket: WebSocket, mut outbound: mpsc::Receiver<Payload>) {
        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(_))) => {
                            let nack = ServerMessage::error(ProtocolError::BinaryFrame);
                            self.broadcaster.send_to(self.id, &nack);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(connection_id = %self.id, "Client closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(connection_id = %self.id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                payload = outbound.recv() => {
                    let Some(payload) = payload else {
                        break;
                    };
                    if socket.send(Message::Text(payload.to_string())).await.is_err() {
                        debug!(connection_id = %self.id, "Send failed, closing");
                        break;
                    }
                }
            }
        }
    }

    fn held_topics(&self) -> Vec<Topic> {
        let mut topics = self.broadcaster.index().topics_of(self.id);
        topics.sort_by_key(|t| t.to_string());
        topics
    }

    fn send_initial_sync(&self) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        let updates = Vec::clone(&snapshots.borrow());
        if updates.is_empty() {
            return;
        }
        self.broadcaster.send_to(
            self.id,
            &ServerMessage::BulkUpdate(BulkUpdate {
                updates,
                timestamp: Utc::now(),
            }),
        );
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id);
        info!(
            connection_id = %self.id,
            user = %self.identity.email,
            "Observer disconnected"
        );
    }
}
