use crate::asset::{AssetUpdate, BulkUpdate, StatusChange};
use crate::subscription::index::ConnectionId;
use crate::subscription::topic::Topic;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event")]
pub enum ClientMessage {
    /// Join `all` plus the listed type/status filters
    #[serde(rename = "assets:subscribe")]
    SubscribeAssets {
        #[serde(default)]
        types: Option<Vec<String>>,
        #[serde(default)]
        statuses: Option<Vec<String>>,
    },
    /// Leave `all` and every type/status filter
    #[serde(rename = "assets:unsubscribe")]
    UnsubscribeAssets,
    #[serde(rename = "asset:subscribe", rename_all = "camelCase")]
    SubscribeAsset { asset_id: String },
    #[serde(rename = "asset:unsubscribe", rename_all = "camelCase")]
    UnsubscribeAsset { asset_id: String },
}

/// Server → Client message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    #[serde(rename = "asset:update")]
    AssetUpdate(AssetUpdate),

    #[serde(rename = "assets:bulk-update")]
    BulkUpdate(BulkUpdate),

    #[serde(rename = "asset:status-change")]
    StatusChange(StatusChange),

    /// Sent once right after the handshake
    #[serde(rename = "connection:status", rename_all = "camelCase")]
    ConnectionStatus {
        connected: bool,
        connection_id: ConnectionId,
    },

    #[serde(rename = "assets:subscribed")]
    AssetsSubscribed { subscribed: bool, topics: Vec<Topic> },

    #[serde(rename = "assets:unsubscribed")]
    AssetsUnsubscribed { unsubscribed: bool, topics: Vec<Topic> },

    #[serde(rename = "asset:subscribed", rename_all = "camelCase")]
    AssetSubscribed { subscribed: bool, asset_id: String },

    #[serde(rename = "asset:unsubscribed", rename_all = "camelCase")]
    AssetUnsubscribed { unsubscribed: bool, asset_id: String },

    /// Negative acknowledgment; the connection stays open
    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerMessage {
    pub fn error(err: impl ToString) -> Self {
        ServerMessage::Error {
            error: err.to_string(),
        }
    }

    /// Serialize once; the result is shared by every recipient
    pub fn to_payload(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Rejected inbound message (answered with `ServerMessage::Error`)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown asset type '{0}'")]
    UnknownAssetType(String),
    #[error("unknown asset status '{0}'")]
    UnknownAssetStatus(String),
    #[error("assetId must not be empty")]
    EmptyAssetId,
    #[error("binary frames are not supported")]
    BinaryFrame,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}
