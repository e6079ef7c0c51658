// Asset model and wire payloads
pub mod asset;

// Handshake credentials and identities
pub mod auth;

// Topic fan-out to local connections and the backbone
pub mod broadcast;

// HTTP and WebSocket APIs
pub mod api;

// Configuration loading and validation
pub mod config;

// Cross-instance replication (NATS or in-memory)
pub mod replication;

// Kinematic fleet simulator and tick loop
pub mod simulation;

// Interest index, wire protocol and connection sessions
pub mod subscription;
