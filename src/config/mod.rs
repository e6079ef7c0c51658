use crate::asset::Bounds;
use serde::Deserialize;
use std::time::Duration;

// Re-export section types owned by other modules
pub use crate::auth::AuthConfig;
pub use crate::replication::NatsConfig;

/// Complete fleetcast configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Allowed browser origin for the map client
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Identifies this process on the backbone; random when unset
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origin: default_cors_origin(),
            instance_id: default_instance_id(),
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Instances with the simulator disabled only relay replicated updates
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_asset_count")]
    pub asset_count: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub bounds: Bounds,
    /// Asset ids are `<prefix>-<n>`. Give each simulating instance its own
    /// prefix when more than one runs behind the same backbone.
    #[serde(default = "default_asset_id_prefix")]
    pub asset_id_prefix: String,
    /// Broadcast a full-fleet snapshot to `all` every N ticks (0 disables)
    #[serde(default)]
    pub bulk_sync_every_ticks: u64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_asset_count() -> usize {
    20
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_asset_id_prefix() -> String {
    "asset".to_string()
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            asset_count: default_asset_count(),
            tick_interval_ms: default_tick_interval_ms(),
            bounds: Bounds::default(),
            asset_id_prefix: default_asset_id_prefix(),
            bulk_sync_every_ticks: 0,
            seed: None,
        }
    }
}

/// Cross-instance observer-count heartbeat
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
}

fn default_heartbeat_seconds() -> u64 {
    2
}

impl PresenceConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Remote counts older than three missed heartbeats are ignored
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds * 3)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: default_heartbeat_seconds(),
        }
    }
}

/// Per-connection delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Outbound messages buffered per connection before new ones are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Fatal startup configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid simulation bounds: min must be below max on both axes ({0:?})")]
    InvalidBounds(Bounds),
    #[error("simulation tick interval must be positive")]
    ZeroTickInterval,
    #[error("presence heartbeat must be positive")]
    ZeroHeartbeat,
    #[error("gateway outbound buffer must be positive")]
    ZeroOutboundBuffer,
    #[error("auth is enabled but no credentials are configured")]
    MissingCredentials,
    #[error("invalid instance id '{0}': no whitespace, '*', '>' or empty dot segments allowed")]
    InvalidInstanceId(String),
    #[error("failed to read config file: {0}")]
    Read(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

impl FleetConfig {
    /// Apply environment overrides on top of file/default values
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("FLEETCAST_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("FLEETCAST_INSTANCE_ID") {
            if !v.is_empty() {
                self.server.instance_id = v;
            }
        }
        if let Ok(v) = std::env::var("FLEETCAST_NATS_URL") {
            self.nats.url = v;
        }
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_instance_id(&self.server.instance_id) {
            return Err(ConfigError::InvalidInstanceId(self.server.instance_id.clone()));
        }
        if !self.simulation.bounds.is_valid() {
            return Err(ConfigError::InvalidBounds(self.simulation.bounds));
        }
        if self.simulation.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.presence.heartbeat_seconds == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.gateway.outbound_buffer == 0 {
            return Err(ConfigError::ZeroOutboundBuffer);
        }
        if self.auth.enabled && self.auth.credentials.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}

/// Instance ids become backbone subject tokens. Dots are fine (the id just
/// spans several tokens); wildcards and whitespace are not.
fn is_valid_instance_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains(['*', '>'])
        && !id.chars().any(char::is_whitespace)
        && !id.starts_with('.')
        && !id.ends_with('.')
        && !id.contains("..")
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FleetConfig, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(format!("{path}: {e}")))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
}
