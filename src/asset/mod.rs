use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
mod tests;

/// Kind of simulated asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Truck,
    Helicopter,
    Drone,
    Personnel,
    Supply,
}

impl AssetType {
    pub const ALL: [AssetType; 5] = [
        AssetType::Truck,
        AssetType::Helicopter,
        AssetType::Drone,
        AssetType::Personnel,
        AssetType::Supply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Truck => "TRUCK",
            AssetType::Helicopter => "HELICOPTER",
            AssetType::Drone => "DRONE",
            AssetType::Personnel => "PERSONNEL",
            AssetType::Supply => "SUPPLY",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Operational status of an asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Active,
    Idle,
    Offline,
    Alert,
}

impl AssetStatus {
    pub const ALL: [AssetStatus; 4] = [
        AssetStatus::Active,
        AssetStatus::Idle,
        AssetStatus::Offline,
        AssetStatus::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "ACTIVE",
            AssetStatus::Idle => "IDLE",
            AssetStatus::Offline => "OFFLINE",
            AssetStatus::Alert => "ALERT",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Unrecognised asset type or status name
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

/// Longitude/latitude pair in degrees, serialised as `[lng, lat]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Planar Euclidean distance in coordinate units
    pub fn distance_to(&self, other: &Position) -> f64 {
        let d_lng = other.lng - self.lng;
        let d_lat = other.lat - self.lat;
        (d_lng * d_lng + d_lat * d_lat).sqrt()
    }
}

impl From<[f64; 2]> for Position {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lng, p.lat]
    }
}

/// Operating bounding box for the simulated fleet
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lng: f64,
    pub max_lng: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    /// Min must be strictly below max on both axes
    pub fn is_valid(&self) -> bool {
        self.min_lng < self.max_lng && self.min_lat < self.max_lat
    }

    pub fn clamp(&self, p: Position) -> Position {
        Position {
            lng: p.lng.clamp(self.min_lng, self.max_lng),
            lat: p.lat.clamp(self.min_lat, self.max_lat),
        }
    }

    pub fn contains(&self, p: &Position) -> bool {
        (self.min_lng..=self.max_lng).contains(&p.lng)
            && (self.min_lat..=self.max_lat).contains(&p.lat)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        // Orikhiv area
        Self {
            min_lng: 35.6,
            max_lng: 36.0,
            min_lat: 47.4,
            max_lat: 47.7,
        }
    }
}

/// Simulated entity, owned and mutated only by the Simulator
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub id: String,
    pub callsign: String,
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub position: Position,
    /// km/h
    pub speed: f64,
    /// Degrees in [0, 360)
    pub heading: f64,
    pub target_position: Position,
}

impl Asset {
    /// Snapshot of the observable fields at `timestamp`
    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> AssetUpdate {
        AssetUpdate {
            id: self.id.clone(),
            callsign: self.callsign.clone(),
            asset_type: self.asset_type,
            status: self.status,
            position: self.position,
            speed: self.speed,
            heading: self.heading,
            timestamp,
        }
    }
}

/// Immutable per-tick snapshot of an asset; the unit of broadcast
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    pub id: String,
    pub callsign: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub position: Position,
    pub speed: f64,
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
}

/// Status transition observed during a tick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: String,
    pub previous_status: AssetStatus,
    pub new_status: AssetStatus,
    pub timestamp: DateTime<Utc>,
}

/// Full-fleet snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdate {
    pub updates: Vec<AssetUpdate>,
    pub timestamp: DateTime<Utc>,
}
