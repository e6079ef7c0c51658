use crate::asset::{AssetStatus, AssetType, AssetUpdate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named interest group a connection can join.
///
/// String forms: `all`, `asset:<id>`, `type:<TYPE>`, `status:<STATUS>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    All,
    Asset(String),
    Type(AssetType),
    Status(AssetStatus),
}

impl Topic {
    /// The four topics an asset update touches
    pub fn touched_by(update: &AssetUpdate) -> [Topic; 4] {
        [
            Topic::All,
            Topic::Asset(update.id.clone()),
            Topic::Type(update.asset_type),
            Topic::Status(update.status),
        ]
    }

    /// Topics covered by the fleet-wide subscription (everything but per-asset)
    pub fn is_fleet_filter(&self) -> bool {
        !matches!(self, Topic::Asset(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::All => f.write_str("all"),
            Topic::Asset(id) => write!(f, "asset:{id}"),
            Topic::Type(t) => write!(f, "type:{t}"),
            Topic::Status(s) => write!(f, "status:{s}"),
        }
    }
}

/// Topic string that does not name a known topic
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid topic '{0}'")]
pub struct TopicParseError(pub String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Topic::All);
        }
        let invalid = || TopicParseError(s.to_string());
        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        match kind {
            "asset" if !value.is_empty() => Ok(Topic::Asset(value.to_string())),
            "type" => value.parse().map(Topic::Type).map_err(|_| invalid()),
            "status" => value.parse().map(Topic::Status).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}
