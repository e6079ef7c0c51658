use crate::subscription::topic::Topic;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Process-unique observer session identifier (UUIDv7, time-ordered)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Two-way membership index between connections and topics.
///
/// Invariant: `c ∈ members(t)` iff `t ∈ topics(c)`.
///
/// Lock order is always connection entry first, then topic entry. `resolve`
/// only takes topic read locks, so a resolve never sees a half-applied change
/// to a single topic's membership, and unrelated topics live on independent
/// shards.
pub struct InterestIndex {
    /// topic -> member connections
    members: DashMap<Topic, HashSet<ConnectionId>>,
    /// connection -> held topics
    topics: DashMap<ConnectionId, HashSet<Topic>>,
}

impl InterestIndex {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            topics: DashMap::new(),
        }
    }

    /// Add `connection` to `topic`. Returns false if it was already a member.
    pub fn join(&self, connection: ConnectionId, topic: Topic) -> bool {
        let mut held = self.topics.entry(connection).or_default();
        if !held.insert(topic.clone()) {
            return false;
        }
        self.members.entry(topic).or_default().insert(connection);
        true
    }

    /// Remove `connection` from `topic`. Returns false if it was not a member.
    pub fn leave(&self, connection: ConnectionId, topic: &Topic) -> bool {
        let Some(mut held) = self.topics.get_mut(&connection) else {
            return false;
        };
        if !held.remove(topic) {
            return false;
        }
        self.remove_member(topic, connection);
        true
    }

    /// Remove `connection` from every topic it holds and forget it.
    ///
    /// Returns the topics it was removed from; unknown connections yield an
    /// empty list.
    pub fn leave_all(&self, connection: ConnectionId) -> Vec<Topic> {
        let held = match self.topics.get_mut(&connection) {
            Some(mut held) => {
                let held = std::mem::take(&mut *held);
                for topic in &held {
                    self.remove_member(topic, connection);
                }
                held
            }
            None => return Vec::new(),
        };
        self.topics.remove_if(&connection, |_, remaining| remaining.is_empty());
        held.into_iter().collect()
    }

    /// Union of members across `topics`, each connection at most once
    pub fn resolve<'a, I>(&self, topics: I) -> HashSet<ConnectionId>
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        let mut recipients = HashSet::new();
        for topic in topics {
            if let Some(members) = self.members.get(topic) {
                recipients.extend(members.iter().copied());
            }
        }
        recipients
    }

    /// Topics currently held by `connection`
    pub fn topics_of(&self, connection: ConnectionId) -> Vec<Topic> {
        self.topics
            .get(&connection)
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection: ConnectionId, topic: &Topic) -> bool {
        self.members
            .get(topic)
            .map(|members| members.contains(&connection))
            .unwrap_or(false)
    }

    /// Number of connections in `topic`
    pub fn member_count(&self, topic: &Topic) -> usize {
        self.members.get(topic).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of topics with at least one member
    pub fn topic_count(&self) -> usize {
        self.members.len()
    }

    fn remove_member(&self, topic: &Topic, connection: ConnectionId) {
        if let Some(mut members) = self.members.get_mut(topic) {
            members.remove(&connection);
        }
        self.members.remove_if(topic, |_, members| members.is_empty());
    }
}

impl Default for InterestIndex {
    fn default() -> Self {
        Self::new()
    }
}
