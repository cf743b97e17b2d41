use serde::{Deserialize, Serialize};

/// A validated channel inside a snapshot.
///
/// `latest` is the primary release. Rollout rules carve percentage ranges out
/// of the client population; whatever they leave unallocated resolves to
/// `latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub latest: String,
    #[serde(default)]
    pub rollouts: Vec<RolloutRule>,
}

impl Channel {
    /// Total percentage claimed by rollout rules, active or not.
    pub fn allocated(&self) -> u32 {
        self.rollouts.iter().map(|r| u32::from(r.percentage)).sum()
    }
}

/// A staged rollout rule.
///
/// An inactive rule keeps its slot in the cumulative percentage walk but
/// resolves to the channel's primary release. Rules are inactive when their
/// server-version bounds exclude the running server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRule {
    pub release: String,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_server_version: Option<String>,
    pub active: bool,
}

/// A channel as returned to a client.
///
/// `latest` is resolved for the requesting client identity, `primary` is the
/// release everyone without a rollout assignment gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub latest: String,
    pub primary: String,
    pub rollouts: Vec<RolloutRule>,
}

impl ChannelRecord {
    pub fn new(channel: &Channel, resolved: &str) -> Self {
        Self {
            name: channel.name.clone(),
            latest: resolved.to_string(),
            primary: channel.latest.clone(),
            rollouts: channel.rollouts.clone(),
        }
    }
}
