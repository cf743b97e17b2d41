//! Read-only projections of a snapshot into the records served over HTTP.
//!
//! A view holds the `Arc<Snapshot>` that was current when it was created and
//! never looks at the subscription again, so every record in one response
//! comes from the same snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ChannelRecord, Release};
use crate::rollout::{self, ClientIdentity};
use crate::snapshot::Snapshot;

/// List/get contract consumed by the HTTP layer.
pub trait ResourceView {
    type Record: Serialize;

    /// Resource type name used in collection responses and links.
    const RESOURCE_TYPE: &'static str;

    fn snapshot(&self) -> &Snapshot;

    fn list(&self, identity: &ClientIdentity) -> Vec<Self::Record>;

    fn get(&self, id: &str, identity: &ClientIdentity) -> Result<Self::Record>;

    fn collection(&self, identity: &ClientIdentity) -> Collection<Self::Record> {
        let snapshot = self.snapshot();
        Collection {
            kind: "collection".to_string(),
            resource_type: Self::RESOURCE_TYPE.to_string(),
            server_version: snapshot.server_version().to_string(),
            revision: snapshot.revision(),
            built_at: snapshot.built_at(),
            data: self.list(identity),
        }
    }
}

/// Collection envelope for list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub resource_type: String,
    pub server_version: String,
    pub revision: u64,
    pub built_at: DateTime<Utc>,
    pub data: Vec<T>,
}

pub struct ChannelView {
    snapshot: Arc<Snapshot>,
}

impl ChannelView {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }
}

impl ResourceView for ChannelView {
    type Record = ChannelRecord;

    const RESOURCE_TYPE: &'static str = "channel";

    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn list(&self, identity: &ClientIdentity) -> Vec<ChannelRecord> {
        self.snapshot
            .list_channels()
            .into_iter()
            .map(|channel| ChannelRecord::new(channel, rollout::resolve_channel(channel, identity)))
            .collect()
    }

    fn get(&self, name: &str, identity: &ClientIdentity) -> Result<ChannelRecord> {
        let channel = self.snapshot.get_channel(name)?;
        Ok(ChannelRecord::new(
            channel,
            rollout::resolve_channel(channel, identity),
        ))
    }
}

pub struct ReleaseView {
    snapshot: Arc<Snapshot>,
}

impl ReleaseView {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }
}

impl ResourceView for ReleaseView {
    type Record = Release;

    const RESOURCE_TYPE: &'static str = "release";

    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    // Releases are the same for every client.
    fn list(&self, _identity: &ClientIdentity) -> Vec<Release> {
        self.snapshot.list_releases().into_iter().cloned().collect()
    }

    fn get(&self, version: &str, _identity: &ClientIdentity) -> Result<Release> {
        self.snapshot.get_release(version).cloned()
    }
}
