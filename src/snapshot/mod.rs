//! Immutable, fully merged configuration for one subscription key.
//!
//! A [`Snapshot`] is produced by [`SnapshotBuilder`] and never mutated once
//! published. Refreshing builds a new one; readers holding an `Arc` to the old
//! one keep a consistent view until they drop it.

mod builder;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{ChannelError, Result};
use crate::models::{Channel, Release};

pub use builder::SnapshotBuilder;

#[derive(Debug, Clone)]
pub struct Snapshot {
    key: String,
    server_version: String,
    revision: u64,
    built_at: DateTime<Utc>,
    source_count: usize,
    channels: BTreeMap<String, Channel>,
    releases: BTreeMap<String, Release>,
}

impl Snapshot {
    /// The subscription key this snapshot was built for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Server-version tag injected from configuration.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Publication counter of the owning subscription, starting at 1.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Number of source documents merged into this snapshot.
    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// All channels, ordered by name.
    pub fn list_channels(&self) -> Vec<&Channel> {
        self.channels.values().collect()
    }

    pub fn get_channel(&self, name: &str) -> Result<&Channel> {
        self.channels
            .get(name)
            .ok_or_else(|| ChannelError::channel_not_found(name))
    }

    /// All releases, ordered by semantic version.
    pub fn list_releases(&self) -> Vec<&Release> {
        let mut releases: Vec<&Release> = self.releases.values().collect();
        releases.sort_by(|a, b| a.version_cmp(b));
        releases
    }

    pub fn get_release(&self, version: &str) -> Result<&Release> {
        self.releases
            .get(version)
            .ok_or_else(|| ChannelError::release_not_found(version))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn release_count(&self) -> usize {
        self.releases.len()
    }
}
