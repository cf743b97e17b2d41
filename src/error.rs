//! Error taxonomy for the refresh subsystem and the read path.
//!
//! Per-URL [`ChannelError::Fetch`] and [`ChannelError::Decode`] failures are
//! recovered inside one refresh cycle. Cycle-wide failures keep the previous
//! snapshot in place. Only [`ChannelError::NotFound`] ever reaches HTTP callers.

use std::fmt;

use thiserror::Error;

pub type Result<T, E = ChannelError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid configuration: {}", join_violations(.0))]
    Validation(Vec<Violation>),

    #[error("no source document could be loaded (all {failed} sources failed)")]
    NoUsableSources { failed: usize },

    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },
}

impl ChannelError {
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Channel,
            name: name.into(),
        }
    }

    pub fn release_not_found(version: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Release,
            name: version.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Channel,
    Release,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => f.write_str("channel"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// A single structural problem found while validating a merged configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A rollout rule percentage outside `0..=100`.
    PercentageOutOfRange {
        channel: String,
        release: String,
        percentage: i64,
    },
    /// Rollout percentages for one channel add up to more than 100.
    PercentageSumExceeded { channel: String, total: i64 },
    /// A channel has no primary release.
    MissingPrimary { channel: String },
    /// A channel or rollout rule points at a release that does not exist.
    DanglingRelease { channel: String, release: String },
    /// A rollout bound that is not a semantic version.
    InvalidBound {
        channel: String,
        release: String,
        bound: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PercentageOutOfRange {
                channel,
                release,
                percentage,
            } => write!(
                f,
                "channel {channel}: rollout to {release} has percentage {percentage} outside 0..=100"
            ),
            Self::PercentageSumExceeded { channel, total } => {
                write!(f, "channel {channel}: rollout percentages sum to {total} (> 100)")
            }
            Self::MissingPrimary { channel } => {
                write!(f, "channel {channel}: no latest release set")
            }
            Self::DanglingRelease { channel, release } => {
                write!(f, "channel {channel}: references unknown release {release}")
            }
            Self::InvalidBound {
                channel,
                release,
                bound,
            } => write!(
                f,
                "channel {channel}: rollout to {release} has invalid version bound {bound:?}"
            ),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
