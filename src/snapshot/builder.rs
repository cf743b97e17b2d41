use std::collections::BTreeMap;

use chrono::Utc;
use semver::Version;

use super::Snapshot;
use crate::error::{ChannelError, Result, Violation};
use crate::models::{
    parse_version, Channel, ChannelSpec, Release, ReleaseSpec, RolloutRule, RolloutSpec,
    SourceDocument,
};

/// Merges decoded source documents into a validated [`Snapshot`].
///
/// Building is a pure function of the documents and the builder settings: no
/// I/O and no clock besides the build timestamp. Either every check passes and
/// a snapshot comes out, or the full list of violations is returned and
/// nothing is produced.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    key: String,
    server_version: String,
    revision: u64,
}

impl SnapshotBuilder {
    pub fn new(key: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            server_version: server_version.into(),
            revision: 1,
        }
    }

    pub fn revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Merge `documents` in order and validate the result.
    ///
    /// For channels (by name) and releases (by version), a later document's
    /// definition replaces an earlier one outright.
    pub fn build(&self, documents: Vec<SourceDocument>) -> Result<Snapshot> {
        let source_count = documents.len();
        let (channels, releases) = merge(documents);

        let violations = validate(&channels, &releases);
        if !violations.is_empty() {
            return Err(ChannelError::Validation(violations));
        }

        let server = parse_version(&self.server_version);
        let channels = channels
            .into_iter()
            .map(|(name, spec)| (name, channel_from_spec(spec, server.as_ref())))
            .collect();
        let releases = releases
            .into_iter()
            .map(|(version, spec)| {
                (
                    version,
                    Release {
                        version: spec.version,
                        metadata: spec.metadata,
                    },
                )
            })
            .collect();

        Ok(Snapshot {
            key: self.key.clone(),
            server_version: self.server_version.clone(),
            revision: self.revision,
            built_at: Utc::now(),
            source_count,
            channels,
            releases,
        })
    }
}

fn merge(
    documents: Vec<SourceDocument>,
) -> (BTreeMap<String, ChannelSpec>, BTreeMap<String, ReleaseSpec>) {
    let mut channels = BTreeMap::new();
    let mut releases = BTreeMap::new();

    for document in documents {
        for channel in document.channels {
            channels.insert(channel.name.clone(), channel);
        }
        for release in document.releases {
            releases.insert(release.version.clone(), release);
        }
    }

    (channels, releases)
}

fn validate(
    channels: &BTreeMap<String, ChannelSpec>,
    releases: &BTreeMap<String, ReleaseSpec>,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for channel in channels.values() {
        if channel.latest.trim().is_empty() {
            violations.push(Violation::MissingPrimary {
                channel: channel.name.clone(),
            });
        } else if !releases.contains_key(&channel.latest) {
            violations.push(Violation::DanglingRelease {
                channel: channel.name.clone(),
                release: channel.latest.clone(),
            });
        }

        let mut total: i64 = 0;
        let mut in_range = true;
        for rule in &channel.rollouts {
            if !(0..=100).contains(&rule.percentage) {
                in_range = false;
                violations.push(Violation::PercentageOutOfRange {
                    channel: channel.name.clone(),
                    release: rule.release.clone(),
                    percentage: rule.percentage,
                });
            }
            total = total.saturating_add(rule.percentage);

            if !releases.contains_key(&rule.release) {
                violations.push(Violation::DanglingRelease {
                    channel: channel.name.clone(),
                    release: rule.release.clone(),
                });
            }

            for bound in [&rule.min_server_version, &rule.max_server_version]
                .into_iter()
                .flatten()
            {
                if parse_version(bound).is_none() {
                    violations.push(Violation::InvalidBound {
                        channel: channel.name.clone(),
                        release: rule.release.clone(),
                        bound: bound.clone(),
                    });
                }
            }
        }

        // Out-of-range entries are already reported; a sum over them says nothing new.
        if in_range && total > 100 {
            violations.push(Violation::PercentageSumExceeded {
                channel: channel.name.clone(),
                total,
            });
        }
    }

    violations
}

fn channel_from_spec(spec: ChannelSpec, server: Option<&Version>) -> Channel {
    let rollouts = spec
        .rollouts
        .into_iter()
        .map(|rule| rule_from_spec(rule, server))
        .collect();

    Channel {
        name: spec.name,
        latest: spec.latest,
        rollouts,
    }
}

fn rule_from_spec(spec: RolloutSpec, server: Option<&Version>) -> RolloutRule {
    let min = spec.min_server_version.as_deref().and_then(parse_version);
    let max = spec.max_server_version.as_deref().and_then(parse_version);

    RolloutRule {
        active: within_bounds(server, min.as_ref(), max.as_ref()),
        release: spec.release,
        // Validated to 0..=100 above.
        percentage: u8::try_from(spec.percentage).unwrap_or(0),
        min_server_version: spec.min_server_version,
        max_server_version: spec.max_server_version,
    }
}

/// Inclusive bounds check. An unbounded rule is always active; a bounded rule
/// never is when the server version is unknown.
fn within_bounds(server: Option<&Version>, min: Option<&Version>, max: Option<&Version>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(server) = server else {
        return false;
    };
    min.map_or(true, |min| server >= min) && max.map_or(true, |max| server <= max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        parse_version(raw).unwrap()
    }

    #[test]
    fn unbounded_rule_is_always_active() {
        assert!(within_bounds(None, None, None));
        assert!(within_bounds(Some(&v("1.0.0")), None, None));
    }

    #[test]
    fn bounds_are_inclusive() {
        let min = v("2.6.0");
        let max = v("2.8.0");
        assert!(within_bounds(Some(&v("2.6.0")), Some(&min), Some(&max)));
        assert!(within_bounds(Some(&v("2.8.0")), Some(&min), Some(&max)));
        assert!(!within_bounds(Some(&v("2.5.9")), Some(&min), Some(&max)));
        assert!(!within_bounds(Some(&v("2.8.1")), Some(&min), Some(&max)));
    }

    #[test]
    fn bounded_rule_is_inactive_without_server_version() {
        assert!(!within_bounds(None, Some(&v("2.6.0")), None));
    }
}
