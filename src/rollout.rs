//! Deterministic per-client rollout evaluation.
//!
//! A client lands in one of [`BUCKETS`] buckets per channel:
//!
//! ```text
//! bucket = fnv1a64(channel ‖ 0x00 ‖ identity) % 100
//! ```
//!
//! The hash is 64-bit FNV-1a. It is stable across processes, platforms and
//! releases of this crate, so a client keeps its assignment for as long as the
//! rollout rules stay the same. Rules claim consecutive bucket ranges in the
//! order they are written; buckets past the last rule go to the primary release.

use crate::error::Result;
use crate::models::Channel;
use crate::snapshot::Snapshot;

pub const BUCKETS: u64 = 100;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Opaque client identifier taken from the request.
///
/// An empty identity never takes part in staged rollouts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Option<&str>> for ClientIdentity {
    fn from(raw: Option<&str>) -> Self {
        raw.map(Self::new).unwrap_or_default()
    }
}

/// Resolve the release `channel` points at for `identity` in `snapshot`.
pub fn resolve<'a>(
    snapshot: &'a Snapshot,
    channel: &str,
    identity: &ClientIdentity,
) -> Result<&'a str> {
    let channel = snapshot.get_channel(channel)?;
    Ok(resolve_channel(channel, identity))
}

/// Resolve against an already looked-up channel.
pub fn resolve_channel<'a>(channel: &'a Channel, identity: &ClientIdentity) -> &'a str {
    if identity.is_empty() || channel.rollouts.is_empty() {
        return &channel.latest;
    }

    let bucket = bucket(&channel.name, identity.as_str());
    let mut upper: u64 = 0;
    for rule in &channel.rollouts {
        upper += u64::from(rule.percentage);
        if bucket < upper {
            return if rule.active {
                &rule.release
            } else {
                &channel.latest
            };
        }
    }

    &channel.latest
}

/// The bucket in `0..100` that `identity` falls into for `channel`.
pub fn bucket(channel: &str, identity: &str) -> u64 {
    fnv1a64(&[channel.as_bytes(), &[0u8], identity.as_bytes()]) % BUCKETS
}

fn fnv1a64(chunks: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in chunks.iter().flat_map(|chunk| chunk.iter()) {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RolloutRule;

    #[test]
    fn fnv1a64_matches_reference_vectors() {
        assert_eq!(fnv1a64(&[]), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(&[b"a".as_slice()]), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(
            fnv1a64(&[b"a".as_slice(), b"".as_slice()]),
            fnv1a64(&[b"".as_slice(), b"a".as_slice()])
        );
    }

    #[test]
    fn buckets_are_scoped_to_the_channel() {
        assert_eq!(bucket("k8s", "cluster-60"), 10);
        assert_eq!(bucket("edge", "cluster-60"), 19);
    }

    #[test]
    fn identity_is_trimmed() {
        assert_eq!(ClientIdentity::new("  c-1 ").as_str(), "c-1");
        assert!(ClientIdentity::new("   ").is_empty());
        assert!(ClientIdentity::from(None).is_empty());
    }

    #[test]
    fn inactive_rule_keeps_its_range_but_serves_primary() {
        let channel = Channel {
            name: "k8s".to_string(),
            latest: "1.28.0".to_string(),
            rollouts: vec![
                RolloutRule {
                    release: "1.30.0".to_string(),
                    percentage: 8,
                    min_server_version: Some("v9.0.0".to_string()),
                    max_server_version: None,
                    active: false,
                },
                RolloutRule {
                    release: "1.29.0".to_string(),
                    percentage: 12,
                    min_server_version: None,
                    max_server_version: None,
                    active: true,
                },
            ],
        };

        // cluster-29 hashes to bucket 5, inside the inactive rule's [0, 8).
        assert_eq!(
            resolve_channel(&channel, &ClientIdentity::new("cluster-29")),
            "1.28.0"
        );
        // cluster-60 hashes to bucket 10, inside the second rule's [8, 20).
        assert_eq!(
            resolve_channel(&channel, &ClientIdentity::new("cluster-60")),
            "1.29.0"
        );
    }
}
