use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A release entry, identified by its version string.
///
/// The metadata (image references, release notes links, ...) is opaque to the
/// server and flattened into the JSON response next to `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Release {
    /// Ordering used for release listings: semantic version order when both
    /// sides parse, otherwise plain string order. Semver releases sort first.
    pub fn version_cmp(&self, other: &Self) -> Ordering {
        match (parse_version(&self.version), parse_version(&other.version)) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.version.cmp(&other.version)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.version.cmp(&other.version),
        }
    }
}

/// Parse a version string, tolerating a leading `v` (`v2.6.0`).
pub fn parse_version(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(version: &str) -> Release {
        Release {
            version: version.to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn orders_semantically_not_lexically() {
        let mut releases = vec![release("1.10.0"), release("1.9.2"), release("v1.9.10")];
        releases.sort_by(Release::version_cmp);

        let versions: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.9.2", "v1.9.10", "1.10.0"]);
    }

    #[test]
    fn non_semver_versions_sort_last() {
        let mut releases = vec![release("nightly"), release("2.0.0"), release("beta")];
        releases.sort_by(Release::version_cmp);

        let versions: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0.0", "beta", "nightly"]);
    }

    #[test]
    fn parse_version_accepts_v_prefix() {
        assert_eq!(parse_version("v2.6.0"), Some(semver::Version::new(2, 6, 0)));
        assert_eq!(parse_version("2.6"), None);
    }
}
