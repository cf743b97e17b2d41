use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A decoded source document.
///
/// Both sections are optional so that a document can contribute only channels
/// or only releases to the merged snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceDocument {
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub releases: Vec<ReleaseSpec>,
}

/// A channel definition as written in a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub name: String,
    /// The primary release. Validation rejects an empty value.
    #[serde(default)]
    pub latest: String,
    /// Staged rollout rules, evaluated in the order written.
    #[serde(default)]
    pub rollouts: Vec<RolloutSpec>,
}

/// A staged rollout rule as written in a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSpec {
    pub release: String,
    /// Kept signed so that negative values surface as validation errors
    /// rather than decode errors.
    pub percentage: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_server_version: Option<String>,
}

/// A release entry as written in a source document. Every field besides
/// `version` is kept as metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseSpec {
    pub version: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

// Hand-written so `version` is read as the scalar's own text. A flattened
// derive buffers the entry first, which turns `1.30` into the float `1.3`.
impl<'de> Deserialize<'de> for ReleaseSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ReleaseSpecVisitor)
    }
}

struct ReleaseSpecVisitor;

impl<'de> Visitor<'de> for ReleaseSpecVisitor {
    type Value = ReleaseSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a release with a version")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ReleaseSpec, A::Error> {
        let mut version = None;
        let mut metadata = Map::new();
        while let Some(field) = map.next_key::<String>()? {
            if field == "version" {
                if version.is_some() {
                    return Err(de::Error::duplicate_field("version"));
                }
                version = Some(map.next_value::<String>()?);
            } else {
                metadata.insert(field, map.next_value::<Value>()?);
            }
        }

        Ok(ReleaseSpec {
            version: version.ok_or_else(|| de::Error::missing_field("version"))?,
            metadata,
        })
    }
}

/// Picks the section named after a subscription key out of the document root
/// and skips every other section.
struct KeySection<'a>(&'a str);

impl<'de> DeserializeSeed<'de> for KeySection<'_> {
    type Value = SourceDocument;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<SourceDocument, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for KeySection<'_> {
    type Value = SourceDocument;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a mapping with a {:?} section", self.0)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SourceDocument, A::Error> {
        let mut document = None;
        while let Some(name) = map.next_key::<String>()? {
            if name == self.0 {
                document = Some(map.next_value::<SourceDocument>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        document.ok_or_else(|| de::Error::custom(format!("no section for key {:?}", self.0)))
    }
}

impl SourceDocument {
    /// Decode a YAML document for subscription `key`.
    ///
    /// When the root has a top-level mapping named `key`, only that mapping is
    /// decoded. This lets one document carry several subscriptions side by side:
    ///
    /// ```yaml
    /// v1-release:
    ///   channels: []
    /// v1-k3s:
    ///   channels: []
    /// ```
    ///
    /// Otherwise the root itself must be a document. A root mapping with
    /// neither a section for `key` nor `channels`/`releases` entries is an
    /// error, as is any unknown top-level field. An empty document decodes to
    /// nothing.
    ///
    /// Scalars are decoded from their source text, so unquoted versions such
    /// as `1.30` stay `"1.30"`.
    pub fn parse(text: &str, key: &str) -> Result<Self, serde_yaml::Error> {
        let root: serde_yaml::Value = serde_yaml::from_str(text)?;
        if root.is_null() {
            return Ok(Self::default());
        }

        if root.get(key).is_some_and(serde_yaml::Value::is_mapping) {
            return KeySection(key).deserialize(serde_yaml::Deserializer::from_str(text));
        }
        if root.is_mapping() && root.get("channels").is_none() && root.get("releases").is_none() {
            return Err(de::Error::custom(format!(
                "document has no section for key {key:?} and no channels or releases"
            )));
        }
        serde_yaml::from_str(text)
    }
}
