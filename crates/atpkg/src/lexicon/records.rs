//! Typed forms of the package records, read after the raw value passed validation.
use base64::Engine;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::cid::{dag_cbor::BYTES, Blob, CidLink};
use crate::syntax::{Did, RecordKey};
use crate::uri::ResourceUri;
use crate::{PACKAGE_COLLECTION, VERSION_COLLECTION};

/// A record type stored under a fixed collection.
pub trait Record: Serialize + DeserializeOwned {
    const NSID: &'static str;

    /// The JSON data model form of this record, including its `$type`.
    fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("$type".into(), Self::NSID.into());
        }
        Ok(value)
    }

    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// The per-package index of tags and versions, keyed by package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: RecordKey,
    pub tags: Vec<TagEntry>,
    pub versions: Vec<VersionEntry>,
}

impl Record for PackageRecord {
    const NSID: &'static str = PACKAGE_COLLECTION;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub tag: RecordKey,
    pub version: RecordKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: RecordKey,
    pub uri: ResourceUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<CidLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

/// An immutable published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub name: RecordKey,
    pub version: RecordKey,
    pub dist: Blob,
    pub legacy_shasum: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<Person>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Vec<String>>,
}

impl Record for VersionRecord {
    const NSID: &'static str = VERSION_COLLECTION;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<Did>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Binary data in the JSON data model: `{"$bytes": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wrapped {
            #[serde(rename = "$bytes")]
            bytes: String,
        }
        Wrapped {
            bytes: BYTES.encode(&self.0),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wrapped {
            #[serde(rename = "$bytes")]
            bytes: String,
        }
        let wrapped = Wrapped::deserialize(deserializer)?;
        BYTES.decode(wrapped.bytes).map(Bytes).map_err(D::Error::custom)
    }
}

pub const AT_DEPENDENCY: &str = "org.purl.atpkgs.node.version#atDependency";
pub const NPM_DEPENDENCY: &str = "org.purl.atpkgs.node.version#npmDependency";

/// A dependency on another package of this network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtDependency {
    pub name: String,
    pub uri: ResourceUri,
    pub range: String,
}

/// A dependency on a package of the npm registry (or an npm mirror of another registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmDependency {
    pub name: String,
    pub specifier: String,
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    At(AtDependency),
    Npm(NpmDependency),
}

impl Dependency {
    /// The name the dependent package imports this dependency under.
    pub fn name(&self) -> &str {
        match self {
            Dependency::At(d) => &d.name,
            Dependency::Npm(d) => &d.name,
        }
    }

    pub fn range(&self) -> &str {
        match self {
            Dependency::At(d) => &d.range,
            Dependency::Npm(d) => &d.range,
        }
    }
}

impl Serialize for Dependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            #[serde(rename = "$type")]
            kind: &'static str,
            #[serde(flatten)]
            inner: &'a T,
        }
        match self {
            Dependency::At(inner) => Tagged {
                kind: AT_DEPENDENCY,
                inner,
            }
            .serialize(serializer),
            Dependency::Npm(inner) => Tagged {
                kind: NPM_DEPENDENCY,
                inner,
            }
            .serialize(serializer),
        }
    }
}

impl TryFrom<Value> for Dependency {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.get("$type").and_then(Value::as_str) {
            Some(AT_DEPENDENCY) => serde_json::from_value(value).map(Dependency::At),
            Some(NPM_DEPENDENCY) => serde_json::from_value(value).map(Dependency::Npm),
            Some(other) => Err(serde_json::Error::custom(format!(
                "unknown dependency type `{other}`"
            ))),
            // untagged: first matching variant in declared order
            None => serde_json::from_value(value.clone())
                .map(Dependency::At)
                .or_else(|_| serde_json::from_value(value).map(Dependency::Npm)),
        }
    }
}

impl<'de> Deserialize<'de> for Dependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Dependency::try_from(Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}
