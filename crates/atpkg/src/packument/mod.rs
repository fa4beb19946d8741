//! # Packument Assembly
//!
//! Builds the npm view of a package from its records. Nothing a repository returns is trusted
//! until it has been checked:
//!
//! 1. the package name must decode to a package index URI, otherwise the package does not exist
//! 2. the owner's identity is resolved to find the PDS hosting the repository
//! 3. the index record is fetched and validated, and its tags and versions are cross-checked
//! 4. every listed version record is fetched concurrently, hashed and compared against the CID
//!    the index recorded for it, then validated
//! 5. the verified records are translated into npm's packument shape
//!
//! Any failure aborts the whole assembly; a partial packument is never returned.
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::cid::ContentId;
use crate::error::{ConsistencyError, Error, IntegrityError, SchemaError};
use crate::identity::{IdentityError, IdentityResolver};
use crate::lexicon::{self, Dependency, PackageRecord, Person, Record, VersionRecord};
use crate::range::Range;
use crate::repo::{RecordStore, StoreConnector};
use crate::syntax::{Did, RecordKey};
use crate::uri::{self, PackageName, ResourceUri};
use crate::{PACKAGE_COLLECTION, VERSION_COLLECTION};

/// The timestamp reported for every package; records carry no trustworthy publish time.
pub const FAKE_TIME: &str = "2025-01-01T00:00:00.000Z";

const GET_BLOB: &str = "/xrpc/com.atproto.sync.getBlob";

/// npm's document describing every version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packument {
    pub name: String,
    #[serde(rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    pub time: Times,
    pub versions: BTreeMap<String, PackumentVersion>,
    /// Copied from the `latest` version, or the first listed one.
    #[serde(flatten)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub created: String,
    pub modified: String,
}

/// The descriptive fields shared by a packument and its versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugs: Option<Bugs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<Contributor>>,
}

/// A single version as npm expects it in `versions` and from `GET /<pkg>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackumentVersion {
    pub name: String,
    pub version: String,
    #[serde(flatten)]
    pub metadata: Metadata,
    pub dist: Dist,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    /// Hex SHA-1 of the tarball.
    pub shasum: String,
    /// Subresource-integrity string of the tarball blob.
    pub integrity: String,
    pub signatures: Vec<Value>,
    pub tarball: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bugs {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub url: String,
}

/// Where a package's records and blobs are read from.
#[derive(Debug)]
struct Source {
    package: String,
    repo: Did,
    rkey: RecordKey,
    blobs: Url,
}

/// A version the index lists, after the index passed its checks.
#[derive(Debug, Clone)]
struct Listed {
    version: String,
    uri: ResourceUri,
    cid: ContentId,
    deprecated: Option<String>,
}

/// A package index which passed validation and cross-checks, with everything needed to
/// fetch its versions.
struct Index {
    source: Arc<Source>,
    store: Arc<dyn RecordStore>,
    tags: BTreeMap<String, String>,
    versions: Vec<Listed>,
}

/// Serves verified packuments out of the repositories of the network.
#[derive(Clone)]
pub struct Registry {
    resolver: Arc<dyn IdentityResolver>,
    connector: Arc<dyn StoreConnector>,
    time: String,
}

impl Registry {
    pub fn new(resolver: Arc<dyn IdentityResolver>, connector: Arc<dyn StoreConnector>) -> Self {
        Registry {
            resolver,
            connector,
            time: FAKE_TIME.to_owned(),
        }
    }

    /// Overrides the timestamp reported in `time.created` and `time.modified`.
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = time.into();
        self
    }

    pub async fn fetch_packument(&self, package: &str) -> Result<Packument, Error> {
        self.fetch_packument_with(package, &CancellationToken::new())
            .await
    }

    /// Assembles the packument of `package`, giving up as soon as `cancel` fires.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn fetch_packument_with(
        &self,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<Packument, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            packument = self.assemble(package) => packument,
        }
    }

    /// Fetches a single verified version, named either by its version or by a dist-tag.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn fetch_version(
        &self,
        package: &str,
        version_or_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<PackumentVersion, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            version = self.find_version(package, version_or_tag) => version,
        }
    }

    async fn find_version(
        &self,
        package: &str,
        version_or_tag: &str,
    ) -> Result<PackumentVersion, Error> {
        let not_found = || Error::NotFound(format!("{package}@{version_or_tag}"));
        let index = self.load_index(package).await?;
        let wanted = if index.versions.iter().any(|v| v.version == version_or_tag) {
            version_or_tag
        } else {
            index
                .tags
                .get(version_or_tag)
                .map(String::as_str)
                .ok_or_else(not_found)?
        };
        let listed: Vec<Listed> = index
            .versions
            .iter()
            .filter(|v| v.version == wanted)
            .cloned()
            .collect();
        fetch_versions(&index, listed)
            .await?
            .pop()
            .ok_or_else(not_found)
    }

    async fn assemble(&self, package: &str) -> Result<Packument, Error> {
        let index = self.load_index(package).await?;
        let fetched = fetch_versions(&index, index.versions.clone()).await?;

        let primary = index
            .tags
            .get("latest")
            .or_else(|| index.versions.first().map(|v| &v.version));
        let metadata = primary
            .and_then(|p| fetched.iter().find(|v| &v.version == p))
            .map(|v| v.metadata.clone())
            .unwrap_or_default();

        tracing::debug!(
            package,
            versions = fetched.len(),
            tags = index.tags.len(),
            "assembled packument"
        );
        Ok(Packument {
            name: package.to_owned(),
            dist_tags: index.tags,
            time: Times {
                created: self.time.clone(),
                modified: self.time.clone(),
            },
            versions: fetched
                .into_iter()
                .map(|v| (v.version.clone(), v))
                .collect(),
            metadata,
        })
    }

    /// Resolves, fetches and checks the package index. No version record is read here.
    async fn load_index(&self, package: &str) -> Result<Index, Error> {
        let name: PackageName = package.parse()?;
        let doc = self.resolver.resolve(name.repo().as_str()).await?;
        tracing::debug!(did = %doc.did, pds = %doc.pds, "resolved package owner");

        let blobs = doc
            .pds
            .join(GET_BLOB)
            .map_err(|e| IdentityError::Document(format!("unusable PDS endpoint: {e}")))?;
        let store = self.connector.connect(&doc.pds);

        let envelope = store
            .get_record(name.repo(), PACKAGE_COLLECTION, name.rkey())
            .await?;
        let computed = ContentId::for_record(&envelope.value)?;
        check_reported(&envelope.uri, envelope.cid, computed)?;

        lexicon::builtin()?.validate_record(PACKAGE_COLLECTION, &envelope.value)?;
        let record = PackageRecord::from_value(envelope.value).map_err(SchemaError::Decode)?;
        tracing::trace!(
            cid = %computed,
            tags = record.tags.len(),
            versions = record.versions.len(),
            "fetched package index"
        );

        let (tags, versions) = check_index(&name, record).inspect_err(|e| {
            tracing::warn!(package, error = %e, "rejected package index");
        })?;

        Ok(Index {
            source: Arc::new(Source {
                package: package.to_owned(),
                repo: name.repo().clone(),
                rkey: name.rkey().clone(),
                blobs,
            }),
            store,
            tags,
            versions,
        })
    }
}

/// The server's own claim about a record's CID must agree with its content.
fn check_reported(
    uri: &ResourceUri,
    reported: Option<ContentId>,
    computed: ContentId,
) -> Result<(), IntegrityError> {
    match reported {
        Some(reported) if reported != computed => Err(IntegrityError::Reported {
            uri: uri.clone(),
            reported,
            computed,
        }),
        _ => Ok(()),
    }
}

fn parse_semver(version: &str) -> Result<(), SchemaError> {
    semver::Version::parse(version)
        .map(drop)
        .map_err(|e| SchemaError::Version(version.to_owned(), e))
}

/// Cross-checks an index before any of its versions is fetched.
fn check_index(
    name: &PackageName,
    record: PackageRecord,
) -> Result<(BTreeMap<String, String>, Vec<Listed>), Error> {
    if record.name != *name.rkey() {
        return Err(ConsistencyError::IndexName {
            expected: name.rkey().to_string(),
            found: record.name.to_string(),
        }
        .into());
    }

    let mut tags = BTreeMap::new();
    for entry in record.tags {
        parse_semver(&entry.version)?;
        if tags
            .insert(entry.tag.to_string(), entry.version.to_string())
            .is_some()
        {
            return Err(ConsistencyError::DuplicateTag(entry.tag.to_string()).into());
        }
    }

    let mut seen = HashSet::new();
    let mut versions = Vec::with_capacity(record.versions.len());
    for entry in record.versions {
        let version = entry.version.to_string();
        if !seen.insert(version.clone()) {
            return Err(ConsistencyError::DuplicateVersion(version).into());
        }
        parse_semver(&version)?;
        entry
            .uri
            .expect_collection(VERSION_COLLECTION)
            .map_err(ConsistencyError::Reference)?;
        if entry.uri.repo() != name.repo() {
            return Err(ConsistencyError::ForeignRepository {
                uri: entry.uri,
                expected: name.repo().clone(),
            }
            .into());
        }
        let cid = entry
            .cid
            .ok_or_else(|| IntegrityError::MissingCid(version.clone()))?
            .link;
        versions.push(Listed {
            version,
            uri: entry.uri,
            cid,
            deprecated: entry.deprecated,
        });
    }

    if let Some((tag, version)) = tags.iter().find(|(_, v)| !seen.contains(*v)) {
        return Err(ConsistencyError::DanglingTag {
            tag: tag.clone(),
            version: version.clone(),
        }
        .into());
    }

    Ok((tags, versions))
}

/// Fetches and verifies `listed` concurrently, returning them in the same order.
///
/// The first failure aborts every fetch still in flight.
async fn fetch_versions(
    index: &Index,
    listed: Vec<Listed>,
) -> Result<Vec<PackumentVersion>, Error> {
    let mut tasks = JoinSet::new();
    for (position, entry) in listed.into_iter().enumerate() {
        let store = Arc::clone(&index.store);
        let source = Arc::clone(&index.source);
        tasks.spawn(
            async move {
                verify_version(store.as_ref(), &source, entry)
                    .await
                    .map(|v| (position, v))
            }
            .in_current_span(),
        );
    }

    let mut fetched = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(version)) => fetched.push(version),
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e.into());
            }
        }
    }
    fetched.sort_by_key(|(position, _)| *position);
    Ok(fetched.into_iter().map(|(_, v)| v).collect())
}

async fn verify_version(
    store: &dyn RecordStore,
    source: &Source,
    listed: Listed,
) -> Result<PackumentVersion, Error> {
    let uri = &listed.uri;
    let envelope = store
        .get_record(uri.repo(), VERSION_COLLECTION, uri.rkey())
        .await
        .map_err(|e| {
            if e.is_not_found() {
                Error::from(ConsistencyError::MissingVersion(uri.clone()))
            } else {
                e.into()
            }
        })?;

    let computed = ContentId::for_record(&envelope.value)?;
    if computed != listed.cid {
        tracing::warn!(
            %uri,
            expected = %listed.cid,
            %computed,
            "version record does not match its index"
        );
        return Err(IntegrityError::Mismatch {
            uri: uri.clone(),
            expected: listed.cid,
            computed,
        }
        .into());
    }
    check_reported(uri, envelope.cid, computed)?;
    tracing::trace!(%uri, cid = %computed, "verified version record");

    lexicon::builtin()?.validate_record(VERSION_COLLECTION, &envelope.value)?;
    let record = VersionRecord::from_value(envelope.value).map_err(SchemaError::Decode)?;

    if *record.version != *listed.version {
        return Err(ConsistencyError::VersionMismatch {
            uri: uri.clone(),
            claimed: listed.version,
            found: record.version.to_string(),
        }
        .into());
    }
    if record.name != source.rkey {
        return Err(ConsistencyError::VersionName {
            version: listed.version,
            found: record.name.to_string(),
        }
        .into());
    }

    let mut version = translate(source, record)?;
    version.deprecated = listed.deprecated;
    Ok(version)
}

/// Converts a verified version record into npm's shape.
fn translate(source: &Source, record: VersionRecord) -> Result<PackumentVersion, Error> {
    let cid = record.dist.cid();
    let mut tarball = source.blobs.clone();
    tarball.set_query(Some(&format!("did={}&cid={cid}", source.repo)));

    let dist = Dist {
        shasum: hex::encode(&record.legacy_shasum.0),
        integrity: cid.to_sri()?,
        signatures: Vec::new(),
        tarball: tarball.to_string(),
    };

    let metadata = Metadata {
        description: record.description,
        keywords: record.keywords,
        homepage: record.homepage,
        bugs: record.bugs.map(|url| Bugs { url }),
        license: record.license,
        repository: record.repository.map(|r| RepositoryInfo {
            url: r.uri,
            directory: r.directory,
        }),
        contributors: record
            .contributors
            .map(|people| people.into_iter().filter_map(contributor).collect()),
    };

    Ok(PackumentVersion {
        name: source.package.clone(),
        version: record.version.to_string(),
        metadata,
        dist,
        os: record.os,
        cpu: record.cpu,
        funding: record.funding,
        dependencies: translate_dependencies(record.dependencies)?,
        peer_dependencies: translate_dependencies(record.peer_dependencies)?,
        optional_dependencies: translate_dependencies(record.optional_dependencies)?,
        deprecated: None,
    })
}

fn contributor(person: Person) -> Option<Contributor> {
    let url = match (person.uri, person.did) {
        (Some(uri), _) => uri,
        (None, Some(did)) => format!("at://{did}"),
        (None, None) => return None,
    };
    Some(Contributor {
        name: String::new(),
        url,
    })
}

/// Turns dependency entries into the specifiers a package manager installs.
///
/// Network-internal dependencies become aliases of their package in this registry; npm
/// dependencies keep their specifier, aliased only when it names a different package.
pub fn translate_dependencies(
    deps: Option<Vec<Dependency>>,
) -> Result<Option<BTreeMap<String, String>>, Error> {
    let Some(deps) = deps.filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    let mut translated = BTreeMap::new();
    for dep in deps {
        Range::parse(dep.range()).map_err(|e| SchemaError::Range(dep.name().to_owned(), e))?;
        let specifier = match &dep {
            Dependency::At(at) => {
                let target = uri::from_resource_uri(&at.uri).map_err(ConsistencyError::Reference)?;
                format!("npm:{target}@{}", at.range)
            }
            Dependency::Npm(npm) if npm.specifier == npm.name => npm.range.clone(),
            Dependency::Npm(npm) => format!("npm:{}@{}", npm.specifier, npm.range),
        };
        translated.insert(dep.name().to_owned(), specifier);
    }
    Ok(Some(translated))
}
