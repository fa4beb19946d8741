//! # Publishing
//!
//! Publishing a version writes three things to the publisher's repository: the tarball blob, an
//! immutable version record pointing at it, and the package index listing the new version
//! together with the CID of its record. The index is the only record ever rewritten, and every
//! rewrite is conditional on the CID of the index read at the start, so two concurrent publishes
//! of the same package cannot silently drop each other's versions.
#[cfg(test)]
mod tests;

mod manifest;

pub use manifest::{apply_overrides, ManifestError, PackageDraft, BYTES_MIME};

use thiserror::Error;

use crate::cid::{CidError, ContentId};
use crate::error::SchemaError;
use crate::lexicon::{self, PackageRecord, Record, TagEntry, VersionEntry};
use crate::repo::{RecordStore, RepoError, WriteResult};
use crate::syntax::{Did, RecordKey, SyntaxError};
use crate::{PACKAGE_COLLECTION, VERSION_COLLECTION};

const LATEST: &str = "latest";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("version already exists")]
    VersionExists(RecordKey),
    #[error("expected blob cid to be {expected}, got {found}")]
    BlobMismatch {
        expected: ContentId,
        found: ContentId,
    },
    #[error("The current package index is invalid: {0}")]
    Index(#[from] SchemaError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cid(#[from] CidError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The records a publish wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub version: WriteResult,
    pub index: WriteResult,
    /// Whether this was the first version, creating the package.
    pub created: bool,
}

/// The current index of a package, with the CID a conditional rewrite must be based on.
struct Current {
    record: PackageRecord,
    cid: ContentId,
}

async fn current_index(
    store: &dyn RecordStore,
    repo: &Did,
    name: &RecordKey,
) -> Result<Option<Current>, PublishError> {
    let envelope = match store.get_record(repo, PACKAGE_COLLECTION, name).await {
        Ok(envelope) => envelope,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // the swap token is computed from the content actually read
    let cid = ContentId::for_record(&envelope.value)?;
    lexicon::builtin()
        .and_then(|catalog| catalog.validate_record(PACKAGE_COLLECTION, &envelope.value))
        .map_err(SchemaError::from)?;
    let record = PackageRecord::from_value(envelope.value).map_err(SchemaError::Decode)?;
    Ok(Some(Current { record, cid }))
}

/// Publishes `draft` as a version of the package `name` in `repo`.
///
/// `tarball` must be the bytes the draft was read from.
#[tracing::instrument(skip(store, draft, tarball), fields(version = %draft.version))]
pub async fn publish(
    store: &dyn RecordStore,
    repo: &Did,
    name: &RecordKey,
    draft: &PackageDraft,
    tarball: &[u8],
) -> Result<Published, PublishError> {
    let current = current_index(store, repo, name).await?;
    if let Some(current) = &current {
        if current.record.versions.iter().any(|v| v.version == draft.version) {
            return Err(PublishError::VersionExists(draft.version.clone()));
        }
    }

    let blob = store
        .upload_blob(repo, tarball.to_vec(), BYTES_MIME)
        .await?;
    if blob.cid() != draft.cid() {
        return Err(PublishError::BlobMismatch {
            expected: *draft.cid(),
            found: *blob.cid(),
        });
    }

    let mut record = draft.to_record(name);
    record.dist.mime_type = blob.mime_type;
    let version = store
        .create_record(repo, VERSION_COLLECTION, None, record.to_value()?)
        .await?;
    tracing::info!(uri = %version.uri, cid = %version.cid, "created version record");

    let entry = VersionEntry {
        version: draft.version.clone(),
        uri: version.uri.clone(),
        cid: Some(version.cid.into()),
        deprecated: None,
    };
    let latest = TagEntry {
        tag: LATEST.parse()?,
        version: draft.version.clone(),
    };

    let (index, created) = match current {
        None => {
            let index = PackageRecord {
                name: name.clone(),
                tags: vec![latest],
                versions: vec![entry],
            };
            let written = store
                .create_record(repo, PACKAGE_COLLECTION, Some(name), index.to_value()?)
                .await?;
            (written, true)
        }
        Some(Current { record, cid }) => {
            let index = updated_index(record, entry, latest, draft.prerelease);
            let written = store
                .put_record(repo, PACKAGE_COLLECTION, name, index.to_value()?, Some(cid))
                .await?;
            (written, false)
        }
    };
    tracing::info!(uri = %index.uri, cid = %index.cid, created, "updated package index");

    Ok(Published {
        version,
        index,
        created,
    })
}

/// Lists a new version first; `latest` moves to it unless it is a pre-release.
fn updated_index(
    current: PackageRecord,
    entry: VersionEntry,
    latest: TagEntry,
    prerelease: bool,
) -> PackageRecord {
    let tags = if prerelease {
        current.tags
    } else {
        std::iter::once(latest)
            .chain(current.tags.into_iter().filter(|t| t.tag.as_str() != LATEST))
            .collect()
    };
    let versions = std::iter::once(entry).chain(current.versions).collect();
    PackageRecord {
        name: current.name,
        tags,
        versions,
    }
}
