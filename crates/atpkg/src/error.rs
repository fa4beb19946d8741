//! # Errors
//!
//! Every failure of the registry pipeline lands in one of a handful of classes. The class
//! decides how it is reported: not-found and encoding failures become a 404 at the HTTP
//! boundary, everything else is a server error. None of them is ever downgraded to an empty or
//! partial result.
use thiserror::Error;

use crate::cid::{CidError, ContentId};
use crate::identity::IdentityError;
use crate::lexicon::LexiconError;
use crate::range::RangeError;
use crate::repo::RepoError;
use crate::syntax::Did;
use crate::uri::{ResourceUri, UriError};

#[derive(Error, Debug)]
pub enum Error {
    /// A malformed or non-canonical package name or URI.
    #[error(transparent)]
    Encoding(#[from] UriError),
    /// A record does not have the shape its lexicon declares.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A record does not hash to the CID it is referenced by.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// Records which are individually valid but contradict each other.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The repository or identity service could not be reached or answered with an error.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Request was cancelled")]
    Cancelled,
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether this error should be reported as a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Encoding(_))
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid record: {0}")]
    Lexicon(#[from] LexiconError),
    #[error("Record does not decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("`{0}` is not a valid semver version: {1}")]
    Version(String, #[source] semver::Error),
    #[error("Dependency `{0}`: {1}")]
    Range(String, #[source] RangeError),
}

#[derive(Error, Debug)]
pub enum IntegrityError {
    /// A record does not hash to the CID its index pins.
    #[error("Record {uri} was tampered with: expected cid {expected}, computed {computed}")]
    Mismatch {
        uri: ResourceUri,
        expected: ContentId,
        computed: ContentId,
    },
    /// An index entry does not pin its version record.
    #[error("Version {0} is listed without a cid")]
    MissingCid(String),
    /// The PDS reported a CID other than the one its content hashes to.
    #[error("Server reported cid {reported} for {uri}, but its content hashes to {computed}")]
    Reported {
        uri: ResourceUri,
        reported: ContentId,
        computed: ContentId,
    },
    /// A CID could not be parsed or computed.
    #[error(transparent)]
    Cid(#[from] CidError),
}

#[derive(Error, Debug)]
pub enum ConsistencyError {
    /// Two entries share a dist-tag.
    #[error("Package has duplicate tag `{0}`")]
    DuplicateTag(String),
    /// Two entries share a version string.
    #[error("Package has duplicate version `{0}`")]
    DuplicateVersion(String),
    /// A dist-tag names a version that is not listed.
    #[error("Tag `{tag}` points at version `{version}`, which the package does not list")]
    DanglingTag { tag: String, version: String },
    /// The index record is stored under a key other than its name.
    #[error("Package index `{found}` is stored under key `{expected}`")]
    IndexName { expected: String, found: String },
    /// A version record belongs to a differently named package.
    #[error("Version {version} of the package has a different name, `{found}`")]
    VersionName { version: String, found: String },
    /// A version record carries a version other than the one listed.
    #[error("Index lists version `{claimed}`, but the record at {uri} is version `{found}`")]
    VersionMismatch {
        uri: ResourceUri,
        claimed: String,
        found: String,
    },
    /// A listed version record was not found.
    #[error("Index lists version {0}, but its record does not exist")]
    MissingVersion(ResourceUri),
    /// A listed version is stored in some other repository.
    #[error("Version {uri} lives outside the package repository {expected}")]
    ForeignRepository { uri: ResourceUri, expected: Did },
    /// A version reference is not a version record URI.
    #[error("Unexpected record: {0}")]
    Reference(#[source] UriError),
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Identity(IdentityError),
}

impl From<RepoError> for Error {
    fn from(e: RepoError) -> Self {
        if e.is_not_found() {
            Error::NotFound(e.to_string())
        } else {
            Error::Upstream(UpstreamError::Repo(e))
        }
    }
}

impl From<IdentityError> for Error {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::NotFound(_) | IdentityError::Identifier(_) => {
                Error::NotFound(e.to_string())
            }
            e => Error::Upstream(UpstreamError::Identity(e)),
        }
    }
}

impl From<LexiconError> for Error {
    fn from(e: LexiconError) -> Self {
        Error::Schema(e.into())
    }
}

impl From<CidError> for Error {
    fn from(e: CidError) -> Self {
        Error::Integrity(e.into())
    }
}
