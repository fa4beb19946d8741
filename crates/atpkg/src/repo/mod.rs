//! # Record Stores
//!
//! Package records live in repositories hosted by personal data servers. This registry reads
//! and writes them through [`RecordStore`], which [`XrpcStore`] implements against a PDS and
//! [`MemoryStore`] implements in process.
//!
//! Writes to the package index are optimistic: `put_record` takes the CID the caller last read
//! and fails if the record changed since.

mod memory;
mod xrpc;

pub use memory::MemoryStore;
pub use xrpc::{XrpcConnector, XrpcStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::cid::{Blob, CidError, ContentId};
use crate::syntax::{Did, RecordKey, SyntaxError};
use crate::uri::{ResourceUri, UriError};
use crate::xrpc::XrpcError;

/// A record as returned by `getRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub uri: ResourceUri,
    /// The CID the server reports; it is not trusted on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<ContentId>,
    pub value: Value,
}

/// The location and CID of a written record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub uri: ResourceUri,
    pub cid: ContentId,
}

#[derive(Error, Debug)]
pub enum RepoError {
    /// No record is stored at the URI.
    #[error("Record `{0}` not found")]
    RecordNotFound(String),
    /// A create targeted a key that is already taken.
    #[error("Record `{0}` already exists")]
    Exists(String),
    /// A compare-and-swap write lost against a concurrent writer.
    #[error("Record `{uri}` changed since it was read (expected {expected}, found {})", describe(.found))]
    SwapMismatch {
        uri: String,
        expected: ContentId,
        found: Option<ContentId>,
    },
    /// The PDS rejected the call or could not be reached.
    #[error(transparent)]
    Xrpc(#[from] XrpcError),
    /// The PDS returned a URI that does not parse.
    #[error(transparent)]
    Uri(#[from] UriError),
    /// The PDS returned an identifier that does not parse.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The PDS returned a CID that does not parse.
    #[error(transparent)]
    Cid(#[from] CidError),
}

fn describe(found: &Option<ContentId>) -> String {
    found.map_or_else(|| "nothing".to_owned(), |c| c.to_string())
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        match self {
            RepoError::RecordNotFound(_) => true,
            RepoError::Xrpc(e) => e.error_name() == Some("RecordNotFound"),
            _ => false,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
    ) -> Result<RecordEnvelope, RepoError>;

    /// Writes a record at a known key, replacing any existing one.
    ///
    /// With `swap`, the write only happens if the current record has exactly that CID.
    async fn put_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
        record: Value,
        swap: Option<ContentId>,
    ) -> Result<WriteResult, RepoError>;

    /// Creates a new record; the store picks a TID key unless `rkey` is given.
    async fn create_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: Option<&RecordKey>,
        record: Value,
    ) -> Result<WriteResult, RepoError>;

    async fn upload_blob(
        &self,
        repo: &Did,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Blob, RepoError>;
}

/// Opens the record store of the PDS at the given endpoint.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, pds: &Url) -> Arc<dyn RecordStore>;
}
