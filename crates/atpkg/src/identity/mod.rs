//! # Identity Resolution
//!
//! Turns a DID or handle into the subset of its DID document this registry needs: the verified
//! handle, the PDS hosting its repository, and its signing key. Resolution itself is delegated to
//! a service implementing `com.bad-example.identity.resolveMiniDoc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use crate::lexicon::{self, LexiconError};
use crate::syntax::{Did, Handle};
use crate::xrpc::{XrpcClient, XrpcError};

pub const RESOLVE_MINI_DOC: &str = "com.bad-example.identity.resolveMiniDoc";

/// The resolved identity of a repository owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniDoc {
    pub did: Did,
    /// `handle.invalid` when the handle does not point back at the DID.
    pub handle: Handle,
    pub pds: Url,
    pub signing_key: String,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("`{0}` is neither a DID nor a handle")]
    Identifier(String),
    #[error("Identity `{0}` could not be resolved")]
    NotFound(String),
    #[error("Resolved `{requested}` to a document for `{found}`")]
    Mismatch { requested: String, found: Did },
    #[error("Malformed identity document: {0}")]
    Document(String),
    #[error(transparent)]
    Xrpc(#[from] XrpcError),
}

impl IdentityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityError::NotFound(_))
    }
}

impl From<LexiconError> for IdentityError {
    fn from(e: LexiconError) -> Self {
        IdentityError::Document(e.to_string())
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolves an at-identifier, a DID or a handle.
    async fn resolve(&self, identifier: &str) -> Result<MiniDoc, IdentityError>;
}

enum Identifier {
    Did(Did),
    Handle(Handle),
}

fn parse_identifier(identifier: &str) -> Result<Identifier, IdentityError> {
    let parsed = if identifier.starts_with("did:") {
        identifier.parse().map(Identifier::Did)
    } else {
        // handles are case-insensitive
        identifier.to_ascii_lowercase().parse().map(Identifier::Handle)
    };
    parsed.map_err(|_| IdentityError::Identifier(identifier.to_owned()))
}

/// Checks that `doc` answers the question asked about `identifier`.
fn check(identifier: &Identifier, doc: MiniDoc) -> Result<MiniDoc, IdentityError> {
    match identifier {
        Identifier::Did(did) if *did != doc.did => Err(IdentityError::Mismatch {
            requested: did.to_string(),
            found: doc.did,
        }),
        Identifier::Handle(handle) if *handle != doc.handle => Err(IdentityError::Mismatch {
            requested: handle.to_string(),
            found: doc.did,
        }),
        _ => Ok(doc),
    }
}

/// Resolves identities through a `resolveMiniDoc` service.
#[derive(Clone, Debug)]
pub struct XrpcResolver {
    client: XrpcClient,
}

impl XrpcResolver {
    pub fn new(http: reqwest::Client, service: Url) -> Self {
        XrpcResolver {
            client: XrpcClient::new(http, service),
        }
    }
}

#[async_trait]
impl IdentityResolver for XrpcResolver {
    #[tracing::instrument(skip(self), fields(service = %self.client.service()))]
    async fn resolve(&self, identifier: &str) -> Result<MiniDoc, IdentityError> {
        let parsed = parse_identifier(identifier)?;
        let value: serde_json::Value = self
            .client
            .query(RESOLVE_MINI_DOC, &[("identifier", identifier)])
            .await
            .map_err(|e| match e.status() {
                Some(400 | 404) => IdentityError::NotFound(identifier.to_owned()),
                _ => e.into(),
            })?;

        lexicon::builtin()?.validate_output(RESOLVE_MINI_DOC, &value)?;
        let doc: MiniDoc =
            serde_json::from_value(value).map_err(|e| IdentityError::Document(e.to_string()))?;
        tracing::debug!(did = %doc.did, handle = %doc.handle, pds = %doc.pds, "resolved identity");
        check(&parsed, doc)
    }
}

/// Caches successful resolutions of the wrapped resolver, keyed by identifier.
pub struct Memoized<R> {
    inner: R,
    cache: RwLock<HashMap<String, MiniDoc>>,
}

impl<R> Memoized<R> {
    pub fn new(inner: R) -> Self {
        Memoized {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<R: IdentityResolver> IdentityResolver for Memoized<R> {
    async fn resolve(&self, identifier: &str) -> Result<MiniDoc, IdentityError> {
        if let Some(doc) = self.cache.read().await.get(identifier) {
            tracing::trace!(identifier, "identity cache hit");
            return Ok(doc.clone());
        }
        let doc = self.inner.resolve(identifier).await?;
        self.cache
            .write()
            .await
            .insert(identifier.to_owned(), doc.clone());
        Ok(doc)
    }
}

/// Serves a fixed set of documents, reachable by DID or by handle.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    docs: HashMap<String, MiniDoc>,
}

impl StaticResolver {
    pub fn new(docs: impl IntoIterator<Item = MiniDoc>) -> Self {
        let mut resolver = StaticResolver::default();
        for doc in docs {
            resolver.insert(doc);
        }
        resolver
    }

    pub fn insert(&mut self, doc: MiniDoc) {
        self.docs.insert(doc.handle.to_string(), doc.clone());
        self.docs.insert(doc.did.to_string(), doc);
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, identifier: &str) -> Result<MiniDoc, IdentityError> {
        let parsed = parse_identifier(identifier)?;
        let key = match &parsed {
            Identifier::Did(did) => did.to_string(),
            Identifier::Handle(handle) => handle.to_string(),
        };
        let doc = self
            .docs
            .get(&key)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(identifier.to_owned()))?;
        check(&parsed, doc)
    }
}
