use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::{RecordEnvelope, RecordStore, RepoError, StoreConnector, WriteResult};
use crate::cid::{Blob, ContentId};
use crate::syntax::{Did, RecordKey, Tid};
use crate::uri::ResourceUri;

type Key = (Did, String, RecordKey);

#[derive(Default)]
struct State {
    records: BTreeMap<Key, (Value, ContentId)>,
    blobs: HashMap<ContentId, Vec<u8>>,
}

/// An in-process store holding any number of repositories.
///
/// Record CIDs are computed from the stored values exactly as a PDS would, so records written
/// here verify like real ones. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn blob(&self, cid: &ContentId) -> Option<Vec<u8>> {
        self.state.read().await.blobs.get(cid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn uri(repo: &Did, collection: &str, rkey: &RecordKey) -> Result<ResourceUri, RepoError> {
    Ok(ResourceUri::new(
        repo.clone(),
        collection.parse()?,
        rkey.clone(),
    ))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
    ) -> Result<RecordEnvelope, RepoError> {
        let uri = uri(repo, collection, rkey)?;
        let state = self.state.read().await;
        let key = (repo.clone(), collection.to_owned(), rkey.clone());
        match state.records.get(&key) {
            Some((value, cid)) => Ok(RecordEnvelope {
                uri,
                cid: Some(*cid),
                value: value.clone(),
            }),
            None => Err(RepoError::RecordNotFound(uri.to_string())),
        }
    }

    async fn put_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
        record: Value,
        swap: Option<ContentId>,
    ) -> Result<WriteResult, RepoError> {
        let uri = uri(repo, collection, rkey)?;
        let cid = ContentId::for_record(&record)?;
        let key = (repo.clone(), collection.to_owned(), rkey.clone());

        let mut state = self.state.write().await;
        if let Some(expected) = swap {
            let found = state.records.get(&key).map(|(_, cid)| *cid);
            if found != Some(expected) {
                return Err(RepoError::SwapMismatch {
                    uri: uri.to_string(),
                    expected,
                    found,
                });
            }
        }
        state.records.insert(key, (record, cid));
        tracing::trace!(%uri, %cid, "put record");
        Ok(WriteResult { uri, cid })
    }

    async fn create_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: Option<&RecordKey>,
        record: Value,
    ) -> Result<WriteResult, RepoError> {
        let rkey = rkey.cloned().unwrap_or_else(|| Tid::now().to_record_key());
        let uri = uri(repo, collection, &rkey)?;
        let cid = ContentId::for_record(&record)?;
        let key = (repo.clone(), collection.to_owned(), rkey);

        let mut state = self.state.write().await;
        if state.records.contains_key(&key) {
            return Err(RepoError::Exists(uri.to_string()));
        }
        state.records.insert(key, (record, cid));
        tracing::trace!(%uri, %cid, "created record");
        Ok(WriteResult { uri, cid })
    }

    async fn upload_blob(
        &self,
        _repo: &Did,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Blob, RepoError> {
        let cid = ContentId::raw(&bytes)?;
        let size = bytes.len() as u64;
        self.state.write().await.blobs.insert(cid, bytes);
        Ok(Blob {
            link: cid.into(),
            mime_type: mime_type.to_owned(),
            size,
        })
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self, _pds: &Url) -> Arc<dyn RecordStore> {
        Arc::new(self.clone())
    }
}
