use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

use super::{RecordEnvelope, RecordStore, RepoError, StoreConnector, WriteResult};
use crate::cid::{Blob, ContentId};
use crate::syntax::{Did, RecordKey};
use crate::xrpc::XrpcClient;

/// A repository reached over the `com.atproto.repo` XRPC methods of its PDS.
#[derive(Clone, Debug)]
pub struct XrpcStore {
    client: XrpcClient,
}

impl XrpcStore {
    pub fn new(http: reqwest::Client, pds: Url) -> Self {
        XrpcStore {
            client: XrpcClient::new(http, pds),
        }
    }
}

#[derive(Deserialize)]
struct UploadBlobOutput {
    blob: Blob,
}

#[async_trait]
impl RecordStore for XrpcStore {
    #[tracing::instrument(skip(self), fields(pds = %self.client.service()))]
    async fn get_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
    ) -> Result<RecordEnvelope, RepoError> {
        let params = [
            ("repo", repo.as_str()),
            ("collection", collection),
            ("rkey", rkey.as_str()),
        ];
        self.client
            .query("com.atproto.repo.getRecord", &params)
            .await
            .map_err(|e| {
                let err = RepoError::from(e);
                if err.is_not_found() {
                    RepoError::RecordNotFound(format!("at://{repo}/{collection}/{rkey}"))
                } else {
                    err
                }
            })
    }

    #[tracing::instrument(skip(self, record), fields(pds = %self.client.service()))]
    async fn put_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
        record: Value,
        swap: Option<ContentId>,
    ) -> Result<WriteResult, RepoError> {
        let mut input = json!({
            "repo": repo,
            "collection": collection,
            "rkey": rkey,
            "record": record,
        });
        if let Some(swap) = swap {
            input["swapRecord"] = swap.to_string().into();
        }
        Ok(self
            .client
            .procedure("com.atproto.repo.putRecord", &input)
            .await?)
    }

    #[tracing::instrument(skip(self, record), fields(pds = %self.client.service()))]
    async fn create_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: Option<&RecordKey>,
        record: Value,
    ) -> Result<WriteResult, RepoError> {
        let mut input = json!({
            "repo": repo,
            "collection": collection,
            "record": record,
        });
        if let Some(rkey) = rkey {
            input["rkey"] = rkey.as_str().into();
        }
        Ok(self
            .client
            .procedure("com.atproto.repo.createRecord", &input)
            .await?)
    }

    #[tracing::instrument(
        skip(self, bytes),
        fields(pds = %self.client.service(), size = bytes.len())
    )]
    async fn upload_blob(
        &self,
        _repo: &Did,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Blob, RepoError> {
        let output: UploadBlobOutput = self
            .client
            .upload("com.atproto.repo.uploadBlob", bytes, mime_type)
            .await?;
        Ok(output.blob)
    }
}

/// Connects to each PDS over XRPC, sharing one HTTP connection pool.
#[derive(Clone, Debug, Default)]
pub struct XrpcConnector {
    http: reqwest::Client,
}

impl XrpcConnector {
    pub fn new(http: reqwest::Client) -> Self {
        XrpcConnector { http }
    }
}

impl StoreConnector for XrpcConnector {
    fn connect(&self, pds: &Url) -> Arc<dyn RecordStore> {
        Arc::new(XrpcStore::new(self.http.clone(), pds.clone()))
    }
}
