//! Minimal XRPC client: queries are `GET /xrpc/<nsid>?<params>`, procedures are
//! `POST /xrpc/<nsid>` with a body. Failures carry the `{error, message}` pair servers send.
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XrpcError {
    #[error("Invalid XRPC endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{nsid} failed with {status}: {error}{}", detail(.message))]
    Status {
        nsid: String,
        status: u16,
        error: String,
        message: Option<String>,
    },
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

impl XrpcError {
    /// The XRPC error name, e.g. `RecordNotFound`, if the server sent one.
    pub fn error_name(&self) -> Option<&str> {
        match self {
            XrpcError::Status { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            XrpcError::Status { status, .. } => Some(*status),
            XrpcError::Http(e) => e.status().map(|s| s.as_u16()),
            XrpcError::Url(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct XrpcClient {
    http: reqwest::Client,
    service: Url,
}

impl XrpcClient {
    pub fn new(http: reqwest::Client, service: Url) -> Self {
        XrpcClient { http, service }
    }

    pub fn service(&self) -> &Url {
        &self.service
    }

    fn endpoint(&self, nsid: &str) -> Result<Url, XrpcError> {
        Ok(self.service.join(&format!("/xrpc/{nsid}"))?)
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T, XrpcError> {
        let mut url = self.endpoint(nsid)?;
        url.query_pairs_mut().extend_pairs(params);
        tracing::trace!(%url, "xrpc query");
        self.send(nsid, self.http.get(url)).await
    }

    pub async fn procedure<T: DeserializeOwned>(
        &self,
        nsid: &str,
        body: &serde_json::Value,
    ) -> Result<T, XrpcError> {
        let url = self.endpoint(nsid)?;
        tracing::trace!(%url, "xrpc procedure");
        self.send(nsid, self.http.post(url).json(body)).await
    }

    /// A procedure taking a raw binary body, such as a blob upload.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        nsid: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<T, XrpcError> {
        let url = self.endpoint(nsid)?;
        let request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes);
        self.send(nsid, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        nsid: &str,
        request: RequestBuilder,
    ) -> Result<T, XrpcError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error: None,
            message: None,
        });
        Err(XrpcError::Status {
            nsid: nsid.to_owned(),
            status: status.as_u16(),
            error: body
                .error
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_owned()),
            message: body.message,
        })
    }
}
