//! # Content Identifiers
//!
//! Tarballs and records are addressed by CIDv1 over a SHA-256 digest. Tarballs use the `raw`
//! codec and can be exported to the `sha256-<base64>` subresource-integrity form package
//! managers check downloads against. Records use the `dag-cbor` codec over a deterministic
//! encoding of their JSON form (see [`dag_cbor`]); that identifier is both the tamper check for
//! fetched records and the swap token for index updates.

pub mod dag_cbor;

use base64::Engine;
use cid::{Cid, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Multicodec for raw binary content.
pub const RAW: u64 = 0x55;
/// Multicodec for deterministically encoded structured data.
pub const DAG_CBOR: u64 = 0x71;
/// Multihash code for SHA2-256.
pub const SHA2_256: u64 = 0x12;
const SHA2_256_LEN: u8 = 32;

#[derive(Error, Debug)]
pub enum CidError {
    /// The string or bytes are not a CID at all.
    #[error("Invalid CID: {0}")]
    Parse(#[from] cid::Error),
    /// A blob CID must be CIDv1.
    #[error("expected atproto blob cid to use CIDv1, found {0:?}")]
    Version(Version),
    /// A blob CID must use the `raw` codec.
    #[error("expected atproto blob cid to use `raw` multicodec, found {0:#x}")]
    Codec(u64),
    /// A blob CID must use `sha-256`.
    #[error("expected atproto blob cid to use `sha-256` multihash, found {0:#x}")]
    Hash(u64),
    /// The record holds a value DAG-CBOR cannot represent.
    #[error("Record cannot be encoded deterministically: {0}")]
    Encode(#[from] dag_cbor::EncodeError),
}

/// A self-describing content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Cid);

impl ContentId {
    /// Builds the `raw`/`sha-256` identifier of a finished digest.
    ///
    /// The binary form is the 4-byte header `[version, codec, hash, length]` followed by the
    /// digest, exactly as stored on the network.
    pub fn from_sha256(digest: [u8; 32]) -> Result<Self, CidError> {
        ContentId::from_digest(RAW, digest)
    }

    fn from_digest(codec: u64, digest: [u8; 32]) -> Result<Self, CidError> {
        // both codecs fit in a single varint byte
        let mut bytes = Vec::with_capacity(4 + digest.len());
        bytes.extend_from_slice(&[1, codec as u8, SHA2_256 as u8, SHA2_256_LEN]);
        bytes.extend_from_slice(&digest);
        Ok(ContentId(Cid::try_from(bytes.as_slice())?))
    }

    /// Hashes `bytes` into a `raw` identifier.
    pub fn raw(bytes: &[u8]) -> Result<Self, CidError> {
        ContentId::from_sha256(Sha256::digest(bytes).into())
    }

    /// Computes the identifier of a record from its JSON data model form.
    pub fn for_record(record: &serde_json::Value) -> Result<Self, CidError> {
        let bytes = dag_cbor::encode(record)?;
        ContentId::from_digest(DAG_CBOR, Sha256::digest(&bytes).into())
    }

    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CidError> {
        Ok(ContentId(Cid::try_from(bytes)?))
    }

    /// The subresource-integrity string of a `raw` CIDv1 over SHA-256.
    ///
    /// Any other combination is a legal CID, but does not describe the bytes of a tarball.
    pub fn to_sri(&self) -> Result<String, CidError> {
        if self.0.version() != Version::V1 {
            return Err(CidError::Version(self.0.version()));
        }
        if self.0.codec() != RAW {
            return Err(CidError::Codec(self.0.codec()));
        }
        let hash = self.0.hash();
        if hash.code() != SHA2_256 || hash.size() != SHA2_256_LEN {
            return Err(CidError::Hash(hash.code()));
        }
        let digest = base64::engine::general_purpose::STANDARD.encode(hash.digest());
        Ok(format!("sha256-{digest}"))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl FromStr for ContentId {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContentId(Cid::try_from(s)?))
    }
}

impl Serialize for ContentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A CID in the JSON data model: `{"$link": "<cid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: ContentId,
}

impl From<ContentId> for CidLink {
    fn from(link: ContentId) -> Self {
        CidLink { link }
    }
}

/// A reference to an uploaded binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type", rename = "blob", rename_all = "camelCase")]
pub struct Blob {
    #[serde(rename = "ref")]
    pub link: CidLink,
    pub mime_type: String,
    pub size: u64,
}

impl Blob {
    pub fn cid(&self) -> &ContentId {
        &self.link.link
    }
}
