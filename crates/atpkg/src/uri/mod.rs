//! # Package Names and Resource URIs
//!
//! Network-internal packages are exposed to package managers under a single npm scope, with the
//! owning DID and the package's record key folded into the package name by the [`name`] codec:
//!
//! ```text
//! at://did:plc:ewvi7nxzyoun6zhxrhs64oiz/org.purl.atpkgs.node.package/left-pad
//!   <=> @atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad
//! ```
//!
//! The mapping is exact in both directions: [`to_resource_uri`] and [`from_resource_uri`]
//! are inverses for every valid DID and record key.
//!
//! People usually refer to a package by its owner's handle instead (`@alice.example.com/left-pad`),
//! which [`HandleName`] parses. Resolving the handle yields the DID needed to build the alias a
//! package manager installs from this registry.
//!
//! [`name`]: crate::name
#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{tag, take_till1},
    character::complete::char,
    combinator::{all_consuming, opt, rest},
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::name::{self, NameError};
use crate::syntax::{Did, Handle, Nsid, RecordKey, SyntaxError};
use crate::{PACKAGE_COLLECTION, SCOPE_PREFIX};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The name lacks the `@atpkgs/did` scope prefix.
    #[error("Package `{0}` is not in the @atpkgs/did namespace")]
    NotNetworkPackage(String),
    /// A segment of the encoded name failed to decode.
    #[error("Package `{0}` has an invalid encoded name: {1}")]
    Name(String, #[source] NameError),
    /// The encoded name did not split into method, identifier and package.
    #[error("Package `{0}` should encode 3 parts, found {1}")]
    Parts(String, usize),
    /// A component is not a valid DID, NSID or record key.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The URI is not of the form `at://<did>/<collection>/<rkey>`.
    #[error("Malformed resource URI `{0}`")]
    Malformed(String),
    /// The URI names a record of some other collection.
    #[error("Expected a record in `{expected}`, found `{found}`")]
    Collection { expected: &'static str, found: Nsid },
    /// A fragment was attached where only whole records are allowed.
    #[error("Resource URI `{0}` cannot carry a fragment")]
    Fragment(String),
    /// A human-facing reference was not `@handle/name[@range]`.
    #[error("Invalid package reference `{0}`, expected `@handle/name[@range]`")]
    HandleName(String),
}

/// A canonical `at://<did>/<collection>/<rkey>[#fragment]` reference to a single record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUri {
    repo: Did,
    collection: Nsid,
    rkey: RecordKey,
    fragment: Option<String>,
}

impl ResourceUri {
    pub fn new(repo: Did, collection: Nsid, rkey: RecordKey) -> Self {
        ResourceUri {
            repo,
            collection,
            rkey,
            fragment: None,
        }
    }

    pub fn repo(&self) -> &Did {
        &self.repo
    }

    pub fn collection(&self) -> &Nsid {
        &self.collection
    }

    pub fn rkey(&self) -> &RecordKey {
        &self.rkey
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Fails unless this URI names a record of `collection`.
    pub fn expect_collection(&self, collection: &'static str) -> Result<(), UriError> {
        if self.collection.as_str() != collection {
            return Err(UriError::Collection {
                expected: collection,
                found: self.collection.clone(),
            });
        }
        Ok(())
    }
}

type Parts<'a> = (&'a str, &'a str, &'a str, Option<&'a str>);

fn segment(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == '/' || c == '#')(input)
}

fn parse_parts(input: &str) -> IResult<&str, Parts> {
    all_consuming(tuple((
        preceded(tag("at://"), segment),
        preceded(char('/'), segment),
        preceded(char('/'), segment),
        opt(preceded(char('#'), rest)),
    )))(input)
}

impl FromStr for ResourceUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (repo, collection, rkey, fragment)) =
            parse_parts(s).map_err(|_| UriError::Malformed(s.to_owned()))?;

        tracing::trace!(repo, collection, rkey, fragment, "{}", s);

        Ok(ResourceUri {
            repo: repo.parse()?,
            collection: collection.parse()?,
            rkey: rkey.parse()?,
            fragment: fragment.map(ToOwned::to_owned),
        })
    }
}

impl TryFrom<String> for ResourceUri {
    type Error = UriError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceUri> for String {
    fn from(uri: ResourceUri) -> Self {
        uri.to_string()
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.repo, self.collection, self.rkey)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Maps an `@atpkgs/did…` package name to the package index record it names.
pub fn to_resource_uri(package: &str) -> Result<ResourceUri, UriError> {
    let encoded = package
        .strip_prefix(SCOPE_PREFIX)
        .ok_or_else(|| UriError::NotNetworkPackage(package.to_owned()))?;
    let decoded = name::decode(encoded).map_err(|e| UriError::Name(package.to_owned(), e))?;

    let parts: Vec<&str> = decoded.split('/').collect();
    let [method, body, rkey] = parts.as_slice() else {
        return Err(UriError::Parts(package.to_owned(), parts.len()));
    };

    let repo: Did = format!("did:{method}:{body}").try_into()?;
    let rkey: RecordKey = rkey.parse()?;
    let collection: Nsid = PACKAGE_COLLECTION.parse()?;

    Ok(ResourceUri::new(repo, collection, rkey))
}

/// Maps a package index URI to the package name it is published under.
pub fn from_resource_uri(uri: &ResourceUri) -> Result<String, UriError> {
    uri.expect_collection(PACKAGE_COLLECTION)?;
    if uri.fragment.is_some() {
        return Err(UriError::Fragment(uri.to_string()));
    }
    let raw = format!(
        "{}/{}/{}",
        uri.repo.method(),
        uri.repo.identifier(),
        uri.rkey
    );
    Ok(format!("{SCOPE_PREFIX}{}", name::encode(&raw)))
}

/// An npm package name under the network-internal scope, paired with the record it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName {
    name: String,
    uri: ResourceUri,
}

impl PackageName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The package index record behind this name.
    pub fn uri(&self) -> &ResourceUri {
        &self.uri
    }

    pub fn repo(&self) -> &Did {
        self.uri.repo()
    }

    pub fn rkey(&self) -> &RecordKey {
        self.uri.rkey()
    }
}

impl FromStr for PackageName {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri = to_resource_uri(s)?;
        // alternate spellings were already rejected by the codec
        Ok(PackageName {
            name: s.to_owned(),
            uri,
        })
    }
}

impl TryFrom<ResourceUri> for PackageName {
    type Error = UriError;

    fn try_from(uri: ResourceUri) -> Result<Self, Self::Error> {
        let name = from_resource_uri(&uri)?;
        Ok(PackageName { name, uri })
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

const HANDLE_NAME_MAX: usize = 255;

/// A human-facing `@handle/name[@range]` reference to a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleName {
    pub handle: Handle,
    pub name: RecordKey,
    /// Everything after the `@` following the name, if present.
    pub range: Option<String>,
}

impl FromStr for HandleName {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || UriError::HandleName(s.to_owned());

        let scoped = s.strip_prefix('@').ok_or_else(err)?;
        let (handle, rest) = scoped.split_once('/').ok_or_else(err)?;
        let (name, range) = match rest.split_once('@') {
            Some((name, range)) if !range.is_empty() => (name, Some(range.to_owned())),
            Some(_) => return Err(err()),
            None => (rest, None),
        };

        let valid_name = !name.is_empty()
            && name.len() <= HANDLE_NAME_MAX
            && !name.starts_with('.')
            && name
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-'));
        if !valid_name {
            return Err(err());
        }

        Ok(HandleName {
            handle: handle.parse()?,
            name: name.parse()?,
            range,
        })
    }
}

impl HandleName {
    /// The package index record of this package, once the handle resolved to `repo`.
    pub fn resource_uri(&self, repo: Did) -> Result<ResourceUri, UriError> {
        Ok(ResourceUri::new(
            repo,
            PACKAGE_COLLECTION.parse()?,
            self.name.clone(),
        ))
    }

    /// The specifier a package manager installs: `@handle/name@npm:@atpkgs/did…[@range]`.
    pub fn alias(&self, repo: Did) -> Result<String, UriError> {
        let target = from_resource_uri(&self.resource_uri(repo)?)?;
        let mut alias = format!("@{}/{}@npm:{target}", self.handle, self.name);
        if let Some(range) = &self.range {
            alias.push('@');
            alias.push_str(range);
        }
        Ok(alias)
    }
}
