//! Reading a `package.json` into the fields of a version record.
//!
//! Manifests are loosely typed and often hand written. Fields which are absent, `null`, `false`
//! or empty strings are treated as not set; anything else must have the expected shape, and the
//! error says which field is wrong and how.
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use thiserror::Error;
use url::Url;

use crate::cid::{Blob, CidError, ContentId};
use crate::lexicon::{
    AtDependency, Bytes, Dependency, NpmDependency, Person, Repository, VersionRecord,
};
use crate::npm::{self, LicenseError, PackageNameError};
use crate::range::{Range, RangeError};
use crate::syntax::{Did, RecordKey};
use crate::uri::{self, UriError};
use crate::SCOPE;

/// The mime type tarballs are uploaded with.
pub const BYTES_MIME: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("package.json must contain an object")]
    NotAnObject,
    #[error("name field must be a string.")]
    NameType,
    #[error("Invalid internal package name: {0:?} ({1})")]
    Name(String, #[source] PackageNameError),
    #[error("version field must be a string.")]
    VersionType,
    #[error("`{0}` is not a valid semver version: {1}")]
    Version(String, #[source] semver::Error),
    #[error("version `{0}` cannot be used as a record key")]
    VersionKey(String),
    #[error("{0} field must be an array of strings.")]
    Strings(&'static str),
    #[error("description field must be a string.")]
    Description,
    #[error("funding[{0}] field must be string, {{url: string}}, or Array<string | {{url: string}}>.")]
    Funding(usize),
    #[error("homepage field must be a string url.")]
    Homepage,
    #[error("No license field.")]
    NoLicense,
    #[error(transparent)]
    License(#[from] LicenseError),
    #[error("repository should be a string url or {{url: string}}")]
    Repository,
    #[error("Bug string field must be url, email, or {{email,url}}")]
    Bugs,
    #[error("bugs.url field must be a string url")]
    BugsUrl,
    #[error("bugs.email field must be a string email")]
    BugsEmail,
    #[error("{0} field must be an array")]
    People(&'static str),
    #[error("{0} field must have an atproto did, url, or email address")]
    Person(String),
    #[error("{0} field should be Record<string, string>")]
    Dependencies(&'static str),
    #[error("{field} key {key:?} is not a valid package name: {source}")]
    DependencyName {
        field: &'static str,
        key: String,
        source: PackageNameError,
    },
    #[error("{field}[{key:?}] should be string")]
    DependencyType { field: &'static str, key: String },
    #[error("{field}[{key:?}] aliases to an invalid npm package name: {source}")]
    Alias {
        field: &'static str,
        key: String,
        source: PackageNameError,
    },
    #[error("{field}[{key:?}] is not a valid jsr package name")]
    Jsr { field: &'static str, key: String },
    #[error("{field}[{key:?}] doesn't look like an npm or jsr package")]
    Specifier { field: &'static str, key: String },
    #[error("{field}[{key:?}]: {source}")]
    Range {
        field: &'static str,
        key: String,
        source: RangeError,
    },
    #[error("{field}[{key:?}] does not name a package of this network: {source}")]
    Target {
        field: &'static str,
        key: String,
        source: UriError,
    },
    #[error(transparent)]
    Cid(#[from] CidError),
}

/// A version ready to be published, before the package name it is published under is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDraft {
    /// The `name` of the manifest, for display.
    pub manifest_name: String,
    pub version: RecordKey,
    pub prerelease: bool,
    pub dist: Blob,
    pub legacy_shasum: Bytes,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub homepage: Option<String>,
    pub bugs: Option<String>,
    pub license: String,
    pub repository: Option<Repository>,
    pub contributors: Option<Vec<Person>>,
    pub funding: Option<Vec<String>>,
    pub dependencies: Option<Vec<Dependency>>,
    pub optional_dependencies: Option<Vec<Dependency>>,
    pub peer_dependencies: Option<Vec<Dependency>>,
    pub os: Option<Vec<String>>,
    pub cpu: Option<Vec<String>>,
}

impl PackageDraft {
    /// Reads a manifest, with its `atpkgs` overrides already applied, and hashes its tarball.
    pub fn from_manifest(manifest: &Value, tarball: &[u8]) -> Result<Self, ManifestError> {
        let pkg = manifest.as_object().ok_or(ManifestError::NotAnObject)?;

        let name = pkg
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ManifestError::NameType)?;
        npm::validate_publish_name(name)
            .map_err(|e| ManifestError::Name(name.to_owned(), e))?;

        let version = pkg
            .get("version")
            .and_then(Value::as_str)
            .ok_or(ManifestError::VersionType)?;
        let parsed = semver::Version::parse(version)
            .map_err(|e| ManifestError::Version(version.to_owned(), e))?;
        let version_key: RecordKey = version
            .parse()
            .map_err(|_| ManifestError::VersionKey(version.to_owned()))?;

        let description = match field(pkg, "description") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ManifestError::Description),
            None => None,
        };

        let homepage = match field(pkg, "homepage") {
            Some(Value::String(s)) if is_url(s) => Some(s.clone()),
            Some(_) => return Err(ManifestError::Homepage),
            None => None,
        };

        let license = match field(pkg, "license").or_else(|| field(pkg, "licence")) {
            Some(Value::String(s)) => {
                npm::validate_license(s)?;
                s.clone()
            }
            Some(other) => return Err(LicenseError(other.to_string()).into()),
            None => return Err(ManifestError::NoLicense),
        };

        let cid = ContentId::raw(tarball)?;
        let shasum = Sha1::digest(tarball);

        let draft = PackageDraft {
            manifest_name: name.to_owned(),
            version: version_key,
            prerelease: !parsed.pre.is_empty(),
            dist: Blob {
                link: cid.into(),
                mime_type: BYTES_MIME.to_owned(),
                size: tarball.len() as u64,
            },
            legacy_shasum: Bytes(shasum.to_vec()),
            description,
            keywords: field(pkg, "keywords").map(keywords).transpose()?,
            homepage,
            bugs: field(pkg, "bugs").map(bugs).transpose()?.flatten(),
            license,
            repository: field(pkg, "repository").map(repository).transpose()?,
            contributors: field(pkg, "contributors")
                .map(|v| people(v, "contributors"))
                .transpose()?,
            funding: field(pkg, "funding").map(funding).transpose()?,
            dependencies: dependency_field(pkg, "dependencies")?,
            optional_dependencies: dependency_field(pkg, "optionalDependencies")?,
            peer_dependencies: dependency_field(pkg, "peerDependencies")?,
            os: field(pkg, "os").map(|v| strings(v, "os")).transpose()?,
            cpu: field(pkg, "cpu").map(|v| strings(v, "cpu")).transpose()?,
        };
        tracing::debug!(name, version, cid = %cid, size = tarball.len(), "read manifest");
        Ok(draft)
    }

    pub fn cid(&self) -> &ContentId {
        self.dist.cid()
    }

    /// The record key the manifest name suggests: the unscoped part of the name, if it is one.
    pub fn default_name(&self) -> Option<RecordKey> {
        let unscoped = match self.manifest_name.split_once('/') {
            Some((_, name)) => name,
            None => &self.manifest_name,
        };
        unscoped.parse().ok()
    }

    /// The version record, as published under the package `name`.
    pub fn to_record(&self, name: &RecordKey) -> VersionRecord {
        VersionRecord {
            name: name.clone(),
            version: self.version.clone(),
            dist: self.dist.clone(),
            legacy_shasum: self.legacy_shasum.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            homepage: self.homepage.clone(),
            bugs: self.bugs.clone(),
            license: Some(self.license.clone()),
            repository: self.repository.clone(),
            contributors: self.contributors.clone(),
            funding: self.funding.clone(),
            dependencies: self.dependencies.clone(),
            optional_dependencies: self.optional_dependencies.clone(),
            peer_dependencies: self.peer_dependencies.clone(),
            os: self.os.clone(),
            cpu: self.cpu.clone(),
        }
    }
}

/// Moves the `atpkgs` section of a manifest over its top-level fields.
///
/// Objects present on both sides are merged one level deep; anything else is replaced.
pub fn apply_overrides(manifest: &mut Value) {
    let Some(pkg) = manifest.as_object_mut() else {
        return;
    };
    if !pkg.get("atpkgs").is_some_and(Value::is_object) {
        return;
    }
    let Some(Value::Object(overrides)) = pkg.remove("atpkgs") else {
        return;
    };
    for (key, value) in overrides {
        match (pkg.get_mut(&key), value) {
            (Some(Value::Object(target)), Value::Object(fields)) => target.extend(fields),
            (_, value) => {
                pkg.insert(key, value);
            }
        }
    }
}

/// A field which is set, in the sense of a JavaScript truthy value.
fn field<'a>(pkg: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match pkg.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        value => Some(value),
    }
}

fn is_url(s: &str) -> bool {
    Url::parse(s).is_ok()
}

fn is_email(s: &str) -> bool {
    match (s.find('@'), s.rfind('.')) {
        (Some(at), Some(dot)) => at < dot,
        _ => false,
    }
}

fn strings(value: &Value, name: &'static str) -> Result<Vec<String>, ManifestError> {
    let err = || ManifestError::Strings(name);
    value
        .as_array()
        .ok_or_else(err)?
        .iter()
        .map(|v| v.as_str().map(ToOwned::to_owned).ok_or_else(err))
        .collect()
}

/// Keywords are an array, or a single string separated by commas followed by whitespace.
fn keywords(value: &Value) -> Result<Vec<String>, ManifestError> {
    let keywords = match value {
        Value::String(s) => split_keywords(s),
        value => strings(value, "keywords")?,
    };
    if keywords.iter().any(String::is_empty) {
        return Err(ManifestError::Strings("keywords"));
    }
    Ok(keywords)
}

fn split_keywords(s: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    let mut rest = s;
    while let Some(comma) = rest
        .char_indices()
        .find(|&(i, c)| c == ',' && rest[i + 1..].starts_with(char::is_whitespace))
        .map(|(i, _)| i)
    {
        keywords.push(rest[..comma].to_owned());
        rest = rest[comma + 1..].trim_start();
    }
    keywords.push(rest.to_owned());
    keywords
}

fn funding(value: &Value) -> Result<Vec<String>, ManifestError> {
    let entries = match value {
        Value::Array(entries) => entries.as_slice(),
        single => std::slice::from_ref(single),
    };
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let url = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("url").and_then(Value::as_str),
                _ => None,
            };
            url.filter(|u| is_url(u))
                .map(ToOwned::to_owned)
                .ok_or(ManifestError::Funding(i))
        })
        .collect()
}

fn repository(value: &Value) -> Result<Repository, ManifestError> {
    let (url, directory) = match value {
        Value::String(url) => (Some(url.as_str()), None),
        Value::Object(o) => (
            o.get("url").and_then(Value::as_str),
            o.get("directory").and_then(Value::as_str),
        ),
        _ => (None, None),
    };
    match url {
        Some(url) if is_url(url) => Ok(Repository {
            uri: url.to_owned(),
            directory: directory.map(ToOwned::to_owned),
        }),
        _ => Err(ManifestError::Repository),
    }
}

fn bugs(value: &Value) -> Result<Option<String>, ManifestError> {
    match value {
        Value::String(s) if is_email(s) => Ok(Some(format!("mailto:{s}"))),
        Value::String(s) if is_url(s) => Ok(Some(s.clone())),
        Value::String(_) => Err(ManifestError::Bugs),
        Value::Object(o) => {
            if let Some(url) = field(o, "url") {
                return match url {
                    Value::String(s) if is_url(s) => Ok(Some(s.clone())),
                    _ => Err(ManifestError::BugsUrl),
                };
            }
            if let Some(email) = field(o, "email") {
                return match email {
                    Value::String(s) if is_email(s) => Ok(Some(format!("mailto:{s}"))),
                    _ => Err(ManifestError::BugsEmail),
                };
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn people(value: &Value, name: &'static str) -> Result<Vec<Person>, ManifestError> {
    value
        .as_array()
        .ok_or(ManifestError::People(name))?
        .iter()
        .enumerate()
        .map(|(i, v)| person(v, &format!("{name}[{i}]")))
        .collect()
}

/// The first `open … close` group holding at least one character and no brackets.
fn bracketed(s: &str, open: char, close: char) -> Option<&str> {
    s.match_indices(open).find_map(|(i, _)| {
        let inner = &s[i + open.len_utf8()..];
        let end = inner.find([open, close])?;
        (end > 0 && inner[end..].starts_with(close)).then(|| &inner[..end])
    })
}

/// Reads a person, either `"Name <email> (url)"` or `{name, email, url}`.
///
/// An `at://did:…` url or a DID in place of the email identifies an account of the network.
fn person(value: &Value, name: &str) -> Result<Person, ManifestError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Object(o) => {
            let get = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| field(o, k).and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_owned()
            };
            let mut text = get(&["name"]);
            let email = get(&["email", "mail"]);
            if !email.is_empty() {
                text.push_str(&format!(" <{email}>"));
            }
            let url = get(&["url", "web"]);
            if !url.is_empty() {
                text.push_str(&format!(" ({url})"));
            }
            text
        }
        _ => return Err(ManifestError::Person(name.to_owned())),
    };

    let url = bracketed(&text, '(', ')');
    let email = bracketed(&text, '<', '>');

    let mut did: Option<Did> = None;
    let at_uri = url.is_some_and(|u| u.starts_with("at://"));
    if let Some(rest) = url.and_then(|u| u.strip_prefix("at://")) {
        did = rest.parse().ok();
    }
    let email_did: Option<Did> = email.and_then(|e| e.parse().ok());
    let did_email = email_did.is_some();
    if email_did.is_some() {
        did = email_did;
    }

    let uri = url
        .filter(|u| !at_uri && is_url(u))
        .map(ToOwned::to_owned)
        .or_else(|| {
            email
                .filter(|_| !did_email)
                .map(|e| format!("mailto:{e}"))
        });

    if uri.is_none() && did.is_none() {
        return Err(ManifestError::Person(name.to_owned()));
    }
    Ok(Person { did, uri })
}

fn dependency_field(
    pkg: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<Vec<Dependency>>, ManifestError> {
    field(pkg, name).map(|v| dependencies(v, name)).transpose()
}

fn dependencies(value: &Value, field: &'static str) -> Result<Vec<Dependency>, ManifestError> {
    let map = value
        .as_object()
        .ok_or(ManifestError::Dependencies(field))?;
    map.iter()
        .map(|(key, spec)| dependency(field, key, spec))
        .collect()
}

/// Reads one dependency: a bare range, `npm:<name>[@range]`, or `jsr:@scope/name[@range]`.
fn dependency(field: &'static str, key: &str, spec: &Value) -> Result<Dependency, ManifestError> {
    let key_owned = || key.to_owned();
    npm::validate_legacy_name(key).map_err(|source| ManifestError::DependencyName {
        field,
        key: key_owned(),
        source,
    })?;
    let spec = spec.as_str().ok_or_else(|| ManifestError::DependencyType {
        field,
        key: key_owned(),
    })?;

    let (package, range) = if Range::parse(spec).is_ok() {
        (key.to_owned(), spec.to_owned())
    } else if let Some(aliased) = spec.strip_prefix("npm:") {
        // the first character may be the `@` of a scope
        let split = aliased
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '@')
            .map(|(i, _)| i);
        match split {
            Some(i) => (aliased[..i].to_owned(), aliased[i + 1..].to_owned()),
            None => (aliased.to_owned(), "*".to_owned()),
        }
    } else if let Some(jsr) = spec.strip_prefix("jsr:") {
        let (scope, name, range) = parse_jsr(jsr).ok_or_else(|| ManifestError::Jsr {
            field,
            key: key_owned(),
        })?;
        (format!("@jsr/{scope}__{name}"), range.unwrap_or("*").to_owned())
    } else {
        return Err(ManifestError::Specifier {
            field,
            key: key_owned(),
        });
    };

    if package != key {
        npm::validate_legacy_name(&package).map_err(|source| ManifestError::Alias {
            field,
            key: key_owned(),
            source,
        })?;
    }
    Range::parse(&range).map_err(|source| ManifestError::Range {
        field,
        key: key_owned(),
        source,
    })?;

    if package.starts_with(SCOPE) {
        let uri = uri::to_resource_uri(&package).map_err(|source| ManifestError::Target {
            field,
            key: key_owned(),
            source,
        })?;
        return Ok(Dependency::At(AtDependency {
            name: key.to_owned(),
            uri,
            range,
        }));
    }
    Ok(Dependency::Npm(NpmDependency {
        name: key.to_owned(),
        specifier: package,
        range,
    }))
}

/// Splits `@scope/name[@range]`.
fn parse_jsr(spec: &str) -> Option<(&str, &str, Option<&str>)> {
    let (scope, rest) = spec.strip_prefix('@')?.split_once('/')?;
    let (name, range) = match rest.split_once('@') {
        Some((name, range)) if !range.is_empty() => (name, Some(range)),
        Some(_) => return None,
        None => (rest, None),
    };
    let part = |s: &str| !s.is_empty() && !s.contains(['@', '/']);
    (part(scope) && part(name)).then_some((scope, name, range))
}
