use super::*;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cid::Blob;
use crate::lexicon::{Dependency, VersionRecord};
use crate::repo::{MemoryStore, RecordEnvelope};

const DID: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";
const TARBALL: &[u8] = b"hello world";

fn manifest(extra: Value) -> Value {
    let mut manifest = json!({
        "name": "left-pad",
        "version": "1.0.0",
        "license": "MIT",
    });
    if let (Some(base), Value::Object(extra)) = (manifest.as_object_mut(), extra) {
        base.extend(extra);
    }
    manifest
}

fn draft(extra: Value) -> Result<PackageDraft, ManifestError> {
    PackageDraft::from_manifest(&manifest(extra), TARBALL)
}

#[test]
fn minimal_manifest() -> anyhow::Result<()> {
    let draft = draft(json!({}))?;
    assert_eq!(draft.manifest_name, "left-pad");
    assert_eq!(draft.version.as_str(), "1.0.0");
    assert!(!draft.prerelease);
    assert_eq!(
        draft.cid().to_string(),
        "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e"
    );
    assert_eq!(
        hex::encode(&draft.legacy_shasum.0),
        "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
    );
    assert_eq!(draft.dist.size, 11);
    assert_eq!(draft.dist.mime_type, BYTES_MIME);
    assert_eq!(draft.default_name().as_deref(), Some("left-pad"));
    Ok(())
}

#[test]
fn full_manifest() -> anyhow::Result<()> {
    let draft = draft(json!({
        "name": "@alice/left-pad",
        "version": "2.0.0-beta.1",
        "description": "pads strings",
        "keywords": "pad, string,  left,right",
        "homepage": "https://left-pad.example.com",
        "bugs": { "email": "bugs@example.com" },
        "repository": { "type": "git", "url": "https://git.example.com/left-pad.git", "directory": "packages/left-pad" },
        "funding": ["https://fund.example.com", { "type": "github", "url": "https://github.com/sponsors/alice" }],
        "os": ["linux", "darwin"],
        "cpu": ["x64"],
        "description_extra": null,
    }))?;

    assert!(draft.prerelease);
    assert_eq!(draft.default_name().as_deref(), Some("left-pad"));
    assert_eq!(draft.description.as_deref(), Some("pads strings"));
    assert_eq!(
        draft.keywords,
        Some(vec!["pad".into(), "string".into(), "left,right".into()])
    );
    assert_eq!(draft.bugs.as_deref(), Some("mailto:bugs@example.com"));
    let repository = draft.repository.clone().unwrap_or_else(|| panic!("repository"));
    assert_eq!(repository.uri, "https://git.example.com/left-pad.git");
    assert_eq!(repository.directory.as_deref(), Some("packages/left-pad"));
    assert_eq!(
        draft.funding,
        Some(vec![
            "https://fund.example.com".into(),
            "https://github.com/sponsors/alice".into()
        ])
    );
    assert_eq!(draft.os, Some(vec!["linux".into(), "darwin".into()]));

    let name: RecordKey = "left-pad".parse()?;
    let record = draft.to_record(&name).to_value()?;
    assert_eq!(record["$type"], VersionRecord::NSID);
    assert_eq!(record["name"], "left-pad");
    assert_eq!(record["license"], "MIT");
    lexicon::builtin()?.validate_record(VERSION_COLLECTION, &record)?;
    Ok(())
}

#[test]
fn package_names() {
    for name in ["left-pad", "@alice/left-pad", "left.pad", "a", "lodash_merge"] {
        assert!(
            draft(json!({ "name": name })).is_ok(),
            "Expected '{}' to be valid",
            name
        );
    }
    for name in [
        ".hidden",
        "_private",
        "Left-Pad",
        " left-pad",
        "node_modules",
        "favicon.ico",
        "left:pad",
        "left+pad",
        "@alice/",
        "",
    ] {
        assert!(
            matches!(draft(json!({ "name": name })), Err(ManifestError::Name(..))),
            "Expected '{}' to be invalid",
            name
        );
    }
    assert!(matches!(
        draft(json!({ "name": 7 })),
        Err(ManifestError::NameType)
    ));
}

#[test]
fn versions() {
    assert!(matches!(
        draft(json!({ "version": 1 })),
        Err(ManifestError::VersionType)
    ));
    assert!(matches!(
        draft(json!({ "version": "1.0" })),
        Err(ManifestError::Version(..))
    ));
    assert!(matches!(
        draft(json!({ "version": "1.0.0+build.5" })),
        Err(ManifestError::VersionKey(_))
    ));
}

#[test]
fn licenses() -> anyhow::Result<()> {
    let mut unlicensed = manifest(json!({}));
    if let Some(map) = unlicensed.as_object_mut() {
        map.remove("license");
    }
    let err = PackageDraft::from_manifest(&unlicensed, TARBALL).unwrap_err();
    assert_eq!(err.to_string(), "No license field.");

    let british = draft(json!({ "license": null, "licence": "Apache-2.0 OR MIT" }))?;
    assert_eq!(british.license, "Apache-2.0 OR MIT");

    for license in ["not a license", "MIT AND", "(MIT"] {
        assert!(
            matches!(
                draft(json!({ "license": license })),
                Err(ManifestError::License(_))
            ),
            "Expected '{}' to be rejected",
            license
        );
    }
    for license in [json!(17), json!(["MIT"])] {
        assert!(matches!(
            draft(json!({ "license": license })),
            Err(ManifestError::License(_))
        ));
    }
    Ok(())
}

#[test]
fn field_shapes() {
    let cases = [
        (json!({ "description": ["pads"] }), "description field must be a string."),
        (json!({ "keywords": ["ok", ""] }), "keywords field must be an array of strings."),
        (json!({ "cpu": "x64" }), "cpu field must be an array of strings."),
        (json!({ "homepage": "left-pad" }), "homepage field must be a string url."),
        (
            json!({ "funding": ["https://fund.example.com", { "type": "github" }] }),
            "funding[1] field must be string, {url: string}, or Array<string | {url: string}>.",
        ),
        (
            json!({ "repository": { "type": "git" } }),
            "repository should be a string url or {url: string}",
        ),
        (json!({ "bugs": "nowhere" }), "Bug string field must be url, email, or {email,url}"),
        (json!({ "bugs": { "url": "nowhere" } }), "bugs.url field must be a string url"),
        (json!({ "contributors": "alice" }), "contributors field must be an array"),
        (
            json!({ "dependencies": ["left-pad"] }),
            "dependencies field should be Record<string, string>",
        ),
    ];
    for (fields, message) in cases {
        let err = draft(fields).unwrap_err();
        assert_eq!(err.to_string(), message);
    }
}

#[test]
fn unset_fields() -> anyhow::Result<()> {
    let draft = draft(json!({
        "description": "",
        "homepage": null,
        "bugs": false,
        "keywords": 0,
    }))?;
    assert_eq!(draft.description, None);
    assert_eq!(draft.homepage, None);
    assert_eq!(draft.bugs, None);
    assert_eq!(draft.keywords, None);
    Ok(())
}

#[test]
fn bug_trackers() -> anyhow::Result<()> {
    let cases = [
        (json!("bugs@example.com"), "mailto:bugs@example.com"),
        (json!("https://bugs.example.com"), "https://bugs.example.com"),
        (
            json!({ "url": "https://bugs.example.com", "email": "bugs@example.com" }),
            "https://bugs.example.com",
        ),
    ];
    for (bugs, expected) in cases {
        assert_eq!(draft(json!({ "bugs": bugs }))?.bugs.as_deref(), Some(expected));
    }
    Ok(())
}

#[test]
fn people() -> anyhow::Result<()> {
    let draft = draft(json!({
        "contributors": [
            "Alice <alice@example.com> (https://alice.example.com)",
            "Bob (at://did:plc:ewvi7nxzyoun6zhxrhs64oiz)",
            "Carol <did:plc:ewvi7nxzyoun6zhxrhs64oiz>",
            { "name": "Dave", "mail": "dave@example.com" },
            { "name": "Erin", "web": "https://erin.example.com", "email": "erin@example.com" },
        ],
    }))?;
    let people = draft.contributors.unwrap_or_default();
    let did: Did = DID.parse()?;

    assert_eq!(people[0].uri.as_deref(), Some("https://alice.example.com"));
    assert_eq!(people[0].did, None);
    assert_eq!(people[1].did.as_ref(), Some(&did));
    assert_eq!(people[1].uri, None);
    assert_eq!(people[2].did.as_ref(), Some(&did));
    assert_eq!(people[2].uri, None);
    assert_eq!(people[3].uri.as_deref(), Some("mailto:dave@example.com"));
    assert_eq!(people[4].uri.as_deref(), Some("https://erin.example.com"));

    let err = PackageDraft::from_manifest(
        &manifest(json!({ "contributors": ["Alice", "Bob"] })),
        TARBALL,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "contributors[0] field must have an atproto did, url, or email address"
    );
    Ok(())
}

#[test]
fn dependency_specifiers() -> anyhow::Result<()> {
    let draft = draft(json!({
        "dependencies": {
            "foo": "^1.0.0",
            "bar": "npm:baz@2",
            "qux": "npm:@scope/qux",
            "std-path": "jsr:@std/path@^1.0.0",
            "pad": "npm:@atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad@~1.3.0",
        },
    }))?;
    let deps = draft.dependencies.unwrap_or_default();
    let find = |name: &str| deps.iter().find(|d| d.name() == name).cloned();

    let Some(Dependency::Npm(foo)) = find("foo") else {
        panic!("Expected an npm dependency for foo");
    };
    assert_eq!((foo.specifier.as_str(), foo.range.as_str()), ("foo", "^1.0.0"));

    let Some(Dependency::Npm(bar)) = find("bar") else {
        panic!("Expected an npm dependency for bar");
    };
    assert_eq!((bar.specifier.as_str(), bar.range.as_str()), ("baz", "2"));

    let Some(Dependency::Npm(qux)) = find("qux") else {
        panic!("Expected an npm dependency for qux");
    };
    assert_eq!((qux.specifier.as_str(), qux.range.as_str()), ("@scope/qux", "*"));

    let Some(Dependency::Npm(path)) = find("std-path") else {
        panic!("Expected an npm dependency for std-path");
    };
    assert_eq!(
        (path.specifier.as_str(), path.range.as_str()),
        ("@jsr/std__path", "^1.0.0")
    );

    let Some(Dependency::At(pad)) = find("pad") else {
        panic!("Expected a network dependency for pad");
    };
    assert_eq!(
        pad.uri.to_string(),
        "at://did:plc:ewvi7nxzyoun6zhxrhs64oiz/org.purl.atpkgs.node.package/left-pad"
    );
    assert_eq!(pad.range, "~1.3.0");
    Ok(())
}

#[test]
fn invalid_dependencies() {
    let cases = [
        json!({ ".bad": "1.0.0" }),
        json!({ "foo": 1 }),
        json!({ "foo": "github:alice/foo" }),
        json!({ "foo": "jsr:std/path" }),
        json!({ "foo": "npm:.bad@1" }),
        json!({ "foo": "npm:bar@^^1" }),
        json!({ "foo": "npm:@atpkgs/left-pad" }),
    ];
    for deps in cases {
        assert!(
            draft(json!({ "peerDependencies": deps.clone() })).is_err(),
            "Expected {} to be rejected",
            deps
        );
    }
}

#[test]
fn overrides() {
    let mut manifest = json!({
        "name": "left-pad",
        "publishConfig": { "access": "public", "tag": "next" },
        "private": true,
        "atpkgs": {
            "name": "pad",
            "publishConfig": { "tag": "latest" },
            "private": false,
        },
    });
    apply_overrides(&mut manifest);
    assert_eq!(
        manifest,
        json!({
            "name": "pad",
            "publishConfig": { "access": "public", "tag": "latest" },
            "private": false,
        })
    );

    // a non-object section is left alone
    let mut manifest = json!({ "name": "left-pad", "atpkgs": "yes" });
    apply_overrides(&mut manifest);
    assert_eq!(manifest["atpkgs"], "yes");
}

async fn index(store: &MemoryStore, name: &RecordKey) -> anyhow::Result<PackageRecord> {
    let envelope = store
        .get_record(&DID.parse()?, PACKAGE_COLLECTION, name)
        .await?;
    Ok(PackageRecord::from_value(envelope.value)?)
}

fn tags(record: &PackageRecord) -> Vec<(String, String)> {
    record
        .tags
        .iter()
        .map(|t| (t.tag.to_string(), t.version.to_string()))
        .collect()
}

#[tokio::test]
async fn publish_versions() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let repo: Did = DID.parse()?;
    let name: RecordKey = "left-pad".parse()?;

    let first = draft(json!({}))?;
    let published = publish(&store, &repo, &name, &first, TARBALL).await?;
    assert!(published.created);
    assert_eq!(store.blob(first.cid()).await, Some(TARBALL.to_vec()));
    let record = index(&store, &name).await?;
    assert_eq!(tags(&record), [("latest".to_owned(), "1.0.0".to_owned())]);
    assert_eq!(record.versions.len(), 1);
    assert_eq!(
        record.versions[0].cid.map(|c| c.link),
        Some(published.version.cid)
    );

    let second = PackageDraft::from_manifest(&manifest(json!({ "version": "1.1.0" })), b"v1.1")?;
    let published = publish(&store, &repo, &name, &second, b"v1.1").await?;
    assert!(!published.created);
    let record = index(&store, &name).await?;
    assert_eq!(tags(&record), [("latest".to_owned(), "1.1.0".to_owned())]);
    let listed: Vec<&str> = record.versions.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(listed, ["1.1.0", "1.0.0"]);

    // pre-releases are listed, but do not move `latest`
    let beta =
        PackageDraft::from_manifest(&manifest(json!({ "version": "2.0.0-beta.1" })), b"v2b")?;
    publish(&store, &repo, &name, &beta, b"v2b").await?;
    let record = index(&store, &name).await?;
    assert_eq!(tags(&record), [("latest".to_owned(), "1.1.0".to_owned())]);
    assert_eq!(record.versions.len(), 3);

    let err = publish(&store, &repo, &name, &second, b"v1.1")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "version already exists");
    Ok(())
}

#[test]
fn tags_keep_their_order() -> anyhow::Result<()> {
    let current = PackageRecord::from_value(json!({
        "name": "left-pad",
        "tags": [
            { "tag": "next", "version": "2.0.0-beta.1" },
            { "tag": "latest", "version": "1.0.0" },
            { "tag": "legacy", "version": "0.9.0" },
        ],
        "versions": [],
    }))?;
    let entry = VersionEntry {
        version: "1.1.0".parse()?,
        uri: format!("at://{DID}/{VERSION_COLLECTION}/3lb4tq2dofc2a").parse()?,
        cid: Some(ContentId::raw(b"1.1.0")?.into()),
        deprecated: None,
    };
    let latest = TagEntry {
        tag: "latest".parse()?,
        version: "1.1.0".parse()?,
    };
    let updated = updated_index(current, entry, latest, false);
    assert_eq!(
        tags(&updated),
        [
            ("latest".to_owned(), "1.1.0".to_owned()),
            ("next".to_owned(), "2.0.0-beta.1".to_owned()),
            ("legacy".to_owned(), "0.9.0".to_owned()),
        ]
    );
    Ok(())
}

/// Stores blobs under a different CID than their content.
struct Corrupting(MemoryStore);

#[async_trait]
impl RecordStore for Corrupting {
    async fn get_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
    ) -> Result<RecordEnvelope, RepoError> {
        self.0.get_record(repo, collection, rkey).await
    }

    async fn put_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: &RecordKey,
        record: Value,
        swap: Option<ContentId>,
    ) -> Result<WriteResult, RepoError> {
        self.0.put_record(repo, collection, rkey, record, swap).await
    }

    async fn create_record(
        &self,
        repo: &Did,
        collection: &str,
        rkey: Option<&RecordKey>,
        record: Value,
    ) -> Result<WriteResult, RepoError> {
        self.0.create_record(repo, collection, rkey, record).await
    }

    async fn upload_blob(
        &self,
        repo: &Did,
        mut bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Blob, RepoError> {
        bytes.push(0);
        self.0.upload_blob(repo, bytes, mime_type).await
    }
}

#[tokio::test]
async fn blob_mismatch() -> anyhow::Result<()> {
    let store = Corrupting(MemoryStore::new());
    let draft = draft(json!({}))?;
    let err = publish(&store, &DID.parse()?, &"left-pad".parse()?, &draft, TARBALL)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::BlobMismatch { .. }));
    let expected = "expected blob cid to be bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e";
    assert!(err.to_string().starts_with(expected));
    // nothing was recorded
    assert!(store.0.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn invalid_current_index() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let repo: Did = DID.parse()?;
    let name: RecordKey = "left-pad".parse()?;
    store
        .put_record(&repo, PACKAGE_COLLECTION, &name, json!({ "name": "left-pad" }), None)
        .await?;
    let err = publish(&store, &repo, &name, &draft(json!({}))?, TARBALL)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Index(_)));
    Ok(())
}
