use super::*;
use crate::lexicon::{AtDependency, NpmDependency};
use serde_json::json;

const DID: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";
const LEFT_PAD: &str = "@atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad";

fn package() -> anyhow::Result<PackageName> {
    Ok(LEFT_PAD.parse()?)
}

fn version(version: &str, rkey: &str) -> anyhow::Result<Value> {
    Ok(json!({
        "version": version,
        "uri": format!("at://{DID}/{VERSION_COLLECTION}/{rkey}"),
        "cid": { "$link": ContentId::raw(version.as_bytes())?.to_string() },
    }))
}

fn index(tags: Value, versions: Vec<Value>) -> anyhow::Result<PackageRecord> {
    Ok(PackageRecord::from_value(json!({
        "name": "left-pad",
        "tags": tags,
        "versions": versions,
    }))?)
}

#[test]
fn accepted_index() -> anyhow::Result<()> {
    let record = index(
        json!([
            { "tag": "latest", "version": "1.1.0" },
            { "tag": "next", "version": "2.0.0-rc.1" },
        ]),
        vec![
            version("2.0.0-rc.1", "3lb5ahplqnc2a")?,
            version("1.1.0", "3lb4xqqjfqk2a")?,
            version("1.0.0", "3lb4tq2dofc2a")?,
        ],
    )?;
    let (tags, versions) = check_index(&package()?, record)?;

    assert_eq!(tags.get("latest").map(String::as_str), Some("1.1.0"));
    assert_eq!(tags.get("next").map(String::as_str), Some("2.0.0-rc.1"));
    let listed: Vec<&str> = versions.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(listed, ["2.0.0-rc.1", "1.1.0", "1.0.0"]);
    assert_eq!(versions[2].cid, ContentId::raw(b"1.0.0")?);
    Ok(())
}

#[test]
fn duplicate_tags() -> anyhow::Result<()> {
    let record = index(
        json!([
            { "tag": "latest", "version": "1.0.0" },
            { "tag": "latest", "version": "1.0.0" },
        ]),
        vec![version("1.0.0", "3lb4tq2dofc2a")?],
    )?;
    let err = check_index(&package()?, record).unwrap_err();
    assert!(
        matches!(&err, Error::Consistency(ConsistencyError::DuplicateTag(tag)) if tag == "latest"),
        "Expected a duplicate tag, got {err:?}"
    );
    Ok(())
}

#[test]
fn duplicate_versions() -> anyhow::Result<()> {
    let record = index(
        json!([]),
        vec![
            version("1.0.0", "3lb4tq2dofc2a")?,
            version("1.0.0", "3lb4xqqjfqk2a")?,
        ],
    )?;
    assert!(matches!(
        check_index(&package()?, record),
        Err(Error::Consistency(ConsistencyError::DuplicateVersion(_)))
    ));
    Ok(())
}

#[test]
fn dangling_tags() -> anyhow::Result<()> {
    let record = index(
        json!([{ "tag": "latest", "version": "9.9.9" }]),
        vec![version("1.0.0", "3lb4tq2dofc2a")?],
    )?;
    assert!(matches!(
        check_index(&package()?, record),
        Err(Error::Consistency(ConsistencyError::DanglingTag { .. }))
    ));
    Ok(())
}

#[test]
fn versions_must_be_semver() -> anyhow::Result<()> {
    for bad in ["1.0", "latest", "01.0.0"] {
        let record = index(json!([]), vec![version(bad, "3lb4tq2dofc2a")?])?;
        let result = check_index(&package()?, record);
        assert!(
            matches!(result, Err(Error::Schema(SchemaError::Version(..)))),
            "Expected '{}' to be rejected",
            bad
        );
    }

    let record = index(
        json!([{ "tag": "latest", "version": "one" }]),
        vec![version("1.0.0", "3lb4tq2dofc2a")?],
    )?;
    assert!(matches!(
        check_index(&package()?, record),
        Err(Error::Schema(SchemaError::Version(..)))
    ));
    Ok(())
}

#[test]
fn version_references() -> anyhow::Result<()> {
    let mut wrong_collection = version("1.0.0", "3lb4tq2dofc2a")?;
    wrong_collection["uri"] = format!("at://{DID}/{PACKAGE_COLLECTION}/left-pad").into();
    assert!(matches!(
        check_index(&package()?, index(json!([]), vec![wrong_collection])?),
        Err(Error::Consistency(ConsistencyError::Reference(_)))
    ));

    let mut foreign = version("1.0.0", "3lb4tq2dofc2a")?;
    foreign["uri"] =
        format!("at://did:plc:aaaaaaaaaaaaaaaaaaaaaaaa/{VERSION_COLLECTION}/3lb4tq2dofc2a").into();
    assert!(matches!(
        check_index(&package()?, index(json!([]), vec![foreign])?),
        Err(Error::Consistency(ConsistencyError::ForeignRepository { .. }))
    ));

    let mut uncommitted = version("1.0.0", "3lb4tq2dofc2a")?;
    if let Some(map) = uncommitted.as_object_mut() {
        map.remove("cid");
    }
    assert!(matches!(
        check_index(&package()?, index(json!([]), vec![uncommitted])?),
        Err(Error::Integrity(IntegrityError::MissingCid(_)))
    ));
    Ok(())
}

#[test]
fn index_name() -> anyhow::Result<()> {
    let record = PackageRecord::from_value(json!({
        "name": "right-pad",
        "tags": [],
        "versions": [],
    }))?;
    assert!(matches!(
        check_index(&package()?, record),
        Err(Error::Consistency(ConsistencyError::IndexName { .. }))
    ));
    Ok(())
}

fn npm(name: &str, specifier: &str, range: &str) -> Dependency {
    Dependency::Npm(NpmDependency {
        name: name.into(),
        specifier: specifier.into(),
        range: range.into(),
    })
}

#[test]
fn npm_dependencies() -> anyhow::Result<()> {
    let translated = translate_dependencies(Some(vec![
        npm("foo", "foo", "^1.0.0"),
        npm("bar", "baz", "2"),
        npm("@types/node", "@types/node", ">=18 <21"),
    ]))?
    .unwrap_or_default();

    assert_eq!(translated["foo"], "^1.0.0");
    assert_eq!(translated["bar"], "npm:baz@2");
    assert_eq!(translated["@types/node"], ">=18 <21");
    assert_eq!(translated.len(), 3);

    assert_eq!(translate_dependencies(Some(vec![]))?, None);
    assert_eq!(translate_dependencies(None)?, None);
    Ok(())
}

#[test]
fn network_dependencies() -> anyhow::Result<()> {
    let translated = translate_dependencies(Some(vec![Dependency::At(AtDependency {
        name: "pad".into(),
        uri: format!("at://{DID}/{PACKAGE_COLLECTION}/left-pad").parse()?,
        range: "~1.3.0".into(),
    })]))?
    .unwrap_or_default();
    insta::assert_snapshot!(
        translated["pad"].as_str(),
        @"npm:@atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad@~1.3.0"
    );

    // a dependency has to name a package index, not a version
    let result = translate_dependencies(Some(vec![Dependency::At(AtDependency {
        name: "pad".into(),
        uri: format!("at://{DID}/{VERSION_COLLECTION}/3lb4tq2dofc2a").parse()?,
        range: "*".into(),
    })]));
    assert!(matches!(
        result,
        Err(Error::Consistency(ConsistencyError::Reference(_)))
    ));
    Ok(())
}

#[test]
fn invalid_ranges() {
    let result = translate_dependencies(Some(vec![npm("foo", "foo", "^^1")]));
    assert!(matches!(result, Err(Error::Schema(SchemaError::Range(name, _))) if name == "foo"));
}

#[test]
fn contributors() -> anyhow::Result<()> {
    let by_uri = contributor(Person {
        did: None,
        uri: Some("mailto:alice@example.com".into()),
    });
    assert_eq!(
        by_uri.map(|c| c.url).as_deref(),
        Some("mailto:alice@example.com")
    );

    let by_did = contributor(Person {
        did: Some(DID.parse()?),
        uri: None,
    });
    assert_eq!(by_did.map(|c| c.url), Some(format!("at://{DID}")));

    assert_eq!(contributor(Person::default()), None);
    Ok(())
}

#[test]
fn packument_shape() -> anyhow::Result<()> {
    let version = PackumentVersion {
        name: LEFT_PAD.into(),
        version: "1.0.0".into(),
        metadata: Metadata {
            license: Some("MIT".into()),
            ..Default::default()
        },
        dist: Dist {
            shasum: "00".repeat(20),
            integrity: "sha256-AAAA".into(),
            signatures: vec![],
            tarball: "https://pds.example.com/xrpc/com.atproto.sync.getBlob".into(),
        },
        os: None,
        cpu: None,
        funding: None,
        dependencies: None,
        peer_dependencies: Some(BTreeMap::from([("react".into(), "^18".into())])),
        optional_dependencies: None,
        deprecated: None,
    };
    let value = serde_json::to_value(&version)?;
    assert_eq!(value["license"], "MIT");
    assert_eq!(value["peerDependencies"]["react"], "^18");
    assert!(value.get("description").is_none());
    assert!(value.get("deprecated").is_none());

    let packument = Packument {
        name: LEFT_PAD.into(),
        dist_tags: BTreeMap::from([("latest".into(), "1.0.0".into())]),
        time: Times {
            created: FAKE_TIME.into(),
            modified: FAKE_TIME.into(),
        },
        versions: BTreeMap::from([("1.0.0".into(), version)]),
        metadata: Metadata::default(),
    };
    let value = serde_json::to_value(&packument)?;
    assert_eq!(value["dist-tags"]["latest"], "1.0.0");
    assert_eq!(value["time"]["modified"], FAKE_TIME);
    assert_eq!(serde_json::from_value::<Packument>(value)?, packument);
    Ok(())
}
