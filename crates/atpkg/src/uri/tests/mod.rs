use super::*;
use proptest::prelude::*;

const LEFT_PAD: &str = "@atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad";
const LEFT_PAD_URI: &str =
    "at://did:plc:ewvi7nxzyoun6zhxrhs64oiz/org.purl.atpkgs.node.package/left-pad";

#[test]
fn package_to_uri() -> anyhow::Result<()> {
    let uri = to_resource_uri(LEFT_PAD)?;
    assert_eq!(uri.to_string(), LEFT_PAD_URI);
    assert_eq!(uri.repo().as_str(), "did:plc:ewvi7nxzyoun6zhxrhs64oiz");
    assert_eq!(uri.rkey().as_str(), "left-pad");
    assert_eq!(uri.collection().as_str(), PACKAGE_COLLECTION);
    Ok(())
}

#[test]
fn uri_to_package() -> anyhow::Result<()> {
    let uri: ResourceUri = LEFT_PAD_URI.parse()?;
    assert_eq!(from_resource_uri(&uri)?, LEFT_PAD);

    let web: ResourceUri =
        "at://did:web:localhost%3A3000/org.purl.atpkgs.node.package/my-pkg".parse()?;
    insta::assert_snapshot!(
        from_resource_uri(&web)?,
        @"@atpkgs/didweb__localhost_eu_3_ie_3000__my-pkg"
    );

    let colons: ResourceUri = "at://did:method:val:two/org.purl.atpkgs.node.package/self".parse()?;
    insta::assert_snapshot!(from_resource_uri(&colons)?, @"@atpkgs/didmethod__val_hi_two__self");
    Ok(())
}

#[test]
fn foreign_scope() {
    for name in ["left-pad", "@types/node", "@atpkgs/left-pad", "@atpkgs/di"] {
        assert!(
            matches!(to_resource_uri(name), Err(UriError::NotNetworkPackage(_))),
            "Expected '{}' to be rejected",
            name
        );
    }
}

#[test]
fn wrong_part_count() {
    assert!(matches!(
        to_resource_uri("@atpkgs/didplc__abc"),
        Err(UriError::Parts(_, 2))
    ));
    assert!(matches!(
        to_resource_uri("@atpkgs/didplc__abc__def__ghi"),
        Err(UriError::Parts(_, 4))
    ));
}

#[test]
fn invalid_encoded_name() {
    // trailing unmatched delimiter
    assert!(matches!(
        to_resource_uri("@atpkgs/didplc__abc__name_"),
        Err(UriError::Name(_, NameError::Unterminated))
    ));
    assert!(matches!(
        to_resource_uri("@atpkgs/did"),
        Err(UriError::Name(_, NameError::Empty))
    ));
}

#[test]
fn invalid_did_or_rkey() {
    // `did:plc:` has an empty identifier
    assert!(matches!(
        to_resource_uri("@atpkgs/didplc____name"),
        Err(UriError::Syntax(SyntaxError::Did(..)))
    ));
    // `..` is a reserved record key
    assert!(matches!(
        to_resource_uri("@atpkgs/didplc__abc__.."),
        Err(UriError::Syntax(SyntaxError::RecordKey(..)))
    ));
}

#[test]
fn version_uris_have_no_package_name() -> anyhow::Result<()> {
    let uri: ResourceUri =
        "at://did:plc:abc/org.purl.atpkgs.node.version/3jui7kd54zh2y".parse()?;
    assert!(matches!(
        from_resource_uri(&uri),
        Err(UriError::Collection { .. })
    ));
    Ok(())
}

#[test]
fn fragments() -> anyhow::Result<()> {
    let uri: ResourceUri = format!("{LEFT_PAD_URI}#/tags").parse()?;
    assert_eq!(uri.fragment(), Some("/tags"));
    assert_eq!(uri.to_string(), format!("{LEFT_PAD_URI}#/tags"));
    assert!(matches!(from_resource_uri(&uri), Err(UriError::Fragment(_))));
    Ok(())
}

#[test]
fn malformed_uris() {
    for uri in [
        "",
        "at://",
        "at://did:plc:abc",
        "at://did:plc:abc/org.purl.atpkgs.node.package",
        "at://did:plc:abc/org.purl.atpkgs.node.package/",
        "at://did:plc:abc/org.purl.atpkgs.node.package/a/b",
        "https://did:plc:abc/org.purl.atpkgs.node.package/a",
    ] {
        assert!(
            matches!(uri.parse::<ResourceUri>(), Err(UriError::Malformed(_))),
            "Expected '{}' to be malformed",
            uri
        );
    }
    assert!(matches!(
        "at://alice.example.com/org.purl.atpkgs.node.package/a".parse::<ResourceUri>(),
        Err(UriError::Syntax(_))
    ));
}

#[test]
fn package_names() -> anyhow::Result<()> {
    let name: PackageName = LEFT_PAD.parse()?;
    assert_eq!(name.uri().to_string(), LEFT_PAD_URI);
    assert_eq!(name.rkey().as_str(), "left-pad");

    let from_uri = PackageName::try_from(name.uri().clone())?;
    assert_eq!(from_uri, name);
    Ok(())
}

#[test]
fn handle_names() -> anyhow::Result<()> {
    let plain: HandleName = "@alice.example.com/left-pad".parse()?;
    assert_eq!(plain.handle.as_str(), "alice.example.com");
    assert_eq!(plain.name.as_str(), "left-pad");
    assert_eq!(plain.range, None);

    let ranged: HandleName = "@alice.example.com/left-pad@^1.3.0".parse()?;
    assert_eq!(ranged.range.as_deref(), Some("^1.3.0"));

    let did: Did = "did:plc:ewvi7nxzyoun6zhxrhs64oiz".parse()?;
    insta::assert_snapshot!(
        ranged.alias(did)?,
        @"@alice.example.com/left-pad@npm:@atpkgs/didplc__ewvi7nxzyoun6zhxrhs64oiz__left-pad@^1.3.0"
    );
    Ok(())
}

#[test]
fn invalid_handle_names() {
    for name in [
        "alice.example.com/left-pad",
        "@alice.example.com",
        "@alice.example.com/",
        "@alice.example.com/.hidden",
        "@alice.example.com/Left-Pad",
        "@alice.example.com/left-pad@",
        "@localhost/left-pad",
    ] {
        assert!(
            name.parse::<HandleName>().is_err(),
            "Expected '{}' to be invalid",
            name
        );
    }
}

fn did_strategy() -> impl Strategy<Value = Did> {
    ("[a-z]{1,8}", "[A-Za-z0-9._:%-]{0,24}[A-Za-z0-9._-]").prop_filter_map(
        "valid did",
        |(method, id)| format!("did:{method}:{id}").parse().ok(),
    )
}

fn rkey_strategy() -> impl Strategy<Value = RecordKey> {
    "[A-Za-z0-9._:~-]{1,32}".prop_filter_map("valid rkey", |rkey| rkey.parse().ok())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

    #[test]
    fn uri_round_trip(repo in did_strategy(), rkey in rkey_strategy()) {
        let uri = ResourceUri::new(repo, PACKAGE_COLLECTION.parse().unwrap(), rkey);
        let name = from_resource_uri(&uri).unwrap();
        prop_assert!(name.starts_with(SCOPE_PREFIX));
        prop_assert_eq!(to_resource_uri(&name), Ok(uri.clone()));
        prop_assert_eq!(uri.to_string().parse::<ResourceUri>(), Ok(uri));
    }

    #[test]
    fn name_round_trip(encoded in "[a-z0-9._-]{1,32}") {
        let name = format!("{SCOPE_PREFIX}{encoded}");
        if let Ok(uri) = to_resource_uri(&name) {
            prop_assert_eq!(from_resource_uri(&uri), Ok(name));
        }
    }
}
