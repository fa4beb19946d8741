use super::*;

#[test]
fn valid_dids() {
    for did in [
        "did:plc:ewvi7nxzyoun6zhxrhs64oiz",
        "did:web:example.com",
        "did:web:localhost%3A3000",
        "did:method:val:two",
        "did:m:v",
    ] {
        assert!(Did::try_from(did).is_ok(), "Expected '{}' to be valid", did);
    }
}

#[test]
fn invalid_dids() {
    for did in [
        "",
        "did",
        "did:",
        "did:plc",
        "did:plc:",
        "did:PLC:abc",
        "did:pl2:abc",
        "DID:plc:abc",
        "did:plc:abc:",
        "did:web:example.com%",
        "did:plc:ab/cd",
        "did:plc:ab cd",
        "did:plc:ab#frag",
    ] {
        assert!(Did::try_from(did).is_err(), "Expected '{}' to be invalid", did);
    }
}

#[test]
fn did_length_limit() {
    let long = format!("did:plc:{}", "a".repeat(DID_MAX));
    assert!(matches!(
        Did::try_from(long),
        Err(SyntaxError::Did(_, "too long"))
    ));
}

#[test]
fn did_parts() -> anyhow::Result<()> {
    let did: Did = "did:web:localhost%3A3000".parse()?;
    assert_eq!(did.method(), "web");
    assert_eq!(did.identifier(), "localhost%3A3000");
    Ok(())
}

#[test]
fn record_keys() {
    for rkey in ["self", "3jui7kd54zh2y", "left-pad", "a:b~c_d.e", "..."] {
        assert!(RecordKey::try_from(rkey).is_ok(), "Expected '{}' to be valid", rkey);
    }
    for rkey in ["", ".", "..", "a/b", "a b", "a#b", "é"] {
        assert!(RecordKey::try_from(rkey).is_err(), "Expected '{}' to be invalid", rkey);
    }
    assert!(RecordKey::try_from("a".repeat(RKEY_MAX)).is_ok());
    assert!(RecordKey::try_from("a".repeat(RKEY_MAX + 1)).is_err());
}

#[test]
fn nsids() -> anyhow::Result<()> {
    for nsid in [
        "org.purl.atpkgs.node.package",
        "com.atproto.repo.getRecord",
        "com.bad-example.identity.resolveMiniDoc",
        "a.b.c",
    ] {
        assert!(Nsid::try_from(nsid).is_ok(), "Expected '{}' to be valid", nsid);
    }
    for nsid in [
        "",
        "a.b",
        "com.example.",
        "com..example.foo",
        "1com.example.foo",
        "com.-example.foo",
        "com.example.foo-bar",
        "com.example.2foo",
        "com.example.foo#bar",
    ] {
        assert!(Nsid::try_from(nsid).is_err(), "Expected '{}' to be invalid", nsid);
    }

    let nsid: Nsid = "org.purl.atpkgs.node.version".parse()?;
    assert_eq!(nsid.authority(), "org.purl.atpkgs.node");
    assert_eq!(nsid.name(), "version");
    Ok(())
}

#[test]
fn handles() {
    for handle in ["alice.bsky.social", "example.com", "xn--ls8h.example.org", "a.b-c.d"] {
        assert!(Handle::try_from(handle).is_ok(), "Expected '{}' to be valid", handle);
    }
    for handle in [
        "",
        "localhost",
        "example.123",
        "-a.example.com",
        "a..b",
        "a_b.com",
        "did:plc:x",
    ] {
        assert!(Handle::try_from(handle).is_err(), "Expected '{}' to be invalid", handle);
    }
}

#[test]
fn tid_encoding() {
    assert_eq!(Tid::from_parts(0, 0).as_str(), "2222222222222");
    assert_eq!(Tid::from_parts(0, 1).as_str(), "2222222222223");
    assert_eq!(Tid::from_parts(1, 0).as_str(), "2222222222322");
}

#[test]
fn generated_tids() {
    let first = Tid::now();
    let second = Tid::now();
    assert!(Tid::try_from(first.as_str()).is_ok());
    assert!(second > first, "{second} should sort after {first}");
    assert!(RecordKey::try_from(first.as_str()).is_ok());
    assert_eq!(first.to_record_key().as_str(), first.as_str());
}

#[test]
fn invalid_tids() {
    for tid in [
        "",
        "222222222222",
        "22222222222222",
        "k222222222222",
        "222222222222A",
        "2222222222221",
    ] {
        assert!(Tid::try_from(tid).is_err(), "Expected '{}' to be invalid", tid);
    }
}

#[test]
fn serde_validates() {
    let ok: Result<Did, _> = serde_json::from_str("\"did:plc:abc\"");
    assert!(ok.is_ok());
    let bad: Result<Did, _> = serde_json::from_str("\"did:plc:\"");
    assert!(bad.is_err());
}
