use super::handlers::{parse_path, PackagePath};

#[test]
fn package_paths() {
    let cases = [
        ("/left-pad", "left-pad", None),
        ("/left-pad/1.0.0", "left-pad", Some("1.0.0")),
        ("/left-pad/", "left-pad", None),
        ("/@atpkgs/didplc__abc__left-pad", "@atpkgs/didplc__abc__left-pad", None),
        ("/@atpkgs%2fdidplc__abc__left-pad", "@atpkgs/didplc__abc__left-pad", None),
        (
            "/@atpkgs%2Fdidplc__abc__left-pad/latest",
            "@atpkgs/didplc__abc__left-pad",
            Some("latest"),
        ),
        (
            "/@atpkgs/didplc__abc__left-pad/2.0.0-rc.1",
            "@atpkgs/didplc__abc__left-pad",
            Some("2.0.0-rc.1"),
        ),
    ];
    for (path, package, version) in cases {
        let parsed = parse_path(path);
        assert_eq!(
            parsed,
            Some(PackagePath {
                package: package.to_owned(),
                version: version.map(str::to_owned),
            }),
            "Expected '{}' to be a package path",
            path
        );
    }
}

#[test]
fn invalid_paths() {
    for path in ["/@atpkgs", "/@atpkgs/", "/.hidden", "/node_modules", "/%ff", "/left%20pad"] {
        assert_eq!(parse_path(path), None, "Expected '{}' to be rejected", path);
    }
}
