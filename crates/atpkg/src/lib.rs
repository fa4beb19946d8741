//! # atpkg
//!
//! Core of the atpkgs registry bridge: the canonical mapping between npm package names and
//! AT Protocol resource URIs, content identifiers for records and tarballs, lexicon validation
//! of package records, and the pipeline which assembles verified npm packuments from them.
pub mod cid;
pub mod error;
pub mod identity;
pub mod lexicon;
pub mod name;
pub mod npm;
pub mod packument;
pub mod publish;
pub mod range;
pub mod repo;
pub mod syntax;
pub mod uri;
pub mod xrpc;

pub use crate::cid::ContentId;
pub use error::Error;
pub use packument::{Packument, Registry};
pub use uri::{PackageName, ResourceUri};

/// The npm scope under which network-internal packages are exposed.
pub const SCOPE: &str = "@atpkgs/";
/// The full prefix of an encoded network-internal package name.
pub const SCOPE_PREFIX: &str = "@atpkgs/did";
/// Collection holding the per-package version index.
pub const PACKAGE_COLLECTION: &str = "org.purl.atpkgs.node.package";
/// Collection holding immutable version records.
pub const VERSION_COLLECTION: &str = "org.purl.atpkgs.node.version";
