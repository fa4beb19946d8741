//! # Lexicons
//!
//! Package records arrive from repositories this registry does not control, so every record is
//! checked against its lexicon before any of its contents are trusted. The lexicon documents
//! ship with the crate and are interpreted at run time by a [`Catalog`].
//!
//! Definitions refer to each other by name (`#tag`, `#atDependency`), possibly in other
//! documents, and possibly before the referenced definition has been read. The catalog is
//! therefore built in two passes: every definition of every document is declared first, then
//! every `ref` and `union` target is checked to exist. During validation refs are followed by
//! name, so definitions which refer to each other never have to be constructed recursively.

mod records;
pub mod schema;
mod validate;

pub use records::{
    AtDependency, Bytes, Dependency, NpmDependency, PackageRecord, Person, Record, Repository,
    TagEntry, VersionEntry, VersionRecord,
};
pub use validate::ValidationError;

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use schema::{Def, LexiconDoc};
use validate::Validator;

const SOURCES: &[&str] = &[
    include_str!("../../lexicons/org.purl.atpkgs.node.package.json"),
    include_str!("../../lexicons/org.purl.atpkgs.node.version.json"),
    include_str!("../../lexicons/com.bad-example.identity.resolveMiniDoc.json"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexiconError {
    #[error("Malformed lexicon document: {0}")]
    Parse(String),
    #[error("Lexicon `{0}` is defined more than once")]
    Duplicate(String),
    #[error("`{from}` refers to undefined `{target}`")]
    Unresolved { from: String, target: String },
    #[error("`{0}` is not a record lexicon")]
    NotARecord(String),
    #[error("`{0}` is not a query lexicon")]
    NotAQuery(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A fully qualified definition name: `nsid#name`, or just `nsid` for `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DefId<'a> {
    pub nsid: &'a str,
    pub name: &'a str,
}

impl<'a> DefId<'a> {
    /// Resolves `target` as written inside the document `context`.
    pub fn resolve(context: &'a str, target: &'a str) -> Self {
        if let Some(name) = target.strip_prefix('#') {
            return DefId {
                nsid: context,
                name,
            };
        }
        match target.split_once('#') {
            Some((nsid, name)) => DefId { nsid, name },
            None => DefId {
                nsid: target,
                name: "main",
            },
        }
    }
}

impl fmt::Display for DefId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == "main" {
            f.write_str(self.nsid)
        } else {
            write!(f, "{}#{}", self.nsid, self.name)
        }
    }
}

/// Every definition of a set of lexicon documents, with all cross references resolved.
#[derive(Debug, Clone)]
pub struct Catalog {
    docs: BTreeMap<String, BTreeMap<String, Def>>,
}

lazy_static::lazy_static! {
    static ref BUILTIN: Result<Catalog, LexiconError> = Catalog::from_sources(SOURCES);
}

/// The catalog of the lexicons shipped with this crate.
pub fn builtin() -> Result<&'static Catalog, LexiconError> {
    BUILTIN.as_ref().map_err(Clone::clone)
}

impl Catalog {
    pub fn from_sources(sources: &[&str]) -> Result<Self, LexiconError> {
        let docs = sources
            .iter()
            .map(|s| serde_json::from_str(s).map_err(|e| LexiconError::Parse(e.to_string())))
            .collect::<Result<Vec<LexiconDoc>, _>>()?;
        Catalog::new(docs)
    }

    pub fn new(docs: impl IntoIterator<Item = LexiconDoc>) -> Result<Self, LexiconError> {
        // first pass: declare
        let mut catalog = Catalog {
            docs: BTreeMap::new(),
        };
        for doc in docs {
            let id = doc.id.to_string();
            if catalog.docs.insert(id.clone(), doc.defs).is_some() {
                return Err(LexiconError::Duplicate(id));
            }
        }

        // second pass: wire
        for (nsid, defs) in &catalog.docs {
            for (name, def) in defs {
                for target in def.targets() {
                    let id = DefId::resolve(nsid, target);
                    if catalog.get(&id).is_none() {
                        return Err(LexiconError::Unresolved {
                            from: DefId { nsid, name }.to_string(),
                            target: id.to_string(),
                        });
                    }
                }
            }
        }

        tracing::trace!(lexicons = catalog.docs.len(), "built lexicon catalog");
        Ok(catalog)
    }

    pub(crate) fn get(&self, id: &DefId) -> Option<&Def> {
        self.docs.get(id.nsid)?.get(id.name)
    }

    /// Validates a record value against the `main` definition of the record lexicon `nsid`.
    pub fn validate_record(&self, nsid: &str, value: &Value) -> Result<(), LexiconError> {
        let id = DefId::resolve(nsid, nsid);
        let Some(Def::Record(_)) = self.get(&id) else {
            return Err(LexiconError::NotARecord(nsid.to_owned()));
        };
        match value.get("$type") {
            None => {
                return Err(ValidationError::Missing {
                    path: "$.$type".into(),
                }
                .into())
            }
            Some(Value::String(found)) if found == nsid => (),
            Some(found) => {
                return Err(ValidationError::TypeTag {
                    path: "$".into(),
                    expected: nsid.to_owned(),
                    found: found.as_str().map_or_else(|| found.to_string(), str::to_owned),
                }
                .into())
            }
        }
        self.validate(nsid, value)
    }

    /// Validates the JSON output of the query lexicon `nsid`.
    pub fn validate_output(&self, nsid: &str, value: &Value) -> Result<(), LexiconError> {
        let id = DefId::resolve(nsid, nsid);
        let Some(Def::Query(query)) = self.get(&id) else {
            return Err(LexiconError::NotAQuery(nsid.to_owned()));
        };
        if let Some(schema) = query.output.as_ref().and_then(|o| o.schema.as_deref()) {
            Validator { catalog: self }.value(nsid, schema, value, "$")?;
        }
        Ok(())
    }

    /// Validates a value against any named definition, e.g. `org.purl.atpkgs.node.version#person`.
    pub fn validate(&self, target: &str, value: &Value) -> Result<(), LexiconError> {
        let id = DefId::resolve(target, target);
        let Some(def) = self.get(&id) else {
            return Err(LexiconError::Unresolved {
                from: "$".into(),
                target: id.to_string(),
            });
        };
        Validator { catalog: self }.value(id.nsid, def, value, "$")?;
        Ok(())
    }
}
