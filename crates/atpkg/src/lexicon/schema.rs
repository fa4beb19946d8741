//! Serde model of lexicon documents.
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::syntax::Nsid;

#[derive(Debug, Clone, Deserialize)]
pub struct LexiconDoc {
    pub lexicon: u32,
    pub id: Nsid,
    #[serde(default)]
    pub revision: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    pub defs: BTreeMap<String, Def>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Def {
    Record(RecordDef),
    Query(QueryDef),
    Object(ObjectDef),
    Params(ObjectDef),
    String(StringDef),
    Integer(IntegerDef),
    Boolean(BooleanDef),
    Bytes(BytesDef),
    CidLink(EmptyDef),
    Blob(BlobDef),
    Array(ArrayDef),
    Ref(RefDef),
    Union(UnionDef),
    Unknown(EmptyDef),
}

impl Def {
    pub fn kind(&self) -> &'static str {
        match self {
            Def::Record(_) => "record",
            Def::Query(_) => "query",
            Def::Object(_) => "object",
            Def::Params(_) => "params",
            Def::String(_) => "string",
            Def::Integer(_) => "integer",
            Def::Boolean(_) => "boolean",
            Def::Bytes(_) => "bytes",
            Def::CidLink(_) => "cid-link",
            Def::Blob(_) => "blob",
            Def::Array(_) => "array",
            Def::Ref(_) => "ref",
            Def::Union(_) => "union",
            Def::Unknown(_) => "unknown",
        }
    }

    /// Every `ref` or `union` target mentioned by this definition, including nested ones.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Def::Ref(r) => out.push(&r.target),
            Def::Union(u) => out.extend(u.refs.iter().map(String::as_str)),
            Def::Array(a) => a.items.collect_targets(out),
            Def::Object(o) | Def::Params(o) => {
                for def in o.properties.values() {
                    def.collect_targets(out);
                }
            }
            Def::Record(r) => {
                for def in r.record.properties.values() {
                    def.collect_targets(out);
                }
            }
            Def::Query(q) => {
                if let Some(params) = &q.parameters {
                    for def in params.properties.values() {
                        def.collect_targets(out);
                    }
                }
                if let Some(schema) = q.output.as_ref().and_then(|o| o.schema.as_ref()) {
                    schema.collect_targets(out);
                }
            }
            _ => (),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmptyDef {}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordDef {
    #[serde(default)]
    pub key: Option<String>,
    pub record: ObjectDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryDef {
    #[serde(default)]
    pub parameters: Option<ObjectDef>,
    #[serde(default)]
    pub output: Option<BodyDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodyDef {
    pub encoding: String,
    #[serde(default)]
    pub schema: Option<Box<Def>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectDef {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub nullable: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Def>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Did,
    RecordKey,
    AtUri,
    Uri,
    Handle,
    Nsid,
    Cid,
    Tid,
    AtIdentifier,
    #[serde(other)]
    Unchecked,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringDef {
    #[serde(default)]
    pub format: Option<StringFormat>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default, rename = "enum")]
    pub choices: Option<Vec<String>>,
    #[serde(default, rename = "const")]
    pub constant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegerDef {
    #[serde(default)]
    pub minimum: Option<i64>,
    #[serde(default)]
    pub maximum: Option<i64>,
    #[serde(default, rename = "enum")]
    pub choices: Option<Vec<i64>>,
    #[serde(default, rename = "const")]
    pub constant: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BooleanDef {
    #[serde(default, rename = "const")]
    pub constant: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytesDef {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDef {
    #[serde(default)]
    pub accept: Option<Vec<String>>,
    #[serde(default)]
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayDef {
    pub items: Box<Def>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefDef {
    #[serde(rename = "ref")]
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnionDef {
    pub refs: Vec<String>,
    #[serde(default)]
    pub closed: bool,
}
