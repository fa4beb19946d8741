//! Validation of untrusted JSON data against catalog definitions.
use base64::Engine;
use serde_json::Value;
use thiserror::Error;

use super::schema::{
    ArrayDef, BlobDef, BytesDef, Def, IntegerDef, ObjectDef, StringDef, StringFormat, UnionDef,
};
use super::{Catalog, DefId};
use crate::cid::{dag_cbor::BYTES, ContentId};
use crate::syntax::{Did, Handle, Nsid, RecordKey, Tid};
use crate::uri::ResourceUri;

/// A violation of a lexicon definition, located by a JSON path from the validated root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{path}: required field is missing")]
    Missing { path: String },
    #[error("{path}: expected {expected}")]
    Type { path: String, expected: &'static str },
    #[error("{path}: invalid {format}: {reason}")]
    Format {
        path: String,
        format: &'static str,
        reason: String,
    },
    #[error("{path}: {reason}")]
    Constraint { path: String, reason: String },
    #[error("{path}: $type should be `{expected}`, found `{found}`")]
    TypeTag {
        path: String,
        expected: String,
        found: String,
    },
    #[error("{path}: matched no variant of the union ({})", join(.failures))]
    Union {
        path: String,
        failures: Vec<ValidationError>,
    },
    #[error("{path}: unknown lexicon definition `{target}`")]
    UnknownDef { path: String, target: String },
}

fn join(failures: &[ValidationError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn path(&self) -> &str {
        match self {
            ValidationError::Missing { path }
            | ValidationError::Type { path, .. }
            | ValidationError::Format { path, .. }
            | ValidationError::Constraint { path, .. }
            | ValidationError::TypeTag { path, .. }
            | ValidationError::Union { path, .. }
            | ValidationError::UnknownDef { path, .. } => path,
        }
    }
}

type Result<T = ()> = std::result::Result<T, ValidationError>;

pub(super) struct Validator<'a> {
    pub(super) catalog: &'a Catalog,
}

impl Validator<'_> {
    /// Validates `value` against `def`, resolving relative refs against the document `nsid`.
    pub(super) fn value(&self, nsid: &str, def: &Def, value: &Value, path: &str) -> Result {
        match def {
            Def::Record(record) => self.object(nsid, &record.record, value, path),
            Def::Object(object) | Def::Params(object) => self.object(nsid, object, value, path),
            Def::String(string) => self.string(string, value, path),
            Def::Integer(integer) => integer_value(integer, value, path),
            Def::Boolean(boolean) => match value {
                Value::Bool(b) if boolean.constant.map_or(true, |c| c == *b) => Ok(()),
                Value::Bool(_) => constraint(path, "does not match the constant value"),
                _ => type_error(path, "a boolean"),
            },
            Def::Bytes(bytes) => bytes_value(bytes, value, path),
            Def::CidLink(_) => cid_link(value, path).map(drop),
            Def::Blob(blob) => blob_value(blob, value, path),
            Def::Array(array) => self.array(nsid, array, value, path),
            Def::Ref(r) => self.reference(nsid, &r.target, value, path),
            Def::Union(union) => self.union(nsid, union, value, path),
            Def::Unknown(_) => match value {
                Value::Object(_) => Ok(()),
                _ => type_error(path, "an object"),
            },
            Def::Query(_) => constraint(path, "a query is not a data definition"),
        }
    }

    fn object(&self, nsid: &str, def: &ObjectDef, value: &Value, path: &str) -> Result {
        let Value::Object(map) = value else {
            return type_error(path, "an object");
        };

        for field in &def.required {
            match map.get(field) {
                None => return Err(ValidationError::Missing { path: child(path, field) }),
                Some(Value::Null) if !def.nullable.contains(field) => {
                    return Err(ValidationError::Missing { path: child(path, field) })
                }
                _ => (),
            }
        }

        for (field, property) in &def.properties {
            match map.get(field) {
                None => (),
                Some(Value::Null) if def.nullable.contains(field) => (),
                Some(v) => self.value(nsid, property, v, &child(path, field))?,
            }
        }
        Ok(())
    }

    fn string(&self, def: &StringDef, value: &Value, path: &str) -> Result {
        let Value::String(s) = value else {
            return type_error(path, "a string");
        };
        if let Some(min) = def.min_length {
            if s.len() < min {
                return constraint(path, format!("shorter than {min} bytes"));
            }
        }
        if let Some(max) = def.max_length {
            if s.len() > max {
                return constraint(path, format!("longer than {max} bytes"));
            }
        }
        if let Some(choices) = &def.choices {
            if !choices.contains(s) {
                return constraint(path, format!("`{s}` is not an allowed value"));
            }
        }
        if let Some(constant) = &def.constant {
            if constant != s {
                return constraint(path, format!("should be `{constant}`"));
            }
        }
        match def.format {
            Some(format) => string_format(format, s, path),
            None => Ok(()),
        }
    }

    fn array(&self, nsid: &str, def: &ArrayDef, value: &Value, path: &str) -> Result {
        let Value::Array(items) = value else {
            return type_error(path, "an array");
        };
        if let Some(min) = def.min_length {
            if items.len() < min {
                return constraint(path, format!("fewer than {min} items"));
            }
        }
        if let Some(max) = def.max_length {
            if items.len() > max {
                return constraint(path, format!("more than {max} items"));
            }
        }
        for (i, item) in items.iter().enumerate() {
            self.value(nsid, &def.items, item, &format!("{path}[{i}]"))?;
        }
        Ok(())
    }

    /// Follows a ref by name; the target is looked up only when data reaches it.
    fn reference(&self, nsid: &str, target: &str, value: &Value, path: &str) -> Result {
        let id = DefId::resolve(nsid, target);
        let Some(def) = self.catalog.get(&id) else {
            return Err(ValidationError::UnknownDef {
                path: path.to_owned(),
                target: id.to_string(),
            });
        };
        if let (Def::Object(_), Some(found)) = (def, type_tag(value)) {
            let expected = id.to_string();
            if found != expected {
                return Err(ValidationError::TypeTag {
                    path: path.to_owned(),
                    expected,
                    found: found.to_owned(),
                });
            }
        }
        self.value(id.nsid, def, value, path)
    }

    fn union(&self, nsid: &str, def: &UnionDef, value: &Value, path: &str) -> Result {
        if !value.is_object() {
            return type_error(path, "an object");
        }

        // an explicit $type selects its variant directly
        if let Some(found) = type_tag(value) {
            if let Some(target) = def
                .refs
                .iter()
                .find(|r| DefId::resolve(nsid, r).to_string() == found)
            {
                return self.reference(nsid, target, value, path);
            }
            if def.closed {
                return constraint(path, format!("`{found}` is not a member of the union"));
            }
        }

        let mut failures = Vec::with_capacity(def.refs.len());
        for target in &def.refs {
            match self.reference(nsid, target, value, path) {
                Ok(()) => return Ok(()),
                Err(e) => failures.push(e),
            }
        }
        Err(ValidationError::Union {
            path: path.to_owned(),
            failures,
        })
    }
}

fn type_tag(value: &Value) -> Option<&str> {
    value.get("$type").and_then(Value::as_str)
}

fn child(path: &str, field: &str) -> String {
    format!("{path}.{field}")
}

fn type_error(path: &str, expected: &'static str) -> Result {
    Err(ValidationError::Type {
        path: path.to_owned(),
        expected,
    })
}

fn constraint(path: &str, reason: impl Into<String>) -> Result {
    Err(ValidationError::Constraint {
        path: path.to_owned(),
        reason: reason.into(),
    })
}

fn string_format(format: StringFormat, s: &str, path: &str) -> Result {
    let checked = match format {
        StringFormat::Did => ("did", s.parse::<Did>().err().map(|e| e.to_string())),
        StringFormat::RecordKey => (
            "record-key",
            s.parse::<RecordKey>().err().map(|e| e.to_string()),
        ),
        StringFormat::AtUri => (
            "at-uri",
            s.parse::<ResourceUri>().err().map(|e| e.to_string()),
        ),
        StringFormat::Uri => ("uri", url::Url::parse(s).err().map(|e| e.to_string())),
        StringFormat::Handle => ("handle", s.parse::<Handle>().err().map(|e| e.to_string())),
        StringFormat::Nsid => ("nsid", s.parse::<Nsid>().err().map(|e| e.to_string())),
        StringFormat::Cid => ("cid", s.parse::<ContentId>().err().map(|e| e.to_string())),
        StringFormat::Tid => ("tid", s.parse::<Tid>().err().map(|e| e.to_string())),
        StringFormat::AtIdentifier => (
            "at-identifier",
            (s.parse::<Did>().is_err() && s.parse::<Handle>().is_err())
                .then(|| format!("`{s}` is neither a DID nor a handle")),
        ),
        StringFormat::Unchecked => return Ok(()),
    };
    match checked {
        (_, None) => Ok(()),
        (format, Some(reason)) => Err(ValidationError::Format {
            path: path.to_owned(),
            format,
            reason,
        }),
    }
}

fn integer_value(def: &IntegerDef, value: &Value, path: &str) -> Result {
    let Some(n) = value.as_i64() else {
        return type_error(path, "an integer");
    };
    if def.minimum.is_some_and(|min| n < min) || def.maximum.is_some_and(|max| n > max) {
        return constraint(path, format!("{n} is out of range"));
    }
    if def.choices.as_ref().is_some_and(|c| !c.contains(&n)) {
        return constraint(path, format!("{n} is not an allowed value"));
    }
    if def.constant.is_some_and(|c| c != n) {
        return constraint(path, "does not match the constant value");
    }
    Ok(())
}

fn bytes_value(def: &BytesDef, value: &Value, path: &str) -> Result {
    let encoded = match value {
        Value::Object(map) if map.len() == 1 => map.get("$bytes").and_then(Value::as_str),
        _ => None,
    };
    let Some(encoded) = encoded else {
        return type_error(path, "a {\"$bytes\": ...} object");
    };
    let bytes = BYTES.decode(encoded).map_err(|e| ValidationError::Format {
        path: path.to_owned(),
        format: "bytes",
        reason: e.to_string(),
    })?;
    if def.min_length.is_some_and(|min| bytes.len() < min)
        || def.max_length.is_some_and(|max| bytes.len() > max)
    {
        return constraint(path, format!("{} bytes is out of range", bytes.len()));
    }
    Ok(())
}

fn cid_link(value: &Value, path: &str) -> Result<ContentId> {
    let link = match value {
        Value::Object(map) if map.len() == 1 => map.get("$link").and_then(Value::as_str),
        _ => None,
    };
    let Some(link) = link else {
        return Err(ValidationError::Type {
            path: path.to_owned(),
            expected: "a {\"$link\": ...} object",
        });
    };
    link.parse().map_err(|e: crate::cid::CidError| ValidationError::Format {
        path: path.to_owned(),
        format: "cid-link",
        reason: e.to_string(),
    })
}

fn blob_value(def: &BlobDef, value: &Value, path: &str) -> Result {
    let Value::Object(map) = value else {
        return type_error(path, "a blob");
    };
    if type_tag(value) != Some("blob") {
        return Err(ValidationError::TypeTag {
            path: path.to_owned(),
            expected: "blob".into(),
            found: type_tag(value).unwrap_or_default().to_owned(),
        });
    }
    let Some(link) = map.get("ref") else {
        return Err(ValidationError::Missing { path: child(path, "ref") });
    };
    cid_link(link, &child(path, "ref"))?;

    let Some(mime) = map.get("mimeType").and_then(Value::as_str) else {
        return type_error(&child(path, "mimeType"), "a string");
    };
    let Some(size) = map.get("size").and_then(Value::as_u64) else {
        return type_error(&child(path, "size"), "a non-negative integer");
    };

    if def.max_size.is_some_and(|max| size > max) {
        return constraint(path, format!("blob of {size} bytes is too large"));
    }
    if let Some(accept) = &def.accept {
        if !accept.iter().any(|pattern| mime_matches(pattern, mime)) {
            return constraint(path, format!("mime type `{mime}` is not accepted"));
        }
    }
    Ok(())
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some("*") => true,
        Some(kind) => mime.split('/').next() == Some(kind),
        None => pattern == mime,
    }
}
