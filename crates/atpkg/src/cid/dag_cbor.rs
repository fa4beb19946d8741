//! Deterministic DAG-CBOR encoding of records in their JSON data model form.
//!
//! Map keys are ordered by encoded length and then bytewise, integers and lengths use their
//! shortest form, `{"$link": cid}` becomes a tag 42 CID and `{"$bytes": base64}` a byte string.
//! Floats have no deterministic form in the record data model and are refused.
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use ciborium::value::Value as Cbor;
use serde_json::{Map, Value};
use thiserror::Error;

const CID_TAG: u64 = 42;

/// Standard alphabet, padding optional on input.
pub(crate) const BYTES: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("floating point number {0} is not allowed in records")]
    Float(f64),
    #[error("invalid $link: {0}")]
    Link(String),
    #[error("invalid $bytes: {0}")]
    Bytes(#[from] base64::DecodeError),
    #[error(transparent)]
    Write(#[from] ciborium::ser::Error<std::io::Error>),
}

/// Serializes `value` to canonical DAG-CBOR bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let cbor = to_cbor(value)?;
    let mut bytes = Vec::new();
    ciborium::into_writer(&cbor, &mut bytes)?;
    Ok(bytes)
}

fn to_cbor(value: &Value) -> Result<Cbor, EncodeError> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Cbor::Integer(i.into())
            } else if let Some(u) = n.as_u64() {
                Cbor::Integer(u.into())
            } else {
                return Err(EncodeError::Float(n.as_f64().unwrap_or(f64::NAN)));
            }
        }
        Value::String(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect::<Result<_, _>>()?),
        Value::Object(map) => object(map)?,
    })
}

fn object(map: &Map<String, Value>) -> Result<Cbor, EncodeError> {
    if map.len() == 1 {
        if let Some(link) = map.get("$link") {
            return cid_link(link);
        }
        if let Some(Value::String(b64)) = map.get("$bytes") {
            return Ok(Cbor::Bytes(BYTES.decode(b64)?));
        }
    }

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        a.len()
            .cmp(&b.len())
            .then_with(|| a.as_bytes().cmp(b.as_bytes()))
    });

    let entries = entries
        .into_iter()
        .map(|(k, v)| Ok((Cbor::Text(k.clone()), to_cbor(v)?)))
        .collect::<Result<_, EncodeError>>()?;
    Ok(Cbor::Map(entries))
}

fn cid_link(link: &Value) -> Result<Cbor, EncodeError> {
    let Value::String(s) = link else {
        return Err(EncodeError::Link(link.to_string()));
    };
    let cid: cid::Cid = s
        .as_str()
        .try_into()
        .map_err(|e: cid::Error| EncodeError::Link(format!("{s}: {e}")))?;
    // the leading zero is the identity multibase prefix
    let mut bytes = vec![0];
    bytes.extend(cid.to_bytes());
    Ok(Cbor::Tag(CID_TAG, Box::new(Cbor::Bytes(bytes))))
}
