//! # Identifier Syntax
//!
//! Validated newtypes for the identifiers of the record network: decentralized identifiers,
//! record keys, namespaced collection ids, handles and timestamp ids. A value of any of these
//! types has been checked on construction, so downstream code can treat it as well formed.
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// Not a `did:<method>:<id>` string.
    #[error("Invalid DID `{0}`: {1}")]
    Did(String, &'static str),
    /// Not a valid record key.
    #[error("Invalid record key `{0}`: {1}")]
    RecordKey(String, &'static str),
    /// Not a reverse-DNS namespaced identifier.
    #[error("Invalid NSID `{0}`: {1}")]
    Nsid(String, &'static str),
    /// Not a DNS hostname usable as a handle.
    #[error("Invalid handle `{0}`: {1}")]
    Handle(String, &'static str),
    /// Not a 13 character base32-sortable timestamp identifier.
    #[error("Invalid TID `{0}`: {1}")]
    Tid(String, &'static str),
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $validate:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = SyntaxError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $validate(s)?;
                Ok($name(s.to_owned()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = SyntaxError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $validate(&s)?;
                Ok($name(s))
            }
        }

        impl TryFrom<&str> for $name {
            type Error = SyntaxError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

identifier!(
    /// A decentralized identifier: `did:<method>:<method-specific-id>`.
    Did,
    validate_did
);
identifier!(
    /// The key of a record within a collection.
    RecordKey,
    validate_record_key
);
identifier!(
    /// A namespaced identifier naming a lexicon, e.g. `org.purl.atpkgs.node.package`.
    Nsid,
    validate_nsid
);
identifier!(
    /// A DNS-style account handle.
    Handle,
    validate_handle
);
identifier!(
    /// A sortable timestamp identifier, the default record key for created records.
    Tid,
    validate_tid
);

const DID_MAX: usize = 2048;
const RKEY_MAX: usize = 512;
const NSID_MAX: usize = 317;
const HANDLE_MAX: usize = 253;
const LABEL_MAX: usize = 63;
const TID_LEN: usize = 13;
const TID_ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

impl Did {
    /// The method name, e.g. `plc` for `did:plc:...`.
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Everything after `did:<method>:`.
    pub fn identifier(&self) -> &str {
        let offset = "did:".len() + self.method().len() + 1;
        self.0.get(offset..).unwrap_or_default()
    }
}

fn validate_did(s: &str) -> Result<(), SyntaxError> {
    let err = |reason| Err(SyntaxError::Did(s.to_owned(), reason));

    if s.len() > DID_MAX {
        return err("too long");
    }
    let Some(rest) = s.strip_prefix("did:") else {
        return err("missing `did:` prefix");
    };
    let Some((method, id)) = rest.split_once(':') else {
        return err("missing method separator");
    };
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_lowercase()) {
        return err("method must be lowercase letters");
    }
    if id.is_empty() {
        return err("empty method-specific identifier");
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
    {
        return err("invalid character in identifier");
    }
    if id.ends_with(':') || id.ends_with('%') {
        return err("identifier cannot end with `:` or `%`");
    }
    Ok(())
}

fn validate_record_key(s: &str) -> Result<(), SyntaxError> {
    let err = |reason| Err(SyntaxError::RecordKey(s.to_owned(), reason));

    if s.is_empty() {
        return err("empty");
    }
    if s.len() > RKEY_MAX {
        return err("too long");
    }
    if s == "." || s == ".." {
        return err("reserved");
    }
    if !s
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'~' | b'-'))
    {
        return err("invalid character");
    }
    Ok(())
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= LABEL_MAX
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn validate_nsid(s: &str) -> Result<(), SyntaxError> {
    let err = |reason| Err(SyntaxError::Nsid(s.to_owned(), reason));

    if s.len() > NSID_MAX {
        return err("too long");
    }
    let segments: Vec<&str> = s.split('.').collect();
    let [domain @ .., name] = segments.as_slice() else {
        return err("empty");
    };
    if domain.len() < 2 {
        return err("needs at least three segments");
    }
    if !domain.iter().all(|label| valid_label(label)) {
        return err("invalid domain segment");
    }
    if domain[0].starts_with(|c: char| c.is_ascii_digit()) {
        return err("first segment cannot start with a digit");
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => (),
        _ => return err("name must start with a letter"),
    }
    if name.len() > LABEL_MAX || !chars.all(|c| c.is_ascii_alphanumeric()) {
        return err("invalid name segment");
    }
    Ok(())
}

impl Nsid {
    /// The reverse-domain authority, without the final name segment.
    pub fn authority(&self) -> &str {
        self.0.rsplit_once('.').map(|(a, _)| a).unwrap_or_default()
    }

    /// The final name segment.
    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, n)| n).unwrap_or_default()
    }
}

fn validate_handle(s: &str) -> Result<(), SyntaxError> {
    let err = |reason| Err(SyntaxError::Handle(s.to_owned(), reason));

    if s.len() > HANDLE_MAX {
        return err("too long");
    }
    let labels: Vec<&str> = s.split('.').collect();
    if labels.len() < 2 {
        return err("needs at least two labels");
    }
    if !labels.iter().all(|label| valid_label(label)) {
        return err("invalid label");
    }
    match labels.last().and_then(|tld| tld.chars().next()) {
        Some(c) if c.is_ascii_alphabetic() => Ok(()),
        _ => err("top-level domain must start with a letter"),
    }
}

fn validate_tid(s: &str) -> Result<(), SyntaxError> {
    let err = |reason| Err(SyntaxError::Tid(s.to_owned(), reason));

    if s.len() != TID_LEN {
        return err("must be 13 characters");
    }
    if !s.bytes().all(|b| TID_ALPHABET.contains(&b)) {
        return err("invalid character");
    }
    // the high bit of the 64-bit value is always zero
    if !matches!(s.as_bytes()[0], b'2'..=b'7' | b'a'..=b'j') {
        return err("high bit set");
    }
    Ok(())
}

static LAST_TID: AtomicU64 = AtomicU64::new(0);

impl Tid {
    /// Encodes a timestamp in microseconds and a 10-bit clock id.
    pub fn from_parts(micros: u64, clock_id: u16) -> Self {
        let value = ((micros & 0x1F_FFFF_FFFF_FFFF) << 10) | u64::from(clock_id & 0x3FF);
        let mut out = String::with_capacity(TID_LEN);
        for i in (0..TID_LEN).rev() {
            let digit = (value >> (i * 5)) & 0x1F;
            out.push(TID_ALPHABET[digit as usize] as char);
        }
        Tid(out)
    }

    /// Generates a fresh identifier, strictly increasing within this process.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        let mut last = LAST_TID.load(Ordering::Relaxed);
        let micros = loop {
            let next = micros.max(last + 1);
            match LAST_TID.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break next,
                Err(current) => last = current,
            }
        };
        Tid::from_parts(micros, (std::process::id() & 0x3FF) as u16)
    }

    /// Returns the record key spelling of this identifier.
    pub fn to_record_key(&self) -> RecordKey {
        // the TID alphabet is a subset of the record key alphabet
        RecordKey(self.0.clone())
    }
}
