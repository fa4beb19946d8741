//! # Canonical Name Codec
//!
//! A reversible mapping between arbitrary text and the restricted alphabet allowed in npm
//! package names. Text is split into alternating runs:
//!
//! ```text
//! literal _ base32(encoded) _ literal _ base32(encoded) ...
//! ```
//!
//! Literal runs only ever contain `[a-z0-9.-]`. Everything else is collected into an encoded
//! run, written as unpadded lowercase RFC 4648 base32 between `_` delimiters. A `/` is never
//! encoded: it is written as a doubled delimiter (`__`), sharing the closing delimiter of an
//! encoded run when it directly follows one. A trailing encoded run is left unterminated.
//!
//! Every name produced by [`encode`] is the single spelling [`decode`] accepts for its value;
//! alternate spellings (uppercase base32, non-zero padding bits, safe characters inside an
//! encoded run, a dangling delimiter) are rejected rather than normalized.

use std::string::FromUtf8Error;
use thiserror::Error;

const DELIM: char = '_';
const SLASH: char = '/';
const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648Lower { padding: false };

/// Errors raised while decoding an encoded name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The empty string is not the encoding of anything.
    #[error("An encoded name cannot be empty")]
    Empty,
    /// A literal run contained a character outside `[a-z0-9.-]`.
    #[error("Invalid character in literal run: '{0}'")]
    InvalidLiteral(char),
    /// The name ended with a delimiter opening an empty run.
    #[error("Encoded name ends with an empty run")]
    Unterminated,
    /// An encoded run is not the canonical base32 spelling of any byte string.
    #[error("Invalid base32 in encoded run: `{0}`")]
    InvalidBase32(String),
    /// An encoded run decoded to bytes which are not UTF-8.
    #[error("Encoded run is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),
    /// An encoded run holds characters that the encoder would have written literally.
    #[error("Encoded run {0:?} contains characters which must be written literally")]
    Noncanonical(String),
}

/// Returns whether `c` may appear in a literal run.
pub fn is_safe(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '.' | '-')
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Run {
    #[default]
    Literal,
    Encoded,
}

impl Run {
    fn toggle(self) -> Self {
        match self {
            Run::Literal => Run::Encoded,
            Run::Encoded => Run::Literal,
        }
    }
}

#[derive(Default)]
struct Encoder {
    run: Run,
    out: String,
    /// Pending text of the current run. In a literal run it may begin with the closing
    /// delimiter of the previous encoded run.
    buf: String,
}

impl Encoder {
    fn push(&mut self, c: char) {
        if c == SLASH {
            if self.run == Run::Encoded {
                self.flush_encoded();
            }
            // a slash right after a closing delimiter reuses it
            if self.buf == "_" {
                self.buf.push(DELIM);
            } else {
                self.buf.push(DELIM);
                self.buf.push(DELIM);
            }
            return;
        }

        match (self.run, is_safe(c)) {
            (Run::Encoded, true) => self.flush_encoded(),
            (Run::Literal, false) => self.flush_literal(),
            _ => (),
        }
        self.buf.push(c);
    }

    fn flush_literal(&mut self) {
        self.out.push_str(&self.buf);
        self.buf.clear();
        self.run = Run::Encoded;
    }

    fn flush_encoded(&mut self) {
        self.write_encoded();
        self.buf.clear();
        self.buf.push(DELIM);
        self.run = Run::Literal;
    }

    fn write_encoded(&mut self) {
        self.out.push(DELIM);
        self.out.push_str(&base32::encode(BASE32, self.buf.as_bytes()));
    }

    fn finish(mut self) -> String {
        if !self.buf.is_empty() {
            match self.run {
                Run::Literal => self.out.push_str(&self.buf),
                Run::Encoded => self.write_encoded(),
            }
        }
        self.out
    }
}

/// Encodes arbitrary text into its canonical npm-safe form.
pub fn encode(raw: &str) -> String {
    let mut encoder = Encoder::default();
    for c in raw.chars() {
        encoder.push(c);
    }
    encoder.finish()
}

#[derive(Default)]
struct Decoder {
    run: Run,
    /// The previous character was a delimiter which opened a run.
    maybe_slash: bool,
    current: String,
    finished: Vec<(Run, String)>,
}

impl Decoder {
    fn push(&mut self, c: char) -> Result<(), NameError> {
        if c == DELIM {
            if self.maybe_slash {
                // `__` inside a literal run: undo the run we just opened
                if self.run == Run::Encoded {
                    self.run = Run::Literal;
                    if let Some((_, previous)) = self.finished.pop() {
                        self.current = previous;
                    }
                }
                self.current.push(SLASH);
                self.maybe_slash = false;
            } else {
                let done = std::mem::take(&mut self.current);
                self.finished.push((self.run, done));
                self.run = self.run.toggle();
                self.maybe_slash = true;
            }
            return Ok(());
        }

        self.maybe_slash = false;
        if self.run == Run::Literal && !is_safe(c) {
            return Err(NameError::InvalidLiteral(c));
        }
        self.current.push(c);
        Ok(())
    }

    fn finish(mut self) -> Result<String, NameError> {
        if self.current.is_empty() {
            return Err(NameError::Unterminated);
        }
        self.finished.push((self.run, self.current));

        let mut out = String::new();
        for (run, segment) in self.finished {
            match run {
                Run::Literal => out.push_str(&segment),
                Run::Encoded => out.push_str(&decode_run(segment)?),
            }
        }
        Ok(out)
    }
}

fn decode_run(segment: String) -> Result<String, NameError> {
    let bytes = base32::decode(BASE32, &segment)
        .ok_or_else(|| NameError::InvalidBase32(segment.clone()))?;
    let text = String::from_utf8(bytes)?;

    // reject alternate spellings of the same bytes
    if base32::encode(BASE32, text.as_bytes()) != segment {
        return Err(NameError::InvalidBase32(segment));
    }
    if text.chars().any(|c| c == SLASH || is_safe(c)) {
        return Err(NameError::Noncanonical(text));
    }
    Ok(text)
}

/// Decodes a canonical npm-safe name back into the text it encodes.
pub fn decode(encoded: &str) -> Result<String, NameError> {
    if encoded.is_empty() {
        return Err(NameError::Empty);
    }
    let mut decoder = Decoder::default();
    for c in encoded.chars() {
        decoder.push(c)?;
    }
    decoder.finish()
}
