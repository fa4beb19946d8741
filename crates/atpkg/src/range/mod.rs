//! # npm Version Ranges
//!
//! A parser for the range grammar package managers accept in dependency maps:
//!
//! ```text
//! range-set  ::= range ( '||' range )*
//! range      ::= hyphen | simple ( ' ' simple )* | ''
//! hyphen     ::= partial ' - ' partial
//! simple     ::= ( '<' | '>' | '>=' | '<=' | '=' | '~' | '~>' | '^' )? partial
//! partial    ::= 'v'? xr ( '.' xr ( '.' xr qualifier? )? )?
//! xr         ::= 'x' | 'X' | '*' | nr
//! qualifier  ::= ( '-' parts )? ( '+' parts )?
//! ```
//!
//! Ranges pulled from remote records are untrusted, so anything outside the grammar is an error
//! rather than being dropped or loosely coerced.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit0, multispace0, multispace1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize, value, verify},
    multi::separated_list1,
    sequence::{pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid semver range `{0}`")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Tilde,
    Caret,
}

/// A possibly incomplete version: `1`, `1.2`, `1.x`, `1.2.3-beta.1+build`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partial {
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub pre: Vec<String>,
    pub build: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparator {
    Simple { op: Option<Op>, version: Partial },
    Hyphen { from: Partial, to: Partial },
}

/// A parsed range, keeping its original spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Range {
    raw: String,
    sets: Vec<Vec<Comparator>>,
}

impl Range {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let sets = input
            .split("||")
            .map(|set| parse_set(set.trim()).map_err(|_| RangeError::Invalid(input.to_owned())))
            .collect::<Result<_, _>>()?;
        Ok(Range {
            raw: input.to_owned(),
            sets,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this range admits any version at all (`""`, `*`, `x`).
    pub fn is_any(&self) -> bool {
        self.sets.iter().any(|set| {
            set.iter().all(|c| {
                matches!(
                    c,
                    Comparator::Simple {
                        op: None | Some(Op::GreaterEq),
                        version: Partial { major: None, .. },
                    }
                )
            })
        })
    }
}

impl FromStr for Range {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Range::parse(s)
    }
}

impl TryFrom<String> for Range {
    type Error = RangeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Range::parse(&s)
    }
}

impl From<Range> for String {
    fn from(range: Range) -> Self {
        range.raw
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_set(input: &str) -> Result<Vec<Comparator>, nom::Err<nom::error::Error<&str>>> {
    if input.is_empty() {
        return Ok(vec![Comparator::Simple {
            op: None,
            version: Partial::default(),
        }]);
    }
    let (_, set) = all_consuming(alt((
        map(hyphen, |c| vec![c]),
        separated_list1(multispace1, simple),
    )))(input)?;
    Ok(set)
}

fn hyphen(input: &str) -> IResult<&str, Comparator> {
    map(
        separated_pair(partial, tuple((multispace1, char('-'), multispace1)), partial),
        |(from, to)| Comparator::Hyphen { from, to },
    )(input)
}

fn simple(input: &str) -> IResult<&str, Comparator> {
    map(
        pair(opt(terminated(op, multispace0)), partial),
        |(op, version)| Comparator::Simple { op, version },
    )(input)
}

fn op(input: &str) -> IResult<&str, Op> {
    alt((
        value(Op::GreaterEq, tag(">=")),
        value(Op::LessEq, tag("<=")),
        value(Op::Greater, char('>')),
        value(Op::Less, char('<')),
        value(Op::Tilde, tag("~>")),
        value(Op::Tilde, char('~')),
        value(Op::Caret, char('^')),
        value(Op::Exact, char('=')),
    ))(input)
}

fn numeric(input: &str) -> IResult<&str, u64> {
    alt((
        value(0, char('0')),
        map_res(recognize(pair(one_of("123456789"), digit0)), str::parse),
    ))(input)
}

fn xr(input: &str) -> IResult<&str, Option<u64>> {
    alt((value(None, one_of("xX*")), map(numeric, Some)))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)
}

fn prerelease_identifier(input: &str) -> IResult<&str, &str> {
    // numeric identifiers cannot carry leading zeros
    verify(identifier, |s: &str| {
        !s.bytes().all(|b| b.is_ascii_digit()) || s == "0" || !s.starts_with('0')
    })(input)
}

fn owned(parts: Vec<&str>) -> Vec<String> {
    parts.into_iter().map(ToOwned::to_owned).collect()
}

fn qualifier(input: &str) -> IResult<&str, (Vec<String>, Vec<String>)> {
    map(
        pair(
            opt(preceded(char('-'), separated_list1(char('.'), prerelease_identifier))),
            opt(preceded(char('+'), separated_list1(char('.'), identifier))),
        ),
        |(pre, build)| {
            (
                pre.map(owned).unwrap_or_default(),
                build.map(owned).unwrap_or_default(),
            )
        },
    )(input)
}

fn partial(input: &str) -> IResult<&str, Partial> {
    let (input, _) = opt(char('v'))(input)?;
    let (input, major) = xr(input)?;
    let (input, rest) = opt(pair(
        preceded(char('.'), xr),
        opt(pair(preceded(char('.'), xr), qualifier)),
    ))(input)?;

    let mut version = Partial {
        major,
        ..Partial::default()
    };
    if let Some((minor, rest)) = rest {
        version.minor = minor;
        if let Some((patch, (pre, build))) = rest {
            version.patch = patch;
            version.pre = pre;
            version.build = build;
        }
    }
    Ok((input, version))
}
