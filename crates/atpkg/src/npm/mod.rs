//! # npm Conventions
//!
//! Checks npm clients and registries apply to package names and license fields. Dependency maps
//! come from arbitrary manifests, so these checks are applied before a name ends up in a record.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, opt, recognize, verify},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageNameError {
    #[error("name length must be greater than zero")]
    Empty,
    #[error("name cannot start with a period")]
    LeadingPeriod,
    #[error("name cannot start with an underscore")]
    LeadingUnderscore,
    #[error("name cannot contain leading or trailing spaces")]
    Whitespace,
    #[error("{0} is a blacklisted name")]
    Blacklisted(String),
    #[error("name can only contain URL-friendly characters")]
    NotUrlSafe,
    #[error("name can no longer contain capital letters")]
    Uppercase,
}

const BLACKLIST: &[&str] = &["node_modules", "favicon.ico"];

/// Characters `encodeURIComponent` leaves alone.
fn is_url_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c)
}

fn url_safe(s: &str) -> bool {
    s.chars().all(is_url_safe)
}

/// Splits `@scope/name` into its two non-empty parts.
fn scoped(name: &str) -> Option<(&str, &str)> {
    let (scope, name) = name.strip_prefix('@')?.split_once('/')?;
    (!scope.is_empty() && !name.is_empty() && !name.contains('/')).then_some((scope, name))
}

/// Whether npm accepts `name` for an existing package: the loosest rules it has ever enforced.
///
/// Capitals, long names and names of core modules remain acceptable here.
pub fn validate_legacy_name(name: &str) -> Result<(), PackageNameError> {
    if name.is_empty() {
        return Err(PackageNameError::Empty);
    }
    if name.starts_with('.') {
        return Err(PackageNameError::LeadingPeriod);
    }
    if name.starts_with('_') {
        return Err(PackageNameError::LeadingUnderscore);
    }
    if name.trim() != name {
        return Err(PackageNameError::Whitespace);
    }
    if let Some(banned) = BLACKLIST.iter().find(|b| b.eq_ignore_ascii_case(name)) {
        return Err(PackageNameError::Blacklisted((*banned).to_owned()));
    }
    if url_safe(name) {
        return Ok(());
    }
    match scoped(name) {
        Some((scope, pkg)) if url_safe(scope) && url_safe(pkg) => Ok(()),
        _ => Err(PackageNameError::NotUrlSafe),
    }
}

/// The stricter rules for the `name` of a manifest about to be published.
pub fn validate_publish_name(name: &str) -> Result<(), PackageNameError> {
    validate_legacy_name(name)?;
    if name.to_lowercase() != name {
        return Err(PackageNameError::Uppercase);
    }
    let unscoped_ok = url_safe(name) && !name.contains(['@', '/', '+', '%', ':']);
    if unscoped_ok || scoped(name).is_some() {
        Ok(())
    } else {
        Err(PackageNameError::NotUrlSafe)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("license should be a valid SPDX license expression, found `{0}`")]
pub struct LicenseError(pub String);

/// Checks a `license` field the way npm does for new packages.
///
/// Accepts `UNLICENSED`, `SEE LICENSE IN <file>`, and SPDX expressions. Only the expression
/// syntax is checked, not membership of identifiers in the SPDX license list.
pub fn validate_license(license: &str) -> Result<(), LicenseError> {
    let err = || LicenseError(license.to_owned());
    if license.trim().is_empty() {
        return Err(err());
    }
    if matches!(license, "UNLICENSED" | "UNLICENCED") {
        return Ok(());
    }
    for prefix in ["SEE LICENSE IN ", "SEE LICENCE IN "] {
        if let Some(file) = license.strip_prefix(prefix) {
            return if file.trim().is_empty() {
                Err(err())
            } else {
                Ok(())
            };
        }
    }
    all_consuming(delimited(multispace0, expression, multispace0))(license)
        .map(drop)
        .map_err(|_| err())
}

const OPERATORS: &[&str] = &["AND", "OR", "WITH"];

fn idstring(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.'),
        |s: &str| !OPERATORS.contains(&s),
    )(input)
}

fn license_ref(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(tuple((tag("DocumentRef-"), idstring, char(':')))),
        tag("LicenseRef-"),
        idstring,
    )))(input)
}

fn simple(input: &str) -> IResult<&str, &str> {
    alt((license_ref, recognize(pair(idstring, opt(char('+'))))))(input)
}

fn operator<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    recognize(tuple((multispace1, tag(word), multispace1)))
}

fn compound(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(
            pair(char('('), multispace0),
            expression,
            pair(multispace0, char(')')),
        )),
        recognize(pair(simple, opt(preceded(operator("WITH"), idstring)))),
    ))(input)
}

fn conjunction(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(operator("AND"), compound))(input)
}

fn expression(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(operator("OR"), conjunction))(input)
}
