//! `Authentication-Results` header handling.
//!
//! Formatting and a pragmatic parser for the header defined in RFC 8601,
//! plus the mapping from DKIM verification outcomes onto its result values.
//! Milter-style front-ends use this to stamp messages with the outcome of
//! the verifications they performed.

use crate::verifier::{Verification, VerificationStatus};
use std::fmt::{self, Display, Formatter, Write};

/// A result value, as registered for RFC 8601.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultValue {
    None,
    Pass,
    Fail,
    SoftFail,
    Neutral,
    Policy,
    PermError,
    TempError,
}

impl ResultValue {
    fn parse(s: &str) -> Option<Self> {
        let v = if s.eq_ignore_ascii_case("none") {
            Self::None
        } else if s.eq_ignore_ascii_case("pass") {
            Self::Pass
        } else if s.eq_ignore_ascii_case("fail") {
            Self::Fail
        } else if s.eq_ignore_ascii_case("softfail") {
            Self::SoftFail
        } else if s.eq_ignore_ascii_case("neutral") {
            Self::Neutral
        } else if s.eq_ignore_ascii_case("policy") {
            Self::Policy
        } else if s.eq_ignore_ascii_case("permerror") {
            Self::PermError
        } else if s.eq_ignore_ascii_case("temperror") {
            Self::TempError
        } else {
            return None;
        };
        Some(v)
    }
}

impl Display for ResultValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::SoftFail => "softfail",
            Self::Neutral => "neutral",
            Self::Policy => "policy",
            Self::PermError => "permerror",
            Self::TempError => "temperror",
        };
        f.write_str(s)
    }
}

/// A `ptype.property=value` item attached to a method result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    pub ptype: String,
    pub name: String,
    pub value: String,
}

/// The result of one authentication method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodResult {
    pub method: String,
    pub value: ResultValue,
    pub reason: Option<String>,
    pub properties: Vec<Property>,
}

impl MethodResult {
    pub fn new(method: impl Into<String>, value: ResultValue) -> Self {
        Self {
            method: method.into(),
            value,
            reason: None,
            properties: vec![],
        }
    }

    /// Maps a DKIM verification outcome onto its method result:
    /// `header.d` and `header.i` properties, and a value of `pass`,
    /// `permerror`, or `temperror`.
    pub fn from_dkim(verification: &Verification) -> Self {
        let value = match &verification.status {
            VerificationStatus::Success => ResultValue::Pass,
            VerificationStatus::Failure(e) => {
                if e.is_temp_fail() {
                    ResultValue::TempError
                } else {
                    ResultValue::PermError
                }
            }
        };

        let mut result = Self::new("dkim", value);

        if let VerificationStatus::Failure(e) = &verification.status {
            result.reason = Some(e.to_string());
        }

        if let Some(domain) = &verification.domain {
            result.properties.push(Property {
                ptype: "header".into(),
                name: "d".into(),
                value: domain.to_string(),
            });
        }
        if let Some(identity) = &verification.identity {
            result.properties.push(Property {
                ptype: "header".into(),
                name: "i".into(),
                value: identity.to_string(),
            });
        }

        result
    }
}

/// Formats an `Authentication-Results` header value for the given authserv
/// identifier and results. Each method result goes on its own folded line.
///
/// A call with no results yields the `none` form (RFC 8601, §4.2).
pub fn format_header_value(authserv_id: &str, results: &[MethodResult]) -> String {
    let mut out = String::with_capacity(64);

    out.push_str(authserv_id);

    if results.is_empty() {
        out.push_str("; none");
        return out;
    }

    for result in results {
        out.push(';');
        out.push_str("\r\n\t");

        write!(out, "{}={}", result.method, result.value).unwrap();

        if let Some(reason) = &result.reason {
            write!(out, " reason=\"{}\"", sanitize_quoted(reason)).unwrap();
        }

        for property in &result.properties {
            write!(
                out,
                " {}.{}={}",
                property.ptype, property.name, property.value
            )
            .unwrap();
        }
    }

    out
}

fn sanitize_quoted(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect()
}

/// An error that occurs when parsing an `Authentication-Results` value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthResultsParseError;

impl Display for AuthResultsParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ill-formed Authentication-Results value")
    }
}

impl std::error::Error for AuthResultsParseError {}

/// Parses an `Authentication-Results` header value into the authserv
/// identifier and the method results.
///
/// The parser is pragmatic: it understands the output of common
/// implementations but does not attempt full RFC 5322 comment handling.
pub fn parse_header_value(
    value: &str,
) -> Result<(String, Vec<MethodResult>), AuthResultsParseError> {
    let mut sections = value.split(';').map(str::trim);

    let identifier = sections.next().filter(|s| !s.is_empty()).ok_or(AuthResultsParseError)?;
    // an optional version number may follow the identifier
    let identifier = identifier
        .split_whitespace()
        .next()
        .ok_or(AuthResultsParseError)?
        .to_owned();

    let mut results = vec![];

    for section in sections {
        if section.is_empty() || section.eq_ignore_ascii_case("none") {
            continue;
        }

        let mut words = section.split_whitespace();

        let (method, value) = words
            .next()
            .and_then(|w| w.split_once('='))
            .ok_or(AuthResultsParseError)?;
        let value = ResultValue::parse(value).ok_or(AuthResultsParseError)?;

        let mut result = MethodResult::new(method, value);

        while let Some(word) = words.next() {
            let Some((key, val)) = word.split_once('=') else {
                // tolerate stray tokens such as comments
                continue;
            };

            if key.eq_ignore_ascii_case("reason") {
                // a quoted reason may span several words
                let mut val = val.to_owned();
                if val.starts_with('"') && !(val.len() > 1 && val.ends_with('"')) {
                    for next in words.by_ref() {
                        val.push(' ');
                        val.push_str(next);
                        if next.ends_with('"') {
                            break;
                        }
                    }
                }
                result.reason = Some(val.trim_matches('"').to_owned());
            } else if let Some((ptype, name)) = key.split_once('.') {
                result.properties.push(Property {
                    ptype: ptype.to_owned(),
                    name: name.to_owned(),
                    value: val.to_owned(),
                });
            }
        }

        results.push(result);
    }

    Ok((identifier, results))
}
