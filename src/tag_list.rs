//! Tag list codec.
//!
//! A tag list is the `tag=value; tag=value; …` syntax shared by the
//! `DKIM-Signature` header, the DKIM public key record, and the DMARC policy
//! record. See RFC 6376, section 3.2 (and erratum 5070 for the ABNF).

use crate::{
    parse::{strip_fws, strip_suffix},
    util::decode_base64,
};
use std::collections::HashSet;

/// A single `name=value` item of a tag list.
#[derive(Debug, PartialEq, Eq)]
pub struct TagSpec<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TagListParseError {
    DuplicateTag,
    Syntax,
}

/// A parsed tag list, in input order.
#[derive(Debug, PartialEq, Eq)]
pub struct TagList<'a>(Vec<TagSpec<'a>>);

impl<'a> AsRef<[TagSpec<'a>]> for TagList<'a> {
    fn as_ref(&self) -> &[TagSpec<'a>] {
        &self.0
    }
}

impl<'a> TagList<'a> {
    pub fn from_str(val: &'a str) -> Result<Self, TagListParseError> {
        match parse_tag_list(val) {
            Some((rest, tags)) if rest.is_empty() => {
                let mut names_seen = HashSet::new();
                if tags.iter().any(|tag| !names_seen.insert(tag.name)) {
                    return Err(TagListParseError::DuplicateTag);
                }
                Ok(TagList(tags))
            }
            _ => Err(TagListParseError::Syntax),
        }
    }
}

fn parse_tag_list(val: &str) -> Option<(&str, Vec<TagSpec<'_>>)> {
    let (mut s, t) = parse_tag_spec(val)?;

    let mut tags = vec![t];

    while let Some((snext, t)) = s.strip_prefix(';').and_then(parse_tag_spec) {
        s = snext;
        tags.push(t);
    }

    // a trailing ; after the final tag is allowed
    let s = s.strip_prefix(';').unwrap_or(s);

    Some((s, tags))
}

fn parse_tag_spec(val: &str) -> Option<(&str, TagSpec<'_>)> {
    let (s, name) = strip_tag_name_and_equals(val)?;

    let (s, value) = match parse_tag_value(s) {
        Some((s, value)) => {
            let s = strip_fws(s).unwrap_or(s);
            (s, value)
        }
        None => (s, Default::default()),
    };

    Some((s, TagSpec { name, value }))
}

/// Strips `[FWS] tag-name [FWS] "=" [FWS]` from the input, returning the rest
/// and the tag name.
pub fn strip_tag_name_and_equals(val: &str) -> Option<(&str, &str)> {
    let s = strip_fws(val).unwrap_or(val);

    let (s, name) = parse_tag_name(s)?;

    let s = strip_fws(s).unwrap_or(s);

    let s = s.strip_prefix('=')?;

    let s = strip_fws(s).unwrap_or(s);

    Some((s, name))
}

// tag-name = ALPHA *ALNUMPUNC
fn parse_tag_name(value: &str) -> Option<(&str, &str)> {
    let s = value
        .strip_prefix(|c: char| c.is_ascii_alphabetic())?
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    Some((s, strip_suffix(value, s)))
}

// tag-value = [tval *(1*(WSP / FWS) tval)]
fn parse_tag_value(value: &str) -> Option<(&str, &str)> {
    fn strip_tval(s: &str) -> Option<&str> {
        s.strip_prefix(is_tval_char)
            .map(|s| s.trim_start_matches(is_tval_char))
    }

    let mut s = strip_tval(value)?;

    while let Some(snext) = strip_fws(s).and_then(strip_tval) {
        s = snext;
    }

    Some((s, strip_suffix(value, s)))
}

// printable ASCII without ‘;’, or non-ASCII UTF-8
pub fn is_tval_char(c: char) -> bool {
    matches!(c, '!'..=':' | '<'..='~') || !c.is_ascii()
}

/// Removes folding whitespace from a tag value.
pub fn strip_fws_from_tag_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect()
}

/// Decodes a tag value containing Base64 data, possibly interspersed with
/// folding whitespace.
pub fn parse_base64_tag_value(value: &str) -> Result<Vec<u8>, TagListParseError> {
    let value = strip_fws_from_tag_value(value);
    decode_base64(&value).map_err(|_| TagListParseError::Syntax)
}

/// Splits a colon-separated tag value into its elements, with surrounding
/// folding whitespace trimmed.
pub fn parse_colon_separated_tag_value(value: &str) -> Vec<&str> {
    value
        .split(':')
        .map(|s| s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n')))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_from_str_ok() {
        // the example signature from RFC 6376, §3.5, with extra FWS thrown in
        let example = " v = 1 ; a=rsa-sha256;d=example.net; s=brisbane;
  c=simple; q=dns/txt; i=@eng.example.net;
  t=1117574938; x=1118006938;
  h=from:to:subject:date;
  bh=MTIzNDU2Nzg5MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTI=;
  b=dzdVyOfAKCdLXdJOc9G2q8LoXSlEniSbav+yuU4zGeeruD00lszZVoG4ZHRNiYzR";
        let example = example.replace('\n', "\r\n");

        let tags = TagList::from_str(&example).unwrap();

        assert_eq!(tags.as_ref().len(), 12);
        assert_eq!(tags.as_ref()[0], TagSpec { name: "v", value: "1" });
    }

    #[test]
    fn tag_list_duplicate_tag() {
        assert_eq!(
            TagList::from_str("a=1; b=2; a=3"),
            Err(TagListParseError::DuplicateTag)
        );
    }

    #[test]
    fn tag_list_empty_value() {
        let tags = TagList::from_str("p=; s=email").unwrap();

        assert_eq!(tags.as_ref()[0], TagSpec { name: "p", value: "" });
    }

    #[test]
    fn tag_list_bad_name() {
        assert!(TagList::from_str("1v=1").is_err());
        assert!(TagList::from_str("=1").is_err());
    }

    #[test]
    fn colon_separated_tag_value_ok() {
        assert_eq!(
            parse_colon_separated_tag_value("from: to :\r\n\tsubject"),
            ["from", "to", "subject"]
        );
        assert_eq!(
            parse_colon_separated_tag_value("sha256:\r\n\tsha1"),
            ["sha256", "sha1"]
        );
        assert_eq!(parse_colon_separated_tag_value(""), [""]);
    }

    #[test]
    fn base64_tag_value_with_fws() {
        assert_eq!(
            parse_base64_tag_value("TWFp\r\n\t bHNl YWw="),
            Ok(b"Mailseal".to_vec())
        );
    }
}
