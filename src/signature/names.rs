use crate::tag_list;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseNameError;

impl Display for ParseNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse name")
    }
}

impl Error for ParseNameError {}

/// A domain name, as used in the *d=* and *i=* tags.
///
/// The string is validated and then encapsulated as-is. Equality comparison
/// is ASCII-case-insensitive; IDNA-aware comparison is available through
/// [`DomainName::eq_or_subdomain_of`].
#[derive(Clone, Eq)]
pub struct DomainName(Box<str>);

impl DomainName {
    pub fn new(s: &str) -> Result<Self, ParseNameError> {
        // A trailing dot (root label) is not accepted in DKIM tags.
        if s.ends_with('.') {
            return Err(ParseNameError);
        }

        if is_valid_dns_name(s) {
            Ok(Self(s.into()))
        } else {
            Err(ParseNameError)
        }
    }

    /// Returns the domain in its ASCII (A-label) form.
    pub fn to_ascii(&self) -> String {
        // Conversion was checked during construction.
        idna::domain_to_ascii(&self.0).unwrap_or_else(|_| self.0.to_ascii_lowercase())
    }

    /// Compares this domain with another for equality or parent-domain
    /// relationship, in case-insensitive and IDNA-aware manner.
    pub fn eq_or_subdomain_of(&self, other: &DomainName) -> bool {
        if self == other {
            return true;
        }

        let name = self.to_ascii();
        let other = other.to_ascii();

        if name.len() > other.len() {
            let len = name.len() - other.len();
            matches!(name.get(len..), Some(s) if s.eq_ignore_ascii_case(&other))
                && matches!(name.get(..len), Some(s) if s.ends_with('.'))
        } else {
            false
        }
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

fn is_valid_dns_name(s: &str) -> bool {
    fn is_tld(s: &str) -> bool {
        is_label(s) && !s.chars().all(|c: char| c.is_ascii_digit())
    }

    if !has_valid_domain_len(s) {
        return false;
    }

    let mut labels = s.split('.').rev().peekable();

    if matches!(labels.next(), Some(l) if !is_tld(l)) {
        return false;
    }
    if labels.peek().is_none() {
        return false;
    }

    labels.all(is_label)
}

// Lenient label syntax; note that the tval alphabet already forbids ‘;’,
// which cannot occur in DKIM tags.
fn is_label(s: &str) -> bool {
    has_valid_label_len(s)
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars().all(tag_list::is_tval_char)
}

const MAX_DOMAIN_LENGTH: usize = 253;

fn has_valid_domain_len(s: &str) -> bool {
    matches!(s.len(), 1..=MAX_DOMAIN_LENGTH)
}

fn has_valid_label_len(s: &str) -> bool {
    matches!(s.len(), 1..=63)
}

/// A selector, as used in the *s=* tag.
#[derive(Clone, Eq)]
pub struct Selector(Box<str>);

impl Selector {
    pub fn new(s: &str) -> Result<Self, ParseNameError> {
        // Lenient per-label syntax, allowing things like "dkim_2024"; the
        // length of the whole query name is checked at lookup time.
        if !s.split('.').all(is_label) {
            return Err(ParseNameError);
        }

        // Ensure the selector survives A-label conversion for the DNS query.
        idna::domain_to_ascii(s).map_err(|_| ParseNameError)?;

        Ok(Selector(s.into()))
    }

    /// Returns the selector in its ASCII (A-label) form.
    pub fn to_ascii(&self) -> String {
        idna::domain_to_ascii(&self.0).unwrap_or_else(|_| self.0.to_ascii_lowercase())
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for Selector {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// An agent or user identifier, as used in the *i=* tag.
///
/// The local-part is optional: a signer may assert responsibility for a
/// domain without committing to a user within it (RFC 6376, §3.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub local_part: Option<Box<str>>,
    pub domain: DomainName,
}

impl Identity {
    pub fn new(ident: &str) -> Result<Self, ParseNameError> {
        let (local_part, domain) = ident.rsplit_once('@').ok_or(ParseNameError)?;

        let local_part = if local_part.is_empty() {
            None
        } else {
            if !is_local_part(local_part) {
                return Err(ParseNameError);
            }
            Some(local_part.into())
        };

        DomainName::new(domain).map(|domain| Self { local_part, domain })
    }

    pub fn from_domain(domain: DomainName) -> Self {
        Self {
            local_part: None,
            domain,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(local_part) = &self.local_part {
            write!(f, "{local_part}")?;
        }
        write!(f, "@{}", self.domain)
    }
}

// ‘local-part’ as in RFC 5321, §4.1.2, with the internationalisation
// modifications of RFC 6531, §3.3.
fn is_local_part(s: &str) -> bool {
    // See RFC 5321, §4.5.3.1.1.
    if s.len() > 64 {
        return false;
    }

    if s.starts_with('"') {
        is_quoted_string(s)
    } else {
        is_dot_string(s)
    }
}

fn is_quoted_string(s: &str) -> bool {
    fn is_qtext_smtp(c: char) -> bool {
        c == ' ' || c.is_ascii_graphic() && !matches!(c, '"' | '\\') || !c.is_ascii()
    }

    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        let mut quoted = false;
        for c in s[1..(s.len() - 1)].chars() {
            if quoted {
                if c == ' ' || c.is_ascii_graphic() {
                    quoted = false;
                } else {
                    return false;
                }
            } else if c == '\\' {
                quoted = true;
            } else if !is_qtext_smtp(c) {
                return false;
            }
        }
        !quoted
    } else {
        false
    }
}

fn is_dot_string(s: &str) -> bool {
    // See RFC 5322, §3.2.3, with the modifications in RFC 6531, §3.3.
    fn is_atext(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
            )
            || !c.is_ascii()
    }

    let mut dot = true;
    for c in s.chars() {
        if dot {
            if is_atext(c) {
                dot = false;
            } else {
                return false;
            }
        } else if c == '.' {
            dot = true;
        } else if !is_atext(c) {
            return false;
        }
    }
    !dot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_name_ok() {
        assert!(DomainName::new("example.com").is_ok());
        assert!(DomainName::new("example.中国").is_ok());
        assert!(DomainName::new("xn--53h.example.xn--fiqs8s").is_ok());

        assert!(DomainName::new("example").is_err());
        assert!(DomainName::new("example.").is_err());
        assert!(DomainName::new("example.com.").is_err());
    }

    #[test]
    fn domain_name_subdomain_of() {
        let base = DomainName::new("example.com").unwrap();

        assert!(DomainName::new("example.com").unwrap().eq_or_subdomain_of(&base));
        assert!(DomainName::new("EXAMPLE.com").unwrap().eq_or_subdomain_of(&base));
        assert!(DomainName::new("mail.example.com").unwrap().eq_or_subdomain_of(&base));

        assert!(!DomainName::new("example.org").unwrap().eq_or_subdomain_of(&base));
        assert!(!DomainName::new("badexample.com").unwrap().eq_or_subdomain_of(&base));
        assert!(!base.eq_or_subdomain_of(&DomainName::new("mail.example.com").unwrap()));
    }

    #[test]
    fn selector_ok() {
        assert!(Selector::new("example").is_ok());
        assert!(Selector::new("dkim_2024").is_ok());
        assert!(Selector::new("a.b").is_ok());

        assert!(Selector::new("").is_err());
        assert!(Selector::new(".").is_err());
        assert!(Selector::new("example.").is_err());
    }

    #[test]
    fn identity_ok() {
        assert!(Identity::new("joe@football.example.com").is_ok());
        assert!(Identity::new("@eng.example.net").is_ok());
        assert!(Identity::new("\"quoted string\"@example.com").is_ok());

        assert!(Identity::new("example.com").is_err());
        assert!(Identity::new("me@@example.com").is_err());
    }

    #[test]
    fn identity_display() {
        assert_eq!(
            Identity::new("joe@football.example.com").unwrap().to_string(),
            "joe@football.example.com"
        );
        assert_eq!(
            Identity::from_domain(DomainName::new("example.com").unwrap()).to_string(),
            "@example.com"
        );
    }
}
