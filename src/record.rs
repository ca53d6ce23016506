//! DKIM public key record.
//!
//! The record published in DNS at `<selector>._domainkey.<domain>`; see
//! RFC 6376, section 3.6.1.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    tag_list::{parse_base64_tag_value, parse_colon_separated_tag_value, TagList, TagSpec},
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// A service type listed in the *s=* tag.
#[derive(Debug, PartialEq, Eq)]
pub enum ServiceType {
    /// `*`, matching all service types.
    Any,
    /// `email`.
    Email,
    Other(Box<str>),
}

/// A flag listed in the *t=* tag.
#[derive(Debug, PartialEq, Eq)]
pub enum SelectorFlag {
    /// `y`: this domain is testing DKIM.
    Testing,
    /// `s`: the *i=* domain must equal the *d=* domain exactly.
    NoSubdomains,
    Other(Box<str>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DkimKeyRecordError {
    RecordSyntax,
    UnsupportedVersion,
    MisplacedVersionTag,
    UnsupportedKeyType,
    NoSupportedHashAlgorithms,
    RevokedKey,
    MissingKeyTag,
    ServiceTypesEmpty,
    ValueSyntax,
}

impl Display for DkimKeyRecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordSyntax => write!(f, "ill-formed key record"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::MisplacedVersionTag => write!(f, "v= tag not in first position"),
            Self::UnsupportedKeyType => write!(f, "unsupported key type"),
            Self::NoSupportedHashAlgorithms => write!(f, "no supported hash algorithms"),
            Self::RevokedKey => write!(f, "key revoked"),
            Self::MissingKeyTag => write!(f, "p= tag missing"),
            Self::ServiceTypesEmpty => write!(f, "no service types"),
            Self::ValueSyntax => write!(f, "syntax error in tag value"),
        }
    }
}

impl std::error::Error for DkimKeyRecordError {}

/// A DKIM public key record, as decoded from the TXT resource record.
#[derive(Debug, PartialEq, Eq)]
pub struct DkimKeyRecord {
    /// Acceptable hash algorithms (*h=*); all, when the tag is absent.
    pub hash_algorithms: Box<[HashAlgorithm]>,
    /// The key type (*k=*); RSA when the tag is absent.
    pub key_type: KeyType,
    /// The public key data (*p=*).
    pub key_data: Box<[u8]>,
    /// Acceptable service types (*s=*); any, when the tag is absent.
    pub service_types: Box<[ServiceType]>,
    /// Flags (*t=*).
    pub flags: Box<[SelectorFlag]>,
    /// Historic granularity of the key (*g=*, RFC 4871). `None` is treated
    /// like `*`.
    pub granularity: Option<Box<str>>,
}

impl DkimKeyRecord {
    pub fn is_testing(&self) -> bool {
        self.flags.contains(&SelectorFlag::Testing)
    }

    /// Whether the record allows use for email (the *s=* tag contains `*` or
    /// `email`).
    pub fn allows_email(&self) -> bool {
        self.service_types
            .iter()
            .any(|s| matches!(s, ServiceType::Any | ServiceType::Email))
    }

    /// Whether the historic *g=* granularity admits the given local-part.
    ///
    /// The granularity may contain one `*` wildcard; an absent tag matches
    /// everything, an empty one matches nothing (RFC 4871, §3.6.1).
    pub fn granularity_matches(&self, local_part: Option<&str>) -> bool {
        let g = match &self.granularity {
            None => return true,
            Some(g) => g.as_ref(),
        };

        if g == "*" {
            return true;
        }
        // an empty g= value matches nothing
        if g.is_empty() {
            return false;
        }

        let local_part = local_part.unwrap_or("");

        match g.split_once('*') {
            Some((prefix, suffix)) => {
                local_part.len() >= prefix.len() + suffix.len()
                    && local_part.starts_with(prefix)
                    && local_part.ends_with(suffix)
            }
            None => local_part == g,
        }
    }

    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimKeyRecordError> {
        let mut hash_algorithms = HashAlgorithm::all();
        let mut key_type = KeyType::Rsa;
        let mut key_data = None;
        let mut service_types = vec![ServiceType::Any];
        let mut flags = vec![];
        let mut granularity = None;

        for (i, &TagSpec { name, value }) in tag_list.as_ref().iter().enumerate() {
            match name {
                "v" => {
                    // §3.6.1: if present, the v= tag must be the first
                    if i != 0 {
                        return Err(DkimKeyRecordError::MisplacedVersionTag);
                    }
                    if value != "DKIM1" {
                        return Err(DkimKeyRecordError::UnsupportedVersion);
                    }
                }
                "h" => {
                    hash_algorithms.clear();
                    for v in parse_colon_separated_tag_value(value) {
                        if v.eq_ignore_ascii_case("sha256") {
                            hash_algorithms.push(HashAlgorithm::Sha256);
                        } else if v.eq_ignore_ascii_case("sha1") {
                            hash_algorithms.push(HashAlgorithm::Sha1);
                        }
                    }
                    if hash_algorithms.is_empty() {
                        return Err(DkimKeyRecordError::NoSupportedHashAlgorithms);
                    }
                }
                "k" => {
                    if value.eq_ignore_ascii_case("ed25519") {
                        key_type = KeyType::Ed25519;
                    } else if !value.eq_ignore_ascii_case("rsa") {
                        return Err(DkimKeyRecordError::UnsupportedKeyType);
                    }
                }
                "p" => {
                    // an empty p= tag means the key has been revoked
                    if value.is_empty() {
                        return Err(DkimKeyRecordError::RevokedKey);
                    }
                    let v = parse_base64_tag_value(value)
                        .map_err(|_| DkimKeyRecordError::ValueSyntax)?;
                    key_data = Some(v.into());
                }
                "s" => {
                    let mut st = vec![];
                    for v in parse_colon_separated_tag_value(value) {
                        if v == "*" {
                            st.push(ServiceType::Any);
                        } else if v.eq_ignore_ascii_case("email") {
                            st.push(ServiceType::Email);
                        } else {
                            st.push(ServiceType::Other(v.into()));
                        }
                    }
                    if st.is_empty() {
                        return Err(DkimKeyRecordError::ServiceTypesEmpty);
                    }
                    service_types = st;
                }
                "t" => {
                    let mut fs = vec![];
                    for v in parse_colon_separated_tag_value(value) {
                        if v.eq_ignore_ascii_case("y") {
                            fs.push(SelectorFlag::Testing);
                        } else if v.eq_ignore_ascii_case("s") {
                            fs.push(SelectorFlag::NoSubdomains);
                        } else {
                            fs.push(SelectorFlag::Other(v.into()));
                        }
                    }
                    flags = fs;
                }
                "g" => {
                    granularity = Some(value.into());
                }
                _ => {}
            }
        }

        let key_data = key_data.ok_or(DkimKeyRecordError::MissingKeyTag)?;

        Ok(Self {
            hash_algorithms: hash_algorithms.into(),
            key_type,
            key_data,
            service_types: service_types.into(),
            flags: flags.into(),
            granularity,
        })
    }
}

impl FromStr for DkimKeyRecord {
    type Err = DkimKeyRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::from_str(s).map_err(|_| DkimKeyRecordError::RecordSyntax)?;

        Self::from_tag_list(&tag_list)
    }
}
