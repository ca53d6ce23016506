//! DKIM signature data.

mod names;

pub use names::{DomainName, Identity, ParseNameError, Selector};

use crate::{
    crypto::{HashAlgorithm, KeyType},
    header::FieldName,
    tag_list::{parse_base64_tag_value, parse_colon_separated_tag_value, TagList, TagSpec},
    util::{encode_base64, CanonicalStr},
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// The name of the *DKIM-Signature* header field.
pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";

/// A signature algorithm: the key type plus hash algorithm given in the *a=*
/// tag.
///
/// `RsaSha1` is recognized for verification of historic signatures only;
/// signing requests using it are rejected (RFC 8301).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// The *rsa-sha256* signature algorithm.
    RsaSha256,
    /// The *ed25519-sha256* signature algorithm.
    Ed25519Sha256,
    /// The historic *rsa-sha1* signature algorithm (verification only).
    RsaSha1,
}

impl SignatureAlgorithm {
    pub fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha256 | Self::RsaSha1 => KeyType::Rsa,
            Self::Ed25519Sha256 => KeyType::Ed25519,
        }
    }

    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha256 | Self::Ed25519Sha256 => HashAlgorithm::Sha256,
            Self::RsaSha1 => HashAlgorithm::Sha1,
        }
    }
}

impl CanonicalStr for SignatureAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
            Self::Ed25519Sha256 => "ed25519-sha256",
            Self::RsaSha1 => "rsa-sha1",
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("rsa-sha256") {
            Ok(Self::RsaSha256)
        } else if s.eq_ignore_ascii_case("ed25519-sha256") {
            Ok(Self::Ed25519Sha256)
        } else if s.eq_ignore_ascii_case("rsa-sha1") {
            Ok(Self::RsaSha1)
        } else {
            Err(ParseAlgorithmError)
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseAlgorithmError;

impl Display for ParseAlgorithmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized algorithm name")
    }
}

impl std::error::Error for ParseAlgorithmError {}

/// A canonicalization algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CanonicalizationAlgorithm {
    /// The *simple* canonicalization algorithm.
    #[default]
    Simple,
    /// The *relaxed* canonicalization algorithm.
    Relaxed,
}

impl CanonicalStr for CanonicalizationAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl Display for CanonicalizationAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err(ParseAlgorithmError)
        }
    }
}

/// The header/body canonicalization pair given in the *c=* tag.
///
/// The default is `simple/simple`, as in the DKIM specification.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    pub header: CanonicalizationAlgorithm,
    pub body: CanonicalizationAlgorithm,
}

impl From<(CanonicalizationAlgorithm, CanonicalizationAlgorithm)> for Canonicalization {
    fn from((header, body): (CanonicalizationAlgorithm, CanonicalizationAlgorithm)) -> Self {
        Self { header, body }
    }
}

impl CanonicalStr for Canonicalization {
    fn canonical_str(&self) -> &'static str {
        use CanonicalizationAlgorithm::*;

        match (self.header, self.body) {
            (Simple, Simple) => "simple/simple",
            (Simple, Relaxed) => "simple/relaxed",
            (Relaxed, Simple) => "relaxed/simple",
            (Relaxed, Relaxed) => "relaxed/relaxed",
        }
    }
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl fmt::Debug for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", &self.header, &self.body)
    }
}

impl FromStr for Canonicalization {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // the body algorithm may be omitted and defaults to simple
        Ok(match s.split_once('/') {
            Some((header, body)) => Self {
                header: header.parse()?,
                body: body.parse()?,
            },
            None => Self {
                header: s.parse()?,
                body: Default::default(),
            },
        })
    }
}

/// An error that occurs when decoding a *DKIM-Signature* header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DkimSignatureError {
    InvalidTagList,
    Utf8Encoding,
    MissingVersionTag,
    UnsupportedVersion,
    MissingAlgorithmTag,
    UnsupportedAlgorithm,
    MissingSignatureTag,
    MissingBodyHashTag,
    UnsupportedCanonicalization,
    MissingDomainTag,
    InvalidDomain,
    MissingSignedHeadersTag,
    SignedHeadersEmpty,
    FromHeaderNotSigned,
    InvalidSignedHeaderName,
    InvalidIdentity,
    IdentityDomainMismatch,
    InvalidBodyLength,
    QueryMethodsNotSupported,
    MissingSelectorTag,
    InvalidSelector,
    InvalidTimestamp,
    InvalidExpiration,
    ExpirationNotAfterTimestamp,
    ValueSyntax,
}

impl Display for DkimSignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTagList => write!(f, "invalid tag list"),
            Self::Utf8Encoding => write!(f, "invalid UTF-8 in header value"),
            Self::MissingVersionTag => write!(f, "v= tag missing"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::MissingAlgorithmTag => write!(f, "a= tag missing"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported algorithm"),
            Self::MissingSignatureTag => write!(f, "b= tag missing"),
            Self::MissingBodyHashTag => write!(f, "bh= tag missing"),
            Self::UnsupportedCanonicalization => write!(f, "unsupported canonicalization"),
            Self::MissingDomainTag => write!(f, "d= tag missing"),
            Self::InvalidDomain => write!(f, "invalid domain"),
            Self::MissingSignedHeadersTag => write!(f, "h= tag missing"),
            Self::SignedHeadersEmpty => write!(f, "no signed headers"),
            Self::FromHeaderNotSigned => write!(f, "From header not signed"),
            Self::InvalidSignedHeaderName => write!(f, "invalid signed header name"),
            Self::InvalidIdentity => write!(f, "invalid identity"),
            Self::IdentityDomainMismatch => write!(f, "identity not in signing domain"),
            Self::InvalidBodyLength => write!(f, "invalid body length"),
            Self::QueryMethodsNotSupported => write!(f, "query methods not supported"),
            Self::MissingSelectorTag => write!(f, "s= tag missing"),
            Self::InvalidSelector => write!(f, "invalid selector"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::InvalidExpiration => write!(f, "invalid expiration"),
            Self::ExpirationNotAfterTimestamp => write!(f, "expiration not after timestamp"),
            Self::ValueSyntax => write!(f, "syntax error in tag value"),
        }
    }
}

impl std::error::Error for DkimSignatureError {}

/// A DKIM signature record, as decoded from a `DKIM-Signature` header field.
#[derive(Clone, Eq, PartialEq)]
pub struct DkimSignature {
    pub algorithm: SignatureAlgorithm,
    pub signature_data: Box<[u8]>,
    pub body_hash: Box<[u8]>,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    pub signed_headers: Box<[FieldName]>,
    pub identity: Option<Identity>,
    pub body_length: Option<u64>,
    pub selector: Selector,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
}

impl DkimSignature {
    /// The identity taking responsibility for this signature: the *i=* value
    /// if present, else `@` followed by the signing domain.
    pub fn identity_or_default(&self) -> Identity {
        match &self.identity {
            Some(identity) => identity.clone(),
            None => Identity::from_domain(self.domain.clone()),
        }
    }

    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimSignatureError> {
        let mut version_seen = false;
        let mut algorithm = None;
        let mut signature_data = None;
        let mut body_hash = None;
        let mut canonicalization = None;
        let mut domain = None;
        let mut signed_headers = None;
        let mut identity = None;
        let mut body_length = None;
        let mut selector = None;
        let mut timestamp = None;
        let mut expiration = None;

        for &TagSpec { name, value } in tag_list.as_ref() {
            match name {
                "v" => {
                    if value != "1" {
                        return Err(DkimSignatureError::UnsupportedVersion);
                    }
                    version_seen = true;
                }
                "a" => {
                    let value = value
                        .parse()
                        .map_err(|_| DkimSignatureError::UnsupportedAlgorithm)?;
                    algorithm = Some(value);
                }
                "b" => {
                    let value = parse_base64_tag_value(value)
                        .map_err(|_| DkimSignatureError::ValueSyntax)?;
                    signature_data = Some(value.into());
                }
                "bh" => {
                    let value = parse_base64_tag_value(value)
                        .map_err(|_| DkimSignatureError::ValueSyntax)?;
                    body_hash = Some(value.into());
                }
                "c" => {
                    let value = value
                        .parse()
                        .map_err(|_| DkimSignatureError::UnsupportedCanonicalization)?;
                    canonicalization = Some(value);
                }
                "d" => {
                    let value =
                        DomainName::new(value).map_err(|_| DkimSignatureError::InvalidDomain)?;
                    domain = Some(value);
                }
                "h" => {
                    let mut names = vec![];
                    for v in parse_colon_separated_tag_value(value) {
                        let name = FieldName::new(v)
                            .map_err(|_| DkimSignatureError::InvalidSignedHeaderName)?;
                        names.push(name);
                    }
                    if names.is_empty() {
                        return Err(DkimSignatureError::SignedHeadersEmpty);
                    }
                    if !names.iter().any(|h| *h == "From") {
                        return Err(DkimSignatureError::FromHeaderNotSigned);
                    }
                    signed_headers = Some(names.into());
                }
                "i" => {
                    let value =
                        Identity::new(value).map_err(|_| DkimSignatureError::InvalidIdentity)?;
                    identity = Some(value);
                }
                "l" => {
                    let value = value
                        .parse()
                        .map_err(|_| DkimSignatureError::InvalidBodyLength)?;
                    body_length = Some(value);
                }
                "q" => {
                    let dns_txt_seen = parse_colon_separated_tag_value(value)
                        .iter()
                        .any(|v| v.eq_ignore_ascii_case("dns/txt"));
                    if !dns_txt_seen {
                        return Err(DkimSignatureError::QueryMethodsNotSupported);
                    }
                }
                "s" => {
                    let value =
                        Selector::new(value).map_err(|_| DkimSignatureError::InvalidSelector)?;
                    selector = Some(value);
                }
                "t" => {
                    let value = value
                        .parse()
                        .map_err(|_| DkimSignatureError::InvalidTimestamp)?;
                    timestamp = Some(value);
                }
                "x" => {
                    let value = value
                        .parse()
                        .map_err(|_| DkimSignatureError::InvalidExpiration)?;
                    expiration = Some(value);
                }
                // unrecognized tags must be ignored
                _ => {}
            }
        }

        if !version_seen {
            return Err(DkimSignatureError::MissingVersionTag);
        }

        let algorithm = algorithm.ok_or(DkimSignatureError::MissingAlgorithmTag)?;
        let signature_data = signature_data.ok_or(DkimSignatureError::MissingSignatureTag)?;
        let body_hash = body_hash.ok_or(DkimSignatureError::MissingBodyHashTag)?;
        let domain = domain.ok_or(DkimSignatureError::MissingDomainTag)?;
        let signed_headers = signed_headers.ok_or(DkimSignatureError::MissingSignedHeadersTag)?;
        let selector = selector.ok_or(DkimSignatureError::MissingSelectorTag)?;

        if let Some(identity) = &identity {
            if !identity.domain.eq_or_subdomain_of(&domain) {
                return Err(DkimSignatureError::IdentityDomainMismatch);
            }
        }

        if let (Some(timestamp), Some(expiration)) = (timestamp, expiration) {
            if expiration <= timestamp {
                return Err(DkimSignatureError::ExpirationNotAfterTimestamp);
            }
        }

        Ok(Self {
            algorithm,
            signature_data,
            body_hash,
            canonicalization: canonicalization.unwrap_or_default(),
            domain,
            signed_headers,
            identity,
            body_length,
            selector,
            timestamp,
            expiration,
        })
    }
}

impl FromStr for DkimSignature {
    type Err = DkimSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list =
            TagList::from_str(s).map_err(|_| DkimSignatureError::InvalidTagList)?;

        Self::from_tag_list(&tag_list)
    }
}

impl fmt::Debug for DkimSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSignature")
            .field("algorithm", &self.algorithm)
            .field("signature_data", &encode_base64(&self.signature_data))
            .field("body_hash", &encode_base64(&self.body_hash))
            .field("canonicalization", &self.canonicalization)
            .field("domain", &self.domain)
            .field("signed_headers", &self.signed_headers)
            .field("identity", &self.identity)
            .field("body_length", &self.body_length)
            .field("selector", &self.selector)
            .field("timestamp", &self.timestamp)
            .field("expiration", &self.expiration)
            .finish()
    }
}
