use crate::{
    header::{FieldName, HeaderFields},
    signature::{
        Canonicalization, CanonicalizationAlgorithm, DomainName, Identity, Selector,
        SignatureAlgorithm, DKIM_SIGNATURE_NAME,
    },
    signer::{format::LINE_WIDTH, SigningError},
};
use std::time::Duration;

/// A generator for the timestamp tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Timestamp {
    /// The current time.
    #[default]
    Now,
    /// The given Unix timestamp, in seconds.
    Exact(u64),
}

/// Selection of the header fields to sign.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum HeaderSelection {
    /// Sign every header field present in the message.
    #[default]
    All,
    /// Sign the fields with the given names; every occurrence of a listed
    /// name is included.
    Pick(Vec<FieldName>),
}

/// Selects all header fields matching the predicate, in reverse (bottom-up)
/// order: the last occurrence in the message first, then earlier occurrences.
/// This is the order the fields are fed to the data hash (RFC 6376, §5.4.2).
pub fn select_headers<'a>(
    headers: &'a HeaderFields,
    mut pred: impl FnMut(&FieldName) -> bool + 'a,
) -> impl DoubleEndedIterator<Item = &'a FieldName> + 'a {
    headers
        .as_ref()
        .iter()
        .rev()
        .filter_map(move |(name, _)| if pred(name) { Some(name) } else { None })
}

/// Returns the collection of header names commonly included in signatures.
///
/// RFC 6376 recommends no specific set; this is the ‘examples’ collection
/// from its section 5.4.1, as also used by OpenDKIM and the usual milter
/// configurations.
pub fn default_signed_headers() -> Vec<FieldName> {
    let names = [
        "From",
        "Reply-To",
        "Subject",
        "Date",
        "To",
        "Cc",
        "Resent-Date",
        "Resent-From",
        "Resent-To",
        "Resent-Cc",
        "In-Reply-To",
        "References",
        "List-Id",
        "List-Help",
        "List-Unsubscribe",
        "List-Subscribe",
        "List-Post",
        "List-Owner",
        "List-Archive",
    ];

    names.into_iter().map(|n| FieldName::new(n).unwrap()).collect()
}

/// A request for generation of one DKIM signature.
pub struct SignRequest<T> {
    /// The signing capability used to produce the signature.
    pub signing_key: T,

    pub algorithm: SignatureAlgorithm,
    pub canonicalization: Canonicalization,
    pub header_selection: HeaderSelection,
    pub domain: DomainName,
    pub identity: Option<Identity>,
    pub selector: Selector,
    /// Generator for the *t=* tag; `None` omits the tag.
    pub timestamp: Option<Timestamp>,
    /// Signature validity, yielding the *x=* tag; `None` omits the tag.
    pub valid_duration: Option<Duration>,
    /// Query methods for the *q=* tag; the tag is omitted when empty. When
    /// given, the list must include `dns/txt`.
    pub query_methods: Vec<Box<str>>,

    /// The generated header's name, normally `DKIM-Signature`.
    pub header_name: String,
    /// Target line width of the generated header.
    pub line_width: usize,
}

impl<T> SignRequest<T> {
    pub fn new(
        domain: DomainName,
        selector: Selector,
        algorithm: SignatureAlgorithm,
        signing_key: T,
    ) -> Self {
        Self {
            signing_key,

            algorithm,
            canonicalization: Canonicalization {
                header: CanonicalizationAlgorithm::Relaxed,
                body: CanonicalizationAlgorithm::Relaxed,
            },
            header_selection: HeaderSelection::All,
            domain,
            identity: None,
            selector,
            timestamp: Some(Timestamp::Now),
            valid_duration: None,
            query_methods: vec![],

            header_name: DKIM_SIGNATURE_NAME.into(),
            line_width: LINE_WIDTH,
        }
    }
}

pub fn validate_request<T>(request: &SignRequest<T>) -> Result<(), SigningError> {
    // Historic rsa-sha1 may be verified but never produced (RFC 8301).
    if request.algorithm == SignatureAlgorithm::RsaSha1 {
        return Err(SigningError::HistoricAlgorithm);
    }

    if let Some(identity) = &request.identity {
        if !identity.domain.eq_or_subdomain_of(&request.domain) {
            return Err(SigningError::IdentityDomainMismatch);
        }
    }

    if !request.query_methods.is_empty()
        && !request
            .query_methods
            .iter()
            .any(|q| q.eq_ignore_ascii_case("dns/txt"))
    {
        return Err(SigningError::QueryMethodsNotSupported);
    }

    if let HeaderSelection::Pick(names) = &request.header_selection {
        if !names.iter().any(|name| *name == "From") {
            return Err(SigningError::FromHeaderNotSigned);
        }
    }

    if request.header_name.is_empty()
        || !request.header_name.eq_ignore_ascii_case(DKIM_SIGNATURE_NAME)
    {
        return Err(SigningError::InvalidHeaderName);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FieldBody;

    #[test]
    fn select_headers_bottom_up() {
        let headers = make_header_fields(["From", "Aa", "Bb", "Aa", "Dd"]);

        let names: Vec<_> = ["from", "aa", "bb", "cc"]
            .into_iter()
            .map(|n| FieldName::new(n).unwrap())
            .collect();

        let selection = select_headers(&headers, move |name| names.contains(name));

        assert!(selection.map(|n| n.as_ref()).eq(["Aa", "Bb", "Aa", "From"]));
    }

    #[test]
    fn validate_request_rejects_sha1() {
        let request = SignRequest::new(
            DomainName::new("example.com").unwrap(),
            Selector::new("sel").unwrap(),
            SignatureAlgorithm::RsaSha1,
            (),
        );

        assert_eq!(
            validate_request(&request),
            Err(SigningError::HistoricAlgorithm)
        );
    }

    #[test]
    fn validate_request_identity_domain() {
        let mut request = SignRequest::new(
            DomainName::new("example.com").unwrap(),
            Selector::new("sel").unwrap(),
            SignatureAlgorithm::RsaSha256,
            (),
        );
        request.identity = Some(Identity::new("joe@mail.example.com").unwrap());

        assert_eq!(validate_request(&request), Ok(()));

        request.identity = Some(Identity::new("joe@example.org").unwrap());

        assert_eq!(
            validate_request(&request),
            Err(SigningError::IdentityDomainMismatch)
        );
    }

    fn make_header_fields(names: impl IntoIterator<Item = &'static str>) -> HeaderFields {
        let fields: Vec<_> = names
            .into_iter()
            .map(|name| (FieldName::new(name).unwrap(), FieldBody::new(*b" x").unwrap()))
            .collect();
        HeaderFields::new(fields).unwrap()
    }
}
