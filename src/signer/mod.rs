//! Signer and supporting types.

mod format;
mod request;
mod sign;

pub use request::{
    default_signed_headers, select_headers, HeaderSelection, SignRequest, Timestamp,
};

use crate::{
    crypto::KeySigner,
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    message::{self, LineEndings, MessageError},
    message_hash::{BodyHasher, BodyHasherBuilder, BodyHasherStance},
    signature::DkimSignature,
};
use std::{
    fmt::{self, Display, Formatter},
    io::{self, BufRead, Write},
};
use tracing::trace;

/// An error that occurs when producing signatures.
#[derive(Debug)]
pub enum SigningError {
    /// Message input or output failed.
    Io(io::Error),
    /// The message header could not be parsed.
    MalformedMessage,
    /// No signing requests were given.
    EmptyRequests,
    /// The message has no *From* header.
    MissingFromHeader,
    /// The selected headers do not include *From*.
    FromHeaderNotSigned,
    /// A selected header name cannot be represented in the *h=* tag.
    InvalidSignedFieldName,
    /// The generated header's name is unusable.
    InvalidHeaderName,
    /// Signing with the historic *rsa-sha1* algorithm was requested.
    HistoricAlgorithm,
    /// The *i=* identity is not within the signing domain.
    IdentityDomainMismatch,
    /// The configured query methods do not include `dns/txt`.
    QueryMethodsNotSupported,
    /// The key's type does not match the requested algorithm.
    KeyTypeMismatch,
    /// The signing key is smaller than RFC 8301 allows.
    KeyTooSmall,
    /// The signing capability failed to produce a signature.
    SigningFailure,
}

impl Display for SigningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedMessage => write!(f, "malformed message"),
            Self::EmptyRequests => write!(f, "no signing requests"),
            Self::MissingFromHeader => write!(f, "no From header in message"),
            Self::FromHeaderNotSigned => write!(f, "From header not signed"),
            Self::InvalidSignedFieldName => write!(f, "invalid signed header name"),
            Self::InvalidHeaderName => write!(f, "invalid signature header name"),
            Self::HistoricAlgorithm => write!(f, "signing with rsa-sha1 not supported"),
            Self::IdentityDomainMismatch => write!(f, "identity not in signing domain"),
            Self::QueryMethodsNotSupported => write!(f, "query methods do not include dns/txt"),
            Self::KeyTypeMismatch => write!(f, "key incompatible with signature algorithm"),
            Self::KeyTooSmall => write!(f, "signing key too small"),
            Self::SigningFailure => write!(f, "could not produce signature"),
        }
    }
}

impl std::error::Error for SigningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl PartialEq for SigningError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl From<MessageError> for SigningError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Io(e) => Self::Io(e),
            MessageError::MalformedMessage => Self::MalformedMessage,
        }
    }
}

impl From<io::Error> for SigningError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A successful signing result: the assembled `DKIM-Signature` header.
///
/// Header name and value concatenate with only a colon in between;
/// continuation lines use CRLF line endings.
#[derive(Debug, PartialEq)]
pub struct SigningResult {
    /// The signature data used to produce the formatted header.
    pub signature: DkimSignature,
    /// The header name.
    pub header_name: String,
    /// The header value.
    pub header_value: String,
}

impl SigningResult {
    /// Produces the formatted header: name, colon, and value.
    pub fn format_header(&self) -> String {
        format!("{}:{}", self.header_name, self.header_value)
    }

    /// Converts this result into a header field.
    pub fn to_header_field(&self) -> HeaderField {
        (
            FieldName::new(self.header_name.as_str()).expect("generated header name is valid"),
            FieldBody::new(self.header_value.as_bytes()).expect("generated header value is valid"),
        )
    }
}

struct SigningTask<T> {
    request: SignRequest<T>,
}

/// A signer for an email message.
///
/// `Signer` is the streaming facade over the signing process. It proceeds in
/// three stages:
///
/// 1. [`prepare_signing`][Signer::prepare_signing]: the signing requests and
///    the message header construct a signer; only the header is retained in
///    memory
/// 2. [`process_body_chunk`][Signer::process_body_chunk]: chunks of the
///    message body are fed through the body hash, without buffering
/// 3. [`sign`][Signer::sign] (async): signing is performed and the assembled
///    `DKIM-Signature` header for each request is returned
///
/// The body must be CRLF-encoded; chunks from LF-separated sources go
/// through [`LineEndings`][crate::message::LineEndings] first.
pub struct Signer<T> {
    tasks: Vec<SigningTask<T>>,
    headers: HeaderFields,
    body_hasher: BodyHasher,
}

impl<T> Signer<T>
where
    T: KeySigner,
{
    /// Prepares a message signing process.
    pub fn prepare_signing<I>(headers: HeaderFields, requests: I) -> Result<Self, SigningError>
    where
        I: IntoIterator<Item = SignRequest<T>>,
    {
        if !headers.as_ref().iter().any(|(name, _)| *name == "From") {
            return Err(SigningError::MissingFromHeader);
        }

        let mut tasks = vec![];
        let mut body_hasher = BodyHasherBuilder::new();

        for request in requests {
            // requests are validated eagerly; any unusable request aborts
            request::validate_request(&request)?;

            let hash_alg = request.algorithm.hash_algorithm();
            let canon_alg = request.canonicalization.body;
            body_hasher.register(None, hash_alg, canon_alg);

            tasks.push(SigningTask { request });
        }

        if tasks.is_empty() {
            return Err(SigningError::EmptyRequests);
        }

        Ok(Self {
            tasks,
            headers,
            body_hasher: body_hasher.build(),
        })
    }

    /// Processes a chunk of the message body.
    ///
    /// The chunk is canonicalized and hashed but not otherwise retained.
    pub fn process_body_chunk(&mut self, chunk: &[u8]) -> BodyHasherStance {
        self.body_hasher.hash_chunk(chunk)
    }

    /// Performs the signing and returns one result per request, in request
    /// order.
    pub async fn sign(self) -> Vec<Result<SigningResult, SigningError>> {
        let hasher_results = self.body_hasher.finish();

        let mut results = vec![];

        for task in self.tasks {
            trace!(
                domain = %task.request.domain,
                selector = %task.request.selector,
                "producing signature"
            );

            let result = sign::perform_signing(task.request, &self.headers, &hasher_results).await;

            results.push(result);
        }

        results
    }
}

/// Signs a message read from `reader` and writes the signed message to
/// `writer`: first the new `DKIM-Signature` header, then the original
/// headers in their original order, then the body.
///
/// Line endings are normalized to CRLF on the way through. The body is
/// buffered in memory until the signature has been computed; use the
/// [`Signer`] facade directly for output-free streaming.
pub async fn sign<T, R, W>(
    writer: &mut W,
    mut reader: R,
    request: SignRequest<T>,
) -> Result<(), SigningError>
where
    T: KeySigner,
    R: BufRead,
    W: Write,
{
    let headers = message::read_header(&mut reader)?;

    let mut signer = Signer::prepare_signing(headers.clone(), [request])?;

    let mut normalizer = LineEndings::new();
    let mut body = vec![];

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();

        let chunk = normalizer.normalize_chunk(buf);
        let _ = signer.process_body_chunk(&chunk);
        body.extend(chunk);

        reader.consume(len);
    }

    let result = signer
        .sign()
        .await
        .into_iter()
        .next()
        .expect("one result per request")?;

    write!(writer, "{}:{}\r\n", result.header_name, result.header_value)?;
    message::write_header_block(writer, &headers)?;
    writer.write_all(b"\r\n")?;
    writer.write_all(&body)?;

    Ok(())
}
