//! Verifier and supporting types.

mod header;
mod lookup;
mod query;
mod verify;

pub use lookup::LookupTxt;

use crate::{
    crypto,
    header::{FieldName, HeaderFields},
    message::{self, LineEndings, MessageError},
    message_hash::{body_hasher_key, BodyHasher, BodyHasherBuilder, BodyHasherStance},
    record::DkimKeyRecordError,
    signature::{DkimSignature, DkimSignatureError, DomainName, Identity, DKIM_SIGNATURE_NAME},
    verifier::header::{HeaderVerifier, VerifyStatus},
};
use std::{
    fmt::{self, Display, Formatter},
    io::{self, BufRead},
    time::{Duration, SystemTime},
};
use tracing::trace;

/// Configuration of the verification process.
pub struct Config {
    /// Timeout applied to each key record lookup.
    pub lookup_timeout: Duration,
    /// Number of signatures evaluated per message; further `DKIM-Signature`
    /// fields are ignored and surfaced as
    /// [`VerifyError::TooManySignatures`]. `None` evaluates all.
    pub max_verifications: Option<usize>,
    /// Leeway applied to expiration and timestamp checks.
    pub time_tolerance: Duration,
    /// Fixed value for ‘now’ in timestamp checks, mainly for testing.
    pub current_time: Option<u64>,
    /// Minimum acceptable public key size in bits, for key types of variable
    /// size.
    pub min_key_bits: usize,
}

impl Config {
    pub(crate) fn current_timestamp(&self) -> u64 {
        self.current_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_or(0, |t| t.as_secs())
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
            max_verifications: None,
            time_tolerance: Duration::from_secs(5 * 60),
            current_time: None,
            min_key_bits: 1024,
        }
    }
}

/// An error that occurs when evaluating one signature.
///
/// Every error classifies as either permanent or temporary, the two-level
/// taxonomy that maps onto the `permerror` and `temperror`
/// `Authentication-Results` values (RFC 8601).
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationError {
    /// The `DKIM-Signature` header could not be decoded.
    SignatureFormat(DkimSignatureError),
    /// The signature's expiration time is in the past.
    SignatureExpired,
    /// The signature's timestamp is in the future.
    TimestampInFuture,
    /// No usable key record syntax.
    KeyRecordFormat(DkimKeyRecordError),
    /// The key record's key type differs from the signature algorithm's.
    WrongKeyType,
    /// The key record does not allow the signature's hash algorithm.
    DisallowedHashAlgorithm,
    /// The key record does not allow use for email.
    DisallowedServiceType,
    /// The key record requires the *i=* domain to equal the signing domain.
    DomainMismatch,
    /// The key record's granularity excludes the *i=* local-part.
    DisallowedLocalPart,
    /// The public key is smaller than acceptable.
    KeyTooSmall,
    /// The cryptographic verification itself failed.
    VerificationFailure(crypto::VerificationError),
    /// The computed body hash does not equal the *bh=* value.
    BodyHashMismatch,
    /// The message body is shorter than the *l=* tag's value.
    InsufficientBodyLength,
    /// No key record exists at the queried name.
    NoKeyFound,
    /// No DNS query name could be formed from domain and selector.
    InvalidKeyDomain,
    /// The key record lookup timed out.
    KeyLookupTimeout,
    /// The key record lookup failed.
    KeyLookup,
}

impl VerificationError {
    /// Whether this error is permanent: the message fails verification
    /// definitively (`permerror`).
    pub fn is_perm_fail(&self) -> bool {
        !self.is_temp_fail()
    }

    /// Whether this error is temporary: verification could succeed at a
    /// later time (`temperror`).
    pub fn is_temp_fail(&self) -> bool {
        matches!(
            self,
            Self::NoKeyFound | Self::KeyLookupTimeout | Self::KeyLookup
        )
    }
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureFormat(error) => error.fmt(f),
            Self::SignatureExpired => write!(f, "signature expired"),
            Self::TimestampInFuture => write!(f, "timestamp in future"),
            Self::KeyRecordFormat(error) => error.fmt(f),
            Self::WrongKeyType => write!(f, "wrong key type"),
            Self::DisallowedHashAlgorithm => write!(f, "hash algorithm not allowed"),
            Self::DisallowedServiceType => write!(f, "service type not allowed"),
            Self::DomainMismatch => write!(f, "domain mismatch"),
            Self::DisallowedLocalPart => write!(f, "local-part not allowed by key"),
            Self::KeyTooSmall => write!(f, "public key too small"),
            Self::VerificationFailure(error) => error.fmt(f),
            Self::BodyHashMismatch => write!(f, "body hash mismatch"),
            Self::InsufficientBodyLength => write!(f, "truncated body"),
            Self::NoKeyFound => write!(f, "no key record found"),
            Self::InvalidKeyDomain => write!(f, "invalid key record domain name"),
            Self::KeyLookupTimeout => write!(f, "key record lookup timed out"),
            Self::KeyLookup => write!(f, "key record lookup failed"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// The outcome of evaluating one signature.
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationStatus {
    Success,
    Failure(VerificationError),
}

impl VerificationStatus {
    /// Returns the error for a failed verification.
    pub fn error(&self) -> Option<&VerificationError> {
        match self {
            Self::Success => None,
            Self::Failure(e) => Some(e),
        }
    }
}

/// The result of evaluating one `DKIM-Signature`. Emitted in the order the
/// signature fields appear in the message.
#[derive(Clone, Debug, PartialEq)]
pub struct Verification {
    /// The signing domain (*d=*), when the signature could be decoded.
    pub domain: Option<DomainName>,
    /// The identity taking responsibility (*i=*, defaulting to `@` plus the
    /// signing domain), when the signature could be decoded.
    pub identity: Option<Identity>,
    /// The signed header names (*h=*), in the order fed to the data hash.
    pub signed_headers: Vec<FieldName>,
    /// The signature timestamp (*t=*), if present.
    pub timestamp: Option<u64>,
    /// The verification outcome.
    pub status: VerificationStatus,
    /// Whether the signing domain is in testing mode (*t=y* in the key
    /// record).
    pub testing: bool,
    /// The public key size in bits, where applicable.
    pub key_size: Option<usize>,
}

/// An error that aborts a whole verification call, as opposed to the
/// per-signature errors captured in [`Verification`].
#[derive(Debug)]
pub enum VerifyError {
    /// Message input failed.
    Io(io::Error),
    /// The message header could not be parsed.
    MalformedMessage,
    /// More `DKIM-Signature` fields were present than
    /// [`Config::max_verifications`] allows. The verifications for the
    /// evaluated prefix are attached; the input has still been read to EOF.
    TooManySignatures(Vec<Verification>),
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedMessage => write!(f, "malformed message"),
            Self::TooManySignatures(_) => write!(f, "too many signatures"),
        }
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MessageError> for VerifyError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Io(e) => Self::Io(e),
            MessageError::MalformedMessage => Self::MalformedMessage,
        }
    }
}

impl From<io::Error> for VerifyError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

struct VerificationTask {
    sig: Option<DkimSignature>,
    status: VerificationStatus,
    testing: bool,
    key_size: Option<usize>,
}

/// A verifier validating all DKIM signatures in a message.
///
/// `Verifier` is the streaming facade over the verification process. It
/// proceeds in three stages:
///
/// 1. [`verify_header`][Verifier::verify_header] (async): the message header
///    is searched for signatures, key records are fetched, and the data
///    hashes are checked
/// 2. [`process_body_chunk`][Verifier::process_body_chunk]: chunks of the
///    message body are fed through the body hashes
/// 3. [`finish`][Verifier::finish]: body hashes are compared and the
///    verification results are returned
///
/// The body must be CRLF-encoded; chunks from LF-separated sources go
/// through [`LineEndings`][crate::message::LineEndings] first.
pub struct Verifier {
    tasks: Vec<VerificationTask>,
    body_hasher: BodyHasher,
}

impl Verifier {
    /// Processes the message header and returns a verifier for the body, or
    /// `None` if the message carries no `DKIM-Signature` fields.
    pub async fn verify_header<T>(
        resolver: &T,
        headers: &HeaderFields,
        config: &Config,
    ) -> Option<Self>
    where
        T: LookupTxt + Clone + 'static,
    {
        let header_tasks = HeaderVerifier::find_signatures(headers, config)?;

        let tasks = header_tasks.verify_all(resolver).await;

        let mut final_tasks = vec![];
        let mut body_hasher = BodyHasherBuilder::new();

        for task in tasks {
            let status = match task.status {
                VerifyStatus::Successful => VerificationStatus::Success,
                VerifyStatus::Failed(e) => VerificationStatus::Failure(e),
                // a lookup task that died leaves its signatures unresolved
                VerifyStatus::InProgress => {
                    VerificationStatus::Failure(VerificationError::KeyLookup)
                }
            };

            // Any decodable signature registers its body hash request, so
            // that the body hash comparison is available in `finish`.
            if let Some(sig) = &task.sig {
                let (len, hash_alg, canon_alg) = body_hasher_key(sig);
                body_hasher.register(len, hash_alg, canon_alg);
            }

            final_tasks.push(VerificationTask {
                sig: task.sig,
                status,
                testing: task.testing,
                key_size: task.key_size,
            });
        }

        Some(Self {
            tasks: final_tasks,
            body_hasher: body_hasher.build(),
        })
    }

    /// Processes a chunk of the message body.
    ///
    /// Returns `Done` once no further input can change any result; the
    /// remaining input then need not be fed (but the source should still be
    /// drained by whoever owns it).
    pub fn process_body_chunk(&mut self, chunk: &[u8]) -> BodyHasherStance {
        self.body_hasher.hash_chunk(chunk)
    }

    /// Settles the body hashes and returns one verification per signature,
    /// in the order the signature fields appear in the message.
    pub fn finish(self) -> Vec<Verification> {
        let hasher_results = self.body_hasher.finish();

        let mut results = vec![];

        for task in self.tasks {
            let status = match &task.sig {
                None => task.status,
                Some(sig) => {
                    let key = body_hasher_key(sig);

                    match hasher_results.get(&key).expect("body hash was registered") {
                        Ok((hash, _)) => {
                            if hash.as_ref() != sig.body_hash.as_ref() {
                                trace!("body hash mismatch");
                                downgrade_to_body_error(
                                    task.status,
                                    VerificationError::BodyHashMismatch,
                                )
                            } else {
                                trace!("body hash matched");
                                task.status
                            }
                        }
                        Err(crypto::InsufficientInput) => downgrade_to_body_error(
                            task.status,
                            VerificationError::InsufficientBodyLength,
                        ),
                    }
                }
            };

            results.push(Verification {
                domain: task.sig.as_ref().map(|sig| sig.domain.clone()),
                identity: task.sig.as_ref().map(|sig| sig.identity_or_default()),
                signed_headers: task
                    .sig
                    .as_ref()
                    .map(|sig| sig.signed_headers.to_vec())
                    .unwrap_or_default(),
                timestamp: task.sig.as_ref().and_then(|sig| sig.timestamp),
                status,
                testing: task.testing,
                key_size: task.key_size,
            });
        }

        results
    }
}

// The body hash is checked before the signature per §6.1; a cryptographic
// failure therefore reports as a body error when the body does not hash as
// declared. Errors from earlier stages (key lookup, key record) stand.
fn downgrade_to_body_error(
    status: VerificationStatus,
    error: VerificationError,
) -> VerificationStatus {
    match status {
        VerificationStatus::Success => VerificationStatus::Failure(error),
        VerificationStatus::Failure(VerificationError::VerificationFailure(_)) => {
            VerificationStatus::Failure(error)
        }
        failure => failure,
    }
}

/// Verifies all DKIM signatures of the message read from `reader`.
///
/// The input is always read to EOF, even once all results are settled or the
/// signature limit is exceeded, so that upstream pipes do not stall. Line
/// endings are normalized to CRLF on the way through.
///
/// Per-signature failures are captured in the returned [`Verification`]s;
/// only I/O problems, an unparseable header block, and exceeding
/// [`Config::max_verifications`] abort the call.
pub async fn verify<T, R>(
    resolver: &T,
    mut reader: R,
    config: &Config,
) -> Result<Vec<Verification>, VerifyError>
where
    T: LookupTxt + Clone + 'static,
    R: BufRead,
{
    let headers = message::read_header(&mut reader)?;

    let total_signatures = headers
        .as_ref()
        .iter()
        .filter(|(name, _)| *name == DKIM_SIGNATURE_NAME)
        .count();
    let overflow =
        matches!(config.max_verifications, Some(max) if total_signatures > max);

    let verifications = match Verifier::verify_header(resolver, &headers, config).await {
        Some(mut verifier) => {
            let mut normalizer = LineEndings::new();

            loop {
                let buf = reader.fill_buf()?;
                if buf.is_empty() {
                    break;
                }
                let len = buf.len();

                let chunk = normalizer.normalize_chunk(buf);
                let _ = verifier.process_body_chunk(&chunk);

                reader.consume(len);
            }

            verifier.finish()
        }
        None => {
            message::drain(&mut reader)?;
            vec![]
        }
    };

    if overflow {
        Err(VerifyError::TooManySignatures(verifications))
    } else {
        Ok(verifications)
    }
}
