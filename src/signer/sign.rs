use crate::{
    crypto::{HashAlgorithm, KeySigner},
    header::{FieldName, HeaderFields},
    message_hash::{self, BodyHasherResults},
    signer::{
        format::{self, UnsignedDkimSignature},
        request::{self, HeaderSelection, SignRequest, Timestamp},
        SigningError, SigningResult,
    },
};
use std::{collections::HashSet, time::SystemTime};
use tracing::trace;

pub async fn perform_signing<T>(
    request: SignRequest<T>,
    headers: &HeaderFields,
    hasher_results: &BodyHasherResults,
) -> Result<SigningResult, SigningError>
where
    T: KeySigner,
{
    let algorithm = request.algorithm;
    let hash_alg = algorithm.hash_algorithm();
    let canonicalization = request.canonicalization;

    if request.signing_key.key_type() != algorithm.key_type() {
        return Err(SigningError::KeyTypeMismatch);
    }

    // RFC 8301: signers must use RSA keys of at least 1024 bits
    if request.signing_key.key_type() == crate::crypto::KeyType::Rsa
        && request.signing_key.signature_length() * 8 < 1024
    {
        return Err(SigningError::KeyTooSmall);
    }

    // look up the body hash computed while the body was streamed through

    let key = (None, hash_alg, canonicalization.body);
    let (body_hash, _) = hasher_results
        .get(&key)
        .expect("body hash not registered")
        .as_ref()
        .expect("unlimited body hash cannot lack input");

    // select the headers to sign, bottom-up

    let signed_headers: Vec<FieldName> = match &request.header_selection {
        HeaderSelection::All => select_all_headers(headers),
        HeaderSelection::Pick(names) => {
            let wanted: HashSet<_> = names.iter().collect();
            request::select_headers(headers, move |name| wanted.contains(name))
                .cloned()
                .collect()
        }
    };

    if !signed_headers.iter().any(|name| *name == "From") {
        return Err(SigningError::FromHeaderNotSigned);
    }
    // a name containing ';' cannot be represented in the h= tag
    if signed_headers.iter().any(|name| name.as_ref().contains(';')) {
        return Err(SigningError::InvalidSignedFieldName);
    }

    // timestamp and expiration

    let timestamp = request.timestamp.map(|timestamp| match timestamp {
        Timestamp::Now => now_unix_secs(),
        Timestamp::Exact(t) => t,
    });

    let expiration = request.valid_duration.map(|duration| {
        timestamp
            .unwrap_or_else(now_unix_secs)
            .saturating_add(duration.as_secs())
    });

    // format the complete header, with the b= tag present but empty

    let sig = UnsignedDkimSignature {
        algorithm,
        body_hash: body_hash.clone(),
        canonicalization,
        domain: request.domain,
        signed_headers: signed_headers.into(),
        identity: request.identity,
        selector: request.selector,
        query_methods: request.query_methods,
        timestamp,
        expiration,
    };

    let (mut header_value, insertion_index) =
        sig.format_without_signature(&request.header_name, request.line_width);

    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        canonicalization.header,
        headers,
        &sig.signed_headers,
        &request.header_name,
        &header_value,
    );

    let signature_data = sign_digest(&request.signing_key, hash_alg, &data_hash)?;

    let sig = sig.into_signature(signature_data.into(), None);

    format::insert_signature_data(
        &mut header_value,
        insertion_index,
        &request.header_name,
        &sig.signature_data,
        request.line_width,
    );

    Ok(SigningResult {
        signature: sig,
        header_name: request.header_name,
        header_value,
    })
}

fn select_all_headers(headers: &HeaderFields) -> Vec<FieldName> {
    request::select_headers(headers, |_| true).cloned().collect()
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |t| t.as_secs())
}

fn sign_digest<T: KeySigner>(
    signing_key: &T,
    hash_alg: HashAlgorithm,
    data_hash: &[u8],
) -> Result<Vec<u8>, SigningError> {
    match signing_key.sign_digest(hash_alg, data_hash) {
        Ok(s) => {
            trace!("signing successful");
            Ok(s)
        }
        Err(e) => {
            trace!("signing failed: {e}");
            Err(SigningError::SigningFailure)
        }
    }
}
