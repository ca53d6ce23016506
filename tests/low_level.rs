pub mod common;

use common::MockLookup;
use mailseal::{
    canonicalize::{self, BodyCanonicalizer},
    crypto::{self, HashAlgorithm, SigningKey},
    encode_base64,
    header::{FieldBody, FieldName, HeaderFields},
    verifier::{Config, VerificationError, VerificationStatus},
};
use std::io::ErrorKind;

// These tests assemble a DKIM-Signature with the low-level building blocks,
// bypassing `Signer`. This is also the only way to produce an l= tag, which
// is supported for verification only.

fn rsa_resolver() -> MockLookup {
    MockLookup::new(|name| {
        Box::pin(async move {
            match name {
                "sel._domainkey.example.com." => {
                    let base64 =
                        common::read_public_key_file_base64("tests/keys/rsa2048pub.pem").await?;
                    Ok(vec![Ok(format!("v=DKIM1; k=rsa; p={base64}").into())])
                }
                _ => Err(ErrorKind::NotFound.into()),
            }
        })
    })
}

async fn sign_with_body_limit(body: &[u8], limit: usize) -> HeaderFields {
    let headers = make_header_fields();

    let hash_alg = HashAlgorithm::Sha256;

    // body hash over the first `limit` octets of the canonicalized body
    let mut bc = BodyCanonicalizer::simple();
    let mut canonical_body = bc.canonicalize_chunk(body);
    canonical_body.extend(bc.finish());
    let hashed_len = limit.min(canonical_body.len());
    let body_hash = encode_base64(crypto::digest(hash_alg, &canonical_body[..hashed_len]));

    let sig_name = "DKIM-Signature";
    let mut sig_value = format!(
        " v=1; a=rsa-sha256; d=example.com; s=sel; c=simple/simple;\r\n\
         \tl={limit}; h=From:To; bh={body_hash}; b="
    );

    let selected_headers = [
        FieldName::new("From").unwrap(),
        FieldName::new("To").unwrap(),
    ];

    // data hash over the canonicalized headers plus the unterminated
    // signature header
    let canon_alg = Default::default();
    let mut canonical_headers =
        canonicalize::canonicalize_headers(canon_alg, &headers, &selected_headers);
    canonicalize::canonicalize_header(&mut canonical_headers, canon_alg, sig_name, &sig_value);

    let data_hash = crypto::digest(hash_alg, &canonical_headers);

    let signing_key = common::read_signing_key_from_file("tests/keys/rsa2048.pem")
        .await
        .unwrap();
    let SigningKey::Rsa(private_key) = &signing_key else {
        unreachable!()
    };
    let signature = crypto::sign_rsa(hash_alg, private_key, &data_hash).unwrap();

    sig_value.push_str(&encode_base64(signature));

    common::prepend_header_field(
        (
            FieldName::new(sig_name).unwrap(),
            FieldBody::new(sig_value.as_bytes()).unwrap(),
        ),
        headers,
    )
}

#[tokio::test]
async fn body_length_limit_ignores_trailing_content() {
    let _ = tracing_subscriber::fmt::try_init();

    let signed_part = b"Hello my friend\r\n";
    let mut body = signed_part.to_vec();

    let headers = sign_with_body_limit(&body, signed_part.len()).await;

    // anything appended after the signed length must not matter
    body.extend(b"-- appended on the way, ignored --\r\n");

    let resolver = rsa_resolver();
    let config = Config::default();

    let verifications = common::verify_message(&resolver, &headers, &body, &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Success
    );
}

#[tokio::test]
async fn body_length_limit_beyond_body_fails() {
    let _ = tracing_subscriber::fmt::try_init();

    let body = b"Hello my friend\r\n".to_vec();

    // declared length exceeds what the message carries
    let headers = sign_with_body_limit(&body, 10_000).await;

    let resolver = rsa_resolver();
    let config = Config::default();

    let verifications = common::verify_message(&resolver, &headers, &body, &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Failure(VerificationError::InsufficientBodyLength)
    );
}

fn make_header_fields() -> HeaderFields {
    "From: me <me@example.com>\nTo: you@example.org"
        .parse()
        .unwrap()
}
