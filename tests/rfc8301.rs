pub mod common;

use common::MockLookup;
use mailseal::{
    canonicalize::{self, BodyCanonicalizer},
    crypto::{self, SigningKey},
    encode_base64,
    header::{FieldBody, FieldName, HeaderFields},
    signature::{DomainName, Selector, SignatureAlgorithm},
    signer::SignRequest,
    verifier::{Config, VerificationError, VerificationStatus},
};
use std::{io::ErrorKind, str::FromStr};

// RFC 8301 behaviour: RSA keys under 1024 bits are unacceptable on both
// sides, and rsa-sha1 survives for verification only. Undersized and
// historic signatures cannot be produced with `Signer`, so they are
// assembled from the low-level building blocks here.

fn resolver_with_key_file(public_key_file: &'static str) -> MockLookup {
    MockLookup::new(move |name| {
        Box::pin(async move {
            match name {
                "sel._domainkey.example.com." => {
                    let base64 = common::read_public_key_file_base64(public_key_file).await?;
                    Ok(vec![Ok(format!("v=DKIM1; k=rsa; p={base64}").into())])
                }
                _ => Err(ErrorKind::NotFound.into()),
            }
        })
    })
}

async fn sign_manually(key_file: &str, algorithm: SignatureAlgorithm) -> HeaderFields {
    let headers = make_header_fields();
    let body = make_body();

    let hash_alg = algorithm.hash_algorithm();

    let mut bc = BodyCanonicalizer::relaxed();
    let mut canonical_body = bc.canonicalize_chunk(&body);
    canonical_body.extend(bc.finish());
    let body_hash = encode_base64(crypto::digest(hash_alg, &canonical_body));

    let algorithm_name = match algorithm {
        SignatureAlgorithm::RsaSha256 => "rsa-sha256",
        SignatureAlgorithm::RsaSha1 => "rsa-sha1",
        SignatureAlgorithm::Ed25519Sha256 => unimplemented!(),
    };

    let sig_name = "DKIM-Signature";
    let mut sig_value = format!(
        " v=1; a={algorithm_name}; d=example.com; s=sel; c=relaxed/relaxed;\r\n\
         \th=From:To:Subject; bh={body_hash}; b="
    );

    let selected_headers = [
        FieldName::new("From").unwrap(),
        FieldName::new("To").unwrap(),
        FieldName::new("Subject").unwrap(),
    ];

    let canon_alg = mailseal::signature::CanonicalizationAlgorithm::Relaxed;
    let mut canonical_headers =
        canonicalize::canonicalize_headers(canon_alg, &headers, &selected_headers);
    canonicalize::canonicalize_header(&mut canonical_headers, canon_alg, sig_name, &sig_value);

    let data_hash = crypto::digest(hash_alg, &canonical_headers);

    let signing_key = common::read_signing_key_from_file(key_file).await.unwrap();
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
async fn undersized_key_rejected_when_signing() {
    let _ = tracing_subscriber::fmt::try_init();

    let signing_key = common::read_signing_key_from_file("tests/keys/rsa512.pem")
        .await
        .unwrap();
    let request = SignRequest::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("sel").unwrap(),
        SignatureAlgorithm::RsaSha256,
        signing_key,
    );

    let results = common::sign_message(make_header_fields(), &make_body(), [request]).await;

    let result = results.into_iter().next().unwrap();

    assert!(matches!(
        result,
        Err(mailseal::SigningError::KeyTooSmall)
    ));
}

#[tokio::test]
async fn undersized_key_rejected_when_verifying() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = sign_manually("tests/keys/rsa512.pem", SignatureAlgorithm::RsaSha256).await;

    let resolver = resolver_with_key_file("tests/keys/rsa512pub.pem");
    let config = Config::default();

    let verifications =
        common::verify_message(&resolver, &headers, &make_body(), &config).await;

    let verification = verifications.into_iter().next().unwrap();

    assert_eq!(
        verification.status,
        VerificationStatus::Failure(VerificationError::KeyTooSmall)
    );
    assert!(verification.status.error().unwrap().is_perm_fail());
}

#[tokio::test]
async fn minimum_key_size_policy() {
    let _ = tracing_subscriber::fmt::try_init();

    // a 1024-bit key is acceptable by default but not under a stricter policy
    let signing_key = common::read_signing_key_from_file("tests/keys/rsa1024.pem")
        .await
        .unwrap();
    let request = SignRequest::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("sel").unwrap(),
        SignatureAlgorithm::RsaSha256,
        signing_key,
    );

    let results = common::sign_message(make_header_fields(), &make_body(), [request]).await;

    let result = results.into_iter().next().unwrap().unwrap();

    let headers = common::prepend_header_field(result.to_header_field(), make_header_fields());

    let resolver = resolver_with_key_file("tests/keys/rsa1024pub.pem");

    let config = Config::default();

    let verifications =
        common::verify_message(&resolver, &headers, &make_body(), &config).await;

    let verification = verifications.into_iter().next().unwrap();

    assert_eq!(verification.status, VerificationStatus::Success);
    assert_eq!(verification.key_size, Some(1024));

    let config = Config {
        min_key_bits: 2048,
        ..Default::default()
    };

    let verifications =
        common::verify_message(&resolver, &headers, &make_body(), &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Failure(VerificationError::KeyTooSmall)
    );
}

#[tokio::test]
async fn historic_sha1_signature_verifies() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = sign_manually("tests/keys/rsa1024.pem", SignatureAlgorithm::RsaSha1).await;

    let resolver = resolver_with_key_file("tests/keys/rsa1024pub.pem");
    let config = Config::default();

    let verifications =
        common::verify_message(&resolver, &headers, &make_body(), &config).await;

    let verification = verifications.into_iter().next().unwrap();

    assert_eq!(verification.status, VerificationStatus::Success);
}

#[tokio::test]
async fn sha1_disallowed_by_key_record() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = sign_manually("tests/keys/rsa1024.pem", SignatureAlgorithm::RsaSha1).await;

    // an h= whitelist without sha1 excludes the historic algorithm
    let resolver = MockLookup::new(|name| {
        Box::pin(async move {
            match name {
                "sel._domainkey.example.com." => {
                    let base64 =
                        common::read_public_key_file_base64("tests/keys/rsa1024pub.pem").await?;
                    Ok(vec![Ok(format!("v=DKIM1; k=rsa; h=sha256; p={base64}").into())])
                }
                _ => Err(ErrorKind::NotFound.into()),
            }
        })
    });
    let config = Config::default();

    let verifications =
        common::verify_message(&resolver, &headers, &make_body(), &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Failure(VerificationError::DisallowedHashAlgorithm)
    );
}

fn make_header_fields() -> HeaderFields {
    HeaderFields::from_str(
        "Subject: key sizes, old and new
From: postmaster <postmaster@example.com>
To: you@example.org",
    )
    .unwrap()
}

fn make_body() -> Vec<u8> {
    "A short test message.\r\n".bytes().collect()
}
