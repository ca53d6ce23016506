pub mod common;

use common::MockLookup;
use mailseal::{
    encode_base64,
    header::FieldName,
    signature::{CanonicalizationAlgorithm, DomainName, Identity, Selector, SignatureAlgorithm},
    signer::{HeaderSelection, SignRequest, Timestamp},
    verifier::{Config, VerificationStatus},
};
use std::{io::ErrorKind, str::FromStr};

// The message from RFC 6376, appendix A, signed with the local test key in
// the same shape as the reference signature (selector ‘brisbane’, simple
// canonicalization, the appendix's h= list and identity).

const REFERENCE_TIMESTAMP: u64 = 1615825284;

// The body hash of the appendix A message body under simple
// canonicalization, as given in the reference signature.
const REFERENCE_BODY_HASH: &str = "2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=";

fn brisbane_resolver() -> MockLookup {
    MockLookup::new(|name| {
        Box::pin(async move {
            match name {
                "brisbane._domainkey.example.com." => {
                    let base64 =
                        common::read_public_key_file_base64("tests/keys/rsa2048pub.pem").await?;
                    Ok(vec![Ok(format!("v=DKIM1; k=rsa; p={base64}").into())])
                }
                _ => Err(ErrorKind::NotFound.into()),
            }
        })
    })
}

async fn brisbane_request() -> SignRequest<mailseal::SigningKey> {
    let signing_key = common::read_signing_key_from_file("tests/keys/rsa2048.pem")
        .await
        .unwrap();

    let mut request = SignRequest::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("brisbane").unwrap(),
        SignatureAlgorithm::RsaSha256,
        signing_key,
    );
    request.canonicalization =
        (CanonicalizationAlgorithm::Simple, CanonicalizationAlgorithm::Simple).into();
    request.identity = Some(Identity::new("joe@football.example.com").unwrap());
    request.timestamp = Some(Timestamp::Exact(REFERENCE_TIMESTAMP));
    request.header_selection = HeaderSelection::Pick(
        ["Received", "From", "To", "Subject", "Date", "Message-ID"]
            .into_iter()
            .map(|n| FieldName::new(n).unwrap())
            .collect(),
    );

    request
}

#[tokio::test]
async fn reference_message_roundtrip() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = make_header_fields();
    let body = make_body();

    let request = brisbane_request().await;

    let results = common::sign_message(headers, &body, [request]).await;

    let result = results.into_iter().next().unwrap().unwrap();

    // the body hash matches the one in the reference signature
    assert_eq!(
        encode_base64(&result.signature.body_hash),
        REFERENCE_BODY_HASH
    );

    let headers = common::prepend_header_field(result.to_header_field(), make_header_fields());

    let resolver = brisbane_resolver();
    let config = Config {
        current_time: Some(REFERENCE_TIMESTAMP + 60),
        ..Default::default()
    };

    let verifications = common::verify_message(&resolver, &headers, &body, &config).await;

    assert_eq!(verifications.len(), 1);

    let verification = verifications.into_iter().next().unwrap();

    assert_eq!(verification.status, VerificationStatus::Success);
    assert_eq!(
        verification.domain,
        Some(DomainName::new("example.com").unwrap())
    );
    assert_eq!(
        verification.identity.unwrap().to_string(),
        "joe@football.example.com"
    );
    assert!(verification
        .signed_headers
        .iter()
        .map(|n| n.as_ref())
        .eq(["Received", "From", "To", "Subject", "Date", "Message-ID"]));
    assert_eq!(verification.timestamp, Some(REFERENCE_TIMESTAMP));
}

#[tokio::test]
async fn reference_message_relaxed_roundtrip() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = make_header_fields();
    let body = make_body();

    let mut request = brisbane_request().await;
    request.canonicalization = (
        CanonicalizationAlgorithm::Relaxed,
        CanonicalizationAlgorithm::Relaxed,
    )
        .into();

    let results = common::sign_message(headers, &body, [request]).await;

    let result = results.into_iter().next().unwrap().unwrap();

    let headers = common::prepend_header_field(result.to_header_field(), make_header_fields());

    let resolver = brisbane_resolver();
    let config = Config {
        current_time: Some(REFERENCE_TIMESTAMP + 60),
        ..Default::default()
    };

    let verifications = common::verify_message(&resolver, &headers, &body, &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Success
    );
}

/// Refolding the signed headers must not affect relaxed verification.
#[tokio::test]
async fn reference_message_relaxed_survives_refolding() {
    let _ = tracing_subscriber::fmt::try_init();

    let headers = make_header_fields();
    let body = make_body();

    let mut request = brisbane_request().await;
    request.canonicalization = (
        CanonicalizationAlgorithm::Relaxed,
        CanonicalizationAlgorithm::Relaxed,
    )
        .into();

    let results = common::sign_message(headers, &body, [request]).await;

    let result = results.into_iter().next().unwrap().unwrap();

    // re-fold the Subject header and change inner whitespace runs
    let refolded = "Subject: Is\r\n\tdinner   ready?";
    let mut header_fields: Vec<_> = make_header_fields().into();
    let subject = header_fields
        .iter_mut()
        .find(|(name, _)| *name == "Subject")
        .unwrap();
    *subject = refolded.parse::<mailseal::HeaderFields>().unwrap().as_ref()[0].clone();

    let headers = common::prepend_header_field(
        result.to_header_field(),
        mailseal::HeaderFields::new(header_fields).unwrap(),
    );

    let resolver = brisbane_resolver();
    let config = Config {
        current_time: Some(REFERENCE_TIMESTAMP + 60),
        ..Default::default()
    };

    let verifications = common::verify_message(&resolver, &headers, &body, &config).await;

    assert_eq!(
        verifications.into_iter().next().unwrap().status,
        VerificationStatus::Success
    );
}

fn make_header_fields() -> mailseal::HeaderFields {
    mailseal::HeaderFields::from_str(
        "Received: from client1.football.example.com  [192.0.2.1]
      by submitserver.example.com with SUBMISSION;
      Fri, 11 Jul 2003 21:01:54 -0700 (PDT)
From: Joe SixPack <joe@football.example.com>
To: Suzie Q <suzie@shopping.example.net>
Subject: Is dinner ready?
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)
Message-ID: <20030712040037.46341.5F8J@football.example.com>",
    )
    .unwrap()
}

fn make_body() -> Vec<u8> {
    "Hi.

We lost the game. Are you hungry yet?

Joe.
"
    .replace('\n', "\r\n")
    .bytes()
    .collect()
}
