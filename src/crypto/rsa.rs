use crate::crypto::{HashAlgorithm, SigningFailure, VerificationError};
use rsa::{
    pkcs1::DecodeRsaPublicKey,
    pkcs8::DecodePublicKey,
    traits::PublicKeyParts,
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::Sha256;

pub fn rsa_key_bits(k: &RsaPublicKey) -> usize {
    k.size() * 8
}

pub(super) fn rsa_private_key_len(k: &RsaPrivateKey) -> usize {
    k.size()
}

// RFC 8301 requires at least 1024 bits for both signing and verifying.
pub const MIN_RSA_KEY_BITS: usize = 1024;

pub fn read_rsa_public_key(key_data: &[u8]) -> Result<RsaPublicKey, VerificationError> {
    // First try reading the data as SubjectPublicKeyInfo (the de facto
    // standard, per the examples in the appendix of RFC 6376), then as
    // RSAPublicKey (what the RFC text actually specifies).
    let public_key = RsaPublicKey::from_public_key_der(key_data)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)?;

    if rsa_key_bits(&public_key) < MIN_RSA_KEY_BITS {
        return Err(VerificationError::InsufficientKeySize);
    }

    Ok(public_key)
}

pub fn verify_rsa(
    hash_alg: HashAlgorithm,
    public_key: &RsaPublicKey,
    digest: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let result = match hash_alg {
        HashAlgorithm::Sha256 => {
            public_key.verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature_data)
        }
        HashAlgorithm::Sha1 => {
            public_key.verify(Pkcs1v15Sign::new::<Sha1>(), digest, signature_data)
        }
    };

    result.map_err(|_| VerificationError::VerificationFailure)
}

pub fn sign_rsa(
    hash_alg: HashAlgorithm,
    private_key: &RsaPrivateKey,
    digest: &[u8],
) -> Result<Vec<u8>, SigningFailure> {
    let result = match hash_alg {
        HashAlgorithm::Sha256 => private_key.sign(Pkcs1v15Sign::new::<Sha256>(), digest),
        HashAlgorithm::Sha1 => private_key.sign(Pkcs1v15Sign::new::<Sha1>(), digest),
    };

    result.map_err(|_| SigningFailure)
}
