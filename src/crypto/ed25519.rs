// mailseal – DKIM signing and verification for email
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

use crate::crypto::{SigningFailure, VerificationError};
use ed25519_dalek::{
    pkcs8::DecodePublicKey, Signature, Signer, SigningKey, Verifier, VerifyingKey,
};

pub fn read_ed25519_verifying_key(key_data: &[u8]) -> Result<VerifyingKey, VerificationError> {
    // RFC 8463 mandates the raw 32 key bytes in DNS; keys in the
    // SubjectPublicKeyInfo format produced by OpenSSL are also accepted.
    VerifyingKey::try_from(key_data)
        .or_else(|_| VerifyingKey::from_public_key_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)
}

// Per RFC 8463, the Ed25519 signature input is the (SHA-256) message digest,
// not the message itself.

pub fn verify_ed25519(
    verifying_key: &VerifyingKey,
    digest: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let signature =
        Signature::from_slice(signature_data).map_err(|_| VerificationError::InvalidSignature)?;

    verifying_key
        .verify(digest, &signature)
        .map_err(|_| VerificationError::VerificationFailure)
}

pub fn sign_ed25519(signing_key: &SigningKey, digest: &[u8]) -> Result<Vec<u8>, SigningFailure> {
    let signature = signing_key.sign(digest);
    Ok(signature.to_bytes().to_vec())
}
