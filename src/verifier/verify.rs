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

use crate::{
    crypto::{self, HashAlgorithm, VerifyingKey},
    header::HeaderFields,
    message_hash,
    signature::DkimSignature,
    tag_list,
    verifier::VerificationError,
};
use std::borrow::Cow;
use tracing::trace;

/// Computes the data hash over the original message header bytes and checks
/// the signature against it.
pub fn perform_verification(
    headers: &HeaderFields,
    public_key: &VerifyingKey,
    sig: &DkimSignature,
    name: &str,
    value: &str,
) -> Result<(), VerificationError> {
    let hash_alg = sig.algorithm.hash_algorithm();

    let original_dkim_sig = strip_signature_data(value);

    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        sig.canonicalization.header,
        headers,
        &sig.signed_headers,
        name,
        &original_dkim_sig,
    );

    verify_signature(public_key, hash_alg, &data_hash, &sig.signature_data)
}

// Blanks out the b= tag's value in the original header value, retaining all
// surrounding bytes exactly (§3.7: the value of the b= tag is treated as
// empty, the tag itself stays).
fn strip_signature_data(value: &str) -> Cow<'_, str> {
    // Returns the length of the segment prefix up to and including the '='
    // of a b= tag. Whitespace after the '=' counts as part of the blanked
    // value, matching what other implementations strip.
    fn b_tag_prefix_len(s: &str) -> Option<usize> {
        let (_, name) = tag_list::strip_tag_name_and_equals(s)?;
        (name == "b").then(|| s.find('=').expect("tag contains '='") + 1)
    }

    let mut val = Cow::from(value);

    let mut last_i = 0;
    let mut semicolons = val.match_indices(';');

    loop {
        match semicolons.next() {
            Some((i, _)) => {
                if let Some(n) = b_tag_prefix_len(&val[last_i..i]) {
                    val.to_mut().drain((last_i + n)..i);
                    break;
                }
                last_i = i + 1;
            }
            None => {
                if last_i != val.len() {
                    if let Some(n) = b_tag_prefix_len(&val[last_i..]) {
                        val = value[..(last_i + n)].into();
                    }
                }
                break;
            }
        }
    }

    val
}

fn verify_signature(
    public_key: &VerifyingKey,
    hash_alg: HashAlgorithm,
    data_hash: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let result = match public_key {
        VerifyingKey::Rsa(pk) => crypto::verify_rsa(hash_alg, pk, data_hash, signature_data),
        VerifyingKey::Ed25519(pk) => crypto::verify_ed25519(pk, data_hash, signature_data),
    };

    match result {
        Ok(()) => {
            trace!("public key verification successful");
            Ok(())
        }
        Err(e) => {
            trace!("public key verification failed: {e}");
            Err(VerificationError::VerificationFailure(e))
        }
    }
}
