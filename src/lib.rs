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

//! A library implementing *DomainKeys Identified Mail* (DKIM) signing and
//! verification as described in [RFC 6376], together with a DMARC policy
//! record lookup helper (module [`dmarc`]) and an `Authentication-Results`
//! helper (module [`authres`]).
//!
//! # Usage
//!
//! The functions [`sign`] and [`verify`] process a whole message read from a
//! stream. The types [`Signer`] and [`Verifier`] expose the same operations
//! as chunk-fed facades for callers that receive the message piecemeal, such
//! as milter front-ends: the message header constructs the driver, body
//! chunks are fed in as they arrive without being buffered, and a final call
//! produces the assembled `DKIM-Signature` header, or the verification
//! results in the order the signature fields appear in the message.
//!
//! Verification resolves public keys through the [`LookupTxt`] trait. An
//! implementation for the [Hickory resolver] is available with the
//! **`hickory-resolver`** Cargo feature; tests and special deployments
//! provide their own.
//!
//! Lower-level building blocks (canonicalization, tag parsing, hashing,
//! cryptography, record decoding) are exposed in their own modules for
//! callers assembling custom pipelines.
//!
//! # Trace logging
//!
//! The high-level drivers emit trace-level events through the [tracing]
//! crate. Install a subscriber and enable the `trace` level for insight into
//! library operation.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376
//! [Hickory resolver]: https://crates.io/crates/hickory-resolver
//! [tracing]: https://crates.io/crates/tracing

pub mod authres;
pub mod canonicalize;
pub mod crypto;
pub mod dmarc;
pub mod header;
pub mod message;
pub mod message_hash;
mod parse;
pub mod record;
pub mod signature;
pub mod signer;
mod tag_list;
mod util;
pub mod verifier;

pub use crate::{
    crypto::{KeySigner, SigningKey},
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    message::MessageError,
    signature::{DkimSignature, DomainName, Identity, Selector, SignatureAlgorithm},
    signer::{sign, SignRequest, Signer, SigningError, SigningResult},
    util::{decode_base64, encode_base64, Base64Error, CanonicalStr},
    verifier::{
        verify, Config, LookupTxt, Verification, VerificationError, VerificationStatus,
        Verifier, VerifyError,
    },
};
