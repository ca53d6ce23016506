//! Computation of the message hashes.
//!
//! Two hashes are involved in every signature: the *body hash* over the
//! canonicalized body, and the *data hash* over the canonicalized selected
//! headers plus the `DKIM-Signature` header itself (with an empty *b=*
//! value). See RFC 6376, section 3.7.

use crate::{
    canonicalize::{self, BodyCanonicalizer},
    crypto::{self, CountingHasher, HashAlgorithm, HashStatus, InsufficientInput},
    header::{FieldName, HeaderFields},
    signature::{CanonicalizationAlgorithm, DkimSignature, DKIM_SIGNATURE_NAME},
};
use std::collections::{HashMap, HashSet};

/// Computes the data hash: the canonicalized selected headers, followed by
/// the canonicalized `DKIM-Signature` header *without* trailing CRLF.
pub fn compute_data_hash(
    hash_alg: HashAlgorithm,
    canon_alg: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    selected_headers: &[FieldName],
    dkim_sig_header_name: &str,
    dkim_sig_header_value: &str,
) -> Box<[u8]> {
    debug_assert!(dkim_sig_header_name.eq_ignore_ascii_case(DKIM_SIGNATURE_NAME));

    let canonical_headers =
        canonicalize::canonicalize_headers(canon_alg, headers, selected_headers);

    let mut canonical_sig =
        Vec::with_capacity(dkim_sig_header_name.len() + dkim_sig_header_value.len() + 1);
    canonicalize::canonicalize_header(
        &mut canonical_sig,
        canon_alg,
        dkim_sig_header_name,
        dkim_sig_header_value,
    );

    crypto::digest_slices(hash_alg, [canonical_headers, canonical_sig])
}

/// The stance of the body hasher with regard to additional body content.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BodyHasherStance {
    /// More input may still contribute to some body hash request; keep
    /// feeding chunks if any remain.
    Interested,
    /// All requests can be answered; additional input would be ignored.
    Done,
}

/// The inputs that distinguish one body hash request from another.
pub type BodyHasherKey = (Option<usize>, HashAlgorithm, CanonicalizationAlgorithm);

pub fn body_hasher_key(sig: &DkimSignature) -> BodyHasherKey {
    let body_len = sig
        .body_length
        .map(|len| len.try_into().unwrap_or(usize::MAX));
    (body_len, sig.algorithm.hash_algorithm(), sig.canonicalization.body)
}

#[derive(Default)]
pub struct BodyHasherBuilder {
    registrations: HashSet<BodyHasherKey>,
}

impl BodyHasherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        length: Option<usize>,
        hash_alg: HashAlgorithm,
        canon_alg: CanonicalizationAlgorithm,
    ) {
        self.registrations.insert((length, hash_alg, canon_alg));
    }

    pub fn build(self) -> BodyHasher {
        let hashers = self
            .registrations
            .into_iter()
            .map(|key @ (len, alg, _)| (key, CountingHasher::new(alg, len)))
            .collect();

        BodyHasher {
            hashers,
            canonicalizer_simple: BodyCanonicalizer::simple(),
            canonicalizer_relaxed: BodyCanonicalizer::relaxed(),
        }
    }
}

/// A producer of body hash results.
///
/// The body is read exactly once: each chunk passes through at most one
/// simple and one relaxed canonicalizer, whose outputs tee into one counting
/// hasher per registered `(length, hash, canonicalization)` combination.
pub struct BodyHasher {
    hashers: HashMap<BodyHasherKey, CountingHasher>,
    canonicalizer_simple: BodyCanonicalizer,
    canonicalizer_relaxed: BodyCanonicalizer,
}

impl BodyHasher {
    pub fn hash_chunk(&mut self, chunk: &[u8]) -> BodyHasherStance {
        let mut canonical_chunk_simple = None;
        let mut canonical_chunk_relaxed = None;

        let mut all_done = true;

        for ((_, _, canon_alg), hasher) in
            self.hashers.iter_mut().filter(|(_, h)| !h.is_done())
        {
            let canonical_chunk = match canon_alg {
                CanonicalizationAlgorithm::Simple => canonical_chunk_simple
                    .get_or_insert_with(|| self.canonicalizer_simple.canonicalize_chunk(chunk)),
                CanonicalizationAlgorithm::Relaxed => canonical_chunk_relaxed
                    .get_or_insert_with(|| self.canonicalizer_relaxed.canonicalize_chunk(chunk)),
            };

            if let HashStatus::AllConsumed = hasher.update(canonical_chunk) {
                if !hasher.is_done() {
                    all_done = false;
                }
            }
        }

        if all_done {
            BodyHasherStance::Done
        } else {
            BodyHasherStance::Interested
        }
    }

    pub fn finish(self) -> BodyHasherResults {
        let mut finish_simple = Some(|| self.canonicalizer_simple.finish());
        let mut finish_relaxed = Some(|| self.canonicalizer_relaxed.finish());
        let mut final_chunk_simple = None;
        let mut final_chunk_relaxed = None;

        let mut results = HashMap::new();

        for (key @ (_, _, canon_alg), mut hasher) in self.hashers {
            if !hasher.is_done() {
                // settle the canonicalizer's withheld trailing output
                let final_chunk = match canon_alg {
                    CanonicalizationAlgorithm::Simple => match finish_simple.take() {
                        Some(f) => final_chunk_simple.insert(f()),
                        None => final_chunk_simple.as_ref().unwrap(),
                    },
                    CanonicalizationAlgorithm::Relaxed => match finish_relaxed.take() {
                        Some(f) => final_chunk_relaxed.insert(f()),
                        None => final_chunk_relaxed.as_ref().unwrap(),
                    },
                };

                let _ = hasher.update(final_chunk);
            }

            results.insert(key, hasher.finish());
        }

        BodyHasherResults { results }
    }
}

pub struct BodyHasherResults {
    results: HashMap<BodyHasherKey, Result<(Box<[u8]>, usize), InsufficientInput>>,
}

impl BodyHasherResults {
    pub fn get(&self, key: &BodyHasherKey) -> Option<&Result<(Box<[u8]>, usize), InsufficientInput>> {
        self.results.get(key)
    }
}
