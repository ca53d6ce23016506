use crate::crypto::HashAlgorithm;
use digest::{Digest, DynDigest};
use sha1::Sha1;
use sha2::Sha256;

/// Computes the digest of the given data.
pub fn digest(hash_alg: HashAlgorithm, data: &[u8]) -> Box<[u8]> {
    digest_slices(hash_alg, [data])
}

/// Computes the digest of the concatenation of the given data slices.
pub fn digest_slices<'a>(
    hash_alg: HashAlgorithm,
    data: impl IntoIterator<Item = impl AsRef<[u8]>>,
) -> Box<[u8]> {
    fn inner<D: Digest>(data: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Box<[u8]> {
        let mut hasher = D::new();
        for d in data {
            hasher.update(d.as_ref());
        }
        Box::from(&hasher.finalize()[..])
    }

    match hash_alg {
        HashAlgorithm::Sha256 => inner::<Sha256>(data),
        HashAlgorithm::Sha1 => inner::<Sha1>(data),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InsufficientInput;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HashStatus {
    /// The input was digested entirely.
    AllConsumed,
    /// Part of the input fell beyond the length limit and was ignored.
    Truncated,
}

/// A hasher that digests at most a fixed number of input bytes.
///
/// This implements the *l=* body length limit: with a length, input beyond the
/// limit is discarded; finalizing with less than `length` bytes written is an
/// error.
pub struct CountingHasher {
    digest: Box<dyn DynDigest + Send>,
    length: Option<usize>,
    bytes_written: usize,
}

impl CountingHasher {
    pub fn new(hash_alg: HashAlgorithm, length: Option<usize>) -> Self {
        let digest: Box<dyn DynDigest + Send> = match hash_alg {
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
        };

        Self {
            digest,
            length,
            bytes_written: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) -> HashStatus {
        match self.length {
            Some(len) => {
                let remaining = len - self.bytes_written;

                if remaining >= bytes.len() {
                    self.digest.update(bytes);
                    self.bytes_written += bytes.len();
                    HashStatus::AllConsumed
                } else {
                    self.digest.update(&bytes[..remaining]);
                    self.bytes_written += remaining;
                    HashStatus::Truncated
                }
            }
            None => {
                self.digest.update(bytes);
                self.bytes_written += bytes.len();
                HashStatus::AllConsumed
            }
        }
    }

    pub fn finish(self) -> Result<(Box<[u8]>, usize), InsufficientInput> {
        if self.length.is_some() && !self.is_done() {
            return Err(InsufficientInput);
        }

        Ok((self.digest.finalize(), self.bytes_written))
    }

    pub fn is_done(&self) -> bool {
        matches!(self.length, Some(len) if len == self.bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::encode_base64;

    #[test]
    fn counting_hasher_ok() {
        let mut hasher = CountingHasher::new(HashAlgorithm::Sha256, None);
        assert!(!hasher.is_done());
        assert_eq!(hasher.update(b"abc"), HashStatus::AllConsumed);
        assert!(!hasher.is_done());
        assert_eq!(hasher.finish().unwrap().1, 3);

        let mut hasher = CountingHasher::new(HashAlgorithm::Sha256, Some(3));
        assert_eq!(hasher.update(b"ab"), HashStatus::AllConsumed);
        assert!(!hasher.is_done());
        assert_eq!(hasher.update(b"c"), HashStatus::AllConsumed);
        assert!(hasher.is_done());
        assert_eq!(hasher.update(b"de"), HashStatus::Truncated);
        assert_eq!(hasher.finish().unwrap().1, 3);

        let mut hasher = CountingHasher::new(HashAlgorithm::Sha256, Some(3));
        assert_eq!(hasher.update(b"ab"), HashStatus::AllConsumed);
        assert_eq!(hasher.finish(), Err(InsufficientInput));
    }

    #[test]
    fn counting_hasher_crlf_body() {
        let mut hasher = CountingHasher::new(HashAlgorithm::Sha256, None);

        hasher.update(b"\r\n");

        let (hash, len) = hasher.finish().unwrap();

        // See RFC 6376, §3.4.3:
        assert_eq!(
            encode_base64(&hash),
            "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY="
        );
        assert_eq!(len, 2);
    }

    #[test]
    fn counting_hasher_empty_body() {
        let hasher = CountingHasher::new(HashAlgorithm::Sha256, None);

        let (hash, len) = hasher.finish().unwrap();

        // See RFC 6376, §3.4.4:
        assert_eq!(
            encode_base64(&hash),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(len, 0);
    }
}
