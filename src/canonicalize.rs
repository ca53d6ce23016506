//! Canonicalization of header fields and message bodies.
//!
//! See RFC 6376, section 3.4.

use crate::{
    header::{FieldBody, FieldName, HeaderFields},
    signature::CanonicalizationAlgorithm,
};
use std::collections::HashMap;

const SP: u8 = b' ';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: [u8; 2] = [CR, LF];

/// A streaming canonicalizer for message bodies.
///
/// The body is fed in as arbitrary chunks; output that cannot be settled yet
/// is withheld until data resumes, so memory use stays bounded regardless of
/// body size. Three things are withheld: a CR whose line ending may complete
/// in the next chunk, a run of whitespace that may turn out to be trailing
/// (relaxed), and completed empty lines that may turn out to end the body.
///
/// Only CRLF counts as a line ending; a lone CR or LF passes through like
/// any other byte.
pub struct BodyCanonicalizer {
    algorithm: CanonicalizationAlgorithm,
    // a CR was seen and may be the start of a CRLF
    cr_pending: bool,
    // an unemitted whitespace run on the current line (relaxed only)
    wsp_pending: bool,
    // the current line already has output
    line_dirty: bool,
    // completed empty lines not yet known to be interior
    blank_streak: usize,
    // whether any output was produced at all
    emitted_any: bool,
}

impl BodyCanonicalizer {
    pub fn new(algorithm: CanonicalizationAlgorithm) -> Self {
        Self {
            algorithm,
            cr_pending: false,
            wsp_pending: false,
            line_dirty: false,
            blank_streak: 0,
            emitted_any: false,
        }
    }

    pub fn simple() -> Self {
        Self::new(CanonicalizationAlgorithm::Simple)
    }

    pub fn relaxed() -> Self {
        Self::new(CanonicalizationAlgorithm::Relaxed)
    }

    pub fn canonicalize_chunk(&mut self, bytes: &[u8]) -> Vec<u8> {
        let relaxed = self.algorithm == CanonicalizationAlgorithm::Relaxed;

        let mut out = Vec::with_capacity(bytes.len() + 2);

        for &b in bytes {
            if self.cr_pending {
                self.cr_pending = false;
                if b == LF {
                    self.end_line(&mut out);
                    continue;
                }
                // the CR did not start a CRLF, it is ordinary content
                self.put(&mut out, CR);
            }

            if b == CR {
                self.cr_pending = true;
            } else if relaxed && matches!(b, SP | b'\t') {
                self.wsp_pending = true;
            } else {
                self.put(&mut out, b);
            }
        }

        out
    }

    pub fn finish(mut self) -> Vec<u8> {
        let mut out = vec![];

        if self.cr_pending {
            // a dangling CR at the very end is ordinary content
            self.put(&mut out, CR);
        }

        match self.algorithm {
            CanonicalizationAlgorithm::Simple => {
                if self.line_dirty {
                    // a non-empty body must end with CRLF
                    out.extend(CRLF);
                } else if !self.emitted_any {
                    // a body reduced to nothing is a single CRLF (§3.4.3)
                    out.extend(CRLF);
                }
            }
            CanonicalizationAlgorithm::Relaxed => {
                // a body reduced to nothing stays empty (§3.4.4); a final
                // line holding only whitespace keeps its line ending
                if self.line_dirty || self.wsp_pending {
                    out.extend(CRLF);
                }
            }
        }

        out
    }

    // Emits one content byte, settling everything withheld before it: empty
    // lines that turned out to be interior, then the whitespace run as one SP.
    fn put(&mut self, out: &mut Vec<u8>, b: u8) {
        for _ in 0..self.blank_streak {
            out.extend(CRLF);
        }
        self.blank_streak = 0;

        if self.wsp_pending {
            out.push(SP);
            self.wsp_pending = false;
        }

        out.push(b);
        self.line_dirty = true;
        self.emitted_any = true;
    }

    // A complete CRLF was seen. The ending of a line with content is final;
    // an empty line (including a line of only discarded whitespace) may yet
    // prove trailing and is counted instead of emitted.
    fn end_line(&mut self, out: &mut Vec<u8>) {
        self.wsp_pending = false;

        if self.line_dirty {
            out.extend(CRLF);
            self.line_dirty = false;
        } else {
            self.blank_streak += 1;
        }
    }
}

/// Produces the header canonicalization result for the given selection.
///
/// Selection is ‘bottom-up’ (RFC 6376, section 5.4.2): per name, a cursor
/// tracks the next occurrence to consume, starting at the bottom of the
/// header block and moving up each time the name recurs in the selection. A
/// name whose occurrences are exhausted contributes nothing.
pub fn canonicalize_headers(
    algorithm: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    selected_headers: &[FieldName],
) -> Vec<u8> {
    let fields = headers.as_ref();

    let mut out = vec![];
    // per-name index below which the next occurrence must be found
    let mut cursors: HashMap<&FieldName, usize> = HashMap::new();

    for selected in selected_headers {
        let end = cursors.get(&selected).copied().unwrap_or(fields.len());

        let occurrence = fields[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, (name, _))| name == selected);

        if let Some((i, (name, body))) = occurrence {
            canonicalize_header(&mut out, algorithm, name, body);
            out.extend(CRLF);
            cursors.insert(selected, i);
        }
    }

    out
}

/// Canonicalizes a single header field into the result vector, without the
/// terminating CRLF.
pub fn canonicalize_header(
    out: &mut Vec<u8>,
    algorithm: CanonicalizationAlgorithm,
    name: impl AsRef<str>,
    body: impl AsRef<[u8]>,
) {
    let name = name.as_ref();
    let body = body.as_ref();

    match algorithm {
        CanonicalizationAlgorithm::Simple => {
            out.extend(name.bytes());
            out.push(b':');
            out.extend(body);
        }
        CanonicalizationAlgorithm::Relaxed => {
            out.extend(name.to_ascii_lowercase().bytes());
            out.push(b':');
            canonicalize_field_body_relaxed(out, body);
        }
    }
}

// Unfolding plus whitespace compression amounts to joining the body's
// whitespace-separated words with single spaces: the CR and LF of a fold
// only ever occur next to WSP in a well-formed field body.
fn canonicalize_field_body_relaxed(out: &mut Vec<u8>, body: &[u8]) {
    debug_assert!(FieldBody::new(body).is_ok());

    let words = body
        .split(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .filter(|w| !w.is_empty());

    for (i, word) in words.enumerate() {
        if i != 0 {
            out.push(SP);
        }
        out.extend(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BStr;

    #[test]
    fn canonicalize_headers_relaxed_bottom_up() {
        let headers = HeaderFields::from_vec(vec![
            ("Subject".to_owned(), b"  Greetings,\r\n\tfriend  ".to_vec()),
            ("X-Tag".to_owned(), b" one".to_vec()),
            ("subject".to_owned(), b" Re:  hello".to_vec()),
            ("Comments".to_owned(), b" n/a".to_vec()),
        ])
        .unwrap();

        let selected = vec![
            FieldName::new("subject").unwrap(),
            FieldName::new("x-tag").unwrap(),
            FieldName::new("SUBJECT").unwrap(),
        ];

        assert_eq!(
            BStr::new(&canonicalize_headers(
                CanonicalizationAlgorithm::Relaxed,
                &headers,
                &selected,
            )),
            BStr::new(&b"subject:Re: hello\r\nx-tag:one\r\nsubject:Greetings, friend\r\n"[..]),
        );
    }

    #[test]
    fn canonicalize_headers_simple_verbatim() {
        let headers = HeaderFields::from_vec(vec![
            ("Comments".to_owned(), b" as  is\r\n\t(kept)".to_vec()),
            ("X-Other".to_owned(), b" y".to_vec()),
        ])
        .unwrap();

        let selected = vec![FieldName::new("comments").unwrap()];

        assert_eq!(
            BStr::new(&canonicalize_headers(
                CanonicalizationAlgorithm::Simple,
                &headers,
                &selected,
            )),
            BStr::new(&b"Comments: as  is\r\n\t(kept)\r\n"[..]),
        );
    }

    #[test]
    fn canonicalize_headers_exhausted_name() {
        let headers = HeaderFields::from_vec(vec![
            ("From".to_owned(), b" me".to_vec()),
            ("To".to_owned(), b" you".to_vec()),
        ])
        .unwrap();

        // second and third ‘to’ have no occurrence left, contribute nothing
        let selected = vec![
            FieldName::new("to").unwrap(),
            FieldName::new("to").unwrap(),
            FieldName::new("to").unwrap(),
            FieldName::new("from").unwrap(),
        ];

        assert_eq!(
            BStr::new(&canonicalize_headers(
                CanonicalizationAlgorithm::Relaxed,
                &headers,
                &selected,
            )),
            BStr::new(&b"to:you\r\nfrom:me\r\n"[..]),
        );
    }

    #[test]
    fn canonicalize_header_simple_preserves_bytes() {
        let mut out = vec![];
        canonicalize_header(
            &mut out,
            CanonicalizationAlgorithm::Simple,
            "SubJect",
            b" spaced \t out\r\n\tmore",
        );

        assert_eq!(
            BStr::new(&out),
            BStr::new(&b"SubJect: spaced \t out\r\n\tmore"[..])
        );
    }

    #[test]
    fn canonicalize_header_relaxed_idempotent() {
        let mut once = vec![];
        canonicalize_header(
            &mut once,
            CanonicalizationAlgorithm::Relaxed,
            "SubJect",
            b"  a \t b\r\n\tc ",
        );
        assert_eq!(BStr::new(&once), BStr::new(&b"subject:a b c"[..]));

        let value = &once[b"subject:".len()..];
        let mut twice = vec![];
        canonicalize_header(
            &mut twice,
            CanonicalizationAlgorithm::Relaxed,
            "subject",
            value,
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn body_simple_preserves_inner_whitespace() {
        let body = canonicalize_chunks(
            BodyCanonicalizer::simple(),
            &[b"one  two \r\n", b"\r\nthree\r\n", b"\r\n\r\n"],
        );

        assert_eq!(BStr::new(&body), BStr::new(&b"one  two \r\n\r\nthree\r\n"[..]));
    }

    #[test]
    fn body_relaxed_collapses_whitespace() {
        let body = canonicalize_chunks(
            BodyCanonicalizer::relaxed(),
            &[b"one \t two\r\n", b" three \r\n", b"\r\n"],
        );

        assert_eq!(BStr::new(&body), BStr::new(&b"one two\r\n three\r\n"[..]));
    }

    #[test]
    fn body_relaxed_split_across_chunks() {
        // line endings and whitespace runs straddling chunk boundaries
        let body = canonicalize_chunks(
            BodyCanonicalizer::relaxed(),
            &[b"a", b" ", b"\t b\r", b"\n\r", b"\nc \r", b"\n"],
        );

        assert_eq!(BStr::new(&body), BStr::new(&b"a b\r\n\r\nc\r\n"[..]));
    }

    #[test]
    fn body_stray_cr_and_lf_are_content() {
        let body = canonicalize_chunks(BodyCanonicalizer::simple(), &[b"a\rb", b"\nc"]);

        assert_eq!(BStr::new(&body), BStr::new(&b"a\rb\nc\r\n"[..]));
    }

    #[test]
    fn body_relaxed_leading_blank_lines_kept() {
        let body = canonicalize_chunks(BodyCanonicalizer::relaxed(), &[b"\r\n\r\nx"]);

        assert_eq!(BStr::new(&body), BStr::new(&b"\r\n\r\nx\r\n"[..]));
    }

    #[test]
    fn body_relaxed_wsp_only_final_line() {
        // an unterminated final line of only whitespace keeps a line ending
        let body = canonicalize_chunks(BodyCanonicalizer::relaxed(), &[b"x\r\n", b" "]);

        assert_eq!(BStr::new(&body), BStr::new(&b"x\r\n\r\n"[..]));
    }

    #[test]
    fn body_canonicalization_empty_body() {
        assert_eq!(canonicalize_chunks(BodyCanonicalizer::simple(), &[]), b"\r\n");
        assert_eq!(canonicalize_chunks(BodyCanonicalizer::relaxed(), &[]), b"");
    }

    #[test]
    fn body_simple_all_blank_equals_empty() {
        // a body of only empty lines reduces to the canonical empty body
        for chunks in [&[][..], &[&b"\r\n"[..]][..], &[&b"\r\n"[..], &b"\r\n"[..]][..]] {
            let body = canonicalize_chunks(BodyCanonicalizer::simple(), chunks);
            assert_eq!(body, b"\r\n");
        }

        for chunks in [&[][..], &[&b"\r\n\r\n"[..]][..]] {
            let body = canonicalize_chunks(BodyCanonicalizer::relaxed(), chunks);
            assert_eq!(body, b"");
        }
    }

    #[test]
    fn body_canonicalization_trailing_lines_collapse() {
        for chunks in [
            &[&b"a\r\n"[..]][..],
            &[&b"a\r\n"[..], &b"\r\n"[..]][..],
            &[&b"a\r\n"[..], &b"\r\n"[..], &b"\r\n\r\n"[..]][..],
        ] {
            let body = canonicalize_chunks(BodyCanonicalizer::simple(), chunks);
            assert_eq!(body, b"a\r\n");
        }
    }

    #[test]
    fn body_canonicalization_idempotent() {
        for alg in [
            CanonicalizationAlgorithm::Simple,
            CanonicalizationAlgorithm::Relaxed,
        ] {
            let once = canonicalize_chunks(
                BodyCanonicalizer::new(alg),
                &[b"x  y \r\n", b"z\r\n\r\n"],
            );
            let twice = canonicalize_chunks(BodyCanonicalizer::new(alg), &[&once]);
            assert_eq!(once, twice);
        }
    }

    fn canonicalize_chunks(mut bc: BodyCanonicalizer, chunks: &[&[u8]]) -> Vec<u8> {
        let mut result = vec![];
        for c in chunks {
            result.extend(bc.canonicalize_chunk(c));
        }
        result.extend(bc.finish());
        result
    }
}
