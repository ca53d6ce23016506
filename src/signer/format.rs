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

//! Formatting of the generated `DKIM-Signature` header.
//!
//! Tags are emitted in the order `v, a, c, d, s, i, q, t, x, h, bh, b`, with
//! `b=` last, and the value is folded with CRLF-HTAB continuations so lines
//! stay within RFC 5322 limits. Offsets are in characters, not bytes.

use crate::{
    header::FieldName,
    signature::{Canonicalization, DkimSignature, DomainName, Identity, Selector, SignatureAlgorithm},
    util::{encode_base64, CanonicalStr},
};

/// Default target line width for generated headers.
pub const LINE_WIDTH: usize = 78;

const INDENT: &str = "\t";

/// DKIM signature data that does not yet carry the cryptographic signature.
pub struct UnsignedDkimSignature {
    pub algorithm: SignatureAlgorithm,
    pub body_hash: Box<[u8]>,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    pub signed_headers: Box<[FieldName]>,
    pub identity: Option<Identity>,
    pub selector: Selector,
    pub query_methods: Vec<Box<str>>,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
}

impl UnsignedDkimSignature {
    /// Formats the header value with the *b=* tag present but empty.
    /// Returns the formatted value and the index where signature data is to
    /// be inserted.
    pub fn format_without_signature(
        &self,
        header_name: &str,
        line_width: usize,
    ) -> (String, usize) {
        let mut fmt = HeaderFormatter::new(header_name, line_width);

        fmt.push_tag("v", "1");
        fmt.push_tag("a", self.algorithm.canonical_str());
        fmt.push_tag("c", self.canonicalization.canonical_str());
        fmt.push_tag("d", self.domain.as_ref());
        fmt.push_tag("s", self.selector.as_ref());

        if let Some(identity) = &self.identity {
            fmt.push_tag("i", &identity.to_string());
        }
        if !self.query_methods.is_empty() {
            fmt.push_tag("q", &self.query_methods.join(":"));
        }
        if let Some(t) = self.timestamp {
            fmt.push_tag("t", &t.to_string());
        }
        if let Some(x) = self.expiration {
            fmt.push_tag("x", &x.to_string());
        }

        fmt.push_header_names_tag(&self.signed_headers);
        fmt.push_base64_tag("bh", &self.body_hash);

        // b= comes last; its value is inserted after signing
        fmt.push_piece("b=");
        let insertion_index = fmt.output.len();

        (fmt.output, insertion_index)
    }

    pub fn into_signature(self, signature_data: Box<[u8]>, body_length: Option<u64>) -> DkimSignature {
        DkimSignature {
            algorithm: self.algorithm,
            signature_data,
            body_hash: self.body_hash,
            canonicalization: self.canonicalization,
            domain: self.domain,
            signed_headers: self.signed_headers,
            identity: self.identity,
            body_length,
            selector: self.selector,
            timestamp: self.timestamp,
            expiration: self.expiration,
        }
    }
}

// Incremental formatter keeping track of the current line's width in
// characters. The header name itself occupies the start of the first line.
struct HeaderFormatter {
    output: String,
    col: usize,
    width: usize,
}

impl HeaderFormatter {
    fn new(header_name: &str, width: usize) -> Self {
        Self {
            output: String::new(),
            // the cursor starts just past ‘name:’
            col: header_name.chars().count() + 1,
            width,
        }
    }

    fn push_tag(&mut self, name: &str, value: &str) {
        let mut piece = String::with_capacity(name.len() + value.len() + 2);
        piece.push_str(name);
        piece.push('=');
        piece.push_str(value);
        piece.push(';');

        self.push_piece(&piece);
    }

    // Writes a piece preceded by a space, folding first if it does not fit.
    fn push_piece(&mut self, piece: &str) {
        let len = piece.chars().count();

        if self.col + 1 + len <= self.width {
            self.output.push(' ');
            self.col += 1 + len;
        } else {
            self.output.push_str("\r\n");
            self.output.push_str(INDENT);
            self.col = INDENT.len() + len;
        }

        self.output.push_str(piece);
    }

    // Appends directly after the previous output, folding if needed. Used
    // where FWS is permitted mid-value.
    fn push_continuation(&mut self, piece: &str) {
        let len = piece.chars().count();

        if self.col + len > self.width {
            self.output.push_str("\r\n");
            self.output.push_str(INDENT);
            self.col = INDENT.len();
        }

        self.output.push_str(piece);
        self.col += len;
    }

    // h= folds at colon boundaries, where FWS is allowed.
    fn push_header_names_tag(&mut self, names: &[FieldName]) {
        debug_assert!(!names.is_empty());

        let mut names = names.iter().map(|n| n.as_ref());

        let first = names.next().unwrap();
        self.push_piece(&format!("h={first}"));

        for name in names {
            self.push_continuation(&format!(":{name}"));
        }

        self.output.push(';');
        self.col += 1;
    }

    fn push_base64_tag(&mut self, name: &str, data: &[u8]) {
        self.push_piece(&format!("{name}="));
        self.push_base64_data(&encode_base64(data));
        self.output.push(';');
        self.col += 1;
    }

    // Base64 data may be broken by FWS anywhere; fill the current line, then
    // continue in width-sized chunks on indented lines.
    fn push_base64_data(&mut self, mut s: &str) {
        // Base64 data is plain ASCII, characters equal bytes here.
        while !s.is_empty() {
            if self.col >= self.width {
                self.output.push_str("\r\n");
                self.output.push_str(INDENT);
                self.col = INDENT.len();
            }

            let take = (self.width - self.col).min(s.len());
            let (chunk, rest) = s.split_at(take);
            self.output.push_str(chunk);
            self.col += take;
            s = rest;
        }
    }
}

/// Inserts Base64-encoded signature data at the insertion index of a header
/// value formatted by
/// [`format_without_signature`][UnsignedDkimSignature::format_without_signature].
pub fn insert_signature_data(
    formatted_header: &mut String,
    insertion_index: usize,
    header_name: &str,
    signature_data: &[u8],
    line_width: usize,
) {
    debug_assert!(insertion_index <= formatted_header.len());

    let s = encode_base64(signature_data);

    // Recover the column at the insertion point.
    let before = &formatted_header[..insertion_index];
    let mut lines = before.rsplit("\r\n");
    let last_line = lines.next().unwrap();
    let col = if lines.next().is_some() {
        last_line.chars().count()
    } else {
        header_name.chars().count() + 1 + last_line.chars().count()
    };

    let mut fmt = HeaderFormatter {
        output: String::with_capacity(s.len() + 16),
        col,
        width: line_width,
    };
    fmt.push_base64_data(&s);

    formatted_header.insert_str(insertion_index, &fmt.output);
}
