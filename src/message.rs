//! Reading RFC 5322 message streams.
//!
//! The splitter reads an octet stream, yields the ordered header fields with
//! their original bytes, and leaves the reader positioned at the first body
//! octet. Input may use CRLF or bare LF line endings; both are normalized to
//! CRLF before any canonicalization sees them.

use crate::header::{FieldBody, FieldName, HeaderFields};
use std::{
    fmt::{self, Display, Formatter},
    io::{self, BufRead, Read, Write},
};

/// An error that occurs when reading a message.
#[derive(Debug)]
pub enum MessageError {
    Io(io::Error),
    /// A header field line without a colon, or an otherwise ill-formed
    /// header block.
    MalformedMessage,
}

impl Display for MessageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedMessage => write!(f, "malformed message"),
        }
    }
}

impl std::error::Error for MessageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::MalformedMessage => None,
        }
    }
}

impl From<io::Error> for MessageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Reads the header block from the given reader.
///
/// Consumes input up to and including the empty separator line; the reader is
/// left at the first body octet. A message that ends within the header block
/// yields the fields seen so far and an empty body.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<HeaderFields, MessageError> {
    let mut fields: Vec<(FieldName, Vec<u8>)> = vec![];
    let mut line = vec![];

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }

        // strip the line ending, whether CRLF or bare LF
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        if line.is_empty() {
            break;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // continuation line, refold with CRLF
            let (_, value) = fields.last_mut().ok_or(MessageError::MalformedMessage)?;
            value.extend(b"\r\n");
            value.extend(&line[..]);
        } else {
            let i = line
                .iter()
                .position(|&b| b == b':')
                .ok_or(MessageError::MalformedMessage)?;

            let name = std::str::from_utf8(&line[..i])
                .map_err(|_| MessageError::MalformedMessage)?;
            let name = FieldName::new(name).map_err(|_| MessageError::MalformedMessage)?;

            fields.push((name, line[(i + 1)..].to_vec()));
        }
    }

    let fields: Vec<_> = fields
        .into_iter()
        .map(|(name, value)| {
            FieldBody::new(value)
                .map(|body| (name, body))
                .map_err(|_| MessageError::MalformedMessage)
        })
        .collect::<Result<_, _>>()?;

    HeaderFields::new(fields).map_err(|_| MessageError::MalformedMessage)
}

/// Writes a header block back out, fields in order, each terminated with
/// CRLF. Does not write the empty separator line.
pub fn write_header_block<W: Write>(writer: &mut W, headers: &HeaderFields) -> io::Result<()> {
    for (name, body) in headers.as_ref() {
        writer.write_all(name.as_ref().as_bytes())?;
        writer.write_all(b":")?;
        writer.write_all(body.as_ref())?;
        writer.write_all(b"\r\n")?;
    }
    Ok(())
}

/// A chunk-wise line ending normalizer: rewrites bare LF as CRLF, leaves CRLF
/// and stray CR untouched. Safe to feed arbitrary chunk boundaries.
#[derive(Default)]
pub struct LineEndings {
    last_was_cr: bool,
}

impl LineEndings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_chunk(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());

        for &b in chunk {
            if b == b'\n' && !self.last_was_cr {
                out.push(b'\r');
            }
            out.push(b);
            self.last_was_cr = b == b'\r';
        }

        out
    }
}

/// Reads the remaining input to EOF, discarding it.
///
/// Used to keep upstream pipes from stalling once processing is complete.
pub fn drain<R: Read>(reader: &mut R) -> io::Result<u64> {
    io::copy(reader, &mut io::sink())
}
