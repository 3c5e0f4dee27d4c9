//! Character sources
//!
//! The pull parser consumes characters one at a time from a [`CharSource`].
//! [`StrSource`] walks an in-memory string; [`DecodingSource`] decodes a byte
//! stream after the encoding sniffer has picked a decoding.

use crate::core::encoding::{read_byte, Encoding};
use std::collections::VecDeque;
use std::io::{self, Read};

/// A stream of characters
pub trait CharSource {
    /// Next character, or `None` at end of input
    fn read_char(&mut self) -> io::Result<Option<char>>;
}

/// Characters of a borrowed string
pub struct StrSource<'a> {
    chars: std::str::Chars<'a>,
}

impl<'a> StrSource<'a> {
    pub fn new(input: &'a str) -> Self {
        StrSource { chars: input.chars() }
    }
}

impl CharSource for StrSource<'_> {
    #[inline]
    fn read_char(&mut self) -> io::Result<Option<char>> {
        Ok(self.chars.next())
    }
}

/// Decodes characters from any source implementing [`Read`].
///
/// Bytes are pulled only as far as the current character needs, so the
/// reader is left positioned right after the last character handed out.
/// Wrap unbuffered readers in [`std::io::BufReader`].
pub struct DecodingSource<R: Read> {
    reader: R,
    encoding: Encoding,
    /// Bytes consumed before decoding started (sniffing) and owed to the decoder
    replay: VecDeque<u8>,
    eof: bool,
}

impl<R: Read> DecodingSource<R> {
    /// Create a decoding source with no replayed bytes
    pub fn new(reader: R, encoding: Encoding) -> Self {
        Self::with_replay(reader, encoding, Vec::new())
    }

    /// Create a decoding source that first decodes `replay`
    pub fn with_replay(reader: R, encoding: Encoding, replay: Vec<u8>) -> Self {
        DecodingSource {
            reader,
            encoding,
            replay: replay.into(),
            eof: false,
        }
    }

    /// The decoding in use
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Get back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.replay.pop_front() {
            return Ok(Some(b));
        }
        if self.eof {
            return Ok(None);
        }
        let b = read_byte(&mut self.reader)?;
        self.eof = b.is_none();
        Ok(b)
    }
}

impl<R: Read> CharSource for DecodingSource<R> {
    fn read_char(&mut self) -> io::Result<Option<char>> {
        let encoding = self.encoding;
        encoding.decode_char(|| self.next_byte())
    }
}
