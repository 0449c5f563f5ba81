//! Stage 1: Reader
//!
//! The reader turns the input into a stream of characters with lookahead.
//! It performs:
//! - Incremental UTF-8 decoding of byte sources in fixed-size chunks
//! - Validation of every character against the printable set
//! - Line and column tracking for marks
//!
//! Once the input is exhausted a NUL sentinel is appended, so lookahead
//! past the end always yields `'\0'`.

use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Mark};

const CHUNK_SIZE: usize = 1024;

/// Longest snippet kept on a mark after the position.
const SNIPPET_REACH: usize = 40;

enum Source<'a> {
    Str(&'a str),
    Stream {
        inner: Box<dyn Read + 'a>,
        pending: Vec<u8>,
    },
}

/// Buffered character source.
pub struct Reader<'a> {
    name: Arc<str>,
    source: Source<'a>,
    buffer: Vec<char>,
    pointer: usize,
    /// Characters decoded so far, including those dropped from the buffer.
    decoded: usize,
    eof: bool,
    error: Option<Error>,
    index: usize,
    line: usize,
    column: usize,
}

/// Check whether a character may appear in a document.
pub fn is_printable(ch: char) -> bool {
    matches!(ch,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{7E}' | '\u{85}'
        | '\u{A0}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

impl<'a> Reader<'a> {
    /// Read from an in-memory string.
    pub fn from_str(input: &'a str) -> Self {
        Self::new(Source::Str(input), "<string>")
    }

    /// Read from a byte stream, decoding UTF-8 as chunks arrive.
    pub fn from_reader<R: Read + 'a>(input: R) -> Self {
        Self::new(
            Source::Stream {
                inner: Box::new(input),
                pending: Vec::new(),
            },
            "<reader>",
        )
    }

    fn new(source: Source<'a>, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            source,
            buffer: Vec::new(),
            pointer: 0,
            decoded: 0,
            eof: false,
            error: None,
            index: 0,
            line: 0,
            column: 0,
        }
    }

    /// Replace the source name reported in marks.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Arc::from(name);
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The character `k` positions ahead of the current one.
    pub fn peek(&mut self, k: usize) -> char {
        self.update(k + 1);
        self.buffer.get(self.pointer + k).copied().unwrap_or('\0')
    }

    /// The next `n` characters (fewer at the end of input).
    pub fn prefix(&mut self, n: usize) -> String {
        self.update(n);
        let end = (self.pointer + n).min(self.buffer.len());
        self.buffer[self.pointer..end].iter().collect()
    }

    /// Advance `n` characters, updating line and column.
    pub fn forward(&mut self, n: usize) {
        self.update(n + 1);
        for _ in 0..n {
            let Some(&ch) = self.buffer.get(self.pointer) else {
                break;
            };
            if ch == '\0' && self.pointer + 1 == self.buffer.len() && self.eof {
                break;
            }
            self.pointer += 1;
            self.index += 1;
            let next = self.buffer.get(self.pointer).copied().unwrap_or('\0');
            if ch == '\n' || ch == '\u{85}' || (ch == '\r' && next != '\n') {
                self.line += 1;
                self.column = 0;
            } else if ch != '\u{FEFF}' {
                self.column += 1;
            }
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// The current position.
    pub fn mark(&self) -> Mark {
        Mark::new(self.name.clone(), self.index, self.line, self.column)
    }

    /// The current position with the surrounding line attached.
    pub fn mark_with_snippet(&self) -> Mark {
        let is_break = |c: char| matches!(c, '\0' | '\r' | '\n' | '\u{85}');
        let start = self.pointer - self.column.min(self.pointer);
        let mut end = self.pointer;
        while end < self.buffer.len() && end - self.pointer < SNIPPET_REACH && !is_break(self.buffer[end])
        {
            end += 1;
        }
        let snippet: String = self.buffer[start..end].iter().collect();
        let mut mark = self.mark();
        mark.snippet = Some(Arc::from(snippet.as_str()));
        mark
    }

    /// The first decoding or validation failure, if one has happened.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    fn update(&mut self, length: usize) {
        if self.buffer.len() - self.pointer >= length || self.eof {
            return;
        }
        if self.pointer > 2 * CHUNK_SIZE {
            // Keep some history for snippets.
            let drop = self.pointer - CHUNK_SIZE;
            self.buffer.drain(..drop);
            self.pointer -= drop;
        }
        while !self.eof && self.buffer.len() - self.pointer < length {
            self.fill();
        }
    }

    fn fill(&mut self) {
        let chunk = match self.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                self.finish();
                return;
            }
            Err(err) => {
                self.error = Some(err);
                self.finish();
                return;
            }
        };
        for ch in chunk.chars() {
            if !is_printable(ch) {
                self.error = Some(Error::Reader {
                    name: self.name.clone(),
                    position: self.decoded,
                    found: format!("#x{:04x}", ch as u32),
                    reason: "special characters are not allowed",
                });
                self.finish();
                return;
            }
            self.buffer.push(ch);
            self.decoded += 1;
        }
    }

    fn finish(&mut self) {
        self.buffer.push('\0');
        self.eof = true;
    }

    fn next_chunk(&mut self) -> Result<Option<String>, Error> {
        match &mut self.source {
            Source::Str(rest) => {
                let text: &'a str = *rest;
                if text.is_empty() {
                    return Ok(None);
                }
                let mut end = text.len().min(CHUNK_SIZE);
                while !text.is_char_boundary(end) {
                    end += 1;
                }
                let (chunk, tail) = text.split_at(end);
                *rest = tail;
                Ok(Some(chunk.to_string()))
            }
            Source::Stream { inner, pending } => {
                let mut bytes = [0u8; CHUNK_SIZE];
                let read = loop {
                    match inner.read(&mut bytes) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(Error::Io(e)),
                    }
                };
                if read == 0 {
                    if let Some(&byte) = pending.first() {
                        return Err(Error::Reader {
                            name: self.name.clone(),
                            position: self.decoded,
                            found: format!("#x{:02x}", byte),
                            reason: "incomplete utf-8 sequence at end of input",
                        });
                    }
                    return Ok(None);
                }
                pending.extend_from_slice(&bytes[..read]);
                let valid = match std::str::from_utf8(pending) {
                    Ok(_) => pending.len(),
                    Err(e) => {
                        if e.error_len().is_some() {
                            let position = self.decoded
                                + String::from_utf8_lossy(&pending[..e.valid_up_to()])
                                    .chars()
                                    .count();
                            return Err(Error::Reader {
                                name: self.name.clone(),
                                position,
                                found: format!("#x{:02x}", pending[e.valid_up_to()]),
                                reason: "invalid utf-8 byte",
                            });
                        }
                        e.valid_up_to()
                    }
                };
                let tail = pending.split_off(valid);
                let chunk = String::from_utf8(std::mem::replace(pending, tail))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                Ok(Some(chunk))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_past_end_is_nul() {
        let mut r = Reader::from_str("ab");
        assert_eq!(r.peek(0), 'a');
        assert_eq!(r.peek(1), 'b');
        assert_eq!(r.peek(2), '\0');
        assert_eq!(r.peek(10), '\0');
    }

    #[test]
    fn test_forward_tracks_lines() {
        let mut r = Reader::from_str("a\r\nb\rc\nd\u{85}e");
        r.forward(3);
        assert_eq!((r.mark().line, r.mark().column), (1, 0));
        r.forward(2);
        assert_eq!((r.mark().line, r.mark().column), (2, 0));
        r.forward(2);
        assert_eq!((r.mark().line, r.mark().column), (3, 0));
        r.forward(2);
        assert_eq!((r.mark().line, r.mark().column), (4, 0));
        assert_eq!(r.peek(0), 'e');
    }

    #[test]
    fn test_prefix() {
        let mut r = Reader::from_str("--- x");
        assert_eq!(r.prefix(3), "---");
        r.forward(4);
        assert_eq!(r.prefix(3), "x\0");
    }

    #[test]
    fn test_invalid_character() {
        let mut r = Reader::from_str("ok\u{7}");
        assert_eq!(r.peek(1), 'k');
        assert_eq!(r.peek(2), '\0');
        match r.take_error() {
            Some(Error::Reader { position, found, .. }) => {
                assert_eq!(position, 2);
                assert_eq!(found, "#x0007");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stream_split_multibyte() {
        // A reader that hands out one byte at a time splits every sequence.
        struct OneByte<'b>(&'b [u8]);
        impl Read for OneByte<'_> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }
        let mut r = Reader::from_reader(OneByte("é✓".as_bytes()));
        assert_eq!(r.peek(0), 'é');
        assert_eq!(r.peek(1), '✓');
        assert_eq!(r.peek(2), '\0');
        assert!(r.take_error().is_none());
    }

    #[test]
    fn test_stream_invalid_utf8() {
        let bytes: &[u8] = &[b'a', 0xff, b'b'];
        let mut r = Reader::from_reader(bytes);
        assert_eq!(r.peek(0), '\0');
        assert!(matches!(r.take_error(), Some(Error::Reader { position: 1, .. })));
    }

    #[test]
    fn test_long_input_crosses_chunks() {
        let text = "x".repeat(5000) + "\ny";
        let mut r = Reader::from_str(&text);
        r.forward(5001);
        assert_eq!(r.peek(0), 'y');
        assert_eq!((r.mark().line, r.mark().column), (1, 0));
    }
}
