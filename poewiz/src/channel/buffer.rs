//! Pattern buffer with tail search and streaming ANSI stripping.
//!
//! Only the last `search_depth` bytes are searched for the prompt, so a long
//! table does not make every read quadratic.

use memchr::memmem;
use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Collects printable output, dropping escape sequences.
struct Printable<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for Printable<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out
            .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }
}

/// Buffer for accumulating CLI output and searching it for the prompt.
pub struct PatternBuffer {
    buffer: Vec<u8>,
    search_depth: usize,
    /// Kept across chunks; an escape sequence may straddle two reads.
    parser: Parser,
}

impl PatternBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let mut printable = Printable {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut printable, data);
    }

    fn tail(&self) -> &[u8] {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        &self.buffer[start..]
    }

    /// Search the last `search_depth` bytes for `pattern`.
    ///
    /// Offsets are relative to the start of the tail, not the full buffer.
    pub fn search_tail(&self, pattern: &Regex) -> Option<regex::bytes::Match<'_>> {
        pattern.find(self.tail())
    }

    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Byte offset in the full buffer where the last tail match ends.
    pub fn tail_match_end(&self, pattern: &Regex) -> Option<usize> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        pattern
            .find_iter(self.tail())
            .last()
            .map(|m| start + m.end())
    }

    /// Whether the whole buffer contains `needle`, ignoring ASCII case.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        let haystack = self.buffer.to_ascii_lowercase();
        memmem::find(&haystack, needle.to_ascii_lowercase().as_bytes()).is_some()
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.parser = Parser::new();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
