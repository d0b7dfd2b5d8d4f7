//! Line readers
//!
//! A [`LineReader`] yields physical lines one at a time, each including the
//! trailing newline it consumed. Keeping the newline lets the scanner account
//! for byte offsets exactly, which the rule indexes depend on.

use std::fs;
use std::path::Path;

/// Forward-only source of physical lines.
pub trait LineReader {
    /// Return the next line including its trailing newline, or `None` when
    /// the source is exhausted.
    fn read_line(&mut self) -> Option<&str>;
}

fn next_line(text: &str, pos: &mut usize) -> Option<(usize, usize)> {
    if *pos >= text.len() {
        return None;
    }
    let start = *pos;
    let end = match text[start..].find('\n') {
        Some(i) => start + i + 1,
        None => text.len(),
    };
    *pos = end;
    Some((start, end))
}

// =============================================================================
// String Reader
// =============================================================================

/// Reads lines from an in-memory buffer.
pub struct StringLineReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> StringLineReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl LineReader for StringLineReader<'_> {
    fn read_line(&mut self) -> Option<&str> {
        next_line(self.text, &mut self.pos).map(|(start, end)| &self.text[start..end])
    }
}

// =============================================================================
// File Reader
// =============================================================================

/// Reads lines from a file buffered whole into memory.
///
/// The file handle is released as soon as the buffer is read, so there is
/// nothing to leak on any exit path afterwards.
pub struct FileLineReader {
    text: String,
    pos: usize,
}

impl FileLineReader {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self { text, pos: 0 })
    }
}

impl LineReader for FileLineReader {
    fn read_line(&mut self) -> Option<&str> {
        next_line(&self.text, &mut self.pos).map(|(start, end)| &self.text[start..end])
    }
}
