//! Forward-only views over large objects.
//!
//! A stream borrows the Variant (or backend cell) it was obtained from, so it
//! cannot be read after the owning row has been refreshed or released.

use std::{
    borrow::Cow,
    io::{self, BufRead, Read},
};

/// Single-pass byte stream over a BLOB.
pub struct BlobStream<'a> {
    data: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> BlobStream<'a> {
    pub fn new<T: Into<Cow<'a, [u8]>>>(data: T) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Total length of the object in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Read for BlobStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (&self.data[self.pos..]).read(buf)?;
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for BlobStream<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}

impl std::fmt::Debug for BlobStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("len", &self.len())
            .field("pos", &self.pos)
            .finish()
    }
}

/// Single-pass character stream over a MEMO (CLOB).
///
/// Reading through [`Read`] yields UTF-8 bytes; [`MemoStream::next_chunk`]
/// yields whole characters.
pub struct MemoStream<'a> {
    data: Cow<'a, str>,
    pos: usize,
}

impl<'a> MemoStream<'a> {
    pub fn new<T: Into<Cow<'a, str>>>(data: T) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Total length of the text in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns up to `max_bytes` of the remaining text, never splitting a
    /// character. At least one character is returned while text remains.
    pub fn next_chunk(&mut self, max_bytes: usize) -> Option<&str> {
        // A byte-wise read may have stopped inside a character.
        while !self.data.is_char_boundary(self.pos) {
            self.pos += 1;
        }
        let rest = &self.data[self.pos..];
        let first = rest.chars().next()?;
        let mut end = max_bytes.min(rest.len()).max(first.len_utf8());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let start = self.pos;
        self.pos += end;
        Some(&self.data[start..self.pos])
    }
}

impl Read for MemoStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (&self.data.as_bytes()[self.pos..]).read(buf)?;
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for MemoStream<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data.as_bytes()[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}

impl std::fmt::Debug for MemoStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoStream")
            .field("len", &self.len())
            .field("pos", &self.pos)
            .finish()
    }
}
