//! # Line ending canonicalization
//!
//! Text signatures are computed over data with `\r\n` line endings. The
//! [`CanonicalWriter`] converts bare `\n` into `\r\n` while streaming, leaving
//! existing `\r\n` pairs untouched.

use std::io::{self, Write};

const CRLF: [u8; 2] = [b'\r', b'\n'];

/// A `Write` implementation that canonicalizes line endings to `\r\n`.
///
/// The state survives across `write` calls, so a `\r` at the end of one buffer
/// and a `\n` at the start of the next are recognized as a single line break.
#[derive(Debug)]
pub struct CanonicalWriter<W> {
    inner: W,
    prev_was_cr: bool,
}

impl<W: Write> CanonicalWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            prev_was_cr: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CanonicalWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, c) in buf.iter().enumerate() {
            match c {
                b'\n' if !self.prev_was_cr => {
                    self.inner.write_all(&buf[start..i])?;
                    self.inner.write_all(&CRLF)?;
                    start = i + 1;
                }
                _ => {}
            }
            self.prev_was_cr = *c == b'\r';
        }
        self.inner.write_all(&buf[start..])?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
