//! Writable sinks that can be finalized.
//!
//! OpenPGP output is produced by a chain of nested writers (literal data inside
//! compression inside encryption). Every layer has framing to emit once the
//! input ends, so the chain is built from [`Sink`]s, which are closed explicitly
//! and in order, outermost layer last.

use std::io::{self, Write};

use digest::DynDigest;

use crate::errors::Result;

/// A [`Write`] that must be closed to finalize its output.
pub trait Sink: Write {
    /// Flushes any pending framing and closes the layers below this one.
    fn close(self: Box<Self>) -> Result<()>;
}

/// The type returned by all streaming entry points.
pub type BoxSink<'a> = Box<dyn Sink + 'a>;

impl<'a> Sink for BoxSink<'a> {
    fn close(self: Box<Self>) -> Result<()> {
        (*self).close()
    }
}

/// Forwards writes, but closing only flushes the wrapped writer.
///
/// Used at the bottom of every chain, so callers keep ownership of their
/// destination stream.
#[derive(Debug)]
pub struct NoOpCloser<W> {
    inner: W,
}

impl<W: Write> NoOpCloser<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for NoOpCloser<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Sink for NoOpCloser<W> {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Feeds everything written into a digest, then forwards it unchanged.
pub struct HashWriter<W> {
    hasher: Box<dyn DynDigest>,
    inner: W,
}

impl<W: Write> HashWriter<W> {
    pub fn new(hasher: Box<dyn DynDigest>, inner: W) -> Self {
        Self { hasher, inner }
    }

    /// Splits into the digest state and the wrapped writer.
    pub fn into_parts(self) -> (Box<dyn DynDigest>, W) {
        (self.hasher, self.inner)
    }
}

impl<W: Write> Write for HashWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Temporary wrapper around `Box<dyn DynDigest>` to implement `io::Write`.
pub(crate) struct WriteHasher<'a>(pub(crate) &'a mut Box<dyn DynDigest>);

impl Write for WriteHasher<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let digest = &mut **self.0;
        DynDigest::update(digest, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::HashAlgorithm;

    #[test]
    fn test_hash_writer_tees() {
        let hasher = HashAlgorithm::Sha256.new_hasher().unwrap();
        let mut out = Vec::new();
        let mut w = HashWriter::new(hasher, &mut out);
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        let (hasher, _) = w.into_parts();

        assert_eq!(out, b"hello world");
        assert_eq!(
            hasher.finalize().to_vec(),
            HashAlgorithm::Sha256.digest(b"hello world").unwrap()
        );
    }

    #[test]
    fn test_noop_closer_keeps_stream() {
        let mut out = Vec::new();
        let mut sink: BoxSink<'_> = Box::new(NoOpCloser::new(&mut out));
        sink.write_all(b"abc").unwrap();
        sink.close().unwrap();
        assert_eq!(out, b"abc");
    }
}
