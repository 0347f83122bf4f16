//! Streaming packet bodies of unknown length.

use std::io::{self, Write};

use log::trace;

use crate::errors::Result;
use crate::sink::{BoxSink, Sink};
use crate::types::{PacketLength, Tag};

/// Size of every partial chunk, `2^13` octets.
const CHUNK_SIZE: usize = 8192;

/// Writes a packet body as a sequence of partial body chunks.
///
/// All chunks but the last carry exactly [`CHUNK_SIZE`] octets; the final chunk
/// uses a fixed length, possibly zero, and is emitted by [`finish`](Self::finish).
#[derive(derive_more::Debug)]
pub struct PartialBodyWriter<W> {
    #[debug(skip)]
    inner: W,
    #[debug("{} buffered", buffer.len())]
    buffer: Vec<u8>,
}

impl<W: Write> PartialBodyWriter<W> {
    /// Writes the packet tag and starts the body.
    pub fn new(tag: Tag, mut inner: W) -> Result<Self> {
        inner.write_all(&[tag.encode()])?;
        Ok(PartialBodyWriter {
            inner,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    fn write_chunk(&mut self) -> io::Result<()> {
        trace!("partial body chunk of {} octets", self.buffer.len());
        let len = PacketLength::Partial(CHUNK_SIZE as u32);
        len.to_writer_new(&mut self.inner)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Writes the final chunk and returns the wrapped writer.
    pub fn finish(mut self) -> Result<W> {
        let len = PacketLength::Fixed(self.buffer.len().try_into()?);
        len.to_writer_new(&mut self.inner)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(self.inner)
    }
}

impl<W: Write> Write for PartialBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(CHUNK_SIZE - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == CHUNK_SIZE {
            self.write_chunk()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> Sink for PartialBodyWriter<BoxSink<'a>> {
    fn close(self: Box<Self>) -> Result<()> {
        let inner = self.finish()?;
        inner.close()
    }
}
