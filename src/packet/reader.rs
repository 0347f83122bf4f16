//! Pull parser over a stream of packets.

use std::io::{self, Read};

use bytes::Bytes;
use log::{debug, warn};

use crate::errors::{Error, Result};
use crate::packet::{header::PacketHeader, Packet};
use crate::types::{PacketLength, Tag};

/// Reads packets one at a time, with a single slot of push-back.
///
/// Packets with unsupported content are skipped, unless they carry message
/// data, in which case the error is returned. Unsupported keys are returned as
/// [`Packet::UnsupportedKey`], so entity boundaries survive. Errors reading a
/// packet header end the stream.
#[derive(derive_more::Debug)]
pub struct PacketReader<R> {
    #[debug(skip)]
    inner: R,
    peeked: Option<Packet>,
    done: bool,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        PacketReader {
            inner,
            peeked: None,
            done: false,
        }
    }

    /// Pushes `packet` back, so the next call to `next` returns it again.
    pub fn unread(&mut self, packet: Packet) {
        debug_assert!(self.peeked.is_none(), "only one packet can be unread");
        self.peeked = Some(packet);
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_body(&mut self, length: PacketLength) -> Result<Bytes> {
        let mut body = Vec::new();
        match length {
            PacketLength::Fixed(len) => self.read_exact_len(len, &mut body)?,
            PacketLength::Indeterminate => {
                self.inner.read_to_end(&mut body)?;
            }
            PacketLength::Partial(first) => {
                let mut len = first;
                loop {
                    self.read_exact_len(len, &mut body)?;
                    match PacketLength::try_from_reader(&mut self.inner).map_err(truncated)? {
                        PacketLength::Partial(next) => len = next,
                        PacketLength::Fixed(last) => {
                            self.read_exact_len(last, &mut body)?;
                            break;
                        }
                        PacketLength::Indeterminate => {
                            structural_err!("indeterminate length inside a partial body")
                        }
                    }
                }
            }
        }
        Ok(body.into())
    }

    fn read_exact_len(&mut self, len: u32, body: &mut Vec<u8>) -> Result<()> {
        let read = (&mut self.inner).take(len.into()).read_to_end(body)?;
        if read != len as usize {
            structural_err!("truncated packet body: {} of {} octets", read, len);
        }
        Ok(())
    }
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Structural {
            message: "truncated partial body length".into(),
        }
    } else {
        err.into()
    }
}

fn is_key_tag(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::PublicKey | Tag::SecretKey | Tag::PublicSubkey | Tag::SecretSubkey
    )
}

/// Packets that carry message content; errors in them are never skipped.
fn is_data_tag(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::LiteralData
            | Tag::CompressedData
            | Tag::SymEncryptedData
            | Tag::SymEncryptedProtectedData
    )
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(packet) = self.peeked.take() {
            return Some(Ok(packet));
        }

        while !self.done {
            let header = match PacketHeader::try_from_reader(&mut self.inner) {
                Ok(Some(header)) => header,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let tag = header.tag();
            let body = match self.read_body(header.length()) {
                Ok(body) => body,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            debug!("read packet {:?} ({} octets)", tag, body.len());

            match Packet::from_body(tag, body.clone()) {
                Ok(packet) => return Some(Ok(packet)),
                Err(err) if err.is_unsupported() && is_key_tag(tag) => {
                    warn!("unsupported {:?} packet: {}", tag, err);
                    return Some(Ok(Packet::UnsupportedKey { tag, body }));
                }
                Err(err) if err.is_unsupported() && !is_data_tag(tag) => {
                    warn!("skipping {:?} packet: {}", tag, err);
                }
                Err(err) if err.is_unsupported() || err.is_structural() => return Some(Err(err)),
                Err(err) => {
                    return Some(Err(Error::Structural {
                        message: format!("malformed {:?} packet: {}", tag, err),
                    }))
                }
            }
        }

        None
    }
}
