use std::io;

use bytes::Buf;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Tag;

const PGP: [u8; 3] = [0x50, 0x47, 0x50];

/// PGP as UTF-8 octets.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-marker-packet-type-id-10>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Marker;

impl Marker {
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        i.read_tag(&PGP)?;
        if i.has_remaining() {
            structural_err!("{} trailing octets in marker packet", i.remaining());
        }
        Ok(Marker)
    }
}

impl Serialize for Marker {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&PGP)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        PGP.len()
    }
}

impl PacketTrait for Marker {
    fn tag(&self) -> Tag {
        Tag::Marker
    }
}
