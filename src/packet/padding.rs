use std::io;

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::Tag;

/// Padding Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-padding-packet-type-id-21>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct Padding {
    #[debug("{} octets", data.len())]
    data: Bytes,
}

impl Padding {
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = i.remaining();
        Ok(Padding {
            data: i.copy_to_bytes(len),
        })
    }
}

impl Serialize for Padding {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for Padding {
    fn tag(&self) -> Tag {
        Tag::Padding
    }
}
