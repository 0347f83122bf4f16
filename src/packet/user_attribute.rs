use std::io;

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::Tag;

/// User Attribute Packet, kept as opaque subpackets.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-user-attribute-packet-type>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserAttribute {
    #[debug("{} octets", data.len())]
    data: Bytes,
}

impl UserAttribute {
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = i.remaining();
        Ok(UserAttribute {
            data: i.copy_to_bytes(len),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for UserAttribute {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for UserAttribute {
    fn tag(&self) -> Tag {
        Tag::UserAttribute
    }
}
