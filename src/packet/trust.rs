use std::io;

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::Tag;

/// Trust Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-trust-packet-type-id-12>
///
/// Implementation defined keyring data; never exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trust {
    data: Bytes,
}

impl Trust {
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = i.remaining();
        Ok(Trust {
            data: i.copy_to_bytes(len),
        })
    }
}

impl Serialize for Trust {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for Trust {
    fn tag(&self) -> Tag {
        Tag::Trust
    }
}
