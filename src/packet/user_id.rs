use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use digest::DynDigest;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::Tag;

/// User ID Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-user-id-packet-type-id-13>
///
/// The content is conventionally UTF-8, but is kept as raw octets so that
/// signatures over it verify byte-for-byte.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserId {
    #[debug("{:?}", String::from_utf8_lossy(id))]
    id: Bytes,
}

impl UserId {
    pub fn from_str(id: &str) -> Self {
        UserId {
            id: Bytes::copy_from_slice(id.as_bytes()),
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = i.remaining();
        Ok(UserId {
            id: i.copy_to_bytes(len),
        })
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The id as a string, with invalid UTF-8 replaced.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Feeds the id into a certification hash: `0xB4`, four octet length, id.
    pub fn hash_for_signature(&self, hasher: &mut dyn DynDigest) -> Result<()> {
        let mut prefix = vec![0xB4];
        prefix.write_u32::<BigEndian>(self.id.len().try_into()?)?;
        hasher.update(&prefix);
        hasher.update(&self.id);
        Ok(())
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.len()
    }
}

impl PacketTrait for UserId {
    fn tag(&self) -> Tag {
        Tag::UserId
    }
}
