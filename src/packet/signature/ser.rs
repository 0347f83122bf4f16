use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use crate::errors::Result;
use crate::packet::{PacketTrait, Signature, SIGNATURE_VERSION};
use crate::ser::Serialize;
use crate::types::Tag;

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[
            SIGNATURE_VERSION,
            self.config.typ.into(),
            self.config.pub_alg.into(),
            self.config.hash_alg.into(),
        ])?;

        writer.write_u16::<BigEndian>(self.config.hashed_subpackets.write_len().try_into()?)?;
        self.config.hashed_subpackets.to_writer(writer)?;
        writer.write_u16::<BigEndian>(self.config.unhashed_subpackets.write_len().try_into()?)?;
        self.config.unhashed_subpackets.to_writer(writer)?;

        writer.write_all(&self.signed_hash_value)?;
        writer.write_all(&self.signature)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        4 + 2
            + self.config.hashed_subpackets.write_len()
            + 2
            + self.config.unhashed_subpackets.write_len()
            + 2
            + self.signature.len()
    }
}

impl PacketTrait for Signature {
    fn tag(&self) -> Tag {
        Tag::Signature
    }
}
