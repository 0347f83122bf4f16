use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::errors::Result;
use crate::types::{PacketLength, Tag};

/// Header of a single packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    tag: Tag,
    length: PacketLength,
}

impl PacketHeader {
    pub fn new(tag: Tag, length: PacketLength) -> Self {
        Self { tag, length }
    }

    /// Reads a new or old format header.
    ///
    /// Returns `None` if the reader is exhausted before the first octet.
    /// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-headers>
    pub fn try_from_reader<R: Read>(mut r: R) -> Result<Option<Self>> {
        let first = match r.read_u8() {
            Ok(b) => b,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if first & 0b1000_0000 == 0 {
            structural_err!("invalid packet header octet {:#04x}", first);
        }

        let header = if first & 0b0100_0000 != 0 {
            let tag = Tag::from(first & 0b0011_1111);
            let length = PacketLength::try_from_reader(&mut r)?;
            PacketHeader { tag, length }
        } else {
            let tag = Tag::from((first >> 2) & 0b1111);
            let length = match first & 0b11 {
                0 => PacketLength::Fixed(r.read_u8()?.into()),
                1 => PacketLength::Fixed(r.read_u16::<BigEndian>()?.into()),
                2 => PacketLength::Fixed(r.read_u32::<BigEndian>()?),
                _ => PacketLength::Indeterminate,
            };
            PacketHeader { tag, length }
        };

        Ok(Some(header))
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn length(&self) -> PacketLength {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_format() {
        // old format, tag 6, two octet length
        let header = PacketHeader::try_from_reader(&[0x99, 0x01, 0x0d][..])
            .unwrap()
            .unwrap();
        assert_eq!(header.tag(), Tag::PublicKey);
        assert_eq!(header.length(), PacketLength::Fixed(269));

        let header = PacketHeader::try_from_reader(&[0xA3, 0x01][..])
            .unwrap()
            .unwrap();
        assert_eq!(header.tag(), Tag::CompressedData);
        assert_eq!(header.length(), PacketLength::Indeterminate);
    }

    #[test]
    fn test_new_format() {
        let header = PacketHeader::try_from_reader(&[0xCB, 0xE2][..])
            .unwrap()
            .unwrap();
        assert_eq!(header.tag(), Tag::LiteralData);
        assert_eq!(header.length(), PacketLength::Partial(4));
    }

    #[test]
    fn test_end_and_garbage() {
        assert!(PacketHeader::try_from_reader(&[][..]).unwrap().is_none());
        assert!(PacketHeader::try_from_reader(&[0x01][..])
            .unwrap_err()
            .is_structural());
    }
}
