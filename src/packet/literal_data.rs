use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::Tag;

/// Longest file name a literal data packet can carry.
pub const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

/// Everything in a literal data packet before the data itself.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct LiteralDataHeader {
    pub mode: DataMode,
    #[debug("{:?}", String::from_utf8_lossy(file_name))]
    pub file_name: Bytes,
    pub created: DateTime<Utc>,
}

impl LiteralDataHeader {
    pub fn new(mode: DataMode, file_name: &[u8], created: DateTime<Utc>) -> Result<Self> {
        ensure!(
            file_name.len() <= MAX_FILE_NAME_LEN,
            "file name of {} octets is too long",
            file_name.len()
        );
        Ok(LiteralDataHeader {
            mode,
            file_name: Bytes::copy_from_slice(file_name),
            created,
        })
    }

    fn try_from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let mode = DataMode::from(i.read_u8()?);
        let name_len = i.read_u8()?;
        let file_name = i.read_take(name_len.into())?;
        let created = u32_to_time(i.read_be_u32()?);

        Ok(LiteralDataHeader {
            mode,
            file_name,
            created,
        })
    }
}

impl Serialize for LiteralDataHeader {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.mode.into())?;
        writer.write_u8(self.file_name.len().try_into()?)?;
        writer.write_all(&self.file_name)?;
        writer.write_u32::<BigEndian>(time_to_u32(&self.created))?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4
    }
}

/// Literal Data Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-literal-data-packet-type-id>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct LiteralData {
    header: LiteralDataHeader,
    #[debug("{} octets", data.len())]
    data: Bytes,
}

impl LiteralData {
    pub fn from_bytes(header: LiteralDataHeader, data: Bytes) -> Self {
        LiteralData { header, data }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let header = LiteralDataHeader::try_from_buf(&mut i)?;
        let data = i.rest();
        Ok(LiteralData { header, data })
    }

    pub fn header(&self) -> &LiteralDataHeader {
        &self.header
    }

    pub fn is_binary(&self) -> bool {
        self.header.mode == DataMode::Binary
    }

    pub fn file_name(&self) -> &[u8] {
        &self.header.file_name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl Serialize for LiteralData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.header.to_writer(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.header.write_len() + self.data.len()
    }
}

impl PacketTrait for LiteralData {
    fn tag(&self) -> Tag {
        Tag::LiteralData
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_literal_roundtrip() {
        let created = Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap();
        let header = LiteralDataHeader::new(DataMode::Text, b"notes.txt", created).unwrap();
        let lit = LiteralData::from_bytes(header, Bytes::from_static(b"hello\r\n"));

        let bytes = lit.to_bytes().unwrap();
        assert_eq!(bytes[0], b't');
        assert_eq!(LiteralData::try_from_buf(&bytes[..]).unwrap(), lit);
    }

    #[test]
    fn test_file_name_too_long() {
        let created = Utc.timestamp_opt(0, 0).unwrap();
        assert!(LiteralDataHeader::new(DataMode::Binary, &[b'a'; 256], created).is_err());
    }
}
