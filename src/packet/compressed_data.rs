use std::io::{self, Read};

use bytes::{Buf, Bytes};
use flate2::read::{DeflateDecoder, ZlibDecoder};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, Tag};

/// Compressed Data Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-compressed-data-packet-type>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct CompressedData {
    compression_algorithm: CompressionAlgorithm,
    #[debug("{} octets", compressed_data.len())]
    compressed_data: Bytes,
}

impl CompressedData {
    pub fn from_compressed(alg: CompressionAlgorithm, data: impl Into<Bytes>) -> Self {
        CompressedData {
            compression_algorithm: alg,
            compressed_data: data.into(),
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let alg = CompressionAlgorithm::from(i.read_u8()?);
        Ok(CompressedData {
            compression_algorithm: alg,
            compressed_data: i.rest(),
        })
    }

    pub fn compression_algorithm(&self) -> CompressionAlgorithm {
        self.compression_algorithm
    }

    /// A reader over the decompressed content.
    pub fn decompress(&self) -> Result<Box<dyn Read + '_>> {
        let data = &self.compressed_data[..];
        match self.compression_algorithm {
            CompressionAlgorithm::Uncompressed => Ok(Box::new(data)),
            CompressionAlgorithm::ZIP => Ok(Box::new(DeflateDecoder::new(data))),
            CompressionAlgorithm::ZLIB => Ok(Box::new(ZlibDecoder::new(data))),
            alg => unsupported_err!("compression algorithm {}", alg),
        }
    }

    /// Decompresses the whole content into memory.
    pub fn decompress_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decompress()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Serialize for CompressedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.compression_algorithm.into()])?;
        writer.write_all(&self.compressed_data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.compressed_data.len()
    }
}

impl PacketTrait for CompressedData {
    fn tag(&self) -> Tag {
        Tag::CompressedData
    }
}
