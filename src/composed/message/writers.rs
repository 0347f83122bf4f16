//! The layers of an outgoing message.
//!
//! Each layer is a [`Sink`] wrapping the next one out. Data packets are
//! streamed with partial body lengths, so nothing but the current chunk is
//! held in memory.

use std::io::{self, Write};

use digest::DynDigest;
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::config::AeadConfig;
use crate::crypto::aead::{AeadAlgorithm, AeadSetup};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::{CfbEncryptor, SymmetricKeyAlgorithm};
use crate::errors::{Error, Result};
use crate::normalize_lines::CanonicalWriter;
use crate::packet::{
    LiteralDataHeader, PacketTrait, PartialBodyWriter, SecretKey, SignatureConfig, SignatureType,
    MDC_PREFIX, SEIPD_V2_SALT_LEN,
};
use crate::ser::Serialize;
use crate::sink::{BoxSink, HashWriter, Sink};
use crate::types::{CompressionAlgorithm, Tag};

fn to_io(err: Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// The body of a literal data packet.
#[derive(derive_more::Debug)]
pub struct LiteralWriter<'a> {
    #[debug(skip)]
    body: PartialBodyWriter<BoxSink<'a>>,
}

impl<'a> LiteralWriter<'a> {
    pub fn new(header: &LiteralDataHeader, outer: BoxSink<'a>) -> Result<Self> {
        let mut body = PartialBodyWriter::new(Tag::LiteralData, outer)?;
        header.to_writer(&mut body)?;
        Ok(LiteralWriter { body })
    }

    /// Ends the packet and hands back the enclosing layer, still open.
    pub fn finish(self) -> Result<BoxSink<'a>> {
        self.body.finish()
    }
}

impl Write for LiteralWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()
    }
}

impl Sink for LiteralWriter<'_> {
    fn close(self: Box<Self>) -> Result<()> {
        self.finish()?.close()
    }
}

enum Encoder<'a> {
    Zip(DeflateEncoder<PartialBodyWriter<BoxSink<'a>>>),
    Zlib(ZlibEncoder<PartialBodyWriter<BoxSink<'a>>>),
}

/// The body of a compressed data packet.
pub struct CompressedWriter<'a> {
    encoder: Encoder<'a>,
}

impl<'a> CompressedWriter<'a> {
    /// Starts a ZIP or ZLIB compressed packet. `level` defaults to 6.
    pub fn new(alg: CompressionAlgorithm, level: Option<u32>, outer: BoxSink<'a>) -> Result<Self> {
        let level = level.map_or_else(Compression::default, Compression::new);
        let mut body = PartialBodyWriter::new(Tag::CompressedData, outer)?;
        let encoder = match alg {
            CompressionAlgorithm::ZIP => {
                body.write_all(&[alg.into()])?;
                Encoder::Zip(DeflateEncoder::new(body, level))
            }
            CompressionAlgorithm::ZLIB => {
                body.write_all(&[alg.into()])?;
                Encoder::Zlib(ZlibEncoder::new(body, level))
            }
            _ => unsupported_err!("compression with {}", alg),
        };
        Ok(CompressedWriter { encoder })
    }
}

impl Write for CompressedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.encoder {
            Encoder::Zip(e) => e.write(buf),
            Encoder::Zlib(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Zip(e) => e.flush(),
            Encoder::Zlib(e) => e.flush(),
        }
    }
}

impl Sink for CompressedWriter<'_> {
    fn close(self: Box<Self>) -> Result<()> {
        let body = match self.encoder {
            Encoder::Zip(e) => e.finish()?,
            Encoder::Zlib(e) => e.finish()?,
        };
        body.finish()?.close()
    }
}

/// The body of a SEIPDv1 packet: CFB encryption with a zero IV, a random
/// prefix and a trailing modification detection code.
pub struct SeipdV1Writer<'a> {
    body: PartialBodyWriter<BoxSink<'a>>,
    encryptor: CfbEncryptor,
    mdc: Box<dyn DynDigest>,
    buffer: Vec<u8>,
}

impl<'a> SeipdV1Writer<'a> {
    pub fn new<R: Rng + CryptoRng>(
        mut rng: R,
        sym_alg: SymmetricKeyAlgorithm,
        session_key: &[u8],
        outer: BoxSink<'a>,
    ) -> Result<Self> {
        let bs = sym_alg.block_size();
        let encryptor = sym_alg.cfb_encryptor(session_key, &vec![0u8; bs])?;
        let mdc = HashAlgorithm::Sha1.new_hasher()?;

        let mut body = PartialBodyWriter::new(Tag::SymEncryptedProtectedData, outer)?;
        body.write_all(&[1])?;

        let mut writer = SeipdV1Writer {
            body,
            encryptor,
            mdc,
            buffer: Vec::new(),
        };

        // the last two octets of the prefix are repeated
        let mut prefix = vec![0u8; bs + 2];
        rng.fill_bytes(&mut prefix[..bs]);
        prefix.copy_within(bs - 2..bs, bs);
        writer.write_all(&prefix)?;

        Ok(writer)
    }
}

impl Write for SeipdV1Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.mdc.update(buf);
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.encryptor.encrypt(&mut self.buffer);
        self.body.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()
    }
}

impl Sink for SeipdV1Writer<'_> {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.mdc.update(&MDC_PREFIX);
        let hash = self.mdc.finalize_reset();

        let mut trailer = MDC_PREFIX.to_vec();
        trailer.extend_from_slice(&hash);
        self.encryptor.encrypt(&mut trailer);
        self.body.write_all(&trailer)?;

        self.body.finish()?.close()
    }
}

/// The body of a SEIPDv2 packet: chunked AEAD encryption with a final
/// authentication tag over the total length.
pub struct SeipdV2Writer<'a> {
    body: PartialBodyWriter<BoxSink<'a>>,
    sym_alg: SymmetricKeyAlgorithm,
    aead: AeadAlgorithm,
    setup: AeadSetup,
    chunk_size: usize,
    buffer: Vec<u8>,
    chunk_index: u64,
    written: u64,
}

impl<'a> SeipdV2Writer<'a> {
    pub fn new<R: Rng + CryptoRng>(
        mut rng: R,
        sym_alg: SymmetricKeyAlgorithm,
        config: AeadConfig,
        session_key: &[u8],
        outer: BoxSink<'a>,
    ) -> Result<Self> {
        let mut salt = [0u8; SEIPD_V2_SALT_LEN];
        rng.fill_bytes(&mut salt);
        let setup = AeadSetup::new(sym_alg, config.mode, config.chunk_size, &salt, session_key)?;

        let mut body = PartialBodyWriter::new(Tag::SymEncryptedProtectedData, outer)?;
        body.write_all(&[
            2,
            sym_alg.into(),
            config.mode.into(),
            config.chunk_size.into(),
        ])?;
        body.write_all(&salt)?;

        let chunk_size = config.chunk_size.as_byte_size();
        Ok(SeipdV2Writer {
            body,
            sym_alg,
            aead: config.mode,
            setup,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            chunk_index: 0,
            written: 0,
        })
    }

    fn seal_chunk(&mut self) -> Result<()> {
        self.setup.set_chunk_index(self.chunk_index);
        let tag = self.aead.encrypt_in_place(
            self.sym_alg,
            &self.setup.message_key,
            &self.setup.nonce,
            &self.setup.info,
            &mut self.buffer,
        )?;
        self.body.write_all(&self.buffer)?;
        self.body.write_all(&tag)?;

        self.written += u64::try_from(self.buffer.len())?;
        self.chunk_index += 1;
        self.buffer.clear();
        Ok(())
    }
}

impl Write for SeipdV2Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk_size - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == self.chunk_size {
            self.seal_chunk().map_err(to_io)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()
    }
}

impl Sink for SeipdV2Writer<'_> {
    fn close(mut self: Box<Self>) -> Result<()> {
        if !self.buffer.is_empty() {
            self.seal_chunk()?;
        }

        self.setup.set_chunk_index(self.chunk_index);
        let mut final_ad = self.setup.info.to_vec();
        final_ad.extend_from_slice(&self.written.to_be_bytes());
        let tag = self.aead.encrypt_in_place(
            self.sym_alg,
            &self.setup.message_key,
            &self.setup.nonce,
            &final_ad,
            &mut [],
        )?;
        self.body.write_all(&tag)?;
        debug!("sealed {} AEAD chunks", self.chunk_index);

        self.body.finish()?.close()
    }
}

enum SignedBody<'a> {
    Binary(HashWriter<LiteralWriter<'a>>),
    Text(CanonicalWriter<HashWriter<LiteralWriter<'a>>>),
}

/// Hashes the message while passing it on to the literal data packet.
///
/// Closing signs the hash, ends the literal data packet, appends the signature
/// packet after it and only then closes the enclosing layers.
pub struct SignatureWriter<'a> {
    body: SignedBody<'a>,
    config: SignatureConfig,
    signer: &'a SecretKey,
}

impl<'a> SignatureWriter<'a> {
    /// `config` decides between binary and text mode. For text signatures the
    /// data is canonicalized before it is hashed and stored.
    pub fn new(
        config: SignatureConfig,
        signer: &'a SecretKey,
        literal: LiteralWriter<'a>,
    ) -> Result<Self> {
        let hasher = config.hash_alg.new_hasher()?;
        let hashed = HashWriter::new(hasher, literal);
        let body = match config.typ {
            SignatureType::Binary => SignedBody::Binary(hashed),
            SignatureType::Text => SignedBody::Text(CanonicalWriter::new(hashed)),
            typ => unsupported_err!("message signature of type {:?}", typ),
        };
        Ok(SignatureWriter {
            body,
            config,
            signer,
        })
    }
}

impl Write for SignatureWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.body {
            SignedBody::Binary(w) => w.write(buf),
            SignedBody::Text(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.body {
            SignedBody::Binary(w) => w.flush(),
            SignedBody::Text(w) => w.flush(),
        }
    }
}

impl Sink for SignatureWriter<'_> {
    fn close(self: Box<Self>) -> Result<()> {
        let hashed = match self.body {
            SignedBody::Binary(w) => w,
            SignedBody::Text(w) => w.into_inner(),
        };
        let (hasher, literal) = hashed.into_parts();

        let sig = self.config.sign_hasher(self.signer, hasher)?;
        let mut outer = literal.finish()?;
        sig.to_writer_with_header(&mut outer)?;
        outer.close()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::aead::ChunkSize;
    use crate::packet::{DataMode, Packet, PacketReader, SeipdConfig};
    use crate::sink::NoOpCloser;

    fn header() -> LiteralDataHeader {
        let created = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        LiteralDataHeader::new(DataMode::Binary, b"data.bin", created).unwrap()
    }

    fn single_packet(data: &[u8]) -> Packet {
        let mut packets = PacketReader::new(data);
        let packet = packets.next().unwrap().unwrap();
        assert!(packets.next().is_none());
        packet
    }

    #[test]
    fn test_literal_writer() {
        let mut out = Vec::new();
        let mut w = Box::new(
            LiteralWriter::new(&header(), Box::new(NoOpCloser::new(&mut out))).unwrap(),
        );
        w.write_all(b"hello").unwrap();
        w.close().unwrap();

        let Packet::LiteralData(lit) = single_packet(&out) else {
            panic!("expected literal data");
        };
        assert_eq!(lit.data(), b"hello");
        assert_eq!(lit.file_name(), b"data.bin");
    }

    #[test]
    fn test_compressed_writer() {
        let payload = b"compress me, compress me, compress me".repeat(100);
        for alg in [CompressionAlgorithm::ZIP, CompressionAlgorithm::ZLIB] {
            let mut out = Vec::new();
            let mut w = Box::new(
                CompressedWriter::new(alg, Some(9), Box::new(NoOpCloser::new(&mut out))).unwrap(),
            );
            w.write_all(&payload).unwrap();
            w.close().unwrap();

            let Packet::CompressedData(packet) = single_packet(&out) else {
                panic!("expected compressed data");
            };
            assert_eq!(packet.compression_algorithm(), alg);
            assert_eq!(packet.decompress_to_vec().unwrap(), payload);
        }

        let sink = Box::new(NoOpCloser::new(io::sink()));
        let err = CompressedWriter::new(CompressionAlgorithm::BZip2, None, sink)
            .err()
            .unwrap();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_seipd_v1_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sym_alg = SymmetricKeyAlgorithm::AES256;
        let key = sym_alg.new_session_key(&mut rng);
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut out = Vec::new();
        let mut w = Box::new(
            SeipdV1Writer::new(&mut rng, sym_alg, &key, Box::new(NoOpCloser::new(&mut out)))
                .unwrap(),
        );
        for chunk in payload.chunks(999) {
            w.write_all(chunk).unwrap();
        }
        w.close().unwrap();

        let Packet::SymEncryptedProtectedData(packet) = single_packet(&out) else {
            panic!("expected SEIPD");
        };
        assert_eq!(packet.config(), &SeipdConfig::V1);
        assert_eq!(packet.decrypt(&key, Some(sym_alg)).unwrap(), payload);
    }

    #[test]
    fn test_seipd_v2_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let sym_alg = SymmetricKeyAlgorithm::AES128;
        let key = sym_alg.new_session_key(&mut rng);

        // chunk size octet 0: 64 byte chunks
        let config = AeadConfig {
            mode: AeadAlgorithm::Ocb,
            chunk_size: ChunkSize::new(0).unwrap(),
        };
        for len in [0usize, 1, 64, 200] {
            let payload = vec![0xAB; len];
            let mut out = Vec::new();
            let mut w = Box::new(
                SeipdV2Writer::new(
                    &mut rng,
                    sym_alg,
                    config,
                    &key,
                    Box::new(NoOpCloser::new(&mut out)),
                )
                .unwrap(),
            );
            w.write_all(&payload).unwrap();
            w.close().unwrap();

            let Packet::SymEncryptedProtectedData(packet) = single_packet(&out) else {
                panic!("expected SEIPD");
            };
            assert!(matches!(packet.config(), SeipdConfig::V2 { .. }));
            assert_eq!(packet.decrypt(&key, None).unwrap(), payload);
        }
    }

    #[test]
    fn test_signature_follows_literal_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let now = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        let key = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();

        let mut out = Vec::new();
        let literal = LiteralWriter::new(&header(), Box::new(NoOpCloser::new(&mut out))).unwrap();
        let config =
            SignatureConfig::from_key(key.public_key(), SignatureType::Text, HashAlgorithm::Sha256, now);
        let mut w = Box::new(SignatureWriter::new(config, &key, literal).unwrap());
        w.write_all(b"one\ntwo\n").unwrap();
        w.close().unwrap();

        let packets: Vec<_> = PacketReader::new(&out[..]).map(|p| p.unwrap()).collect();
        assert_eq!(packets.len(), 2);
        let Packet::LiteralData(lit) = &packets[0] else {
            panic!("expected literal data first");
        };
        assert_eq!(lit.data(), b"one\r\ntwo\r\n");
        let Packet::Signature(sig) = &packets[1] else {
            panic!("expected signature second");
        };
        sig.verify(key.public_key(), lit.data()).unwrap();
        sig.verify(key.public_key(), &b"one\ntwo\n"[..]).unwrap();
    }
}
