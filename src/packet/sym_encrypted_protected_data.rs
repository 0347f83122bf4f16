use std::io;

use bytes::{Buf, Bytes};
use log::debug;

use crate::crypto::aead::{AeadAlgorithm, AeadSetup, ChunkSize, TAG_SIZE};
use crate::crypto::checksum;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// Header of the modification detection code trailing SEIPDv1 plaintext.
pub const MDC_PREFIX: [u8; 2] = [0xD3, 0x14];
/// Length of the modification detection code, header included.
pub const MDC_LEN: usize = 22;
/// Salt length of SEIPDv2 packets.
pub const SEIPD_V2_SALT_LEN: usize = 32;

/// Version specific fields of a SEIPD packet.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum SeipdConfig {
    V1,
    V2 {
        sym_alg: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        chunk_size: ChunkSize,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; SEIPD_V2_SALT_LEN],
    },
}

/// Symmetrically Encrypted Integrity Protected Data Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetrically-encrypted-and>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct SymEncryptedProtectedData {
    config: SeipdConfig,
    #[debug("{} octets", data.len())]
    data: Bytes,
}

impl SymEncryptedProtectedData {
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        let config = match version {
            1 => SeipdConfig::V1,
            2 => {
                let sym_alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                let aead = AeadAlgorithm::from(i.read_u8()?);
                let chunk_size = ChunkSize::new(i.read_u8()?)?;
                let salt = i.read_array::<SEIPD_V2_SALT_LEN>()?;
                SeipdConfig::V2 {
                    sym_alg,
                    aead,
                    chunk_size,
                    salt,
                }
            }
            _ => unsupported_err!("SEIPD version {}", version),
        };

        Ok(SymEncryptedProtectedData {
            config,
            data: i.rest(),
        })
    }

    pub fn config(&self) -> &SeipdConfig {
        &self.config
    }

    /// Decrypts and authenticates the whole packet.
    ///
    /// v1 packets need the cipher from the session key packet, v2 packets carry
    /// their own.
    pub fn decrypt(
        &self,
        session_key: &[u8],
        sym_alg: Option<SymmetricKeyAlgorithm>,
    ) -> Result<Vec<u8>> {
        match &self.config {
            SeipdConfig::V1 => {
                let Some(sym_alg) = sym_alg else {
                    bail!("SEIPDv1 needs a cipher from the session key packet");
                };
                decrypt_v1(sym_alg, session_key, &self.data)
            }
            SeipdConfig::V2 {
                sym_alg,
                aead,
                chunk_size,
                salt,
            } => decrypt_v2(*sym_alg, *aead, *chunk_size, salt, session_key, &self.data),
        }
    }
}

fn decrypt_v1(sym_alg: SymmetricKeyAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = sym_alg.block_size();
    ensure!(bs > 0, "cipher {} can not decrypt", sym_alg);
    if data.len() < bs + 2 + MDC_LEN {
        structural_err!("SEIPDv1 packet of {} octets is too short", data.len());
    }

    let mut buf = data.to_vec();
    sym_alg.decrypt_with_iv(key, &vec![0u8; bs], &mut buf)?;

    // the last two prefix octets are repeated
    if buf[bs - 2..bs] != buf[bs..bs + 2] {
        return Err(Error::MdcError);
    }

    let mdc_start = buf.len() - MDC_LEN;
    if buf[mdc_start..mdc_start + 2] != MDC_PREFIX {
        return Err(Error::MdcError);
    }
    let expected = checksum::calculate_sha1(&buf[..mdc_start + 2]);
    if buf[mdc_start + 2..] != expected {
        return Err(Error::MdcError);
    }

    buf.truncate(mdc_start);
    buf.drain(..bs + 2);
    Ok(buf)
}

fn decrypt_v2(
    sym_alg: SymmetricKeyAlgorithm,
    aead: AeadAlgorithm,
    chunk_size: ChunkSize,
    salt: &[u8],
    session_key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    let mut setup = AeadSetup::new(sym_alg, aead, chunk_size, salt, session_key)?;
    if data.len() < TAG_SIZE {
        structural_err!("SEIPDv2 packet of {} octets is too short", data.len());
    }
    let (chunks, final_tag) = data.split_at(data.len() - TAG_SIZE);

    let mut out = Vec::with_capacity(chunks.len());
    let mut index = 0u64;
    for chunk in chunks.chunks(chunk_size.as_byte_size() + TAG_SIZE) {
        if chunk.len() <= TAG_SIZE {
            structural_err!("truncated AEAD chunk {}", index);
        }
        let (ciphertext, tag) = chunk.split_at(chunk.len() - TAG_SIZE);
        let mut plain = ciphertext.to_vec();
        setup.set_chunk_index(index);
        aead.decrypt_in_place(
            sym_alg,
            &setup.message_key,
            &setup.nonce,
            &setup.info,
            &mut plain,
            tag,
        )?;
        out.extend_from_slice(&plain);
        index += 1;
    }

    setup.set_chunk_index(index);
    let mut final_ad = setup.info.to_vec();
    final_ad.extend_from_slice(&u64::try_from(out.len())?.to_be_bytes());
    aead.decrypt_in_place(
        sym_alg,
        &setup.message_key,
        &setup.nonce,
        &final_ad,
        &mut [],
        final_tag,
    )?;
    debug!("decrypted {} AEAD chunks", index);

    Ok(out)
}

impl Serialize for SymEncryptedProtectedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match &self.config {
            SeipdConfig::V1 => writer.write_all(&[1])?,
            SeipdConfig::V2 {
                sym_alg,
                aead,
                chunk_size,
                salt,
            } => {
                writer.write_all(&[2, (*sym_alg).into(), (*aead).into(), (*chunk_size).into()])?;
                writer.write_all(salt)?;
            }
        }
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        let header = match self.config {
            SeipdConfig::V1 => 1,
            SeipdConfig::V2 { .. } => 4 + SEIPD_V2_SALT_LEN,
        };
        header + self.data.len()
    }
}

impl PacketTrait for SymEncryptedProtectedData {
    fn tag(&self) -> Tag {
        Tag::SymEncryptedProtectedData
    }
}
