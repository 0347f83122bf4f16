use std::io;

use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketTrait, PublicKey, SecretKey, KEY_VERSION};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{Fingerprint, KeyId, Mpi, PkeskVersion, Tag};

/// Algorithm specific fields of a PKESK.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum PkeskBytes {
    Rsa {
        mpi: Mpi,
    },
    Ecdh {
        public_point: Mpi,
        #[debug("{}", hex::encode(encrypted_session_key))]
        encrypted_session_key: Bytes,
    },
    X25519 {
        ephemeral: [u8; 32],
        /// Sent in the clear in v3 packets, absent in v6.
        sym_alg: Option<SymmetricKeyAlgorithm>,
        #[debug("{}", hex::encode(session_key))]
        session_key: Bytes,
    },
    Other {
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

impl PkeskBytes {
    fn try_from_buf<B: Buf>(alg: PublicKeyAlgorithm, version: PkeskVersion, i: &mut B) -> Result<Self> {
        match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt => Ok(PkeskBytes::Rsa {
                mpi: Mpi::try_from_buf(i)?,
            }),
            PublicKeyAlgorithm::ECDH => {
                let public_point = Mpi::try_from_buf(i)?;
                let len = i.read_u8()?;
                let encrypted_session_key = i.read_take(len.into())?;
                Ok(PkeskBytes::Ecdh {
                    public_point,
                    encrypted_session_key,
                })
            }
            PublicKeyAlgorithm::X25519 => {
                let ephemeral = i.read_array::<32>()?;
                let len = i.read_u8()?;
                let mut rest = i.read_take(len.into())?;
                let sym_alg = if version == PkeskVersion::V3 {
                    Some(SymmetricKeyAlgorithm::from(rest.read_u8()?))
                } else {
                    None
                };
                Ok(PkeskBytes::X25519 {
                    ephemeral,
                    sym_alg,
                    session_key: rest.rest(),
                })
            }
            _ => Ok(PkeskBytes::Other { data: i.rest() }),
        }
    }
}

impl Serialize for PkeskBytes {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PkeskBytes::Rsa { mpi } => mpi.to_writer(writer)?,
            PkeskBytes::Ecdh {
                public_point,
                encrypted_session_key,
            } => {
                public_point.to_writer(writer)?;
                writer.write_all(&[encrypted_session_key.len().try_into()?])?;
                writer.write_all(encrypted_session_key)?;
            }
            PkeskBytes::X25519 {
                ephemeral,
                sym_alg,
                session_key,
            } => {
                writer.write_all(ephemeral)?;
                let len = session_key.len() + usize::from(sym_alg.is_some());
                writer.write_all(&[len.try_into()?])?;
                if let Some(sym_alg) = sym_alg {
                    writer.write_all(&[(*sym_alg).into()])?;
                }
                writer.write_all(session_key)?;
            }
            PkeskBytes::Other { data } => writer.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PkeskBytes::Rsa { mpi } => mpi.write_len(),
            PkeskBytes::Ecdh {
                public_point,
                encrypted_session_key,
            } => public_point.write_len() + 1 + encrypted_session_key.len(),
            PkeskBytes::X25519 {
                sym_alg,
                session_key,
                ..
            } => 32 + 1 + usize::from(sym_alg.is_some()) + session_key.len(),
            PkeskBytes::Other { data } => data.len(),
        }
    }
}

/// Frames a session key for algorithms that encrypt the algorithm octet and
/// checksum along with it: `sym_alg || key || checksum`, where v6 packets
/// leave out the algorithm.
pub(crate) fn encode_session_key(
    sym_alg: Option<SymmetricKeyAlgorithm>,
    session_key: &[u8],
) -> Zeroizing<Vec<u8>> {
    let mut data = Zeroizing::new(Vec::with_capacity(1 + session_key.len() + 2));
    if let Some(sym_alg) = sym_alg {
        data.push(sym_alg.into());
    }
    data.extend_from_slice(session_key);
    data.extend_from_slice(&checksum::calculate_simple(session_key).to_be_bytes());
    data
}

/// Reverses [`encode_session_key`], verifying the checksum.
pub(crate) fn decode_session_key(
    version: PkeskVersion,
    data: &[u8],
) -> Result<(Option<SymmetricKeyAlgorithm>, Zeroizing<Vec<u8>>)> {
    let (sym_alg, rest) = match version {
        PkeskVersion::V3 => match data.split_first() {
            Some((alg, rest)) => (Some(SymmetricKeyAlgorithm::from(*alg)), rest),
            None => bail!("empty session key"),
        },
        _ => (None, data),
    };
    ensure!(rest.len() > 2, "session key of {} octets", rest.len());
    let (key, check) = rest.split_at(rest.len() - 2);
    checksum::simple([check[0], check[1]], key)?;
    if let Some(sym_alg) = sym_alg {
        ensure_eq!(
            key.len(),
            sym_alg.key_size(),
            "session key size does not match {}",
            sym_alg
        );
    }
    Ok((sym_alg, Zeroizing::new(key.to_vec())))
}

/// Public-Key Encrypted Session Key Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-encrypted-sessio>
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyEncryptedSessionKey {
    V3 {
        id: KeyId,
        pk_algo: PublicKeyAlgorithm,
        values: PkeskBytes,
    },
    V6 {
        /// `None` for anonymous recipients.
        fingerprint: Option<Fingerprint>,
        pk_algo: PublicKeyAlgorithm,
        values: PkeskBytes,
    },
}

impl PublicKeyEncryptedSessionKey {
    /// Encrypts `session_key` to `pkey`, for use with SEIPDv1.
    pub fn from_session_key_v3<R: Rng + CryptoRng>(
        rng: R,
        session_key: &[u8],
        sym_alg: SymmetricKeyAlgorithm,
        pkey: &PublicKey,
    ) -> Result<Self> {
        let values = pkey.encrypt_session_key(rng, session_key, Some(sym_alg))?;
        Ok(PublicKeyEncryptedSessionKey::V3 {
            id: pkey.key_id(),
            pk_algo: pkey.algorithm(),
            values,
        })
    }

    /// Encrypts `session_key` to `pkey`, for use with SEIPDv2.
    pub fn from_session_key_v6<R: Rng + CryptoRng>(
        rng: R,
        session_key: &[u8],
        pkey: &PublicKey,
    ) -> Result<Self> {
        let values = pkey.encrypt_session_key(rng, session_key, None)?;
        Ok(PublicKeyEncryptedSessionKey::V6 {
            fingerprint: Some(pkey.fingerprint()),
            pk_algo: pkey.algorithm(),
            values,
        })
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = PkeskVersion::from(i.read_u8()?);
        match version {
            PkeskVersion::V3 => {
                let id = KeyId::from(i.read_array::<8>()?);
                let pk_algo = PublicKeyAlgorithm::from(i.read_u8()?);
                let values = PkeskBytes::try_from_buf(pk_algo, version, &mut i)?;
                Ok(PublicKeyEncryptedSessionKey::V3 {
                    id,
                    pk_algo,
                    values,
                })
            }
            PkeskVersion::V6 => {
                let len = i.read_u8()?;
                let fingerprint = match len {
                    0 => None,
                    21 => {
                        let key_version = i.read_u8()?;
                        if key_version != KEY_VERSION {
                            unsupported_err!("PKESK for key version {}", key_version);
                        }
                        Some(Fingerprint::from(i.read_array::<20>()?))
                    }
                    _ => unsupported_err!("PKESK recipient field of {} octets", len),
                };
                let pk_algo = PublicKeyAlgorithm::from(i.read_u8()?);
                let values = PkeskBytes::try_from_buf(pk_algo, version, &mut i)?;
                Ok(PublicKeyEncryptedSessionKey::V6 {
                    fingerprint,
                    pk_algo,
                    values,
                })
            }
            PkeskVersion::Other(v) => unsupported_err!("PKESK version {}", v),
        }
    }

    pub fn version(&self) -> PkeskVersion {
        match self {
            PublicKeyEncryptedSessionKey::V3 { .. } => PkeskVersion::V3,
            PublicKeyEncryptedSessionKey::V6 { .. } => PkeskVersion::V6,
        }
    }

    /// Whether the packet is addressed to `key`, or to nobody in particular.
    pub fn matches(&self, key: &PublicKey) -> bool {
        match self {
            PublicKeyEncryptedSessionKey::V3 { id, .. } => id.is_wildcard() || *id == key.key_id(),
            PublicKeyEncryptedSessionKey::V6 { fingerprint, .. } => {
                fingerprint.map_or(true, |fp| fp == key.fingerprint())
            }
        }
    }

    /// Recovers the session key, and for v3 packets the cipher it is used with.
    pub fn decrypt(
        &self,
        key: &SecretKey,
    ) -> Result<(Option<SymmetricKeyAlgorithm>, Zeroizing<Vec<u8>>)> {
        let values = match self {
            PublicKeyEncryptedSessionKey::V3 { values, .. } => values,
            PublicKeyEncryptedSessionKey::V6 { values, .. } => values,
        };
        debug!("decrypting session key with {}", key.key_id());
        key.decrypt_session_key(values, self.version())
    }
}

impl Serialize for PublicKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicKeyEncryptedSessionKey::V3 {
                id,
                pk_algo,
                values,
            } => {
                writer.write_all(&[PkeskVersion::V3.into()])?;
                writer.write_all(id.as_ref())?;
                writer.write_all(&[(*pk_algo).into()])?;
                values.to_writer(writer)?;
            }
            PublicKeyEncryptedSessionKey::V6 {
                fingerprint,
                pk_algo,
                values,
            } => {
                writer.write_all(&[PkeskVersion::V6.into()])?;
                match fingerprint {
                    Some(fp) => {
                        writer.write_all(&[21, KEY_VERSION])?;
                        writer.write_all(fp.as_bytes())?;
                    }
                    None => writer.write_all(&[0])?,
                }
                writer.write_all(&[(*pk_algo).into()])?;
                values.to_writer(writer)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicKeyEncryptedSessionKey::V3 { values, .. } => 1 + 8 + 1 + values.write_len(),
            PublicKeyEncryptedSessionKey::V6 {
                fingerprint,
                values,
                ..
            } => 1 + 1 + fingerprint.map_or(0, |_| 21) + 1 + values.write_len(),
        }
    }
}

impl PacketTrait for PublicKeyEncryptedSessionKey {
    fn tag(&self) -> Tag {
        Tag::PublicKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_v3_and_v6_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let keys = [
            SecretKey::generate_x25519(&mut rng, now, true).unwrap(),
            SecretKey::generate_ecdh(&mut rng, now, true).unwrap(),
            SecretKey::generate_rsa(&mut rng, 1024, now, true).unwrap(),
        ];
        let session_key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);

        for key in &keys {
            let v3 = PublicKeyEncryptedSessionKey::from_session_key_v3(
                &mut rng,
                &session_key,
                SymmetricKeyAlgorithm::AES256,
                key.public_key(),
            )
            .unwrap();
            let v6 = PublicKeyEncryptedSessionKey::from_session_key_v6(
                &mut rng,
                &session_key,
                key.public_key(),
            )
            .unwrap();

            for pkesk in [v3, v6] {
                let bytes = pkesk.to_bytes().unwrap();
                assert_eq!(bytes.len(), pkesk.write_len());
                let parsed = PublicKeyEncryptedSessionKey::try_from_buf(&bytes[..]).unwrap();
                assert_eq!(parsed, pkesk);
                assert!(parsed.matches(key.public_key()));

                let (sym_alg, decrypted) = parsed.decrypt(key).unwrap();
                assert_eq!(&decrypted[..], &session_key[..]);
                match parsed.version() {
                    PkeskVersion::V3 => assert_eq!(sym_alg, Some(SymmetricKeyAlgorithm::AES256)),
                    _ => assert_eq!(sym_alg, None),
                }
            }
        }
    }

    #[test]
    fn test_decode_session_key() {
        let key = [5u8; 16];
        let data = encode_session_key(Some(SymmetricKeyAlgorithm::AES128), &key);
        assert_eq!(data.len(), 19);
        let (alg, decoded) = decode_session_key(PkeskVersion::V3, &data).unwrap();
        assert_eq!(alg, Some(SymmetricKeyAlgorithm::AES128));
        assert_eq!(&decoded[..], &key[..]);

        // the key does not match the size of the named cipher
        let data = encode_session_key(Some(SymmetricKeyAlgorithm::AES256), &key);
        assert!(decode_session_key(PkeskVersion::V3, &data).is_err());

        let mut data = encode_session_key(None, &key);
        data[0] ^= 1;
        assert!(decode_session_key(PkeskVersion::V6, &data).is_err());
        assert!(decode_session_key(PkeskVersion::V3, &[]).is_err());
    }
}
