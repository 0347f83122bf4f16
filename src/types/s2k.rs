use std::io;

use bytes::Buf;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::Serialize;

const EXPBIAS: u32 = 6;

/// The GnuPG extension marker following S2K type 101.
const GNU_MAGIC: &[u8] = b"GNU";

/// String-To-Key specifier.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-string-to-key-s2k-specifier>
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringToKey {
    Simple {
        hash_alg: HashAlgorithm,
    },
    Salted {
        hash_alg: HashAlgorithm,
        salt: [u8; 8],
    },
    IteratedAndSalted {
        hash_alg: HashAlgorithm,
        salt: [u8; 8],
        /// Coded iteration count.
        count: u8,
    },
    /// GnuPG extension, used to mark secret key material that is not present.
    /// Mode 1 is "gnu-dummy", mode 2 "divert-to-card".
    Gnu { hash_alg: HashAlgorithm, mode: u8 },
}

impl StringToKey {
    /// Iterated and salted with SHA-256 and a fresh random salt.
    pub fn new_iterated<R: Rng + CryptoRng>(mut rng: R, hash_alg: HashAlgorithm, count: u8) -> Self {
        let mut salt = [0u8; 8];
        rng.fill_bytes(&mut salt);
        StringToKey::IteratedAndSalted {
            hash_alg,
            salt,
            count,
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let typ = i.read_u8()?;
        let hash_alg = HashAlgorithm::from(i.read_u8()?);
        let s2k = match typ {
            0 => StringToKey::Simple { hash_alg },
            1 => StringToKey::Salted {
                hash_alg,
                salt: i.read_array::<8>()?,
            },
            3 => StringToKey::IteratedAndSalted {
                hash_alg,
                salt: i.read_array::<8>()?,
                count: i.read_u8()?,
            },
            101 => {
                i.read_tag(GNU_MAGIC)?;
                // GnuPG numbers these modes 1001 and 1002
                let mode = i.read_u8()?;
                StringToKey::Gnu { hash_alg, mode }
            }
            _ => unsupported_err!("S2K type {}", typ),
        };
        Ok(s2k)
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        match self {
            StringToKey::Simple { hash_alg }
            | StringToKey::Salted { hash_alg, .. }
            | StringToKey::IteratedAndSalted { hash_alg, .. }
            | StringToKey::Gnu { hash_alg, .. } => *hash_alg,
        }
    }

    /// Placeholder marker for keys whose secret material is absent.
    pub fn is_gnu_dummy(&self) -> bool {
        matches!(self, StringToKey::Gnu { mode: 1 | 2, .. })
    }

    /// Converts a coded count into the number of bytes to hash.
    /// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-iterated-and-salted-s2k>
    pub fn decode_count(c: u8) -> usize {
        ((16u32 + u32::from(c & 15)) << (u32::from(c >> 4) + EXPBIAS)) as usize
    }

    /// Derives a key of `key_size` bytes from the passphrase.
    pub fn derive_key(&self, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let hash_alg = self.hash_alg();
        let Some(digest_size) = hash_alg.digest_size() else {
            unsupported_err!("S2K hash {:?}", hash_alg);
        };
        let rounds = key_size.div_ceil(digest_size);
        let mut key = Zeroizing::new(Vec::with_capacity(rounds * digest_size));

        for round in 0..rounds {
            let mut hasher = hash_alg.new_hasher()?;
            // each further round is preloaded with one more zero byte
            hasher.update(&vec![0u8; round]);

            match self {
                StringToKey::Simple { .. } => hasher.update(passphrase),
                StringToKey::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                }
                StringToKey::IteratedAndSalted { salt, count, .. } => {
                    let data = Zeroizing::new([&salt[..], passphrase].concat());
                    let total = Self::decode_count(*count).max(data.len());
                    let mut done = 0;
                    while done < total {
                        let n = data.len().min(total - done);
                        hasher.update(&data[..n]);
                        done += n;
                    }
                }
                StringToKey::Gnu { .. } => {
                    unsupported_err!("GNU S2K extensions do not derive keys");
                }
            }

            key.extend_from_slice(&hasher.finalize());
        }

        key.truncate(key_size);
        Ok(key)
    }
}

impl Serialize for StringToKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            StringToKey::Simple { hash_alg } => {
                writer.write_all(&[0, (*hash_alg).into()])?;
            }
            StringToKey::Salted { hash_alg, salt } => {
                writer.write_all(&[1, (*hash_alg).into()])?;
                writer.write_all(salt)?;
            }
            StringToKey::IteratedAndSalted {
                hash_alg,
                salt,
                count,
            } => {
                writer.write_all(&[3, (*hash_alg).into()])?;
                writer.write_all(salt)?;
                writer.write_all(&[*count])?;
            }
            StringToKey::Gnu { hash_alg, mode } => {
                writer.write_all(&[101, (*hash_alg).into()])?;
                writer.write_all(GNU_MAGIC)?;
                writer.write_all(&[*mode])?;
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            StringToKey::Simple { .. } => 2,
            StringToKey::Salted { .. } => 10,
            StringToKey::IteratedAndSalted { .. } => 11,
            StringToKey::Gnu { .. } => 6,
        }
    }
}
