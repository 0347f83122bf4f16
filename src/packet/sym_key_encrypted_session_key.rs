use std::io;

use bytes::{Buf, Bytes};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{StringToKey, Tag};

const SKESK_VERSION: u8 = 4;

/// Symmetric-Key Encrypted Session Key Packet, version 4
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-encrypted-ses>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct SymKeyEncryptedSessionKey {
    sym_algorithm: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    /// When absent, the S2K output is the session key.
    #[debug("{:?}", encrypted_key.as_ref().map(hex::encode))]
    encrypted_key: Option<Bytes>,
}

impl SymKeyEncryptedSessionKey {
    /// A packet whose S2K output is the session key.
    ///
    /// Returns the packet and the derived session key.
    pub fn new<R: Rng + CryptoRng>(
        rng: R,
        passphrase: &[u8],
        sym_algorithm: SymmetricKeyAlgorithm,
        s2k_count: u8,
    ) -> Result<(Self, Zeroizing<Vec<u8>>)> {
        let s2k = StringToKey::new_iterated(rng, HashAlgorithm::Sha256, s2k_count);
        let session_key = s2k.derive_key(passphrase, sym_algorithm.key_size())?;
        let packet = SymKeyEncryptedSessionKey {
            sym_algorithm,
            s2k,
            encrypted_key: None,
        };
        Ok((packet, session_key))
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != SKESK_VERSION {
            unsupported_err!("SKESK version {}", version);
        }
        let sym_algorithm = SymmetricKeyAlgorithm::from(i.read_u8()?);
        let s2k = StringToKey::try_from_buf(&mut i)?;
        let encrypted_key = if i.has_remaining() {
            Some(i.rest())
        } else {
            None
        };

        Ok(SymKeyEncryptedSessionKey {
            sym_algorithm,
            s2k,
            encrypted_key,
        })
    }

    pub fn sym_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.sym_algorithm
    }

    /// Derives the session key and the cipher it is used with.
    pub fn decrypt(
        &self,
        passphrase: &[u8],
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let key = self
            .s2k
            .derive_key(passphrase, self.sym_algorithm.key_size())?;
        let Some(encrypted_key) = &self.encrypted_key else {
            return Ok((self.sym_algorithm, key));
        };

        let iv = vec![0u8; self.sym_algorithm.block_size()];
        let mut decrypted = Zeroizing::new(encrypted_key.to_vec());
        self.sym_algorithm
            .decrypt_with_iv(&key, &iv, &mut decrypted)?;
        ensure!(!decrypted.is_empty(), "empty encrypted session key");

        let sym_alg = SymmetricKeyAlgorithm::from(decrypted[0]);
        ensure_eq!(
            decrypted.len() - 1,
            sym_alg.key_size(),
            "invalid session key size for {}",
            sym_alg
        );
        Ok((sym_alg, Zeroizing::new(decrypted[1..].to_vec())))
    }
}

impl Serialize for SymKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[SKESK_VERSION, self.sym_algorithm.into()])?;
        self.s2k.to_writer(writer)?;
        if let Some(key) = &self.encrypted_key {
            writer.write_all(key)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.s2k.write_len() + self.encrypted_key.as_ref().map_or(0, |k| k.len())
    }
}

impl PacketTrait for SymKeyEncryptedSessionKey {
    fn tag(&self) -> Tag {
        Tag::SymKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_derived_session_key() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (packet, session_key) =
            SymKeyEncryptedSessionKey::new(&mut rng, b"hunter2", SymmetricKeyAlgorithm::AES128, 96)
                .unwrap();
        assert_eq!(session_key.len(), 16);

        let bytes = packet.to_bytes().unwrap();
        let parsed = SymKeyEncryptedSessionKey::try_from_buf(&bytes[..]).unwrap();
        let (alg, key) = parsed.decrypt(b"hunter2").unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES128);
        assert_eq!(&key[..], &session_key[..]);

        let (_, wrong) = parsed.decrypt(b"hunter3").unwrap();
        assert_ne!(&wrong[..], &session_key[..]);
    }
}
