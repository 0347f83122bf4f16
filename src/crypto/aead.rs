use aead::{
    consts::{U12, U15},
    generic_array::typenum::Unsigned,
    AeadCore, AeadInPlace, KeyInit,
};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::AesGcm;
use eax::Eax;
use hkdf::Hkdf;
use num_enum::{FromPrimitive, IntoPrimitive};
use ocb3::Ocb3;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::types::Tag;

/// All supported modes use 16 byte authentication tags.
pub const TAG_SIZE: usize = 16;

/// Available AEAD algorithms.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum AeadAlgorithm {
    /// None
    #[display("None")]
    None = 0,
    #[display("EAX")]
    Eax = 1,
    #[display("OCB")]
    Ocb = 2,
    #[display("GCM")]
    Gcm = 3,

    #[num_enum(catch_all)]
    #[display("Other({_0})")]
    Other(u8),
}

impl Default for AeadAlgorithm {
    fn default() -> Self {
        Self::Eax
    }
}

/// Encoded chunk size octet of a SEIPDv2 packet.
///
/// The plaintext is split into chunks of `2^(c + 6)` bytes.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ChunkSize(u8);

impl ChunkSize {
    /// Largest allowed chunk size octet (4 MiB chunks).
    pub const MAX: u8 = 16;

    pub fn new(octet: u8) -> Result<Self> {
        if octet > Self::MAX {
            unsupported_err!("AEAD chunk size octet {} is too large", octet);
        }
        Ok(Self(octet))
    }

    pub fn as_byte_size(self) -> usize {
        1usize << (u32::from(self.0) + 6)
    }
}

impl Default for ChunkSize {
    /// 256 KiB chunks.
    fn default() -> Self {
        Self(12)
    }
}

impl From<ChunkSize> for u8 {
    fn from(value: ChunkSize) -> Self {
        value.0
    }
}

fn seal<C: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    buf: &mut [u8],
) -> Result<[u8; TAG_SIZE]> {
    ensure_eq!(nonce.len(), C::NonceSize::USIZE, "invalid nonce size");
    let cipher = C::new_from_slice(key)?;
    let tag = cipher.encrypt_in_place_detached(aead::Nonce::<C>::from_slice(nonce), ad, buf)?;
    let mut out = [0u8; TAG_SIZE];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn open<C: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    buf: &mut [u8],
    tag: &[u8],
) -> Result<()> {
    ensure_eq!(nonce.len(), C::NonceSize::USIZE, "invalid nonce size");
    ensure_eq!(tag.len(), TAG_SIZE, "invalid tag size");
    let cipher = C::new_from_slice(key)?;
    cipher.decrypt_in_place_detached(
        aead::Nonce::<C>::from_slice(nonce),
        ad,
        buf,
        aead::Tag::<C>::from_slice(tag),
    )?;
    Ok(())
}

impl AeadAlgorithm {
    /// Nonce size used for this AEAD algorithm.
    pub fn nonce_size(self) -> usize {
        match self {
            Self::Eax => 16,
            Self::Ocb => 15,
            Self::Gcm => 12,
            _ => 0,
        }
    }

    /// Size of the authentication tag.
    pub fn tag_size(self) -> Option<usize> {
        match self {
            Self::Eax | Self::Ocb | Self::Gcm => Some(TAG_SIZE),
            _ => None,
        }
    }

    /// Encrypts `buf` in place, returning the detached tag.
    pub fn encrypt_in_place(
        self,
        sym: SymmetricKeyAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
        buf: &mut [u8],
    ) -> Result<[u8; TAG_SIZE]> {
        use SymmetricKeyAlgorithm::*;

        match (self, sym) {
            (Self::Eax, AES128) => seal::<Eax<Aes128>>(key, nonce, ad, buf),
            (Self::Eax, AES192) => seal::<Eax<Aes192>>(key, nonce, ad, buf),
            (Self::Eax, AES256) => seal::<Eax<Aes256>>(key, nonce, ad, buf),
            (Self::Ocb, AES128) => seal::<Ocb3<Aes128, U15>>(key, nonce, ad, buf),
            (Self::Ocb, AES192) => seal::<Ocb3<Aes192, U15>>(key, nonce, ad, buf),
            (Self::Ocb, AES256) => seal::<Ocb3<Aes256, U15>>(key, nonce, ad, buf),
            (Self::Gcm, AES128) => seal::<AesGcm<Aes128, U12>>(key, nonce, ad, buf),
            (Self::Gcm, AES192) => seal::<AesGcm<Aes192, U12>>(key, nonce, ad, buf),
            (Self::Gcm, AES256) => seal::<AesGcm<Aes256, U12>>(key, nonce, ad, buf),
            _ => unsupported_err!("AEAD {} with {}", self, sym),
        }
    }

    /// Decrypts `buf` in place, checking the detached `tag`.
    pub fn decrypt_in_place(
        self,
        sym: SymmetricKeyAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
        buf: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        use SymmetricKeyAlgorithm::*;

        match (self, sym) {
            (Self::Eax, AES128) => open::<Eax<Aes128>>(key, nonce, ad, buf, tag),
            (Self::Eax, AES192) => open::<Eax<Aes192>>(key, nonce, ad, buf, tag),
            (Self::Eax, AES256) => open::<Eax<Aes256>>(key, nonce, ad, buf, tag),
            (Self::Ocb, AES128) => open::<Ocb3<Aes128, U15>>(key, nonce, ad, buf, tag),
            (Self::Ocb, AES192) => open::<Ocb3<Aes192, U15>>(key, nonce, ad, buf, tag),
            (Self::Ocb, AES256) => open::<Ocb3<Aes256, U15>>(key, nonce, ad, buf, tag),
            (Self::Gcm, AES128) => open::<AesGcm<Aes128, U12>>(key, nonce, ad, buf, tag),
            (Self::Gcm, AES192) => open::<AesGcm<Aes192, U12>>(key, nonce, ad, buf, tag),
            (Self::Gcm, AES256) => open::<AesGcm<Aes256, U12>>(key, nonce, ad, buf, tag),
            _ => unsupported_err!("AEAD {} with {}", self, sym),
        }
    }
}

/// Key material of a SEIPDv2 packet, derived from the session key.
pub struct AeadSetup {
    /// Associated data of every chunk.
    pub info: [u8; 5],
    pub message_key: Zeroizing<Vec<u8>>,
    /// IV followed by the eight byte chunk index.
    pub nonce: Vec<u8>,
}

impl AeadSetup {
    /// Derives message key and IV with HKDF-SHA256.
    ///
    /// Ref <https://www.rfc-editor.org/rfc/rfc9580.html#name-version-2-symmetrically-enc>
    pub fn new(
        sym: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        chunk_size: ChunkSize,
        salt: &[u8],
        session_key: &[u8],
    ) -> Result<Self> {
        ensure_eq!(
            session_key.len(),
            sym.key_size(),
            "invalid session key size for {}",
            sym
        );
        let nonce_size = aead.nonce_size();
        ensure!(nonce_size > 8, "unsupported AEAD mode {}", aead);

        let info = [
            Tag::SymEncryptedProtectedData.encode(),
            0x02,
            sym.into(),
            aead.into(),
            chunk_size.into(),
        ];

        let hk = Hkdf::<Sha256>::new(Some(salt), session_key);
        let mut okm = Zeroizing::new(vec![0u8; sym.key_size() + nonce_size - 8]);
        hk.expand(&info, &mut okm)
            .map_err(|_| Error::InvalidKeyLength)?;

        let message_key = Zeroizing::new(okm[..sym.key_size()].to_vec());
        let mut nonce = vec![0u8; nonce_size];
        nonce[..nonce_size - 8].copy_from_slice(&okm[sym.key_size()..]);

        Ok(Self {
            info,
            message_key,
            nonce,
        })
    }

    /// Sets the trailing eight bytes of the nonce to the chunk index.
    pub fn set_chunk_index(&mut self, index: u64) {
        let l = self.nonce.len() - 8;
        self.nonce[l..].copy_from_slice(&index.to_be_bytes());
    }
}
