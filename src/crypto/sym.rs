use aes::{Aes128, Aes192, Aes256};
use cast5::Cast5;
use cfb_mode::{cipher::KeyIvInit, BufDecryptor, BufEncryptor};
use des::TdesEde3;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::errors::Result;

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    #[display("Plaintext")]
    Plaintext = 0,
    /// IDEA
    #[display("IDEA")]
    IDEA = 1,
    /// Triple-DES
    #[display("3DES")]
    TripleDES = 2,
    /// CAST5
    #[display("CAST5")]
    CAST5 = 3,
    /// Blowfish
    #[display("Blowfish")]
    Blowfish = 4,
    // 5 & 6 are reserved for DES/SK
    /// AES with 128-bit key
    #[display("AES128")]
    AES128 = 7,
    /// AES with 192-bit key
    #[display("AES192")]
    AES192 = 8,
    /// AES with 256-bit key
    #[display("AES256")]
    AES256 = 9,
    /// Twofish with 256-bit key
    #[display("Twofish")]
    Twofish = 10,

    #[num_enum(catch_all)]
    #[display("Other({_0})")]
    Other(u8),
}

impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES128
    }
}

impl zeroize::DefaultIsZeroes for SymmetricKeyAlgorithm {}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA
            | SymmetricKeyAlgorithm::TripleDES
            | SymmetricKeyAlgorithm::CAST5
            | SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128
            | SymmetricKeyAlgorithm::AES192
            | SymmetricKeyAlgorithm::AES256
            | SymmetricKeyAlgorithm::Twofish => 16,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of the key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// Whether this crate can encrypt and decrypt with the algorithm.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            SymmetricKeyAlgorithm::TripleDES
                | SymmetricKeyAlgorithm::CAST5
                | SymmetricKeyAlgorithm::AES128
                | SymmetricKeyAlgorithm::AES192
                | SymmetricKeyAlgorithm::AES256
        )
    }

    /// Generates a new session key of the right size.
    pub fn new_session_key<R: Rng + CryptoRng>(self, mut rng: R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }

    /// Starts an unsynchronized CFB encryption stream.
    pub fn cfb_encryptor(self, key: &[u8], iv: &[u8]) -> Result<CfbEncryptor> {
        let enc = match self {
            SymmetricKeyAlgorithm::TripleDES => {
                CfbEncryptor::TripleDes(BufEncryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::CAST5 => {
                CfbEncryptor::Cast5(BufEncryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES128 => {
                CfbEncryptor::Aes128(BufEncryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES192 => {
                CfbEncryptor::Aes192(BufEncryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES256 => {
                CfbEncryptor::Aes256(BufEncryptor::new_from_slices(key, iv)?)
            }
            _ => unsupported_err!("CFB encryption with {}", self),
        };
        Ok(enc)
    }

    /// Starts an unsynchronized CFB decryption stream.
    pub fn cfb_decryptor(self, key: &[u8], iv: &[u8]) -> Result<CfbDecryptor> {
        let dec = match self {
            SymmetricKeyAlgorithm::TripleDES => {
                CfbDecryptor::TripleDes(BufDecryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::CAST5 => {
                CfbDecryptor::Cast5(BufDecryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES128 => {
                CfbDecryptor::Aes128(BufDecryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES192 => {
                CfbDecryptor::Aes192(BufDecryptor::new_from_slices(key, iv)?)
            }
            SymmetricKeyAlgorithm::AES256 => {
                CfbDecryptor::Aes256(BufDecryptor::new_from_slices(key, iv)?)
            }
            _ => unsupported_err!("CFB decryption with {}", self),
        };
        Ok(dec)
    }

    /// Encrypts `data` in place in CFB mode.
    pub fn encrypt_with_iv(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.cfb_encryptor(key, iv)?.encrypt(data);
        Ok(())
    }

    /// Decrypts `data` in place in CFB mode.
    pub fn decrypt_with_iv(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.cfb_decryptor(key, iv)?.decrypt(data);
        Ok(())
    }
}

/// Buffered CFB encryption, usable across many calls.
pub enum CfbEncryptor {
    TripleDes(BufEncryptor<TdesEde3>),
    Cast5(BufEncryptor<Cast5>),
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

impl CfbEncryptor {
    pub fn encrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::TripleDes(e) => e.encrypt(data),
            Self::Cast5(e) => e.encrypt(data),
            Self::Aes128(e) => e.encrypt(data),
            Self::Aes192(e) => e.encrypt(data),
            Self::Aes256(e) => e.encrypt(data),
        }
    }
}

/// Buffered CFB decryption, usable across many calls.
pub enum CfbDecryptor {
    TripleDes(BufDecryptor<TdesEde3>),
    Cast5(BufDecryptor<Cast5>),
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

impl CfbDecryptor {
    pub fn decrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::TripleDes(d) => d.decrypt(data),
            Self::Cast5(d) => d.decrypt(data),
            Self::Aes128(d) => d.decrypt(data),
            Self::Aes192(d) => d.decrypt(data),
            Self::Aes256(d) => d.decrypt(data),
        }
    }
}
