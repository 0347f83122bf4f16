//! Operation settings.
//!
//! Every operation that depends on the current time or picks algorithms takes
//! a [`Config`]. There is no implicit fallback to the system clock.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use derive_builder::Builder;

use crate::crypto::aead::{AeadAlgorithm, ChunkSize};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::rsa;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Error;
use crate::types::{CompressionAlgorithm, KeyId};

/// Default coded S2K count, 65536 octets.
pub const DEFAULT_S2K_COUNT: u8 = 96;

/// Smallest RSA modulus accepted for new keys, in bits.
pub const MIN_RSA_BITS: usize = 1024;

/// Algorithms of newly generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Ed25519 for signing and X25519 for encryption, RFC 9580 encoding.
    #[default]
    Curve25519,
    /// Ed25519 for signing and Curve25519 ECDH for encryption, in the RFC 6637
    /// encoding older implementations understand.
    Curve25519Legacy,
    /// RSA with a modulus of the given size in bits, for both.
    Rsa(usize),
}

impl KeyType {
    pub(crate) fn validate(self) -> std::result::Result<(), String> {
        if let KeyType::Rsa(bits) = self {
            if !(MIN_RSA_BITS..=rsa::MAX_KEY_SIZE).contains(&bits) {
                return Err(format!("RSA key size {bits} out of range"));
            }
        }
        Ok(())
    }
}

/// Settings for SEIPDv2 encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeadConfig {
    pub mode: AeadAlgorithm,
    pub chunk_size: ChunkSize,
}

impl Default for AeadConfig {
    fn default() -> Self {
        Self {
            mode: AeadAlgorithm::Eax,
            chunk_size: ChunkSize::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct Config {
    /// Evaluation instant for expiry checks, and creation time of new signatures.
    #[builder(setter(custom))]
    now: DateTime<Utc>,

    /// Preferred hash for new signatures.
    #[builder(default)]
    hash: HashAlgorithm,
    /// Preferred cipher for new messages.
    #[builder(default)]
    cipher: SymmetricKeyAlgorithm,
    #[builder(default)]
    compression: CompressionAlgorithm,
    /// Deflate level, 0 to 9.
    #[builder(default)]
    compression_level: Option<u32>,
    /// Enables SEIPDv2 when every recipient supports it.
    #[builder(default)]
    aead: Option<AeadConfig>,

    /// Lifetime written into new signatures.
    #[builder(default)]
    sig_lifetime: Option<Duration>,
    /// Lifetime written into new self-signatures.
    #[builder(default)]
    key_lifetime: Option<Duration>,

    /// Restricts signing to the key with this id.
    #[builder(default)]
    signing_key_id: KeyId,

    #[builder(default = "DEFAULT_S2K_COUNT")]
    s2k_count: u8,

    /// Algorithms of subkeys added to existing entities.
    #[builder(default)]
    key_type: KeyType,
}

impl ConfigBuilder {
    /// Sets the evaluation instant, truncated to whole seconds.
    pub fn now(&mut self, now: DateTime<Utc>) -> &mut Self {
        self.now = Some(now.trunc_subsecs(0));
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(Some(level)) = self.compression_level {
            if level > 9 {
                return Err(format!("compression level {level} out of range"));
            }
        }
        if let Some(Some(aead)) = self.aead {
            if matches!(aead.mode, AeadAlgorithm::None | AeadAlgorithm::Other(_)) {
                return Err(format!("AEAD mode {} is not usable", aead.mode));
            }
        }
        if let Some(cipher) = self.cipher {
            if !cipher.is_supported() {
                return Err(format!("cipher {cipher} is not supported"));
            }
        }
        if let Some(key_type) = self.key_type {
            key_type.validate()?;
        }
        Ok(())
    }
}

impl Config {
    /// Default settings, evaluated at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: now.trunc_subsecs(0),
            hash: HashAlgorithm::default(),
            cipher: SymmetricKeyAlgorithm::default(),
            compression: CompressionAlgorithm::default(),
            compression_level: None,
            aead: None,
            sig_lifetime: None,
            key_lifetime: None,
            signing_key_id: KeyId::WILDCARD,
            s2k_count: DEFAULT_S2K_COUNT,
            key_type: KeyType::default(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn cipher(&self) -> SymmetricKeyAlgorithm {
        self.cipher
    }

    pub fn compression(&self) -> CompressionAlgorithm {
        self.compression
    }

    pub fn compression_level(&self) -> Option<u32> {
        self.compression_level
    }

    pub fn aead(&self) -> Option<AeadConfig> {
        self.aead
    }

    pub fn sig_lifetime(&self) -> Option<Duration> {
        self.sig_lifetime
    }

    pub fn key_lifetime(&self) -> Option<Duration> {
        self.key_lifetime
    }

    pub fn signing_key_id(&self) -> KeyId {
        self.signing_key_id
    }

    pub fn s2k_count(&self) -> u8 {
        self.s2k_count
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// A copy evaluated at a different instant.
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        Self {
            now: now.trunc_subsecs(0),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_builder_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let config = Config::builder().now(now).build().unwrap();
        assert_eq!(config, Config::new(now));
        assert_eq!(config.cipher(), SymmetricKeyAlgorithm::AES128);
        assert_eq!(config.hash(), HashAlgorithm::Sha256);
        assert!(config.signing_key_id().is_wildcard());
    }

    #[test]
    fn test_builder_requires_now() {
        assert!(Config::builder().build().is_err());
    }

    #[test]
    fn test_builder_validates() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(Config::builder()
            .now(now)
            .compression_level(Some(12))
            .build()
            .is_err());
        assert!(Config::builder()
            .now(now)
            .cipher(SymmetricKeyAlgorithm::Twofish)
            .build()
            .is_err());
        assert!(Config::builder()
            .now(now)
            .key_type(KeyType::Rsa(512))
            .build()
            .is_err());
        let config = Config::builder()
            .now(now)
            .key_type(KeyType::Rsa(3072))
            .build()
            .unwrap();
        assert_eq!(config.key_type(), KeyType::Rsa(3072));
    }
}
