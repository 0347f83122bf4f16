//! Signature packets: subpackets, hashing, creation and verification.

mod config;
mod de;
mod ser;
mod subpacket;
mod types;

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;

pub use self::config::SignatureConfig;
pub use self::subpacket::{Subpacket, SubpacketData, SubpacketType};
pub use self::types::*;

use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PublicKey, UserId};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId};

/// Signature Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-signature-packet-type-id-2>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Signature {
    pub config: SignatureConfig,
    #[debug("{}", hex::encode(signed_hash_value))]
    pub signed_hash_value: [u8; 2],
    #[debug("{}", hex::encode(signature))]
    pub signature: Bytes,
}

impl Signature {
    pub fn from_config(
        config: SignatureConfig,
        signed_hash_value: [u8; 2],
        signature: Bytes,
    ) -> Self {
        Signature {
            config,
            signed_hash_value,
            signature,
        }
    }

    /// Returns what kind of signature this is.
    pub fn typ(&self) -> SignatureType {
        self.config.typ
    }

    /// The used `HashAlgorithm`.
    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    pub fn pub_alg(&self) -> PublicKeyAlgorithm {
        self.config.pub_alg
    }

    /// Verify this signature over `data`.
    pub fn verify<R: Read>(&self, key: &PublicKey, data: R) -> Result<()> {
        ensure!(
            self.is_issued_by(key),
            "verify: no matching issuer or issuer fingerprint for key {}",
            key.key_id()
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;
        self.config.hash_data_to_sign(&mut hasher, data)?;
        self.finish_verify(key, hasher, "signature")
    }

    /// Verify this signature over data already fed into `hasher`.
    pub fn verify_hasher(&self, key: &PublicKey, hasher: Box<dyn DynDigest>) -> Result<()> {
        ensure!(
            self.is_issued_by(key),
            "verify: no matching issuer or issuer fingerprint for key {}",
            key.key_id()
        );
        self.finish_verify(key, hasher, "signature")
    }

    /// Verifies a certification of `id` on `key`, made by `signer`.
    pub fn verify_certification(
        &self,
        signer: &PublicKey,
        key: &PublicKey,
        id: &UserId,
    ) -> Result<()> {
        debug!("verifying certification {} by {}", key.key_id(), signer.key_id());
        ensure!(
            self.typ().is_certification(),
            "not a certification: {:?}",
            self.typ()
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;
        key.hash_for_signature(&mut *hasher)?;
        id.hash_for_signature(&mut *hasher)?;
        self.finish_verify(signer, hasher, "certification")
    }

    /// Verifies a subkey binding or subkey revocation made by `primary`.
    ///
    /// A binding that grants signing must carry an embedded primary key
    /// binding signature made by the subkey.
    pub fn verify_key_binding(&self, primary: &PublicKey, subkey: &PublicKey) -> Result<()> {
        debug!(
            "verifying key binding {} - {}",
            primary.key_id(),
            subkey.key_id()
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;
        primary.hash_for_signature(&mut *hasher)?;
        subkey.hash_for_signature(&mut *hasher)?;
        self.finish_verify(primary, hasher, "key binding")?;

        if self.has_key_flags() && self.key_flags().sign() {
            let Some(backsig) = self.embedded_signature() else {
                bail!("signing subkey {} is missing cross-signature", subkey.key_id());
            };
            ensure_eq!(
                backsig.typ(),
                SignatureType::KeyBinding,
                "cross-signature has wrong type"
            );
            backsig.verify_primary_key_binding(primary, subkey)?;
        }
        Ok(())
    }

    /// Verifies a primary key binding signature ("back signature") made by the subkey.
    pub fn verify_primary_key_binding(&self, primary: &PublicKey, subkey: &PublicKey) -> Result<()> {
        let mut hasher = self.config.hash_alg.new_hasher()?;
        primary.hash_for_signature(&mut *hasher)?;
        subkey.hash_for_signature(&mut *hasher)?;
        self.finish_verify(subkey, hasher, "primary key binding")
    }

    /// Verifies a direct key signature or a revocation.
    pub fn verify_key(&self, key: &PublicKey) -> Result<()> {
        debug!("verifying key signature {:?} on {}", self.typ(), key.key_id());

        let mut hasher = self.config.hash_alg.new_hasher()?;
        key.hash_for_signature(&mut *hasher)?;
        self.finish_verify(key, hasher, "key")
    }

    fn finish_verify(
        &self,
        signer: &PublicKey,
        mut hasher: Box<dyn DynDigest>,
        what: &str,
    ) -> Result<()> {
        let len = self.config.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.config.trailer(len)?);

        let hash = hasher.finalize();
        ensure_eq!(
            &self.signed_hash_value[..],
            &hash[0..2],
            "{}: invalid signed hash value",
            what
        );

        signer.verify_signature(self.config.hash_alg, &hash, &self.signature)
    }

    /// Whether `key` is the issuer, by fingerprint if present, else by key id.
    pub fn is_issued_by(&self, key: &PublicKey) -> bool {
        if let Some(fp) = self.issuer_fingerprint() {
            return fp == key.fingerprint();
        }
        match self.issuer() {
            Some(id) => id == key.key_id(),
            None => false,
        }
    }

    fn hashed_find<T>(&self, f: impl Fn(&SubpacketData) -> Option<T>) -> Option<T> {
        self.config.hashed_subpackets().find_map(|p| f(&p.data))
    }

    fn any_find<T>(&self, f: impl Fn(&SubpacketData) -> Option<T>) -> Option<T> {
        self.config
            .hashed_subpackets()
            .chain(self.config.unhashed_subpackets())
            .find_map(|p| f(&p.data))
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.hashed_find(|p| match p {
            SubpacketData::SignatureCreationTime(d) => Some(*d),
            _ => None,
        })
    }

    pub fn signature_expiration_time(&self) -> Option<Duration> {
        self.hashed_find(|p| match p {
            SubpacketData::SignatureExpirationTime(d) => Some(*d),
            _ => None,
        })
    }

    pub fn key_expiration_time(&self) -> Option<Duration> {
        self.hashed_find(|p| match p {
            SubpacketData::KeyExpirationTime(d) => Some(*d),
            _ => None,
        })
    }

    pub fn issuer(&self) -> Option<KeyId> {
        self.any_find(|p| match p {
            SubpacketData::Issuer(id) => Some(*id),
            _ => None,
        })
    }

    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.any_find(|p| match p {
            SubpacketData::IssuerFingerprint(fp) => Some(*fp),
            _ => None,
        })
    }

    pub fn preferred_symmetric_algs(&self) -> &[SymmetricKeyAlgorithm] {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredSymmetricAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn preferred_hash_algs(&self) -> &[HashAlgorithm] {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredHashAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn preferred_compression_algs(&self) -> &[CompressionAlgorithm] {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredCompressionAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn preferred_aead_algs(&self) -> &[AeadAlgorithm] {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredEncryptionModes(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    /// Whether a key flags subpacket is present at all.
    pub fn has_key_flags(&self) -> bool {
        self.config
            .hashed_subpackets()
            .any(|p| matches!(p.data, SubpacketData::KeyFlags(_)))
    }

    pub fn key_flags(&self) -> KeyFlags {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::KeyFlags(d) => Some(KeyFlags::from(&d[..])),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn features(&self) -> &[u8] {
        self.config
            .hashed_subpackets()
            .find_map(|p| match &p.data {
                SubpacketData::Features(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    /// Whether the features subpacket announces SEIPDv2.
    pub fn supports_seipd_v2(&self) -> bool {
        self.features()
            .first()
            .is_some_and(|f| f & FEATURE_SEIPD_V2 != 0)
    }

    pub fn revocation_reason_code(&self) -> Option<RevocationCode> {
        self.hashed_find(|p| match p {
            SubpacketData::RevocationReason(code, _) => Some(*code),
            _ => None,
        })
    }

    pub fn revocation_reason_string(&self) -> Option<&Bytes> {
        self.config.hashed_subpackets().find_map(|p| match &p.data {
            SubpacketData::RevocationReason(_, reason) => Some(reason),
            _ => None,
        })
    }

    pub fn is_primary(&self) -> bool {
        self.hashed_find(|p| match p {
            SubpacketData::IsPrimary(d) => Some(*d),
            _ => None,
        })
        .unwrap_or(false)
    }

    pub fn embedded_signature(&self) -> Option<&Signature> {
        self.config
            .hashed_subpackets()
            .chain(self.config.unhashed_subpackets())
            .find_map(|p| match &p.data {
                SubpacketData::EmbeddedSignature(d) => Some(&**d),
                _ => None,
            })
    }

    /// Whether the signature is not (or no longer) valid at `now`.
    ///
    /// Signatures created after `now` count as expired, as do signatures
    /// without a creation time.
    pub fn sig_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(created) = self.created() else {
            return true;
        };
        if created > now {
            return true;
        }
        match self.signature_expiration_time() {
            None => false,
            Some(lifetime) if lifetime.is_zero() => false,
            Some(lifetime) => match chrono::Duration::from_std(lifetime) {
                Ok(lifetime) => now > created + lifetime,
                Err(_) => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use smallvec::smallvec;

    use super::*;
    use crate::packet::SecretKey;
    use crate::ser::Serialize;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sig_expired() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let now = fixed_now();
        let key = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();

        let mut config = SignatureConfig::from_key(
            key.public_key(),
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            now,
        );
        config.push_hashed(SubpacketData::SignatureExpirationTime(Duration::from_secs(60)));
        let sig = config.sign(&key, &b"x"[..]).unwrap();

        assert!(sig.sig_expired(now - chrono::Duration::seconds(1)));
        assert!(!sig.sig_expired(now));
        assert!(!sig.sig_expired(now + chrono::Duration::seconds(60)));
        assert!(sig.sig_expired(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_key_binding_requires_cross_signature() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let now = fixed_now();
        let primary = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();
        let subkey = SecretKey::generate_ed25519(&mut rng, now, true).unwrap();

        let mut config = SignatureConfig::from_key(
            primary.public_key(),
            SignatureType::SubkeyBinding,
            HashAlgorithm::Sha256,
            now,
        );
        config.push_hashed(SubpacketData::KeyFlags(smallvec![0x02]));
        let missing = config
            .clone()
            .sign_key_binding(&primary, primary.public_key(), subkey.public_key())
            .unwrap();
        assert!(missing
            .verify_key_binding(primary.public_key(), subkey.public_key())
            .is_err());

        let backsig = SignatureConfig::from_key(
            subkey.public_key(),
            SignatureType::KeyBinding,
            HashAlgorithm::Sha256,
            now,
        )
        .sign_key_binding(&subkey, primary.public_key(), subkey.public_key())
        .unwrap();
        config.push_unhashed(SubpacketData::EmbeddedSignature(Box::new(backsig)));
        let binding = config
            .sign_key_binding(&primary, primary.public_key(), subkey.public_key())
            .unwrap();
        binding
            .verify_key_binding(primary.public_key(), subkey.public_key())
            .unwrap();

        let bytes = binding.to_bytes().unwrap();
        let parsed = Signature::try_from_buf(&bytes[..]).unwrap();
        assert_eq!(parsed, binding);
        assert!(parsed.embedded_signature().is_some());
    }

    #[test]
    fn test_is_issued_by_prefers_fingerprint() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let now = fixed_now();
        let a = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();
        let b = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();

        let mut config =
            SignatureConfig::new(SignatureType::Key, PublicKeyAlgorithm::Ed25519, HashAlgorithm::Sha256);
        config.push_hashed(SubpacketData::IssuerFingerprint(a.fingerprint()));
        config.push_unhashed(SubpacketData::Issuer(b.key_id()));
        let sig = Signature::from_config(config, [0, 0], Bytes::new());

        assert!(sig.is_issued_by(a.public_key()));
        assert!(!sig.is_issued_by(b.public_key()));
    }
}
