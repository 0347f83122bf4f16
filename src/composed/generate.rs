//! Creating new entities, identities and subkeys.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use derive_builder::Builder;
use log::debug;
use rand::{CryptoRng, Rng};
use smallvec::{smallvec, SmallVec};

use crate::composed::entity::{Entity, Identity, Subkey};
use crate::config::{Config, KeyType};
use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::{
    KeyFlags, PublicKey, SecretKey, Signature, SignatureConfig, SignatureType, SubpacketData,
    UserId, FEATURE_SEIPD_V1, FEATURE_SEIPD_V2,
};
use crate::types::CompressionAlgorithm;

/// Parameters for [`EntityBuilder`], which generates a primary key for
/// certification and signing, and a subkey for encryption. The algorithms
/// follow [`KeyType`], Ed25519 and X25519 by default.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(
    name = "EntityBuilder",
    build_fn(name = "build_params", validate = "Self::validate", error = "Error")
)]
pub struct EntityParams {
    #[builder(setter(into))]
    primary_user_id: String,
    #[builder(default)]
    user_ids: Vec<String>,

    /// Creation time of the keys and their self-signatures.
    #[builder(setter(custom))]
    created_at: DateTime<Utc>,
    /// Lifetime of the primary key and the subkey.
    #[builder(default)]
    key_lifetime: Option<Duration>,
    /// Hash for the self-signatures.
    #[builder(default)]
    hash: HashAlgorithm,
    #[builder(default)]
    key_type: KeyType,

    #[builder(default = "smallvec![SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128]")]
    preferred_symmetric_algorithms: SmallVec<[SymmetricKeyAlgorithm; 8]>,
    #[builder(default = "smallvec![HashAlgorithm::Sha256, HashAlgorithm::Sha512]")]
    preferred_hash_algorithms: SmallVec<[HashAlgorithm; 8]>,
    #[builder(
        default = "smallvec![CompressionAlgorithm::ZLIB, CompressionAlgorithm::ZIP, CompressionAlgorithm::Uncompressed]"
    )]
    preferred_compression_algorithms: SmallVec<[CompressionAlgorithm; 8]>,
    /// Advertise SEIPDv2 in the features subpacket.
    #[builder(default)]
    seipd_v2: bool,
    #[builder(default = "smallvec![AeadAlgorithm::Ocb, AeadAlgorithm::Eax]")]
    preferred_aead_algorithms: SmallVec<[AeadAlgorithm; 4]>,
}

impl EntityBuilder {
    pub fn created_at(&mut self, created_at: DateTime<Utc>) -> &mut Self {
        self.created_at = Some(created_at.trunc_subsecs(0));
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(name) = &self.primary_user_id {
            if name.is_empty() {
                return Err("primary user id must not be empty".into());
            }
        }
        if let Some(algs) = &self.preferred_symmetric_algorithms {
            if let Some(alg) = algs.iter().find(|alg| !alg.is_supported()) {
                return Err(format!("cipher {alg} is not supported"));
            }
        }
        if let Some(key_type) = self.key_type {
            key_type.validate()?;
        }
        Ok(())
    }

    /// Generates the keys and self-signs them.
    pub fn generate<R: Rng + CryptoRng>(&self, rng: R) -> Result<Entity> {
        self.build_params()?.generate(rng)
    }
}

impl EntityParams {
    pub fn generate<R: Rng + CryptoRng>(self, mut rng: R) -> Result<Entity> {
        let primary = generate_signing_key(&mut rng, self.key_type, self.created_at, false)?;
        let subkey = generate_encryption_key(&mut rng, self.key_type, self.created_at, true)?;
        debug!(
            "generated key {} with subkey {}",
            primary.key_id(),
            subkey.key_id()
        );

        let mut identities = BTreeMap::new();
        let names = std::iter::once(&self.primary_user_id).chain(self.user_ids.iter());
        for (i, name) in names.enumerate() {
            let user_id = UserId::from_str(name);
            let mut config = self.self_signature_config(primary.public_key());
            if i == 0 {
                config.push_hashed(SubpacketData::IsPrimary(true));
            }
            let sig = config.sign_certification(&primary, primary.public_key(), &user_id)?;

            let mut identity = Identity::new(user_id);
            identity.self_signature = Some(sig.clone());
            identity.signatures.push(sig);
            identities.insert(identity.name.clone(), identity);
        }

        let mut flags = KeyFlags::default();
        flags.set_encrypt_comms(true);
        flags.set_encrypt_storage(true);
        let mut config = SignatureConfig::from_key(
            primary.public_key(),
            SignatureType::SubkeyBinding,
            self.hash,
            self.created_at,
        );
        config.push_hashed(SubpacketData::KeyFlags(flags.into()));
        if let Some(lifetime) = self.key_lifetime {
            config.push_hashed(SubpacketData::KeyExpirationTime(lifetime));
        }
        let binding = config.sign_key_binding(&primary, primary.public_key(), subkey.public_key())?;

        Ok(Entity {
            primary_key: primary.public_key().clone(),
            private_key: Some(primary),
            identities,
            revocations: Vec::new(),
            subkeys: vec![Subkey {
                public_key: subkey.public_key().clone(),
                private_key: Some(subkey),
                sig: binding,
                revocations: Vec::new(),
            }],
        })
    }

    /// Positive certification with flags, preferences and features.
    fn self_signature_config(&self, primary: &PublicKey) -> SignatureConfig {
        let mut flags = KeyFlags::default();
        flags.set_certify(true);
        flags.set_sign(true);

        let mut features = FEATURE_SEIPD_V1;
        if self.seipd_v2 {
            features |= FEATURE_SEIPD_V2;
        }

        let mut config = SignatureConfig::from_key(
            primary,
            SignatureType::CertPositive,
            self.hash,
            self.created_at,
        );
        config.push_hashed(SubpacketData::KeyFlags(flags.into()));
        if let Some(lifetime) = self.key_lifetime {
            config.push_hashed(SubpacketData::KeyExpirationTime(lifetime));
        }
        config.push_hashed(SubpacketData::PreferredSymmetricAlgorithms(
            self.preferred_symmetric_algorithms.clone(),
        ));
        config.push_hashed(SubpacketData::PreferredHashAlgorithms(
            self.preferred_hash_algorithms.clone(),
        ));
        config.push_hashed(SubpacketData::PreferredCompressionAlgorithms(
            self.preferred_compression_algorithms.clone(),
        ));
        if self.seipd_v2 {
            config.push_hashed(SubpacketData::PreferredEncryptionModes(
                self.preferred_aead_algorithms.clone(),
            ));
        }
        config.push_hashed(SubpacketData::Features(smallvec![features]));
        config
    }
}

impl Entity {
    fn signing_private_key(&self) -> Result<&SecretKey> {
        let Some(private_key) = &self.private_key else {
            invalid_argument_err!("entity {} has no private key", self.key_id());
        };
        if private_key.is_dummy() {
            invalid_argument_err!("dummy private key {} can not sign", self.key_id());
        }
        if private_key.is_encrypted() {
            invalid_argument_err!("private key {} must be decrypted", self.key_id());
        }
        Ok(private_key)
    }

    /// Adds a new identity, self-signed at `config.now()`.
    ///
    /// Flags, preferences and features are copied from the current primary
    /// identity.
    pub fn add_user_id(&mut self, name: &str, config: &Config) -> Result<()> {
        if self.identities.contains_key(name) {
            invalid_argument_err!("user id {:?} already exists", name);
        }
        let private_key = self.signing_private_key()?;

        let mut sig_config = SignatureConfig::from_key(
            &self.primary_key,
            SignatureType::CertPositive,
            config.hash(),
            config.now(),
        );
        if let Some(primary_sig) = self
            .primary_identity()
            .and_then(|identity| identity.self_signature.as_ref())
        {
            let inherited = primary_sig
                .config
                .hashed_subpackets()
                .filter(|p| is_inherited(&p.data))
                .cloned();
            sig_config.hashed_subpackets.extend(inherited);
        }

        let user_id = UserId::from_str(name);
        let sig = sig_config.sign_certification(private_key, &self.primary_key, &user_id)?;

        let mut identity = Identity::new(user_id);
        identity.self_signature = Some(sig.clone());
        identity.signatures.push(sig);
        self.identities.insert(identity.name.clone(), identity);
        Ok(())
    }

    /// Adds a new signing subkey of `config.key_type()`, cross-signed by
    /// itself.
    pub fn add_signing_subkey<R: Rng + CryptoRng>(&mut self, rng: R, config: &Config) -> Result<()> {
        let private_key = self.signing_private_key()?;
        let subkey = generate_signing_key(rng, config.key_type(), config.now(), true)?;

        let backsig = SignatureConfig::from_key(
            subkey.public_key(),
            SignatureType::KeyBinding,
            config.hash(),
            config.now(),
        )
        .sign_key_binding(&subkey, &self.primary_key, subkey.public_key())?;

        let mut flags = KeyFlags::default();
        flags.set_sign(true);
        let mut sig_config = self.binding_config(flags, config);
        sig_config.push_hashed(SubpacketData::EmbeddedSignature(Box::new(backsig)));
        let sig = sig_config.sign_key_binding(private_key, &self.primary_key, subkey.public_key())?;

        self.push_subkey(subkey, sig);
        Ok(())
    }

    /// Adds a new encryption subkey of `config.key_type()`.
    pub fn add_encryption_subkey<R: Rng + CryptoRng>(
        &mut self,
        rng: R,
        config: &Config,
    ) -> Result<()> {
        let private_key = self.signing_private_key()?;
        let subkey = generate_encryption_key(rng, config.key_type(), config.now(), true)?;

        let mut flags = KeyFlags::default();
        flags.set_encrypt_comms(true);
        flags.set_encrypt_storage(true);
        let sig = self
            .binding_config(flags, config)
            .sign_key_binding(private_key, &self.primary_key, subkey.public_key())?;

        self.push_subkey(subkey, sig);
        Ok(())
    }

    fn binding_config(&self, flags: KeyFlags, config: &Config) -> SignatureConfig {
        let mut sig_config = SignatureConfig::from_key(
            &self.primary_key,
            SignatureType::SubkeyBinding,
            config.hash(),
            config.now(),
        );
        sig_config.push_hashed(SubpacketData::KeyFlags(flags.into()));
        if let Some(lifetime) = config.key_lifetime() {
            sig_config.push_hashed(SubpacketData::KeyExpirationTime(lifetime));
        }
        sig_config
    }

    fn push_subkey(&mut self, subkey: SecretKey, sig: Signature) {
        debug!("adding subkey {} to {}", subkey.key_id(), self.key_id());
        self.subkeys.push(Subkey {
            public_key: subkey.public_key().clone(),
            private_key: Some(subkey),
            sig,
            revocations: Vec::new(),
        });
    }
}

fn generate_signing_key<R: Rng + CryptoRng>(
    rng: R,
    key_type: KeyType,
    created_at: DateTime<Utc>,
    is_subkey: bool,
) -> Result<SecretKey> {
    match key_type {
        KeyType::Curve25519 => SecretKey::generate_ed25519(rng, created_at, is_subkey),
        KeyType::Curve25519Legacy => SecretKey::generate_eddsa_legacy(rng, created_at, is_subkey),
        KeyType::Rsa(bits) => SecretKey::generate_rsa(rng, bits, created_at, is_subkey),
    }
}

fn generate_encryption_key<R: Rng + CryptoRng>(
    rng: R,
    key_type: KeyType,
    created_at: DateTime<Utc>,
    is_subkey: bool,
) -> Result<SecretKey> {
    match key_type {
        KeyType::Curve25519 => SecretKey::generate_x25519(rng, created_at, is_subkey),
        KeyType::Curve25519Legacy => SecretKey::generate_ecdh(rng, created_at, is_subkey),
        KeyType::Rsa(bits) => SecretKey::generate_rsa(rng, bits, created_at, is_subkey),
    }
}

/// Subpackets a new identity takes over from the primary one.
fn is_inherited(data: &SubpacketData) -> bool {
    matches!(
        data,
        SubpacketData::KeyFlags(_)
            | SubpacketData::KeyExpirationTime(_)
            | SubpacketData::PreferredSymmetricAlgorithms(_)
            | SubpacketData::PreferredHashAlgorithms(_)
            | SubpacketData::PreferredCompressionAlgorithms(_)
            | SubpacketData::PreferredEncryptionModes(_)
            | SubpacketData::Features(_)
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::public_key::PublicKeyAlgorithm;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_generate() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let entity = EntityBuilder::default()
            .primary_user_id("Alice <alice@example.org>")
            .user_ids(vec!["Alice <alice@work.example>".into()])
            .created_at(created())
            .generate(&mut rng)
            .unwrap();

        assert_eq!(entity.identities.len(), 2);
        let primary = entity.primary_identity().unwrap();
        assert_eq!(primary.name, "Alice <alice@example.org>");
        let sig = primary.self_signature.as_ref().unwrap();
        assert!(sig.is_primary());
        assert!(sig.key_flags().sign());
        assert!(!sig.supports_seipd_v2());
        sig.verify_certification(&entity.primary_key, &entity.primary_key, &primary.user_id)
            .unwrap();

        assert_eq!(entity.subkeys.len(), 1);
        let subkey = &entity.subkeys[0];
        assert!(subkey.sig.key_flags().encrypt_comms());
        subkey
            .sig
            .verify_key_binding(&entity.primary_key, &subkey.public_key)
            .unwrap();
    }

    #[test]
    fn test_builder_requires_fields() {
        assert!(EntityBuilder::default()
            .primary_user_id("a")
            .build_params()
            .is_err());
        assert!(EntityBuilder::default()
            .primary_user_id("")
            .created_at(created())
            .build_params()
            .is_err());
    }

    #[test]
    fn test_add_user_id_and_subkeys() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut entity = EntityBuilder::default()
            .primary_user_id("Bob")
            .created_at(created())
            .seipd_v2(true)
            .generate(&mut rng)
            .unwrap();
        let config = Config::new(created());

        entity.add_user_id("Robert", &config).unwrap();
        let robert = &entity.identities["Robert"];
        let sig = robert.self_signature.as_ref().unwrap();
        assert!(sig.supports_seipd_v2());
        assert!(!sig.is_primary());
        assert!(entity.add_user_id("Robert", &config).unwrap_err().is_invalid_argument());

        entity.add_signing_subkey(&mut rng, &config).unwrap();
        entity.add_encryption_subkey(&mut rng, &config).unwrap();
        assert_eq!(entity.subkeys.len(), 3);
        for subkey in &entity.subkeys {
            subkey
                .sig
                .verify_key_binding(&entity.primary_key, &subkey.public_key)
                .unwrap();
        }
        assert!(entity.subkeys[1].sig.embedded_signature().is_some());
    }

    #[test]
    fn test_generate_key_types() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for (key_type, signing, encryption) in [
            (
                KeyType::Curve25519Legacy,
                PublicKeyAlgorithm::EdDSALegacy,
                PublicKeyAlgorithm::ECDH,
            ),
            (KeyType::Rsa(1024), PublicKeyAlgorithm::RSA, PublicKeyAlgorithm::RSA),
        ] {
            let mut entity = EntityBuilder::default()
                .primary_user_id("Dave")
                .created_at(created())
                .key_type(key_type)
                .generate(&mut rng)
                .unwrap();
            assert_eq!(entity.primary_key.algorithm(), signing);
            assert_eq!(entity.subkeys[0].public_key.algorithm(), encryption);

            let config = Config::builder()
                .now(created())
                .key_type(key_type)
                .build()
                .unwrap();
            entity.add_signing_subkey(&mut rng, &config).unwrap();
            assert_eq!(entity.subkeys[1].public_key.algorithm(), signing);

            let identity = entity.primary_identity().unwrap();
            identity
                .self_signature
                .as_ref()
                .unwrap()
                .verify_certification(&entity.primary_key, &entity.primary_key, &identity.user_id)
                .unwrap();
            for subkey in &entity.subkeys {
                subkey
                    .sig
                    .verify_key_binding(&entity.primary_key, &subkey.public_key)
                    .unwrap();
            }
        }

        assert!(EntityBuilder::default()
            .primary_user_id("Eve")
            .created_at(created())
            .key_type(KeyType::Rsa(512))
            .build_params()
            .is_err());
    }

    #[test]
    fn test_public_entity_can_not_sign() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let entity = EntityBuilder::default()
            .primary_user_id("Carol")
            .created_at(created())
            .generate(&mut rng)
            .unwrap();
        let mut public = entity.to_public();
        let err = public
            .add_user_id("Caroline", &Config::new(created()))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
