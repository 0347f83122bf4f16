//! Certifications and revocations added to existing entities.

use log::debug;

use crate::composed::entity::Entity;
use crate::config::Config;
use crate::errors::Result;
use crate::packet::{RevocationCode, SignatureConfig, SignatureType, SubpacketData};
use crate::types::KeyId;

impl Entity {
    /// Adds a certification by `signer`, attesting that `identity` belongs to
    /// this entity.
    ///
    /// The identity must already exist, and the private key of `signer` must
    /// be decrypted.
    pub fn sign_identity(&mut self, identity: &str, signer: &Entity, config: &Config) -> Result<()> {
        let Some(signer_key) = &signer.private_key else {
            invalid_argument_err!("signing entity must have a private key");
        };
        if signer_key.is_encrypted() {
            invalid_argument_err!("signing entity's private key must be decrypted");
        }
        let primary_key = &self.primary_key;
        let Some(ident) = self.identities.get_mut(identity) else {
            invalid_argument_err!("identity {:?} not found in entity", identity);
        };

        let mut sig_config = SignatureConfig::from_key(
            &signer.primary_key,
            SignatureType::CertGeneric,
            config.hash(),
            config.now(),
        );
        if let Some(lifetime) = config.sig_lifetime() {
            sig_config.push_hashed(SubpacketData::SignatureExpirationTime(lifetime));
        }
        let sig = sig_config.sign_certification(signer_key, primary_key, &ident.user_id)?;
        debug!("{} certified {:?}", signer.key_id(), identity);

        ident.signatures.push(sig);
        Ok(())
    }

    /// Revokes the primary key.
    pub fn revoke_key(&mut self, reason: RevocationCode, text: &str, config: &Config) -> Result<()> {
        let sig_config = self.revocation_config(SignatureType::KeyRevocation, reason, text, config);
        let Some(private_key) = &self.private_key else {
            invalid_argument_err!("revoking {} requires its private key", self.key_id());
        };

        let sig = sig_config.sign_key(private_key, &self.primary_key)?;
        self.revocations.push(sig);
        Ok(())
    }

    /// Revokes the subkey with id `subkey_id`.
    pub fn revoke_subkey(
        &mut self,
        subkey_id: KeyId,
        reason: RevocationCode,
        text: &str,
        config: &Config,
    ) -> Result<()> {
        let sig_config =
            self.revocation_config(SignatureType::SubkeyRevocation, reason, text, config);
        let Some(private_key) = &self.private_key else {
            invalid_argument_err!("revoking a subkey requires the primary private key");
        };
        let Some(subkey) = self.subkeys.iter_mut().find(|s| s.key_id() == subkey_id) else {
            invalid_argument_err!("subkey {} is not associated with this key", subkey_id);
        };
        if subkey
            .sig
            .verify_key_binding(&self.primary_key, &subkey.public_key)
            .is_err()
        {
            invalid_argument_err!("subkey {} is not associated with this key", subkey_id);
        }

        let sig = sig_config.sign_key_binding(private_key, &self.primary_key, &subkey.public_key)?;
        subkey.revocations.push(sig);
        Ok(())
    }

    fn revocation_config(
        &self,
        typ: SignatureType,
        reason: RevocationCode,
        text: &str,
        config: &Config,
    ) -> SignatureConfig {
        let mut sig_config =
            SignatureConfig::from_key(&self.primary_key, typ, config.hash(), config.now());
        sig_config.push_hashed(SubpacketData::RevocationReason(
            reason,
            text.as_bytes().to_vec().into(),
        ));
        sig_config
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{read_entity, EntityBuilder};
    use crate::packet::PacketReader;

    fn entity(seed: u64, name: &str) -> Entity {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        EntityBuilder::default()
            .primary_user_id(name)
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .generate(&mut rng)
            .unwrap()
    }

    fn config() -> Config {
        Config::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_sign_identity() {
        let mut e = entity(1, "Frank");
        let signer = entity(2, "Grace");
        e.sign_identity("Frank", &signer, &config()).unwrap();

        let ident = &e.identities["Frank"];
        assert_eq!(ident.signatures.len(), 2);
        let sig = &ident.signatures[1];
        assert_eq!(sig.typ(), SignatureType::CertGeneric);
        sig.verify_certification(&signer.primary_key, &e.primary_key, &ident.user_id)
            .unwrap();

        let err = e.sign_identity("Nobody", &signer, &config()).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = e
            .sign_identity("Frank", &signer.to_public(), &config())
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_revoke_key() {
        let mut e = entity(3, "Heidi");
        let now = config().now();
        assert!(e.encryption_key(now).is_some());

        e.revoke_key(RevocationCode::KeyRetired, "retired", &config())
            .unwrap();
        assert!(e.revoked(now));
        assert!(!e.revoked(now - Duration::days(1)));
        assert!(e.encryption_key(now).is_none());
        assert!(e.signing_key(now).is_none());

        // survives a round trip
        let mut data = Vec::new();
        e.serialize(&mut data).unwrap();
        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.revocations.len(), 1);
    }

    #[test]
    fn test_revoke_subkey() {
        let mut e = entity(4, "Ivan");
        let now = config().now();
        let subkey_id = e.subkeys[0].key_id();
        e.revoke_subkey(subkey_id, RevocationCode::KeySuperseded, "", &config())
            .unwrap();

        assert!(e.subkeys[0].revoked(now));
        assert!(e.encryption_key(now).is_none());

        let err = e
            .revoke_subkey(KeyId::from(1u64), RevocationCode::NoReason, "", &config())
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
