use std::io;

use chrono::{DateTime, Utc};
use log::debug;

use crate::composed::entity::{Entity, Subkey};
use crate::config::Config;
use crate::errors::Result;
use crate::packet::{PacketTrait, SecretKey, Signature, SignatureConfig, SubpacketData};

impl Entity {
    /// Writes the public part of the entity, including signatures from other
    /// entities. No private key material is written.
    pub fn serialize<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.to_writer_with_header(writer)?;
        write_all(writer, &self.revocations)?;

        for identity in self.identities.values() {
            identity.user_id.to_writer_with_header(writer)?;
            write_all(writer, &identity.signatures)?;
        }

        for subkey in &self.subkeys {
            subkey.public_key.to_writer_with_header(writer)?;
            write_all(writer, &subkey.revocations)?;
            subkey.sig.to_writer_with_header(writer)?;
        }

        Ok(())
    }

    /// Writes the entity including private key material, but excluding
    /// signatures from other entities.
    ///
    /// Identities and subkeys are re-signed at `config.now()`, in case they
    /// changed since they were created.
    pub fn serialize_private<W: io::Write>(&self, writer: &mut W, config: &Config) -> Result<()> {
        if self.private_key.as_ref().is_some_and(SecretKey::is_dummy) {
            invalid_argument_err!("dummy private key cannot re-sign identities");
        }
        self.write_private(writer, Some(config.now()))
    }

    /// Like [`Entity::serialize_private`], but keeps the stored self-signatures.
    ///
    /// Useful for entities whose private key is a placeholder.
    pub fn serialize_private_without_signing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.write_private(writer, None)
    }

    fn write_private<W: io::Write>(
        &self,
        writer: &mut W,
        resign: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let Some(private_key) = &self.private_key else {
            invalid_argument_err!("private key of {} is missing", self.key_id());
        };

        private_key.to_writer_with_header(writer)?;
        write_all(writer, &self.revocations)?;

        for identity in self.identities.values() {
            identity.user_id.to_writer_with_header(writer)?;

            let self_sig = match resign {
                Some(now) => {
                    let Some(sig) = &identity.self_signature else {
                        invalid_argument_err!(
                            "can't re-sign identity {:?} without valid self-signature",
                            identity.name
                        );
                    };
                    let mut config = sig.config.clone();
                    config.set_created(now);
                    let sig =
                        config.sign_certification(private_key, &self.primary_key, &identity.user_id)?;
                    Some(sig)
                }
                None => identity.self_signature.clone(),
            };

            write_all(writer, &identity.revocations)?;
            if let Some(sig) = self_sig {
                sig.to_writer_with_header(writer)?;
            }
        }

        for subkey in &self.subkeys {
            match &subkey.private_key {
                Some(key) => key.to_writer_with_header(writer)?,
                None => subkey.public_key.to_writer_with_header(writer)?,
            }

            let binding = match resign {
                Some(now) => self.resign_binding(private_key, subkey, now)?,
                None => subkey.sig.clone(),
            };

            write_all(writer, &subkey.revocations)?;
            binding.to_writer_with_header(writer)?;
        }

        Ok(())
    }

    /// A fresh binding signature for `subkey`, with a fresh cross-signature by
    /// the subkey if the old binding carried one.
    fn resign_binding(
        &self,
        private_key: &SecretKey,
        subkey: &Subkey,
        now: DateTime<Utc>,
    ) -> Result<Signature> {
        let mut config = subkey.sig.config.clone();
        config.set_created(now);

        if let Some(backsig) = subkey.sig.embedded_signature() {
            let Some(subkey_private) = &subkey.private_key else {
                invalid_argument_err!(
                    "can't cross-sign subkey {} without its private key",
                    subkey.key_id()
                );
            };
            debug!("re-signing cross-signature of {}", subkey.key_id());
            let mut backsig_config = backsig.config.clone();
            backsig_config.set_created(now);
            let backsig = backsig_config.sign_key_binding(
                subkey_private,
                &self.primary_key,
                &subkey.public_key,
            )?;
            replace_embedded_signature(&mut config, backsig);
        }

        config.sign_key_binding(private_key, &self.primary_key, &subkey.public_key)
    }
}

fn replace_embedded_signature(config: &mut SignatureConfig, sig: Signature) {
    let packets = config
        .hashed_subpackets
        .iter_mut()
        .chain(config.unhashed_subpackets.iter_mut());
    for packet in packets {
        if let SubpacketData::EmbeddedSignature(embedded) = &mut packet.data {
            **embedded = sig;
            return;
        }
    }
}

fn write_all<W: io::Write>(writer: &mut W, sigs: &[Signature]) -> Result<()> {
    for sig in sigs {
        sig.to_writer_with_header(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{read_entity, EntityBuilder};
    use crate::packet::PacketReader;
    use crate::types::SecretParams;

    fn config() -> Config {
        Config::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
    }

    fn entity(seed: u64) -> Entity {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut entity = EntityBuilder::default()
            .primary_user_id("Erin <erin@example.org>")
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .generate(&mut rng)
            .unwrap();
        entity.add_signing_subkey(&mut rng, &config()).unwrap();
        entity
    }

    /// Replaces the primary private key with a GnuPG stub.
    fn with_dummy_primary(mut e: Entity) -> Entity {
        let public = e.primary_key.clone();
        let stub = [254u8, 0, 101, 0, b'G', b'N', b'U', 1];
        let params =
            SecretParams::try_from_buf(public.algorithm(), public.public_params(), &stub[..])
                .unwrap();
        e.private_key = Some(SecretKey::new(public, params));
        e
    }

    #[test]
    fn test_private_roundtrip_resigned() {
        let e = entity(1);
        let mut data = Vec::new();
        e.serialize_private(&mut data, &config()).unwrap();

        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        assert!(parsed.private_key.is_some());
        assert_eq!(parsed.key_id(), e.key_id());
        assert_eq!(parsed.subkeys.len(), 2);
        assert!(parsed.subkeys.iter().all(|s| s.private_key.is_some()));
        for subkey in &parsed.subkeys {
            subkey
                .sig
                .verify_key_binding(&parsed.primary_key, &subkey.public_key)
                .unwrap();
        }
    }

    #[test]
    fn test_resigned_at_config_time() {
        let e = entity(5);
        let later = config().at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let mut data = Vec::new();
        e.serialize_private(&mut data, &later).unwrap();

        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        let identity = parsed.primary_identity().unwrap();
        let self_sig = identity.self_signature.as_ref().unwrap();
        assert_eq!(self_sig.created(), Some(later.now()));
        assert!(self_sig.is_primary());
        self_sig
            .verify_certification(&parsed.primary_key, &parsed.primary_key, &identity.user_id)
            .unwrap();

        let signing = &parsed.subkeys[1];
        assert_eq!(signing.sig.created(), Some(later.now()));
        let backsig = signing.sig.embedded_signature().unwrap();
        assert_eq!(backsig.created(), Some(later.now()));
        signing
            .sig
            .verify_key_binding(&parsed.primary_key, &signing.public_key)
            .unwrap();
    }

    #[test]
    fn test_dummy_primary_key() {
        let e = with_dummy_primary(entity(6));
        assert!(e.private_key.as_ref().unwrap().is_dummy());

        let mut data = Vec::new();
        assert!(e
            .serialize_private(&mut data, &config())
            .unwrap_err()
            .is_invalid_argument());
        assert!(data.is_empty());

        e.serialize_private_without_signing(&mut data).unwrap();
        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        assert!(parsed.private_key.as_ref().unwrap().is_dummy());
        assert_eq!(parsed.subkeys.len(), 2);
        assert_eq!(
            parsed.primary_identity().unwrap().self_signature,
            e.primary_identity().unwrap().self_signature
        );
        assert_eq!(parsed, e);
    }

    #[test]
    fn test_private_without_signing_keeps_signatures() {
        let e = entity(2);
        let mut data = Vec::new();
        e.serialize_private_without_signing(&mut data).unwrap();

        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.subkeys[1].sig, e.subkeys[1].sig);
        assert_eq!(
            parsed.primary_identity().unwrap().self_signature,
            e.primary_identity().unwrap().self_signature
        );
    }

    #[test]
    fn test_private_requires_private_key() {
        let e = entity(3).to_public();
        let mut data = Vec::new();
        assert!(e
            .serialize_private(&mut data, &config())
            .unwrap_err()
            .is_invalid_argument());
        assert!(e
            .serialize_private_without_signing(&mut data)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_public_has_no_secrets() {
        let e = entity(4);
        let mut data = Vec::new();
        e.serialize(&mut data).unwrap();
        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed, e.to_public());
    }
}
