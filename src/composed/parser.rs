//! Building [`Entity`]s from a packet stream.

use std::collections::BTreeMap;
use std::io::Read;

use log::{debug, warn};

use crate::composed::entity::{Entity, Identity, Subkey};
use crate::errors::{Error, Result};
use crate::packet::{
    Packet, PacketReader, PublicKey, SecretKey, Signature, SignatureType, UserId,
};
use crate::types::Tag;

/// Reads one entity: a primary key, its identities, revocations and subkeys.
///
/// Returns `Ok(None)` at the end of the stream. Stops at the next primary key,
/// which is left in the reader.
pub fn read_entity<R: Read>(packets: &mut PacketReader<R>) -> Result<Option<Entity>> {
    let Some(first) = packets.next() else {
        return Ok(None);
    };

    let (primary_key, private_key) = match first? {
        Packet::PublicKey(key) => (key, None),
        Packet::SecretKey(key) => (key.public_key().clone(), Some(key)),
        Packet::UnsupportedKey { tag, .. } => {
            unsupported_err!("unsupported primary key packet {:?}", tag)
        }
        other => {
            packets.unread(other);
            structural_err!("first packet was not a public/private key");
        }
    };

    if !primary_key.can_sign() {
        structural_err!(
            "primary key {} ({}) can not be used for signatures",
            primary_key.key_id(),
            primary_key.algorithm()
        );
    }

    let mut entity = Entity {
        primary_key,
        private_key,
        identities: BTreeMap::new(),
        revocations: Vec::new(),
        subkeys: Vec::new(),
    };
    let mut revocations = Vec::new();

    while let Some(packet) = packets.next() {
        match packet? {
            Packet::UserId(user_id) => add_user_id(&mut entity, packets, user_id)?,
            Packet::Signature(sig) => match sig.typ() {
                SignatureType::KeyRevocation => revocations.push(sig),
                SignatureType::Key => {
                    debug!("ignoring direct key signature on {}", entity.key_id());
                }
                typ => debug!("ignoring unattached signature {:?}", typ),
            },
            Packet::PublicSubkey(key) => add_subkey(&mut entity, packets, key, None)?,
            Packet::SecretSubkey(key) => {
                add_subkey(&mut entity, packets, key.public_key().clone(), Some(key))?
            }
            packet @ (Packet::PublicKey(_)
            | Packet::SecretKey(_)
            | Packet::UnsupportedKey {
                tag: Tag::PublicKey | Tag::SecretKey,
                ..
            }) => {
                packets.unread(packet);
                break;
            }
            Packet::UnsupportedKey { tag, .. } => {
                warn!("skipping unsupported {:?} of {}", tag, entity.key_id());
                skip_signatures(packets)?;
            }
            packet @ (Packet::UserAttribute(_)
            | Packet::Trust(_)
            | Packet::Marker(_)
            | Packet::Padding(_)
            | Packet::OnePassSignature(_)
            | Packet::LiteralData(_)
            | Packet::CompressedData(_)
            | Packet::PublicKeyEncryptedSessionKey(_)
            | Packet::SymKeyEncryptedSessionKey(_)
            | Packet::SymEncryptedProtectedData(_)
            | Packet::Unknown { .. }) => {
                debug!("ignoring {:?} packet in key", packet.tag());
            }
        }
    }

    if entity.identities.is_empty() {
        structural_err!("entity {} without any identities", entity.key_id());
    }

    for revocation in revocations {
        if let Err(err) = revocation.verify_key(&entity.primary_key) {
            return Err(structural_unless_unsupported(
                err,
                "revocation signature signed by alternate key",
            ));
        }
        entity.revocations.push(revocation);
    }

    Ok(Some(entity))
}

/// Reads the signatures following a user id.
///
/// The identity is only added once a self-signature over it verifies.
fn add_user_id<R: Read>(
    entity: &mut Entity,
    packets: &mut PacketReader<R>,
    user_id: UserId,
) -> Result<()> {
    let name = user_id.name();
    let existing = entity.identities.get(&name).cloned();
    let is_new = existing.is_none();
    let mut identity = existing.unwrap_or_else(|| Identity::new(user_id.clone()));
    let mut self_signed = false;

    while let Some(packet) = packets.next() {
        let sig = match packet? {
            Packet::Signature(sig) => sig,
            other => {
                packets.unread(other);
                break;
            }
        };

        if !sig.typ().is_certification() {
            structural_err!("user ID signature with wrong type {:?}", sig.typ());
        }

        if sig.is_issued_by(&entity.primary_key) {
            if let Err(err) =
                sig.verify_certification(&entity.primary_key, &entity.primary_key, &user_id)
            {
                return Err(structural_unless_unsupported(
                    err,
                    "user ID self-signature invalid",
                ));
            }

            if sig.typ() == SignatureType::CertRevocation {
                identity.revocations.push(sig.clone());
            } else if is_newer(&sig, identity.self_signature.as_ref()) {
                identity.self_signature = Some(sig.clone());
            }
            self_signed = true;
        }
        identity.signatures.push(sig);
    }

    if self_signed || !is_new {
        entity.identities.insert(name, identity);
    } else {
        warn!("ignoring user id {:?} without self-signature", name);
    }
    Ok(())
}

/// Reads the binding and revocation signatures following a subkey.
fn add_subkey<R: Read>(
    entity: &mut Entity,
    packets: &mut PacketReader<R>,
    public_key: PublicKey,
    private_key: Option<SecretKey>,
) -> Result<()> {
    let mut binding: Option<Signature> = None;
    let mut revocations = Vec::new();

    while let Some(packet) = packets.next() {
        let packet = packet.map_err(|err| Error::Structural {
            message: format!("subkey signature invalid: {err}"),
        })?;
        let sig = match packet {
            Packet::Signature(sig) => sig,
            other => {
                packets.unread(other);
                break;
            }
        };

        if !matches!(
            sig.typ(),
            SignatureType::SubkeyBinding | SignatureType::SubkeyRevocation
        ) {
            structural_err!("subkey signature with wrong type {:?}", sig.typ());
        }

        if let Err(err) = sig.verify_key_binding(&entity.primary_key, &public_key) {
            return Err(structural_unless_unsupported(err, "subkey signature invalid"));
        }

        if sig.typ() == SignatureType::SubkeyRevocation {
            revocations.push(sig);
        } else if is_newer(&sig, binding.as_ref()) {
            binding = Some(sig);
        }
    }

    let Some(sig) = binding else {
        structural_err!("subkey {} not followed by signature", public_key.key_id());
    };

    entity.subkeys.push(Subkey {
        public_key,
        private_key,
        sig,
        revocations,
    });
    Ok(())
}

/// Drops the signatures following a subkey that can not be used.
fn skip_signatures<R: Read>(packets: &mut PacketReader<R>) -> Result<()> {
    while let Some(packet) = packets.next() {
        match packet? {
            Packet::Signature(_) => {}
            other => {
                packets.unread(other);
                break;
            }
        }
    }
    Ok(())
}

fn is_newer(sig: &Signature, current: Option<&Signature>) -> bool {
    match current {
        None => true,
        Some(current) => sig.created() > current.created(),
    }
}

/// Keeps unsupported algorithms distinguishable, everything else is a
/// structural problem of the key.
fn structural_unless_unsupported(err: Error, context: &str) -> Error {
    if err.is_unsupported() {
        err
    } else {
        Error::Structural {
            message: format!("{context}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::EntityBuilder;
    use crate::crypto::hash::HashAlgorithm;
    use crate::packet::{PacketTrait, SignatureConfig};

    fn entity(seed: u64) -> Entity {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        EntityBuilder::default()
            .primary_user_id("Dave <dave@example.org>")
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .generate(&mut rng)
            .unwrap()
    }

    #[test]
    fn test_first_packet_must_be_key() {
        let mut data = Vec::new();
        UserId::from_str("x").to_writer_with_header(&mut data).unwrap();
        let mut packets = PacketReader::new(&data[..]);
        let err = read_entity(&mut packets).unwrap_err();
        assert!(err.is_structural());
        // the offending packet stays in the reader
        assert!(matches!(packets.next(), Some(Ok(Packet::UserId(_)))));
    }

    #[test]
    fn test_empty_stream() {
        let mut packets = PacketReader::new(&[][..]);
        assert!(read_entity(&mut packets).unwrap().is_none());
    }

    #[test]
    fn test_without_identities() {
        let e = entity(1);
        let mut data = Vec::new();
        e.primary_key.to_writer_with_header(&mut data).unwrap();
        let err = read_entity(&mut PacketReader::new(&data[..])).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_subkey_without_binding() {
        let e = entity(2);
        let mut data = Vec::new();
        e.primary_key.to_writer_with_header(&mut data).unwrap();
        let identity = e.primary_identity().unwrap();
        identity.user_id.to_writer_with_header(&mut data).unwrap();
        identity
            .self_signature
            .as_ref()
            .unwrap()
            .to_writer_with_header(&mut data)
            .unwrap();
        e.subkeys[0]
            .public_key
            .to_writer_with_header(&mut data)
            .unwrap();

        let err = read_entity(&mut PacketReader::new(&data[..])).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_wrong_user_id_signature_type() {
        let e = entity(3);
        let private_key = e.private_key.as_ref().unwrap();
        let mut data = Vec::new();
        e.primary_key.to_writer_with_header(&mut data).unwrap();
        let identity = e.primary_identity().unwrap();
        identity.user_id.to_writer_with_header(&mut data).unwrap();
        let sig = SignatureConfig::from_key(
            &e.primary_key,
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .sign(private_key, &b"hello"[..])
        .unwrap();
        sig.to_writer_with_header(&mut data).unwrap();

        let err = read_entity(&mut PacketReader::new(&data[..])).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_third_party_signatures_are_kept_but_untrusted() {
        let mut e = entity(4);
        let other = entity(5);
        let name = e.primary_identity().unwrap().name.clone();
        let config = crate::config::Config::new(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        e.sign_identity(&name, &other, &config).unwrap();

        let mut data = Vec::new();
        e.serialize(&mut data).unwrap();
        let parsed = read_entity(&mut PacketReader::new(&data[..]))
            .unwrap()
            .unwrap();
        let identity = &parsed.identities[&name];
        assert_eq!(identity.signatures.len(), 2);
        assert_eq!(
            identity.self_signature.as_ref(),
            e.identities[&name].self_signature.as_ref()
        );
    }
}
