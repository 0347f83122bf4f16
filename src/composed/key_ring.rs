use std::io::Read;

use log::warn;

use crate::composed::entity::Entity;
use crate::composed::parser::read_entity;
use crate::composed::resolve::Key;
use crate::errors::Result;
use crate::packet::{KeyFlags, Packet, PacketReader};
use crate::types::KeyId;

/// The usage bits `keys_by_id_usage` compares.
const USAGE_MASK: u8 = 0x0F;

/// Access to public and private keys.
pub trait KeyRing {
    /// All keys with the given key id.
    fn keys_by_id(&self, id: KeyId) -> Vec<Key<'_>>;

    /// All keys with the given key id that also allow every usage in
    /// `required`.
    fn keys_by_id_usage(&self, id: KeyId, required: KeyFlags) -> Vec<Key<'_>>;

    /// All private keys that are valid for decryption.
    fn decryption_keys(&self) -> Vec<Key<'_>>;
}

/// One or more entities.
pub type EntityList = Vec<Entity>;

impl KeyRing for [Entity] {
    fn keys_by_id(&self, id: KeyId) -> Vec<Key<'_>> {
        let mut keys = Vec::new();
        for entity in self {
            if entity.primary_key.key_id() == id {
                let self_sig = entity
                    .primary_identity()
                    .and_then(|identity| identity.self_signature.as_ref());
                keys.push(Key::primary(entity, self_sig));
            }

            for subkey in &entity.subkeys {
                if subkey.key_id() == id {
                    keys.push(Key::subkey(entity, subkey));
                }
            }
        }
        keys
    }

    fn keys_by_id_usage(&self, id: KeyId, required: KeyFlags) -> Vec<Key<'_>> {
        let required = required.bits() & USAGE_MASK;
        self.keys_by_id(id)
            .into_iter()
            .filter(|key| match key.self_signature {
                Some(sig) if sig.has_key_flags() && required != 0 => {
                    sig.key_flags().bits() & required == required
                }
                _ => true,
            })
            .collect()
    }

    fn decryption_keys(&self) -> Vec<Key<'_>> {
        let mut keys = Vec::new();
        for entity in self {
            for subkey in &entity.subkeys {
                let flags = subkey.sig.key_flags();
                if subkey.private_key.is_some()
                    && (!subkey.sig.has_key_flags()
                        || flags.encrypt_storage()
                        || flags.encrypt_comms())
                {
                    keys.push(Key::subkey(entity, subkey));
                }
            }
        }
        keys
    }
}

impl KeyRing for Vec<Entity> {
    fn keys_by_id(&self, id: KeyId) -> Vec<Key<'_>> {
        self.as_slice().keys_by_id(id)
    }

    fn keys_by_id_usage(&self, id: KeyId, required: KeyFlags) -> Vec<Key<'_>> {
        self.as_slice().keys_by_id_usage(id, required)
    }

    fn decryption_keys(&self) -> Vec<Key<'_>> {
        self.as_slice().decryption_keys()
    }
}

impl KeyRing for Entity {
    fn keys_by_id(&self, id: KeyId) -> Vec<Key<'_>> {
        std::slice::from_ref(self).keys_by_id(id)
    }

    fn keys_by_id_usage(&self, id: KeyId, required: KeyFlags) -> Vec<Key<'_>> {
        std::slice::from_ref(self).keys_by_id_usage(id, required)
    }

    fn decryption_keys(&self) -> Vec<Key<'_>> {
        std::slice::from_ref(self).decryption_keys()
    }
}

/// Reads one or more public or private keys.
///
/// Keys that are unsupported or malformed are skipped, as long as at least one
/// key can be read. Otherwise the last such error is returned.
pub fn read_key_ring<R: Read>(reader: R) -> Result<EntityList> {
    let mut packets = PacketReader::new(reader);
    let mut entities = Vec::new();
    let mut last_error = None;

    loop {
        match read_entity(&mut packets) {
            Ok(Some(entity)) => entities.push(entity),
            Ok(None) => break,
            Err(err) if err.is_recoverable() => {
                warn!("skipping key: {}", err);
                last_error = Some(err);
                read_to_next_primary_key(&mut packets)?;
            }
            Err(err) => return Err(err),
        }
    }

    match last_error {
        Some(err) if entities.is_empty() => Err(err),
        _ => Ok(entities),
    }
}

/// Skips packets until the start of the next entity, leaving its primary key in
/// the reader.
fn read_to_next_primary_key<R: Read>(packets: &mut PacketReader<R>) -> Result<()> {
    while let Some(packet) = packets.next() {
        match packet {
            Ok(packet) if packet.is_primary_key() => {
                packets.unread(packet);
                break;
            }
            Ok(_) => {}
            Err(err) if err.is_recoverable() => warn!("skipping packet: {}", err),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
