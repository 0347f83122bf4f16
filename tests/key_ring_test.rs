use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use pgp_entity::composed::{read_key_ring, Entity, EntityBuilder, KeyRing};
use pgp_entity::packet::{KeyFlags, Marker, PacketTrait, RevocationCode, UserId};
use pgp_entity::ser::Serialize;
use pgp_entity::Config;

fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn generate(seed: u64, name: &str) -> Entity {
    let _ = pretty_env_logger::try_init();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    EntityBuilder::default()
        .primary_user_id(name)
        .created_at(created())
        .generate(&mut rng)
        .unwrap()
}

#[test]
fn reads_multiple_entities() {
    let alice = generate(1, "Alice");
    let bob = generate(2, "Bob");

    let mut data = Vec::new();
    alice.serialize(&mut data).unwrap();
    Marker.to_writer_with_header(&mut data).unwrap();
    bob.serialize_private(&mut data, &Config::new(created())).unwrap();

    let ring = read_key_ring(&data[..]).unwrap();
    assert_eq!(ring.len(), 2);
    assert_eq!(ring[0].key_id(), alice.key_id());
    assert_eq!(ring[1].key_id(), bob.key_id());
    assert!(ring[0].private_key.is_none());
    assert!(ring[1].private_key.is_some());
}

#[test]
fn skips_broken_entities() {
    let alice = generate(3, "Alice");
    let bob = generate(4, "Bob");

    let mut data = Vec::new();
    // a primary key without any identity
    alice.primary_key.to_writer_with_header(&mut data).unwrap();
    bob.serialize(&mut data).unwrap();

    let ring = read_key_ring(&data[..]).unwrap();
    assert_eq!(ring.len(), 1);
    assert_eq!(ring[0].key_id(), bob.key_id());
}

/// Serializes `entity` with its primary key claiming key version 5.
fn with_v5_primary_key(entity: &Entity) -> Vec<u8> {
    let mut data = Vec::new();
    entity.serialize(&mut data).unwrap();
    let key = &entity.primary_key;
    let version_offset = key.write_len_with_header() - key.write_len();
    assert_eq!(data[version_offset], 4);
    data[version_offset] = 5;
    data
}

#[test]
fn unsupported_entity_keeps_its_packets() {
    let alice = generate(8, "Alice");
    let mut bob = generate(9, "Bob");
    bob.revoke_key(RevocationCode::KeyRetired, "gone", &Config::new(created()))
        .unwrap();
    let carol = generate(10, "Carol");

    let mut data = Vec::new();
    alice.serialize(&mut data).unwrap();
    data.extend_from_slice(&with_v5_primary_key(&bob));
    carol.serialize(&mut data).unwrap();

    let ring = read_key_ring(&data[..]).unwrap();
    assert_eq!(ring.len(), 2);
    assert_eq!(ring[0].key_id(), alice.key_id());
    assert_eq!(ring[0].subkeys.len(), alice.subkeys.len());
    assert!(ring[0].revocations.is_empty());
    assert_eq!(ring[0].identities.len(), 1);
    assert_eq!(ring[1].key_id(), carol.key_id());
}

#[test]
fn only_unsupported_entities() {
    let dave = generate(11, "Dave");
    let data = with_v5_primary_key(&dave);

    let err = read_key_ring(&data[..]).unwrap_err();
    assert!(err.is_unsupported(), "{err:?}");
}

#[test]
fn reports_error_when_nothing_parses() {
    let alice = generate(5, "Alice");

    let mut data = Vec::new();
    alice.primary_key.to_writer_with_header(&mut data).unwrap();
    UserId::from_str("no self signature")
        .to_writer_with_header(&mut data)
        .unwrap();

    let err = read_key_ring(&data[..]).unwrap_err();
    assert!(err.is_structural(), "{err:?}");
}

#[test]
fn empty_input_is_empty_ring() {
    let ring = read_key_ring(std::io::empty()).unwrap();
    assert!(ring.is_empty());
}

#[test]
fn queries() {
    let alice = generate(6, "Alice");
    let bob = generate(7, "Bob").to_public();
    let ring = vec![alice.clone(), bob.clone()];

    let mut sign = KeyFlags::default();
    sign.set_sign(true);
    let mut encrypt = KeyFlags::default();
    encrypt.set_encrypt_comms(true);

    let bob_subkey = bob.subkeys[0].key_id();
    assert_eq!(ring.keys_by_id(bob_subkey).len(), 1);
    assert_eq!(ring.keys_by_id_usage(bob_subkey, encrypt).len(), 1);
    assert!(ring.keys_by_id_usage(bob_subkey, sign).is_empty());
    assert_eq!(ring.keys_by_id_usage(bob.key_id(), sign).len(), 1);
    // no flags requested means no filtering
    assert_eq!(
        ring.keys_by_id_usage(bob_subkey, KeyFlags::default()).len(),
        1
    );

    // only alice carries private keys
    let decryption: Vec<_> = ring.decryption_keys().iter().map(|k| k.key_id()).collect();
    assert_eq!(decryption, vec![alice.subkeys[0].key_id()]);
}
