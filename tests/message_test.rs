use std::io::Write;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::smallvec;

use pgp_entity::composed::message::{
    detach_sign, encrypt, encrypt_text_split, read_message, sign_text, symmetrically_encrypt,
    FileHints,
};
use pgp_entity::composed::{Entity, EntityBuilder};
use pgp_entity::config::AeadConfig;
use pgp_entity::crypto::sym::SymmetricKeyAlgorithm;
use pgp_entity::packet::{Packet, PacketReader, SeipdConfig};
use pgp_entity::types::CompressionAlgorithm;
use pgp_entity::{Config, KeyType};

fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn config() -> Config {
    Config::new(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
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

fn hints(name: &str) -> FileHints {
    FileHints {
        is_binary: true,
        file_name: name.to_string(),
        mod_time: Some(created()),
    }
}

fn seipd_config(data: &[u8]) -> SeipdConfig {
    PacketReader::new(data)
        .find_map(|p| match p.unwrap() {
            Packet::SymEncryptedProtectedData(data) => Some(data.config().clone()),
            _ => None,
        })
        .expect("encrypted data packet")
}

#[test]
fn encrypt_sign_decrypt_verify() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let alice = generate(1, "Alice <alice@example.org>");
    let bob = generate(2, "Bob <bob@example.org>");
    let plaintext = b"The quick brown fox jumps over the lazy dog. ".repeat(500);

    let mut ciphertext = Vec::new();
    let mut w = encrypt(
        &mut rng,
        &mut ciphertext,
        &[&bob],
        Some(&alice),
        &hints("fox.txt"),
        &config(),
    )
    .unwrap();
    // odd sized writes cross partial body chunk boundaries
    for chunk in plaintext.chunks(777) {
        w.write_all(chunk).unwrap();
    }
    w.close().unwrap();

    let keyring = vec![bob.clone(), alice.to_public()];
    let details = read_message(&ciphertext[..], &keyring, None, &config()).unwrap();

    assert!(details.is_encrypted);
    assert_eq!(details.literal.data(), &plaintext[..]);
    assert_eq!(details.literal.file_name(), b"fox.txt");
    assert!(details.is_verified(), "{:?}", details.signature_error);
    assert_eq!(details.signed_by.unwrap().entity.key_id(), alice.key_id());
}

#[test]
fn rsa_and_legacy_curve25519_entities() {
    let mut rng = ChaCha8Rng::seed_from_u64(110);
    let mut key_rng = ChaCha8Rng::seed_from_u64(111);
    let rsa = EntityBuilder::default()
        .primary_user_id("Rita <rita@example.org>")
        .created_at(created())
        .key_type(KeyType::Rsa(1024))
        .generate(&mut key_rng)
        .unwrap();
    let legacy = EntityBuilder::default()
        .primary_user_id("Leo <leo@example.org>")
        .created_at(created())
        .key_type(KeyType::Curve25519Legacy)
        .generate(&mut key_rng)
        .unwrap();
    let plaintext = b"legacy algorithms still interoperate".repeat(20);

    for (sender, recipient) in [(&rsa, &legacy), (&legacy, &rsa)] {
        let mut ciphertext = Vec::new();
        let mut w = encrypt(
            &mut rng,
            &mut ciphertext,
            &[recipient],
            Some(sender),
            &hints("legacy.bin"),
            &config(),
        )
        .unwrap();
        w.write_all(&plaintext).unwrap();
        w.close().unwrap();

        let keyring = vec![recipient.clone(), sender.to_public()];
        let details = read_message(&ciphertext[..], &keyring, None, &config()).unwrap();
        assert!(details.is_encrypted);
        assert_eq!(details.literal.data(), &plaintext[..]);
        assert!(details.is_verified(), "{:?}", details.signature_error);
        assert_eq!(details.signed_by.unwrap().entity.key_id(), sender.key_id());
    }
}

#[test]
fn multiple_recipients_share_a_cipher() {
    let mut rng = ChaCha8Rng::seed_from_u64(101);
    let mut r = ChaCha8Rng::seed_from_u64(3);
    let carol = EntityBuilder::default()
        .primary_user_id("Carol")
        .created_at(created())
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .generate(&mut r)
        .unwrap();
    let dave = EntityBuilder::default()
        .primary_user_id("Dave")
        .created_at(created())
        .preferred_symmetric_algorithms(smallvec![
            SymmetricKeyAlgorithm::AES128,
            SymmetricKeyAlgorithm::AES256
        ])
        .generate(&mut r)
        .unwrap();

    let mut out = Vec::new();
    let mut w = encrypt(
        &mut rng,
        &mut out,
        &[&carol, &dave],
        None,
        &hints(""),
        &config(),
    )
    .unwrap();
    w.write_all(b"for both of you").unwrap();
    w.close().unwrap();

    for reader in [&carol, &dave] {
        let details = read_message(&out[..], reader, None, &config()).unwrap();
        assert_eq!(details.literal.data(), b"for both of you");
        assert_eq!(details.encrypted_to_key_ids.len(), 2);
        assert!(!details.is_signed);
    }
}

#[test]
fn disjoint_preferences_fail_negotiation() {
    let mut rng = ChaCha8Rng::seed_from_u64(102);
    let mut r = ChaCha8Rng::seed_from_u64(4);
    let erin = EntityBuilder::default()
        .primary_user_id("Erin")
        .created_at(created())
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .generate(&mut r)
        .unwrap();
    let frank = EntityBuilder::default()
        .primary_user_id("Frank")
        .created_at(created())
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::CAST5])
        .generate(&mut r)
        .unwrap();

    let err = encrypt(
        &mut rng,
        Vec::new(),
        &[&erin, &frank],
        None,
        &hints(""),
        &config(),
    )
    .err()
    .unwrap();
    assert!(err.is_negotiation_failure(), "{err:?}");
}

#[test]
fn aead_when_every_recipient_supports_it() {
    let mut rng = ChaCha8Rng::seed_from_u64(103);
    let mut r = ChaCha8Rng::seed_from_u64(5);
    let grace = EntityBuilder::default()
        .primary_user_id("Grace")
        .created_at(created())
        .seipd_v2(true)
        .generate(&mut r)
        .unwrap();
    let heidi = generate(6, "Heidi");

    let config = Config::builder()
        .now(config().now())
        .aead(Some(AeadConfig::default()))
        .compression(CompressionAlgorithm::ZLIB)
        .build()
        .unwrap();

    let mut out = Vec::new();
    let mut w = encrypt(&mut rng, &mut out, &[&grace], None, &hints(""), &config).unwrap();
    w.write_all(b"aead").unwrap();
    w.close().unwrap();
    assert!(matches!(seipd_config(&out), SeipdConfig::V2 { .. }));
    let details = read_message(&out[..], &grace, None, &config).unwrap();
    assert_eq!(details.literal.data(), b"aead");

    let mut out = Vec::new();
    let mut w = encrypt(
        &mut rng,
        &mut out,
        &[&grace, &heidi],
        None,
        &hints(""),
        &config,
    )
    .unwrap();
    w.write_all(b"mixed").unwrap();
    w.close().unwrap();
    assert_eq!(seipd_config(&out), SeipdConfig::V1);
    let details = read_message(&out[..], &heidi, None, &config).unwrap();
    assert_eq!(details.literal.data(), b"mixed");
}

#[test]
fn split_text_message() {
    let mut rng = ChaCha8Rng::seed_from_u64(104);
    let ivan = generate(7, "Ivan");
    let judy = generate(8, "Judy");

    let mut keys = Vec::new();
    let mut data = Vec::new();
    let mut w = encrypt_text_split(
        &mut rng,
        &mut keys,
        &mut data,
        &[&judy],
        Some(&ivan),
        &FileHints::default(),
        &config(),
    )
    .unwrap();
    w.write_all(b"first\nsecond").unwrap();
    w.close().unwrap();

    let mut joined = keys.clone();
    joined.extend_from_slice(&data);
    let keyring = vec![judy, ivan.to_public()];
    let details = read_message(&joined[..], &keyring, None, &config()).unwrap();
    assert_eq!(details.literal.data(), b"first\r\nsecond");
    assert!(details.is_verified(), "{:?}", details.signature_error);
}

#[test]
fn locked_keys() {
    let mut rng = ChaCha8Rng::seed_from_u64(105);
    let mut mallory = generate(9, "Mallory");
    let niaj = generate(10, "Niaj");

    mallory
        .private_key
        .as_mut()
        .unwrap()
        .protect(b"password", &mut rng, &config())
        .unwrap();
    mallory.subkeys[0]
        .private_key
        .as_mut()
        .unwrap()
        .protect(b"password", &mut rng, &config())
        .unwrap();

    // signing needs a decrypted key
    let err = sign_text(Vec::new(), &mallory, &FileHints::default(), &config())
        .err()
        .unwrap();
    assert!(err.is_invalid_argument(), "{err:?}");

    // decryption unlocks with the passphrase
    let mut out = Vec::new();
    let mut w = encrypt(&mut rng, &mut out, &[&mallory], Some(&niaj), &hints(""), &config()).unwrap();
    w.write_all(b"locked").unwrap();
    w.close().unwrap();

    assert!(read_message(&out[..], &mallory, None, &config())
        .unwrap_err()
        .is_invalid_argument());
    let details = read_message(&out[..], &mallory, Some(b"password"), &config()).unwrap();
    assert_eq!(details.literal.data(), b"locked");
    // niaj is not in the key ring
    assert!(details.is_signed);
    assert!(!details.is_verified());
}

#[test]
fn detached_signature() {
    let olivia = generate(11, "Olivia");
    let message = b"detached message".to_vec();

    let mut sig_data = Vec::new();
    detach_sign(&mut sig_data, &olivia, &message[..], &config()).unwrap();

    let Some(Ok(Packet::Signature(sig))) = PacketReader::new(&sig_data[..]).next() else {
        panic!("expected a signature packet");
    };
    sig.verify(&olivia.primary_key, &message[..]).unwrap();
    assert!(sig.verify(&olivia.primary_key, &b"other message"[..]).is_err());
}

#[test]
fn passphrase_only() {
    let mut rng = ChaCha8Rng::seed_from_u64(106);
    for aead in [None, Some(AeadConfig::default())] {
        let config = Config::builder()
            .now(config().now())
            .aead(aead)
            .compression(CompressionAlgorithm::ZIP)
            .build()
            .unwrap();

        let mut out = Vec::new();
        let mut w =
            symmetrically_encrypt(&mut rng, &mut out, b"correct horse", &hints("a"), &config)
                .unwrap();
        w.write_all(&[0xAB; 20_000]).unwrap();
        w.close().unwrap();

        let keyring = Vec::<Entity>::new();
        let details = read_message(&out[..], &keyring, Some(b"correct horse"), &config).unwrap();
        assert!(details.is_symmetrically_encrypted);
        assert_eq!(details.literal.data(), &[0xAB; 20_000][..]);
    }
}
