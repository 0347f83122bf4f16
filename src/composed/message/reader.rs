use std::io::Read;

use log::{debug, warn};

use crate::composed::key_ring::KeyRing;
use crate::composed::resolve::Key;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::packet::{
    KeyFlags, LiteralData, OnePassSignature, Packet, PacketReader, PublicKeyEncryptedSessionKey,
    Signature, SymEncryptedProtectedData, SymKeyEncryptedSessionKey,
};
use crate::types::KeyId;

/// Compressed packets nested deeper than this are rejected.
const MAX_NESTING: usize = 8;

/// The outcome of [`read_message`].
#[derive(Debug)]
pub struct MessageDetails<'a> {
    pub is_encrypted: bool,
    /// Recipients named by the public key encrypted session keys. Anonymous
    /// recipients show up as the wildcard key id.
    pub encrypted_to_key_ids: Vec<KeyId>,
    pub is_symmetrically_encrypted: bool,
    /// The key that decrypted the session key, if any.
    pub decrypted_with: Option<Key<'a>>,

    pub is_signed: bool,
    pub signed_by_key_id: Option<KeyId>,
    /// The key ring entry for `signed_by_key_id`, if it was found.
    pub signed_by: Option<Key<'a>>,

    pub literal: LiteralData,
    pub signature: Option<Signature>,
    /// Why the signature is not valid. Unset if the message is unsigned or
    /// the signature verified.
    pub signature_error: Option<Error>,
}

impl MessageDetails<'_> {
    pub fn is_verified(&self) -> bool {
        self.is_signed && self.signed_by.is_some() && self.signature_error.is_none()
    }
}

/// Reads a message, decrypting it if needed and verifying its signature.
///
/// Session keys are tried with every decryption key in `keyring`. Encrypted
/// private keys are unlocked with `passphrase`, which is also tried against
/// symmetric session key packets. Signatures are checked against the signing
/// keys in `keyring`; a bad signature does not fail the call but is reported
/// in [`MessageDetails::signature_error`].
pub fn read_message<'a, R: Read, K: KeyRing + ?Sized>(
    reader: R,
    keyring: &'a K,
    passphrase: Option<&[u8]>,
    config: &Config,
) -> Result<MessageDetails<'a>> {
    let mut packets = PacketReader::new(reader);

    let mut pkesks = Vec::new();
    let mut skesks = Vec::new();
    let mut seipd = None;
    while let Some(packet) = packets.next() {
        match packet? {
            Packet::PublicKeyEncryptedSessionKey(esk) => pkesks.push(esk),
            Packet::SymKeyEncryptedSessionKey(esk) => skesks.push(esk),
            Packet::Marker(_) | Packet::Padding(_) => {}
            Packet::SymEncryptedProtectedData(data) => {
                seipd = Some(data);
                break;
            }
            other => {
                packets.unread(other);
                break;
            }
        }
    }

    let encrypted_to_key_ids = pkesks.iter().map(recipient_id).collect();
    let is_symmetrically_encrypted = !skesks.is_empty();

    let (payload, decrypted_with) = match seipd {
        Some(seipd) => {
            let (plaintext, key) = decrypt(&seipd, &pkesks, &skesks, keyring, passphrase)?;
            let mut payload = Payload::default();
            payload.collect(PacketReader::new(&plaintext[..]), 0)?;
            (payload, key)
        }
        None => {
            if !pkesks.is_empty() || !skesks.is_empty() {
                structural_err!("session key packets without encrypted data");
            }
            let mut payload = Payload::default();
            payload.collect(packets, 0)?;
            (payload, None)
        }
    };

    let Payload {
        ops,
        literal,
        signature,
    } = payload;
    let Some(literal) = literal else {
        structural_err!("message contains no literal data");
    };

    let mut details = MessageDetails {
        is_encrypted: decrypted_with.is_some() || is_symmetrically_encrypted,
        encrypted_to_key_ids,
        is_symmetrically_encrypted,
        decrypted_with,
        is_signed: false,
        signed_by_key_id: None,
        signed_by: None,
        literal,
        signature: None,
        signature_error: None,
    };

    let signer_id = match (&ops, &signature) {
        (Some(ops), _) => Some(ops.key_id),
        (None, Some(sig)) => sig.issuer(),
        (None, None) => None,
    };
    if let Some(id) = signer_id {
        details.is_signed = true;
        details.signed_by_key_id = Some(id);

        let mut usage = KeyFlags::default();
        usage.set_sign(true);
        details.signed_by = keyring.keys_by_id_usage(id, usage).into_iter().next();
        details.signature_error = check_signature(
            details.signed_by.as_ref(),
            ops.as_ref(),
            signature.as_ref(),
            &details.literal,
            config,
        )
        .err();
        details.signature = signature;
    }

    Ok(details)
}

fn recipient_id(esk: &PublicKeyEncryptedSessionKey) -> KeyId {
    match esk {
        PublicKeyEncryptedSessionKey::V3 { id, .. } => *id,
        PublicKeyEncryptedSessionKey::V6 { fingerprint, .. } => {
            fingerprint.map_or(KeyId::WILDCARD, |fp| fp.key_id())
        }
    }
}

fn decrypt<'a, K: KeyRing + ?Sized>(
    seipd: &SymEncryptedProtectedData,
    pkesks: &[PublicKeyEncryptedSessionKey],
    skesks: &[SymKeyEncryptedSessionKey],
    keyring: &'a K,
    passphrase: Option<&[u8]>,
) -> Result<(Vec<u8>, Option<Key<'a>>)> {
    for key in keyring.decryption_keys() {
        let Some(private_key) = key.private_key else {
            continue;
        };
        for esk in pkesks.iter().filter(|esk| esk.matches(key.public_key)) {
            let result = if private_key.is_encrypted() {
                let Some(passphrase) = passphrase else {
                    debug!("skipping locked key {}", key.key_id());
                    continue;
                };
                let mut unlocked = private_key.clone();
                unlocked
                    .unlock(passphrase)
                    .and_then(|_| esk.decrypt(&unlocked))
            } else {
                esk.decrypt(private_key)
            };

            match result {
                Ok((sym_alg, session_key)) => {
                    let plaintext = seipd.decrypt(&session_key, sym_alg)?;
                    return Ok((plaintext, Some(key)));
                }
                Err(err) => warn!("session key for {} failed: {}", key.key_id(), err),
            }
        }
    }

    if let Some(passphrase) = passphrase {
        for esk in skesks {
            match try_skesk(seipd, esk, passphrase) {
                Ok(plaintext) => return Ok((plaintext, None)),
                Err(err) => debug!("symmetric session key failed: {}", err),
            }
        }
    }

    invalid_argument_err!("no key to decrypt the message")
}

fn try_skesk(
    seipd: &SymEncryptedProtectedData,
    esk: &SymKeyEncryptedSessionKey,
    passphrase: &[u8],
) -> Result<Vec<u8>> {
    let (sym_alg, session_key) = esk.decrypt(passphrase)?;
    seipd.decrypt(&session_key, Some(sym_alg))
}

/// The packets found inside the (decrypted) message.
#[derive(Debug, Default)]
struct Payload {
    ops: Option<OnePassSignature>,
    literal: Option<LiteralData>,
    signature: Option<Signature>,
}

impl Payload {
    fn collect<R: Read>(&mut self, packets: PacketReader<R>, depth: usize) -> Result<()> {
        for packet in packets {
            match packet? {
                Packet::CompressedData(compressed) => {
                    if depth >= MAX_NESTING {
                        structural_err!("compressed packets nested too deeply");
                    }
                    let data = compressed.decompress_to_vec()?;
                    self.collect(PacketReader::new(&data[..]), depth + 1)?;
                }
                Packet::OnePassSignature(ops) if self.ops.is_none() => self.ops = Some(ops),
                Packet::LiteralData(literal) if self.literal.is_none() => {
                    self.literal = Some(literal)
                }
                Packet::Signature(sig) if self.signature.is_none() => self.signature = Some(sig),
                Packet::Marker(_) | Packet::Padding(_) => {}
                other => structural_err!("unexpected {:?} packet in message", other.tag()),
            }
        }
        Ok(())
    }
}

fn check_signature(
    key: Option<&Key<'_>>,
    ops: Option<&OnePassSignature>,
    signature: Option<&Signature>,
    literal: &LiteralData,
    config: &Config,
) -> Result<()> {
    let Some(sig) = signature else {
        structural_err!("signed message is missing its signature");
    };
    let Some(key) = key else {
        invalid_argument_err!("unknown issuer {:?}", sig.issuer());
    };
    if let Some(ops) = ops {
        ensure!(
            ops.typ == sig.typ() && ops.hash_alg == sig.hash_alg(),
            "one-pass signature does not match the signature"
        );
    }

    sig.verify(key.public_key, literal.data())?;

    let now = config.now();
    if sig.sig_expired(now) {
        bail!("signature expired");
    }
    if key.revoked(now) {
        bail!("signing key {} is revoked", key.key_id());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::message::{encrypt, encrypt_text, sign, symmetrically_encrypt, FileHints};
    use crate::composed::{Entity, EntityBuilder};
    use crate::config::AeadConfig;
    use crate::packet::{DataMode, LiteralDataHeader, PacketTrait};

    fn entity(seed: u64, name: &str) -> Entity {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        EntityBuilder::default()
            .primary_user_id(name)
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .generate(&mut rng)
            .unwrap()
    }

    fn config() -> Config {
        Config::new(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
    }

    fn hints() -> FileHints {
        FileHints {
            is_binary: true,
            file_name: "msg.txt".to_string(),
            mod_time: None,
        }
    }

    #[test]
    fn test_plain_literal() {
        let header = LiteralDataHeader::new(DataMode::Binary, b"", Utc::now()).unwrap();
        let literal = LiteralData::from_bytes(header, "hello".into());
        let mut data = Vec::new();
        literal.to_writer_with_header(&mut data).unwrap();

        let keyring = Vec::<Entity>::new();
        let details = read_message(&data[..], &keyring, None, &config()).unwrap();
        assert!(!details.is_encrypted);
        assert!(!details.is_signed);
        assert_eq!(details.literal.data(), b"hello");
    }

    #[test]
    fn test_encrypted_and_signed() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let alice = entity(2, "Alice");
        let bob = entity(3, "Bob");

        let mut out = Vec::new();
        let mut w = encrypt(&mut rng, &mut out, &[&bob], Some(&alice), &hints(), &config()).unwrap();
        w.write_all(b"meet at noon").unwrap();
        w.close().unwrap();

        let keyring = vec![alice.to_public(), bob.clone()];
        let details = read_message(&out[..], &keyring, None, &config()).unwrap();
        assert!(details.is_encrypted);
        assert_eq!(details.encrypted_to_key_ids, vec![bob.subkeys[0].key_id()]);
        assert_eq!(
            details.decrypted_with.unwrap().key_id(),
            bob.subkeys[0].key_id()
        );
        assert_eq!(details.literal.data(), b"meet at noon");
        assert_eq!(details.literal.file_name(), b"msg.txt");
        assert!(details.is_verified(), "{:?}", details.signature_error);
        assert_eq!(details.signed_by_key_id, Some(alice.key_id()));
    }

    #[test]
    fn test_wrong_recipient() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let bob = entity(5, "Bob");
        let eve = entity(6, "Eve");

        let mut out = Vec::new();
        let mut w = encrypt(&mut rng, &mut out, &[&bob], None, &hints(), &config()).unwrap();
        w.write_all(b"secret").unwrap();
        w.close().unwrap();

        let err = read_message(&out[..], &vec![eve], None, &config()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_unknown_signer_is_reported() {
        let alice = entity(7, "Alice");
        let mut out = Vec::new();
        let mut w = sign(&mut out, &alice, &hints(), &config()).unwrap();
        w.write_all(b"who wrote this").unwrap();
        w.close().unwrap();

        let keyring = Vec::<Entity>::new();
        let details = read_message(&out[..], &keyring, None, &config()).unwrap();
        assert!(details.is_signed);
        assert!(details.signed_by.is_none());
        assert!(details.signature_error.is_some());
        assert!(!details.is_verified());
    }

    #[test]
    fn test_verification_needs_signer_key() {
        let alice = entity(8, "Alice");
        let mallory = entity(9, "Mallory");
        let mut out = Vec::new();
        let mut w = sign(&mut out, &alice, &hints(), &config()).unwrap();
        w.write_all(b"original").unwrap();
        w.close().unwrap();

        let keyring = vec![alice.clone()];
        let details = read_message(&out[..], &keyring, None, &config()).unwrap();
        assert!(details.is_verified());
        let keyring = vec![mallory];
        let details = read_message(&out[..], &keyring, None, &config()).unwrap();
        assert_eq!(details.signed_by_key_id, Some(alice.key_id()));
        assert!(details.signed_by.is_none());
        assert!(!details.is_verified());
    }

    #[test]
    fn test_text_signature_aead() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let alice = entity(11, "Alice");
        let config = Config::builder()
            .now(config().now())
            .aead(Some(AeadConfig::default()))
            .build()
            .unwrap();

        let mut out = Vec::new();
        let text_hints = FileHints {
            is_binary: false,
            ..hints()
        };
        let mut w =
            encrypt_text(&mut rng, &mut out, &[&alice], Some(&alice), &text_hints, &config).unwrap();
        w.write_all(b"line one\nline two\n").unwrap();
        w.close().unwrap();

        let details = read_message(&out[..], &alice, None, &config).unwrap();
        assert!(!details.literal.is_binary());
        assert_eq!(details.literal.data(), b"line one\r\nline two\r\n");
        assert!(details.is_verified(), "{:?}", details.signature_error);
    }

    #[test]
    fn test_symmetric() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut out = Vec::new();
        let mut w = symmetrically_encrypt(&mut rng, &mut out, b"hunter2", &hints(), &config())
            .unwrap();
        w.write_all(b"shared secret").unwrap();
        w.close().unwrap();

        let keyring = Vec::<Entity>::new();
        let details = read_message(&out[..], &keyring, Some(b"hunter2"), &config()).unwrap();
        assert!(details.is_symmetrically_encrypted);
        assert!(details.decrypted_with.is_none());
        assert_eq!(details.literal.data(), b"shared secret");

        let err = read_message(&out[..], &keyring, Some(b"wrong"), &config()).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
