//! Producing and reading OpenPGP messages.
//!
//! The writing entry points return a [`BoxSink`]: the caller writes the
//! plaintext into it and then calls [`Sink::close`], which finalizes every
//! layer in order. Nothing is buffered beyond the current packet chunk.
//!
//! ```text
//! PKESK*  SEIPD( [Compressed( [OnePassSignature] Literal [Signature] )] )
//! ```
//!
//! [`Sink::close`]: crate::sink::Sink::close

mod negotiation;
mod reader;
mod writers;

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use log::debug;
use rand::{CryptoRng, Rng};

pub use self::negotiation::{
    intersect_preferences, Candidates, Negotiated, CANDIDATE_AEAD_MODES, CANDIDATE_CIPHERS,
    CANDIDATE_COMPRESSION, CANDIDATE_HASHES,
};
pub use self::reader::{read_message, MessageDetails};
pub use self::writers::{
    CompressedWriter, LiteralWriter, SeipdV1Writer, SeipdV2Writer, SignatureWriter,
};

use crate::composed::entity::Entity;
use crate::config::{AeadConfig, Config};
use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::packet::{
    DataMode, LiteralDataHeader, OnePassSignature, PacketTrait, PublicKeyEncryptedSessionKey,
    SecretKey, SignatureConfig, SignatureType, SubpacketData, SymKeyEncryptedSessionKey,
    MAX_FILE_NAME_LEN,
};
use crate::ser::u32_to_time;
use crate::sink::{BoxSink, NoOpCloser};
use crate::types::CompressionAlgorithm;

/// Metadata about the encrypted content. Stored inside the literal data
/// packet, so it is encrypted as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHints {
    /// The content is binary data rather than text.
    pub is_binary: bool,
    /// Suggested file name, truncated to 255 octets. Empty suggests the data
    /// should not be written to disk; `_CONSOLE` is the conventional name for
    /// data meant for display only.
    pub file_name: String,
    pub mod_time: Option<DateTime<Utc>>,
}

impl FileHints {
    fn literal_header(&self) -> Result<LiteralDataHeader> {
        let mode = if self.is_binary {
            DataMode::Binary
        } else {
            DataMode::Text
        };
        let name = self.file_name.as_bytes();
        let name = &name[..name.len().min(MAX_FILE_NAME_LEN)];
        let created = self.mod_time.unwrap_or_else(|| u32_to_time(0));
        LiteralDataHeader::new(mode, name, created)
    }
}

/// Encrypts a message to `to` and, if `signer` is given, signs it in binary
/// mode.
///
/// The returned sink must be closed once the plaintext is written.
pub fn encrypt<'a, R, W>(
    rng: R,
    ciphertext: W,
    to: &[&Entity],
    signer: Option<&'a Entity>,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    W: Write + 'a,
{
    encrypt_inner(
        rng,
        None,
        ciphertext,
        to,
        signer,
        hints,
        SignatureType::Binary,
        config,
    )
}

/// Like [`encrypt`], but signs in text mode: line endings are canonicalized
/// before the data is hashed and stored.
pub fn encrypt_text<'a, R, W>(
    rng: R,
    ciphertext: W,
    to: &[&Entity],
    signer: Option<&'a Entity>,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    W: Write + 'a,
{
    encrypt_inner(
        rng,
        None,
        ciphertext,
        to,
        signer,
        hints,
        SignatureType::Text,
        config,
    )
}

/// Like [`encrypt`], but the session key packets go to `keys` and only the
/// encrypted data goes to `data`.
pub fn encrypt_split<'a, R, K, W>(
    rng: R,
    mut keys: K,
    data: W,
    to: &[&Entity],
    signer: Option<&'a Entity>,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    K: Write,
    W: Write + 'a,
{
    encrypt_inner(
        rng,
        Some(&mut keys as &mut dyn Write),
        data,
        to,
        signer,
        hints,
        SignatureType::Binary,
        config,
    )
}

/// [`encrypt_split`] with a text mode signature.
pub fn encrypt_text_split<'a, R, K, W>(
    rng: R,
    mut keys: K,
    data: W,
    to: &[&Entity],
    signer: Option<&'a Entity>,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    K: Write,
    W: Write + 'a,
{
    encrypt_inner(
        rng,
        Some(&mut keys as &mut dyn Write),
        data,
        to,
        signer,
        hints,
        SignatureType::Text,
        config,
    )
}

#[allow(clippy::too_many_arguments)]
fn encrypt_inner<'a, R, W>(
    mut rng: R,
    keys: Option<&mut dyn Write>,
    mut data: W,
    to: &[&Entity],
    signer: Option<&'a Entity>,
    hints: &FileHints,
    typ: SignatureType,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    W: Write + 'a,
{
    if to.is_empty() {
        invalid_argument_err!("no encryption recipient provided");
    }

    let now = config.now();
    let mut candidates = Candidates::default();
    let mut recipients = Vec::with_capacity(to.len());
    for entity in to {
        let Some(key) = entity.encryption_key(now) else {
            invalid_argument_err!(
                "cannot encrypt a message to key id {} because it has no valid encryption keys",
                entity.key_id()
            );
        };
        // a resolved encryption key implies a self-signed primary identity
        if let Some(sig) = entity
            .primary_identity()
            .and_then(|identity| identity.self_signature.as_ref())
        {
            candidates.narrow_by(sig);
        }
        recipients.push(key);
    }

    let negotiated = candidates.negotiate(config)?;
    let signing_key = signer.map(|s| signing_private_key(s, config)).transpose()?;

    let session_key = negotiated.cipher.new_session_key(&mut rng);
    let mut esk_out: &mut dyn Write = match keys {
        Some(keys) => keys,
        None => &mut data,
    };
    let payload: BoxSink<'a> = match negotiated.aead {
        Some(mode) => {
            for key in &recipients {
                let esk = PublicKeyEncryptedSessionKey::from_session_key_v6(
                    &mut rng,
                    &session_key,
                    key.public_key,
                )?;
                esk.to_writer_with_header(&mut esk_out)?;
            }
            let aead = AeadConfig {
                mode,
                chunk_size: config.aead().unwrap_or_default().chunk_size,
            };
            Box::new(SeipdV2Writer::new(
                &mut rng,
                negotiated.cipher,
                aead,
                &session_key,
                Box::new(NoOpCloser::new(data)),
            )?)
        }
        None => {
            for key in &recipients {
                let esk = PublicKeyEncryptedSessionKey::from_session_key_v3(
                    &mut rng,
                    &session_key,
                    negotiated.cipher,
                    key.public_key,
                )?;
                esk.to_writer_with_header(&mut esk_out)?;
            }
            Box::new(SeipdV1Writer::new(
                &mut rng,
                negotiated.cipher,
                &session_key,
                Box::new(NoOpCloser::new(data)),
            )?)
        }
    };
    debug!(
        "encrypting to {} recipients with {:?}",
        recipients.len(),
        negotiated
    );

    let payload = compress(payload, negotiated.compression, config)?;
    write_and_sign(payload, negotiated.hash, signing_key, hints, typ, config)
}

/// Signs a message in binary mode, without encrypting it.
///
/// The output is a one-pass signature, the literal data and the signature.
pub fn sign<'a, W: Write + 'a>(
    output: W,
    signer: &'a Entity,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>> {
    sign_inner(output, signer, hints, SignatureType::Binary, config)
}

/// Like [`sign`], in text mode.
pub fn sign_text<'a, W: Write + 'a>(
    output: W,
    signer: &'a Entity,
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>> {
    sign_inner(output, signer, hints, SignatureType::Text, config)
}

fn sign_inner<'a, W: Write + 'a>(
    output: W,
    signer: &'a Entity,
    hints: &FileHints,
    typ: SignatureType,
    config: &Config,
) -> Result<BoxSink<'a>> {
    let signing_key = signing_private_key(signer, config)?;

    let mut candidates = Candidates::default();
    if let Some(sig) = signer
        .primary_identity()
        .and_then(|identity| identity.self_signature.as_ref())
    {
        candidates.narrow_hashes_by(sig);
    }
    let hash = candidates.hash(config)?;

    write_and_sign(
        Box::new(NoOpCloser::new(output)),
        hash,
        Some(signing_key),
        hints,
        typ,
        config,
    )
}

/// Writes a signature over `message` to `output`, without the message itself.
pub fn detach_sign<W: Write, R: Read>(
    output: W,
    signer: &Entity,
    message: R,
    config: &Config,
) -> Result<()> {
    detach_sign_inner(output, signer, message, SignatureType::Binary, config)
}

/// Like [`detach_sign`], over the message with canonicalized line endings.
pub fn detach_sign_text<W: Write, R: Read>(
    output: W,
    signer: &Entity,
    message: R,
    config: &Config,
) -> Result<()> {
    detach_sign_inner(output, signer, message, SignatureType::Text, config)
}

fn detach_sign_inner<W: Write, R: Read>(
    mut output: W,
    signer: &Entity,
    message: R,
    typ: SignatureType,
    config: &Config,
) -> Result<()> {
    let signing_key = signing_private_key(signer, config)?;

    let mut sig_config =
        SignatureConfig::from_key(signing_key.public_key(), typ, config.hash(), config.now());
    if let Some(lifetime) = config.sig_lifetime() {
        sig_config.push_hashed(SubpacketData::SignatureExpirationTime(lifetime));
    }

    let sig = sig_config.sign(signing_key, message)?;
    sig.to_writer_with_header(&mut output)
}

/// Encrypts a message with a passphrase only.
///
/// Uses SEIPDv2 when the configuration enables AEAD, and compresses with the
/// configured algorithm.
pub fn symmetrically_encrypt<'a, R, W>(
    mut rng: R,
    mut ciphertext: W,
    passphrase: &[u8],
    hints: &FileHints,
    config: &Config,
) -> Result<BoxSink<'a>>
where
    R: Rng + CryptoRng,
    W: Write + 'a,
{
    let cipher = config.cipher();
    let (esk, session_key) =
        SymKeyEncryptedSessionKey::new(&mut rng, passphrase, cipher, config.s2k_count())?;
    esk.to_writer_with_header(&mut ciphertext)?;

    let outer: BoxSink<'a> = Box::new(NoOpCloser::new(ciphertext));
    let payload: BoxSink<'a> = match config.aead() {
        Some(aead) => Box::new(SeipdV2Writer::new(
            &mut rng,
            cipher,
            aead,
            &session_key,
            outer,
        )?),
        None => Box::new(SeipdV1Writer::new(&mut rng, cipher, &session_key, outer)?),
    };

    let payload = compress(payload, config.compression(), config)?;
    Ok(Box::new(LiteralWriter::new(&hints.literal_header()?, payload)?))
}

/// The private key to sign with, which must be usable without a passphrase.
fn signing_private_key<'a>(signer: &'a Entity, config: &Config) -> Result<&'a SecretKey> {
    let Some(key) = signer.signing_key_by_id(config.now(), config.signing_key_id()) else {
        invalid_argument_err!("no valid signing keys");
    };
    let Some(private_key) = key.private_key else {
        invalid_argument_err!("no private key in signing key {}", key.key_id());
    };
    if private_key.is_encrypted() {
        invalid_argument_err!("signing key {} must be decrypted", key.key_id());
    }
    if private_key.is_dummy() {
        invalid_argument_err!("signing key {} has no secret material", key.key_id());
    }
    Ok(private_key)
}

fn compress<'a>(
    payload: BoxSink<'a>,
    alg: CompressionAlgorithm,
    config: &Config,
) -> Result<BoxSink<'a>> {
    match alg {
        CompressionAlgorithm::Uncompressed => Ok(payload),
        alg => Ok(Box::new(CompressedWriter::new(
            alg,
            config.compression_level(),
            payload,
        )?)),
    }
}

/// Starts the literal data packet, preceded by a one-pass signature and
/// wrapped in a [`SignatureWriter`] if there is a signer.
fn write_and_sign<'a>(
    mut payload: BoxSink<'a>,
    hash: HashAlgorithm,
    signer: Option<&'a SecretKey>,
    hints: &FileHints,
    typ: SignatureType,
    config: &Config,
) -> Result<BoxSink<'a>> {
    let header = hints.literal_header()?;
    let Some(signer) = signer else {
        return Ok(Box::new(LiteralWriter::new(&header, payload)?));
    };

    let ops = OnePassSignature::new(typ, hash, signer.algorithm(), signer.key_id());
    ops.to_writer_with_header(&mut payload)?;

    let literal = LiteralWriter::new(&header, payload)?;
    let sig_config = SignatureConfig::from_key(signer.public_key(), typ, hash, config.now());
    Ok(Box::new(SignatureWriter::new(sig_config, signer, literal)?))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::EntityBuilder;
    use crate::packet::{Packet, PacketReader};

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

    fn tags(data: &[u8]) -> Vec<crate::types::Tag> {
        PacketReader::new(data)
            .map(|p| p.unwrap().tag())
            .collect()
    }

    #[test]
    fn test_file_hints_truncate_name() {
        let hints = FileHints {
            is_binary: true,
            file_name: "x".repeat(300),
            mod_time: None,
        };
        let header = hints.literal_header().unwrap();
        assert_eq!(header.file_name.len(), MAX_FILE_NAME_LEN);
        assert_eq!(header.mode, DataMode::Binary);
        assert_eq!(header.created.timestamp(), 0);
    }

    #[test]
    fn test_encrypt_requires_recipients() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = encrypt(&mut rng, Vec::new(), &[], None, &FileHints::default(), &config())
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_encrypt_to_revoked_recipient() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut bob = entity(3, "Bob");
        bob.revoke_key(crate::packet::RevocationCode::KeyCompromised, "", &config())
            .unwrap();

        let err = encrypt(&mut rng, Vec::new(), &[&bob], None, &FileHints::default(), &config())
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_split_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let bob = entity(5, "Bob");
        let alice = entity(6, "Alice");

        let mut keys = Vec::new();
        let mut data = Vec::new();
        let mut w = encrypt_split(
            &mut rng,
            &mut keys,
            &mut data,
            &[&bob, &alice],
            None,
            &FileHints::default(),
            &config(),
        )
        .unwrap();
        w.write_all(b"split").unwrap();
        w.close().unwrap();

        use crate::types::Tag;
        assert_eq!(
            tags(&keys),
            vec![Tag::PublicKeyEncryptedSessionKey, Tag::PublicKeyEncryptedSessionKey]
        );
        assert_eq!(tags(&data), vec![Tag::SymEncryptedProtectedData]);
    }

    #[test]
    fn test_sign_layout() {
        let alice = entity(7, "Alice");
        let mut out = Vec::new();
        let mut w = sign(&mut out, &alice, &FileHints::default(), &config()).unwrap();
        w.write_all(b"signed").unwrap();
        w.close().unwrap();

        let packets: Vec<_> = PacketReader::new(&out[..]).map(|p| p.unwrap()).collect();
        assert_eq!(packets.len(), 3);
        let Packet::OnePassSignature(ops) = &packets[0] else {
            panic!("expected one-pass signature");
        };
        assert_eq!(ops.key_id, alice.key_id());
        assert_eq!(ops.typ, SignatureType::Binary);
        let (Packet::LiteralData(lit), Packet::Signature(sig)) = (&packets[1], &packets[2]) else {
            panic!("expected literal data and signature");
        };
        assert_eq!(sig.hash_alg(), ops.hash_alg);
        sig.verify(&alice.primary_key, lit.data()).unwrap();
    }

    #[test]
    fn test_sign_requires_private_key() {
        let alice = entity(8, "Alice").to_public();
        let err = sign(Vec::new(), &alice, &FileHints::default(), &config())
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());

        let err = detach_sign(Vec::new(), &alice, &b"msg"[..], &config()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_detach_sign_text() {
        let alice = entity(9, "Alice");
        let config = Config::builder()
            .now(config().now())
            .sig_lifetime(Some(std::time::Duration::from_secs(3600)))
            .build()
            .unwrap();

        let mut out = Vec::new();
        detach_sign_text(&mut out, &alice, &b"a\nb\n"[..], &config).unwrap();

        let Some(Ok(Packet::Signature(sig))) = PacketReader::new(&out[..]).next() else {
            panic!("expected a signature");
        };
        assert_eq!(sig.typ(), SignatureType::Text);
        assert_eq!(
            sig.signature_expiration_time(),
            Some(std::time::Duration::from_secs(3600))
        );
        sig.verify(&alice.primary_key, &b"a\r\nb\r\n"[..]).unwrap();
    }

    #[test]
    fn test_signing_key_id_must_match() {
        let alice = entity(10, "Alice");
        let config = Config::builder()
            .now(config().now())
            .signing_key_id(crate::types::KeyId::from(42u64))
            .build()
            .unwrap();
        let err = sign(Vec::new(), &alice, &FileHints::default(), &config)
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());
    }
}
