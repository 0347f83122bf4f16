use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::normalize_lines::CanonicalWriter;
use crate::packet::{
    PublicKey, SecretKey, Signature, SignatureType, Subpacket, SubpacketData, UserId,
    SIGNATURE_VERSION,
};
use crate::ser::Serialize;
use crate::sink::WriteHasher;

/// Everything about a signature except the signature material itself.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignatureConfig {
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    pub hash_alg: HashAlgorithm,
    pub hashed_subpackets: Vec<Subpacket>,
    pub unhashed_subpackets: Vec<Subpacket>,
}

impl SignatureConfig {
    pub fn new(typ: SignatureType, pub_alg: PublicKeyAlgorithm, hash_alg: HashAlgorithm) -> Self {
        Self {
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
        }
    }

    /// A configuration for a signature by `signer`, made at `created`.
    ///
    /// Carries the creation time and the issuer fingerprint in the hashed area,
    /// and the issuer key id in the unhashed area.
    pub fn from_key(
        signer: &PublicKey,
        typ: SignatureType,
        hash_alg: HashAlgorithm,
        created: DateTime<Utc>,
    ) -> Self {
        let mut config = Self::new(typ, signer.algorithm(), hash_alg);
        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(created)),
            Subpacket::regular(SubpacketData::IssuerFingerprint(signer.fingerprint())),
        ];
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(
            signer.key_id(),
        ))];
        config
    }

    /// Replaces the creation time, keeping all other subpackets.
    pub fn set_created(&mut self, created: DateTime<Utc>) {
        self.hashed_subpackets
            .retain(|p| !matches!(p.data, SubpacketData::SignatureCreationTime(_)));
        self.hashed_subpackets.insert(
            0,
            Subpacket::regular(SubpacketData::SignatureCreationTime(created)),
        );
    }

    pub fn push_hashed(&mut self, data: SubpacketData) {
        self.hashed_subpackets.push(Subpacket::regular(data));
    }

    pub fn push_unhashed(&mut self, data: SubpacketData) {
        self.unhashed_subpackets.push(Subpacket::regular(data));
    }

    pub fn hashed_subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.hashed_subpackets.iter()
    }

    pub fn unhashed_subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.unhashed_subpackets.iter()
    }

    /// Sign the given data.
    pub fn sign<R: Read>(self, key: &SecretKey, data: R) -> Result<Signature> {
        let mut hasher = self.hash_alg.new_hasher()?;
        self.hash_data_to_sign(&mut hasher, data)?;
        self.sign_hasher(key, hasher)
    }

    /// Create a certification self-signature.
    pub fn sign_certification(
        self,
        signer: &SecretKey,
        key: &PublicKey,
        id: &UserId,
    ) -> Result<Signature> {
        ensure!(
            self.typ.is_certification(),
            "can not sign a user id with signature type {:?}",
            self.typ
        );
        let mut hasher = self.hash_alg.new_hasher()?;
        key.hash_for_signature(&mut *hasher)?;
        id.hash_for_signature(&mut *hasher)?;
        self.sign_hasher(signer, hasher)
    }

    /// Create a subkey binding (by the primary key) or a primary key binding
    /// (by the subkey). The primary key is always hashed first.
    pub fn sign_key_binding(
        self,
        signer: &SecretKey,
        primary: &PublicKey,
        subkey: &PublicKey,
    ) -> Result<Signature> {
        let mut hasher = self.hash_alg.new_hasher()?;
        primary.hash_for_signature(&mut *hasher)?;
        subkey.hash_for_signature(&mut *hasher)?;
        self.sign_hasher(signer, hasher)
    }

    /// Signs a key directly, for revocations and direct key signatures.
    pub fn sign_key(self, signer: &SecretKey, key: &PublicKey) -> Result<Signature> {
        let mut hasher = self.hash_alg.new_hasher()?;
        key.hash_for_signature(&mut *hasher)?;
        self.sign_hasher(signer, hasher)
    }

    /// Completes a signature over data already fed into `hasher`.
    pub fn sign_hasher(self, key: &SecretKey, mut hasher: Box<dyn DynDigest>) -> Result<Signature> {
        ensure_eq!(
            key.algorithm(),
            self.pub_alg,
            "signing key does not match signature algorithm"
        );
        let len = self.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.trailer(len)?);

        let hash = hasher.finalize();
        let signed_hash_value = [hash[0], hash[1]];
        let signature = key.create_signature(self.hash_alg, &hash)?;
        debug!("signed {:?} with {}", self.typ, key.key_id());

        Ok(Signature::from_config(self, signed_hash_value, signature))
    }

    /// Feeds the signed document into `hasher`, canonicalizing line endings for
    /// text signatures.
    pub fn hash_data_to_sign<R: Read>(
        &self,
        hasher: &mut Box<dyn DynDigest>,
        mut data: R,
    ) -> Result<()> {
        match self.typ {
            SignatureType::Text => {
                let mut writer = CanonicalWriter::new(WriteHasher(hasher));
                io::copy(&mut data, &mut writer)?;
            }
            SignatureType::Binary => {
                io::copy(&mut data, &mut WriteHasher(hasher))?;
            }
            _ => bail!("data signature of type {:?}", self.typ),
        }
        Ok(())
    }

    /// Feeds the signature fields into `hasher`, returning the number of octets.
    pub fn hash_signature_data(&self, hasher: &mut dyn DynDigest) -> Result<usize> {
        let mut res = vec![
            SIGNATURE_VERSION,
            self.typ.into(),
            self.pub_alg.into(),
            self.hash_alg.into(),
        ];

        let mut hashed_subpackets = Vec::new();
        for packet in &self.hashed_subpackets {
            packet.to_writer(&mut hashed_subpackets)?;
        }
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, hashed_subpackets.len().try_into()?);
        res.extend_from_slice(&len);
        res.extend(hashed_subpackets);

        hasher.update(&res);
        Ok(res.len())
    }

    /// The final octets hashed into a v4 signature.
    pub fn trailer(&self, len: usize) -> Result<[u8; 6]> {
        let mut trailer = [SIGNATURE_VERSION, 0xFF, 0, 0, 0, 0];
        BigEndian::write_u32(&mut trailer[2..], len.try_into()?);
        Ok(trailer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_sign_verify_binary_and_text() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let key = SecretKey::generate_ed25519(&mut rng, now, false).unwrap();

        let sig = SignatureConfig::from_key(
            key.public_key(),
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            now,
        )
        .sign(&key, &b"hello\n"[..])
        .unwrap();
        sig.verify(key.public_key(), &b"hello\n"[..]).unwrap();
        assert!(sig.verify(key.public_key(), &b"hello\r\n"[..]).is_err());

        let sig = SignatureConfig::from_key(
            key.public_key(),
            SignatureType::Text,
            HashAlgorithm::Sha512,
            now,
        )
        .sign(&key, &b"hello\n"[..])
        .unwrap();
        sig.verify(key.public_key(), &b"hello\r\n"[..]).unwrap();
        sig.verify(key.public_key(), &b"hello\n"[..]).unwrap();
    }

    #[test]
    fn test_set_created() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let then = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let key = SecretKey::generate_ed25519(&mut rng, then, false).unwrap();

        let mut config = SignatureConfig::from_key(
            key.public_key(),
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            then,
        );
        config.set_created(later);
        assert_eq!(config.hashed_subpackets.len(), 2);

        let sig = config.sign(&key, &b"data"[..]).unwrap();
        assert_eq!(sig.created(), Some(later));
        sig.verify(key.public_key(), &b"data"[..]).unwrap();
    }

    #[test]
    fn test_trailer() {
        let config = SignatureConfig::new(
            SignatureType::Binary,
            PublicKeyAlgorithm::Ed25519,
            HashAlgorithm::Sha256,
        );
        assert_eq!(config.trailer(6).unwrap(), [4, 0xFF, 0, 0, 0, 6]);

        let mut hasher = HashAlgorithm::Sha256.new_hasher().unwrap();
        assert_eq!(config.hash_signature_data(&mut *hasher).unwrap(), 6);
    }
}
