//! Picking the algorithms of a message from the preferences of its recipients.

use log::debug;

use crate::config::Config;
use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::Signature;
use crate::types::CompressionAlgorithm;

/// Ciphers a message may be encrypted with, most preferred first.
pub const CANDIDATE_CIPHERS: [SymmetricKeyAlgorithm; 3] = [
    SymmetricKeyAlgorithm::AES128,
    SymmetricKeyAlgorithm::AES256,
    SymmetricKeyAlgorithm::CAST5,
];

/// Hashes a message signature may use, most preferred first.
pub const CANDIDATE_HASHES: [HashAlgorithm; 5] = [
    HashAlgorithm::Sha256,
    HashAlgorithm::Sha384,
    HashAlgorithm::Sha512,
    HashAlgorithm::Sha1,
    HashAlgorithm::Ripemd160,
];

/// AEAD modes for SEIPDv2, most preferred first.
pub const CANDIDATE_AEAD_MODES: [AeadAlgorithm; 3] =
    [AeadAlgorithm::Eax, AeadAlgorithm::Ocb, AeadAlgorithm::Gcm];

pub const CANDIDATE_COMPRESSION: [CompressionAlgorithm; 3] = [
    CompressionAlgorithm::Uncompressed,
    CompressionAlgorithm::ZIP,
    CompressionAlgorithm::ZLIB,
];

/// Keeps the values of `candidates` that also appear in `preferences`, in the
/// order of `candidates`.
pub fn intersect_preferences<T: PartialEq + Copy>(candidates: &[T], preferences: &[T]) -> Vec<T> {
    candidates
        .iter()
        .filter(|c| preferences.contains(c))
        .copied()
        .collect()
}

/// Narrows `candidates` by `preferences`; an empty preference list stands for
/// the first candidate every implementation has to support.
fn narrow<T: PartialEq + Copy>(candidates: &mut Vec<T>, preferences: &[T], default: T) {
    *candidates = if preferences.is_empty() {
        intersect_preferences(candidates, &[default])
    } else {
        intersect_preferences(candidates, preferences)
    };
}

/// The configured algorithm if it survived, else the first survivor.
fn choose<T: PartialEq + Copy>(candidates: &[T], configured: T) -> Option<T> {
    if candidates.contains(&configured) {
        Some(configured)
    } else {
        candidates.first().copied()
    }
}

/// The algorithms chosen for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub cipher: SymmetricKeyAlgorithm,
    pub hash: HashAlgorithm,
    /// `Some` when the message is encrypted with SEIPDv2.
    pub aead: Option<AeadAlgorithm>,
    /// [`CompressionAlgorithm::Uncompressed`] means no compression layer.
    pub compression: CompressionAlgorithm,
}

/// The running candidate sets while folding over the recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    pub ciphers: Vec<SymmetricKeyAlgorithm>,
    pub hashes: Vec<HashAlgorithm>,
    pub aead_modes: Vec<AeadAlgorithm>,
    pub compression: Vec<CompressionAlgorithm>,
    /// Whether every recipient so far announced SEIPDv2.
    pub seipd_v2: bool,
}

impl Default for Candidates {
    fn default() -> Self {
        Candidates {
            ciphers: CANDIDATE_CIPHERS.to_vec(),
            hashes: CANDIDATE_HASHES.to_vec(),
            aead_modes: CANDIDATE_AEAD_MODES.to_vec(),
            compression: CANDIDATE_COMPRESSION.to_vec(),
            seipd_v2: true,
        }
    }
}

impl Candidates {
    /// Narrows every candidate set by the preferences in a recipient's
    /// self-signature.
    pub fn narrow_by(&mut self, sig: &Signature) {
        narrow(
            &mut self.ciphers,
            sig.preferred_symmetric_algs(),
            CANDIDATE_CIPHERS[0],
        );
        self.narrow_hashes_by(sig);
        narrow(
            &mut self.aead_modes,
            sig.preferred_aead_algs(),
            CANDIDATE_AEAD_MODES[0],
        );
        narrow(
            &mut self.compression,
            sig.preferred_compression_algs(),
            CANDIDATE_COMPRESSION[0],
        );
        self.seipd_v2 &= sig.supports_seipd_v2();
    }

    /// Narrows only the hashes, for messages that are signed but not
    /// encrypted.
    pub fn narrow_hashes_by(&mut self, sig: &Signature) {
        narrow(&mut self.hashes, sig.preferred_hash_algs(), CANDIDATE_HASHES[0]);
    }

    /// Picks the algorithms of an encrypted message.
    pub fn negotiate(&self, config: &Config) -> Result<Negotiated> {
        if self.ciphers.is_empty() || self.hashes.is_empty() || self.aead_modes.is_empty() {
            return Err(Error::AlgorithmNegotiation {
                message: "recipient set shares no common algorithms".into(),
            });
        }

        let cipher = choose(&self.ciphers, config.cipher()).ok_or_else(no_common("cipher"))?;
        let hash = self.hash(config)?;
        let aead = match config.aead() {
            Some(aead) if self.seipd_v2 => choose(&self.aead_modes, aead.mode),
            _ => None,
        };

        let configured = config.compression();
        let compression = if self.compression.contains(&configured) {
            configured
        } else {
            CompressionAlgorithm::Uncompressed
        };

        let negotiated = Negotiated {
            cipher,
            hash,
            aead,
            compression,
        };
        debug!("negotiated {:?}", negotiated);
        Ok(negotiated)
    }

    /// Picks the hash of a message signature.
    pub fn hash(&self, config: &Config) -> Result<HashAlgorithm> {
        let available: Vec<_> = self
            .hashes
            .iter()
            .copied()
            .filter(|h| h.digest_size().is_some())
            .collect();
        choose(&available, config.hash()).ok_or_else(no_common("hash"))
    }
}

fn no_common(what: &'static str) -> impl FnOnce() -> Error {
    move || Error::AlgorithmNegotiation {
        message: format!("no usable {what} algorithm"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::config::AeadConfig;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::packet::{SignatureConfig, SignatureType, SubpacketData, FEATURE_SEIPD_V2};

    fn config() -> Config {
        Config::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn self_sig(data: Vec<SubpacketData>) -> Signature {
        let mut config = SignatureConfig::new(
            SignatureType::CertPositive,
            PublicKeyAlgorithm::Ed25519,
            HashAlgorithm::Sha256,
        );
        for d in data {
            config.push_hashed(d);
        }
        Signature::from_config(config, [0, 0], Default::default())
    }

    fn ciphers(algs: &[SymmetricKeyAlgorithm]) -> SubpacketData {
        SubpacketData::PreferredSymmetricAlgorithms(algs.iter().copied().collect())
    }

    #[test]
    fn test_intersect_preserves_candidate_order() {
        assert_eq!(intersect_preferences(&['A', 'B', 'C'], &['C', 'A']), vec!['A', 'C']);
        assert!(intersect_preferences(&['A'], &[]).is_empty());
    }

    #[test]
    fn test_two_recipients_agree_on_aes256() {
        let mut candidates = Candidates::default();
        candidates.narrow_by(&self_sig(vec![ciphers(&[SymmetricKeyAlgorithm::AES256])]));
        candidates.narrow_by(&self_sig(vec![ciphers(&[
            SymmetricKeyAlgorithm::AES128,
            SymmetricKeyAlgorithm::AES256,
        ])]));

        assert_eq!(candidates.ciphers, vec![SymmetricKeyAlgorithm::AES256]);
        let negotiated = candidates.negotiate(&config()).unwrap();
        assert_eq!(negotiated.cipher, SymmetricKeyAlgorithm::AES256);
    }

    #[test]
    fn test_no_preferences_use_defaults() {
        let mut candidates = Candidates::default();
        candidates.narrow_by(&self_sig(vec![]));

        let negotiated = candidates.negotiate(&config()).unwrap();
        assert_eq!(negotiated.cipher, SymmetricKeyAlgorithm::AES128);
        assert_eq!(negotiated.hash, HashAlgorithm::Sha256);
        assert_eq!(negotiated.aead, None);
        assert_eq!(negotiated.compression, CompressionAlgorithm::Uncompressed);
    }

    #[test]
    fn test_configured_algorithm_wins() {
        let mut candidates = Candidates::default();
        candidates.narrow_by(&self_sig(vec![
            SubpacketData::PreferredHashAlgorithms(
                [HashAlgorithm::Sha256, HashAlgorithm::Sha512].into_iter().collect(),
            ),
            SubpacketData::PreferredCompressionAlgorithms(
                [CompressionAlgorithm::ZLIB].into_iter().collect(),
            ),
        ]));

        let config = Config::builder()
            .now(config().now())
            .hash(HashAlgorithm::Sha512)
            .compression(CompressionAlgorithm::ZLIB)
            .build()
            .unwrap();
        let negotiated = candidates.negotiate(&config).unwrap();
        assert_eq!(negotiated.hash, HashAlgorithm::Sha512);
        // only the recipient's own list survives, uncompressed is gone
        assert_eq!(negotiated.compression, CompressionAlgorithm::ZLIB);

        let config = Config::builder()
            .now(config.now())
            .hash(HashAlgorithm::Sha224)
            .compression(CompressionAlgorithm::ZIP)
            .build()
            .unwrap();
        let negotiated = candidates.negotiate(&config).unwrap();
        assert_eq!(negotiated.hash, HashAlgorithm::Sha256);
        assert_eq!(negotiated.compression, CompressionAlgorithm::Uncompressed);
    }

    #[test]
    fn test_disjoint_ciphers_fail_negotiation() {
        let mut candidates = Candidates::default();
        candidates.narrow_by(&self_sig(vec![ciphers(&[SymmetricKeyAlgorithm::AES256])]));
        candidates.narrow_by(&self_sig(vec![ciphers(&[SymmetricKeyAlgorithm::CAST5])]));

        let err = candidates.negotiate(&config()).unwrap_err();
        assert!(err.is_negotiation_failure());
    }

    #[test]
    fn test_aead_needs_every_recipient() {
        let aead_config = Config::builder()
            .now(config().now())
            .aead(Some(AeadConfig {
                mode: AeadAlgorithm::Ocb,
                ..Default::default()
            }))
            .build()
            .unwrap();
        let v2 = self_sig(vec![SubpacketData::Features(
            [FEATURE_SEIPD_V2].into_iter().collect(),
        )]);

        let mut candidates = Candidates::default();
        candidates.narrow_by(&v2);
        // no AEAD preferences: the default mode only
        assert_eq!(candidates.negotiate(&aead_config).unwrap().aead, Some(AeadAlgorithm::Eax));
        assert_eq!(candidates.negotiate(&config()).unwrap().aead, None);

        candidates.narrow_by(&self_sig(vec![]));
        assert_eq!(candidates.negotiate(&aead_config).unwrap().aead, None);
    }

    proptest! {
        #[test]
        fn intersection_is_ordered_subset(
            a in proptest::collection::vec(0u8..16, 0..12),
            b in proptest::collection::vec(0u8..16, 0..12),
        ) {
            let out = intersect_preferences(&a, &b);
            prop_assert!(out.iter().all(|v| a.contains(v) && b.contains(v)));

            let mut rest = a.iter();
            for v in &out {
                prop_assert!(rest.any(|x| x == v));
            }
        }

        #[test]
        fn negotiated_cipher_is_acceptable_to_all(
            prefs in proptest::collection::vec(
                proptest::sample::subsequence(CANDIDATE_CIPHERS.to_vec(), 0..=3),
                1..4,
            ),
        ) {
            let mut candidates = Candidates::default();
            for p in &prefs {
                candidates.narrow_by(&self_sig(vec![ciphers(p)]));
            }
            if let Ok(negotiated) = candidates.negotiate(&config()) {
                for p in &prefs {
                    let accepted = if p.is_empty() { &CANDIDATE_CIPHERS[..1] } else { &p[..] };
                    prop_assert!(accepted.contains(&negotiated.cipher));
                }
            }
        }
    }
}
