//! ECDH over Curve25519 in the RFC 6637 framing (`ECDH`, algorithm 18).
//!
//! The shared secret goes through the RFC 6637 KDF, and the session key is
//! PKCS#5 padded before it is wrapped with AES key wrap.

use block_padding::{Padding, Pkcs7};
use cipher::generic_array::{typenum::U8, GenericArray};
use log::debug;
use rand::{CryptoRng, Rng};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::aes_kw;
use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::eddsa::{decode_point, encode_point};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::x25519;
use crate::errors::{Error, Result};
use crate::types::{Fingerprint, Mpi};

/// 20 octets representing "Anonymous Sender    ".
const ANON_SENDER: [u8; 20] = *b"Anonymous Sender    ";

/// Wrapped keys longer than this do not fit the one octet length field.
const MAX_WRAPPED: usize = 239;

/// Parameters of an ECDH key beyond its point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub hash: HashAlgorithm,
    pub alg_sym: SymmetricKeyAlgorithm,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            hash: HashAlgorithm::Sha256,
            alg_sym: SymmetricKeyAlgorithm::AES128,
        }
    }
}

fn check_curve(curve: &EccCurve) -> Result<()> {
    if curve != &EccCurve::Curve25519 {
        unsupported_err!("curve {} for ECDH", curve);
    }
    Ok(())
}

/// Generates a clamped Curve25519 secret and its public point MPI.
pub fn generate_key<R: Rng + CryptoRng>(mut rng: R) -> (x25519::SecretKey, Mpi) {
    let mut secret = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut *secret);
    secret[0] &= 0xF8;
    secret[31] &= 0x7F;
    secret[31] |= 0x40;

    let key = x25519::SecretKey::from_bytes(*secret);
    let public = encode_point(&key.public());
    (key, public)
}

/// Reads the big endian secret scalar MPI, checking it against the public
/// point.
pub fn secret_from_mpi(curve: &EccCurve, p: &Mpi, secret: &Mpi) -> Result<x25519::SecretKey> {
    check_curve(curve)?;
    let mut le = Zeroizing::new(secret.to_array::<32>()?);
    le.reverse();
    let key = x25519::SecretKey::from_bytes(*le);
    ensure!(
        key.public() == decode_point(p)?,
        "ECDH secret does not match the public key"
    );
    Ok(key)
}

/// The big endian secret scalar MPI of `key`.
pub fn secret_to_mpi(key: &x25519::SecretKey) -> Mpi {
    let mut be = Zeroizing::new(*key.as_bytes());
    be.reverse();
    Mpi::from_slice(&be[..])
}

/// KDF parameter block: curve, algorithm, KDF params, sender, recipient.
/// Ref: <https://www.rfc-editor.org/rfc/rfc6637#section-8>
fn build_ecdh_param(curve: &EccCurve, kdf: &KdfParams, fingerprint: &Fingerprint) -> Vec<u8> {
    let oid = curve.oid();
    let mut param = Vec::with_capacity(1 + oid.len() + 1 + 4 + 20 + 20);
    param.push(oid.len() as u8);
    param.extend_from_slice(oid);
    param.push(PublicKeyAlgorithm::ECDH.into());
    param.extend_from_slice(&[0x03, 0x01, kdf.hash.into(), kdf.alg_sym.into()]);
    param.extend_from_slice(&ANON_SENDER);
    param.extend_from_slice(fingerprint.as_bytes());
    param
}

/// Single step KDF with counter 1.
/// Ref: <https://www.rfc-editor.org/rfc/rfc6637#section-7>
fn kdf(kdf: &KdfParams, shared: &[u8; 32], param: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut hasher = kdf.hash.new_hasher()?;
    hasher.update(&[0, 0, 0, 1]);
    hasher.update(shared);
    hasher.update(param);
    let mut digest = Zeroizing::new(hasher.finalize().to_vec());

    let len = kdf.alg_sym.key_size();
    ensure!(digest.len() >= len, "KDF hash {} too short", kdf.hash);
    digest.truncate(len);
    Ok(digest)
}

/// Encrypts `plain` to the point `p`, returning the ephemeral point and the
/// wrapped key.
pub fn encrypt<R: Rng + CryptoRng>(
    mut rng: R,
    curve: &EccCurve,
    p: &Mpi,
    kdf_params: &KdfParams,
    fingerprint: &Fingerprint,
    plain: &[u8],
) -> Result<(Mpi, Vec<u8>)> {
    debug!("ECDH encrypt");
    check_curve(curve)?;
    ensure!(
        plain.len() < MAX_WRAPPED,
        "unable to encrypt larger than {} bytes",
        MAX_WRAPPED
    );

    let their_public = PublicKey::from(decode_point(p)?);
    let mut ephemeral = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut *ephemeral);
    let our_secret = StaticSecret::from(*ephemeral);
    let shared = our_secret.diffie_hellman(&their_public);

    let param = build_ecdh_param(curve, kdf_params, fingerprint);
    let z = kdf(kdf_params, shared.as_bytes(), &param)?;

    // PKCS#5 pads to full 8 octet blocks, adding a whole block if aligned
    let len = plain.len();
    let padded_len = (len / 8 + 1) * 8;
    let mut padded = Zeroizing::new(vec![0u8; padded_len]);
    padded[..len].copy_from_slice(plain);
    let last = padded_len - 8;
    Pkcs7::pad(
        GenericArray::<u8, U8>::from_mut_slice(&mut padded[last..]),
        len - last,
    );

    let wrapped = aes_kw::wrap(&z, &padded)?;
    let ephemeral_public = encode_point(PublicKey::from(&our_secret).as_bytes());
    Ok((ephemeral_public, wrapped))
}

/// Unwraps a session key encrypted to `key`.
pub fn decrypt(
    key: &x25519::SecretKey,
    curve: &EccCurve,
    kdf_params: &KdfParams,
    fingerprint: &Fingerprint,
    ephemeral: &Mpi,
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    debug!("ECDH decrypt");
    check_curve(curve)?;

    let their_public = PublicKey::from(decode_point(ephemeral)?);
    let shared = StaticSecret::from(*key.as_bytes()).diffie_hellman(&their_public);

    let param = build_ecdh_param(curve, kdf_params, fingerprint);
    let z = kdf(kdf_params, shared.as_bytes(), &param)?;

    let mut padded = aes_kw::unwrap(&z, wrapped)?;
    let len = padded.len();
    ensure!(
        len >= 8 && len % 8 == 0,
        "invalid padded session key length {}",
        len
    );
    let last = len - 8;
    let unpadded = Pkcs7::unpad(GenericArray::<u8, U8>::from_slice(&padded[last..]))
        .map_err(|_| Error::InvalidArgument {
            message: "invalid session key padding".into(),
        })?
        .len();
    padded.truncate(last + unpadded);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let (secret, public) = generate_key(&mut rng);
        let kdf_params = KdfParams::default();

        for text_size in [1, 7, 8, 19, 35, 238] {
            let mut fingerprint = [0u8; 20];
            rng.fill_bytes(&mut fingerprint);
            let fingerprint = Fingerprint::from(fingerprint);

            let mut plain = vec![0u8; text_size];
            rng.fill_bytes(&mut plain);

            let (ephemeral, wrapped) = encrypt(
                &mut rng,
                &EccCurve::Curve25519,
                &public,
                &kdf_params,
                &fingerprint,
                &plain,
            )
            .unwrap();
            let decrypted = decrypt(
                &secret,
                &EccCurve::Curve25519,
                &kdf_params,
                &fingerprint,
                &ephemeral,
                &wrapped,
            )
            .unwrap();
            assert_eq!(&decrypted[..], &plain[..]);
        }
    }

    #[test]
    fn test_fingerprint_is_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let (secret, public) = generate_key(&mut rng);
        let kdf_params = KdfParams::default();

        let (ephemeral, wrapped) = encrypt(
            &mut rng,
            &EccCurve::Curve25519,
            &public,
            &kdf_params,
            &Fingerprint::from([1u8; 20]),
            b"session key",
        )
        .unwrap();
        assert!(decrypt(
            &secret,
            &EccCurve::Curve25519,
            &kdf_params,
            &Fingerprint::from([2u8; 20]),
            &ephemeral,
            &wrapped,
        )
        .is_err());
    }

    #[test]
    fn test_secret_mpi_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let (secret, public) = generate_key(&mut rng);
        let mpi = secret_to_mpi(&secret);
        let again = secret_from_mpi(&EccCurve::Curve25519, &public, &mpi).unwrap();
        assert_eq!(again, secret);
    }
}
