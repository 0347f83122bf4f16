//! EdDSA in the legacy RFC 4880bis framing (`EdDSALegacy`, algorithm 22).
//!
//! The cryptography is Ed25519, as in [`crate::crypto::ed25519`], but the
//! public point is an MPI prefixed with `0x40`, the secret is an MPI, and
//! signatures are the two MPIs `r` and `s`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::ed25519;
use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::ser::Serialize;
use crate::types::Mpi;

/// Prefix of a native point encoding.
pub(crate) const NATIVE_POINT: u8 = 0x40;

/// Encodes a 32 octet point as a prefixed MPI.
pub(crate) fn encode_point(point: &[u8; 32]) -> Mpi {
    let mut q = Vec::with_capacity(33);
    q.push(NATIVE_POINT);
    q.extend_from_slice(point);
    Mpi::from_slice(&q)
}

/// Decodes a prefixed 32 octet point.
pub(crate) fn decode_point(q: &Mpi) -> Result<[u8; 32]> {
    let raw = q.as_bytes();
    ensure_eq!(raw.len(), 33, "invalid Q (len)");
    ensure_eq!(raw[0], NATIVE_POINT, "invalid Q (prefix)");
    let mut point = [0u8; 32];
    point.copy_from_slice(&raw[1..]);
    Ok(point)
}

fn check_curve(curve: &EccCurve) -> Result<()> {
    if curve != &EccCurve::Ed25519 {
        unsupported_err!("curve {} for EdDSA", curve);
    }
    Ok(())
}

/// The public point encoding of `key`.
pub fn public(key: &ed25519::SecretKey) -> Mpi {
    encode_point(&key.public())
}

/// Reads the secret scalar MPI, checking it against the public point.
pub fn secret_from_mpi(curve: &EccCurve, q: &Mpi, secret: &Mpi) -> Result<ed25519::SecretKey> {
    check_curve(curve)?;
    let key = ed25519::SecretKey::from_bytes(&secret.to_array::<32>()?);
    ensure!(
        key.public() == decode_point(q)?,
        "EdDSA secret does not match the public key"
    );
    Ok(key)
}

/// Signs and encodes the signature as the MPIs `r` and `s`.
pub fn sign(key: &ed25519::SecretKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Bytes> {
    let sig = key.sign(hash, digest)?;
    let r = Mpi::from_slice(&sig[..32]);
    let s = Mpi::from_slice(&sig[32..]);

    let mut out = BytesMut::with_capacity(r.write_len() + s.write_len()).writer();
    r.to_writer(&mut out)?;
    s.to_writer(&mut out)?;
    Ok(out.into_inner().freeze())
}

/// Verifies a signature made of the MPIs `r` and `s`.
pub fn verify(
    curve: &EccCurve,
    q: &Mpi,
    hash: HashAlgorithm,
    hashed: &[u8],
    mut sig_bytes: &[u8],
) -> Result<()> {
    check_curve(curve)?;
    let public = decode_point(q)?;
    let r = Mpi::try_from_buf(&mut sig_bytes)?;
    let s = Mpi::try_from_buf(&mut sig_bytes)?;
    if !sig_bytes.is_empty() {
        structural_err!("{} trailing octets in EdDSA signature", sig_bytes.len());
    }

    let mut sig = [0u8; 64];
    sig[..32].copy_from_slice(&r.to_array::<32>()?);
    sig[32..].copy_from_slice(&s.to_array::<32>()?);
    ed25519::verify(&public, hash, hashed, &sig)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_sign_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let key = ed25519::SecretKey::generate(&mut rng);
        let q = public(&key);
        assert_eq!(q.len(), 33);

        let digest = HashAlgorithm::Sha256.digest(b"legacy").unwrap();
        let sig = sign(&key, HashAlgorithm::Sha256, &digest).unwrap();
        verify(&EccCurve::Ed25519, &q, HashAlgorithm::Sha256, &digest, &sig).unwrap();

        let other = HashAlgorithm::Sha256.digest(b"legacY").unwrap();
        assert!(verify(&EccCurve::Ed25519, &q, HashAlgorithm::Sha256, &other, &sig).is_err());
        assert!(
            verify(&EccCurve::Curve25519, &q, HashAlgorithm::Sha256, &digest, &sig)
                .unwrap_err()
                .is_unsupported()
        );
    }

    #[test]
    fn test_secret_must_match() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let key = ed25519::SecretKey::generate(&mut rng);
        let other = ed25519::SecretKey::generate(&mut rng);
        let secret = Mpi::from_slice(&key.to_bytes()[..]);

        let again = secret_from_mpi(&EccCurve::Ed25519, &public(&key), &secret).unwrap();
        assert_eq!(again, key);
        assert!(secret_from_mpi(&EccCurve::Ed25519, &public(&other), &secret).is_err());
    }
}
