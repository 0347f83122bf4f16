//! RSA with PKCS#1 v1.5 padding, for signatures and session keys.

use num_bigint::ModInverse;
use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::types::Mpi;

/// Largest modulus accepted, in bits.
pub const MAX_KEY_SIZE: usize = 16384;

/// DigestInfo prefix of SHA-1, which has no OID registered with the hasher.
const SHA1_DIGEST_INFO: [u8; 15] = [
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];

/// Secret key for RSA.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    key: RsaPrivateKey,
    /// `d`, `p`, `q` and `u` as written to secret key packets.
    #[debug("..")]
    components: [Mpi; 4],
}

impl SecretKey {
    fn new(key: RsaPrivateKey) -> Result<Self> {
        let [p, q] = key.primes() else {
            bail!("RSA key with {} primes", key.primes().len());
        };
        let Some(u) = p.clone().mod_inverse(q).and_then(|u| u.to_biguint()) else {
            bail!("invalid RSA primes");
        };
        let components = [
            Mpi::from(key.d()),
            Mpi::from(p),
            Mpi::from(q),
            Mpi::from(&u),
        ];
        Ok(SecretKey { key, components })
    }

    /// Generates a key with a modulus of `bits` bits, returning it with the
    /// public modulus and exponent.
    pub fn generate<R: Rng + CryptoRng>(mut rng: R, bits: usize) -> Result<(Self, Mpi, Mpi)> {
        let key = RsaPrivateKey::new(&mut rng, bits)?;
        let n = Mpi::from(key.n());
        let e = Mpi::from(key.e());
        Ok((SecretKey::new(key)?, n, e))
    }

    /// Rebuilds the key from its OpenPGP components. `u` is recomputed, so it
    /// is not read.
    pub fn try_from_mpi(n: &Mpi, e: &Mpi, d: &Mpi, p: &Mpi, q: &Mpi) -> Result<Self> {
        let key = RsaPrivateKey::from_components(
            n.into(),
            e.into(),
            d.into(),
            vec![p.into(), q.into()],
        )?;
        key.validate()?;
        SecretKey::new(key)
    }

    /// The OpenPGP secret components `d`, `p`, `q` and `u = p^-1 mod q`.
    pub fn to_mpi(&self) -> &[Mpi; 4] {
        &self.components
    }

    pub fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Mpi> {
        let sig = self.key.sign(padding(hash)?, digest)?;
        Ok(Mpi::from_slice(&sig))
    }

    pub fn decrypt(&self, ciphertext: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
        let padded = ciphertext.to_padded(self.key.size())?;
        let plain = self.key.decrypt(Pkcs1v15Encrypt, &padded)?;
        Ok(Zeroizing::new(plain))
    }
}

fn public_key(n: &Mpi, e: &Mpi) -> Result<RsaPublicKey> {
    let key = RsaPublicKey::new_with_max_size(n.into(), e.into(), MAX_KEY_SIZE)?;
    Ok(key)
}

fn padding(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    let padding = match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign {
            hash_len: Some(20),
            prefix: SHA1_DIGEST_INFO.into(),
        },
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        _ => unsupported_err!("RSA signature with hash {:?}", hash),
    };
    Ok(padding)
}

/// Verifies a PKCS#1 v1.5 signature over `hashed`.
pub fn verify(n: &Mpi, e: &Mpi, hash: HashAlgorithm, hashed: &[u8], sig: &Mpi) -> Result<()> {
    let key = public_key(n, e)?;
    // signatures with leading zero octets are stored shortened
    let sig = sig.to_padded(key.size())?;
    key.verify(padding(hash)?, hashed, &sig)?;
    Ok(())
}

/// Encrypts `plain` to the key `(n, e)`.
pub fn encrypt<R: Rng + CryptoRng>(mut rng: R, n: &Mpi, e: &Mpi, plain: &[u8]) -> Result<Mpi> {
    let key = public_key(n, e)?;
    let ciphertext = key.encrypt(&mut rng, Pkcs1v15Encrypt, plain)?;
    Ok(Mpi::from_slice(&ciphertext))
}
