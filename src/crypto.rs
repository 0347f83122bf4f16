//! Cryptographic primitives, dispatched by OpenPGP algorithm id.

pub mod aead;
pub mod aes_kw;
pub mod checksum;
pub mod ecc_curve;
pub mod ecdh;
pub mod ed25519;
pub mod eddsa;
pub mod hash;
pub mod public_key;
pub mod rsa;
pub mod sym;
pub mod x25519;
