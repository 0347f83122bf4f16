mod compression;
mod fingerprint;
mod key_id;
mod mpi;
mod packet;
mod params;
mod s2k;

pub use self::{
    compression::CompressionAlgorithm,
    fingerprint::Fingerprint,
    key_id::KeyId,
    mpi::Mpi,
    packet::*,
    params::*,
    s2k::StringToKey,
};
