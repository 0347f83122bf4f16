use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use num_bigint::BigUint;

use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::Serialize;

/// Largest MPI accepted when reading, in bits. Same limit as GnuPG.
const MAX_EXTERN_MPI_BITS: u16 = 16384;

/// A multiprecision integer, stored big endian without leading zeros.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-multiprecision-integers>
#[derive(Default, Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Mpi(#[debug("{}", hex::encode(_0))] Bytes);

impl Mpi {
    /// Reads a bit count followed by the integer.
    pub fn try_from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let bits = i.read_be_u16()?;
        if bits > MAX_EXTERN_MPI_BITS {
            unsupported_err!("MPI of {} bits", bits);
        }
        let body = i.read_take(usize::from(bits).div_ceil(8))?;
        let start = leading_zeros(&body);
        Ok(Mpi(body.slice(start..)))
    }

    /// Wraps raw big endian bytes, stripping leading zeros.
    pub fn from_slice(raw: &[u8]) -> Self {
        let start = leading_zeros(raw);
        Mpi(Bytes::copy_from_slice(&raw[start..]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value left padded with zeros to `len` octets.
    pub fn to_padded(&self, len: usize) -> Result<Vec<u8>> {
        ensure!(
            self.0.len() <= len,
            "MPI of {} octets does not fit into {}",
            self.0.len(),
            len
        );
        let mut out = vec![0u8; len - self.0.len()];
        out.extend_from_slice(&self.0);
        Ok(out)
    }

    /// Like [`Mpi::to_padded`], for fixed size fields.
    pub fn to_array<const C: usize>(&self) -> Result<[u8; C]> {
        let mut out = [0u8; C];
        ensure!(
            self.0.len() <= C,
            "MPI of {} octets does not fit into {}",
            self.0.len(),
            C
        );
        out[C - self.0.len()..].copy_from_slice(&self.0);
        Ok(out)
    }

    fn bits(&self) -> u16 {
        match self.0.first() {
            None => 0,
            Some(first) => (self.0.len() * 8) as u16 - first.leading_zeros() as u16,
        }
    }
}

fn leading_zeros(raw: &[u8]) -> usize {
    raw.iter().position(|b| *b != 0).unwrap_or(raw.len())
}

impl AsRef<[u8]> for Mpi {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&BigUint> for Mpi {
    fn from(n: &BigUint) -> Self {
        Mpi::from_slice(&n.to_bytes_be())
    }
}

impl From<&Mpi> for BigUint {
    fn from(mpi: &Mpi) -> Self {
        BigUint::from_bytes_be(mpi.as_bytes())
    }
}

impl Serialize for Mpi {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.bits())?;
        writer.write_all(&self.0)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.0.len()
    }
}
