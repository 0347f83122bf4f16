use num_enum::{FromPrimitive, IntoPrimitive};

/// Available compression algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-compression-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    #[display("Uncompressed")]
    Uncompressed = 0,
    #[display("ZIP")]
    ZIP = 1,
    #[display("ZLIB")]
    ZLIB = 2,
    #[display("BZip2")]
    BZip2 = 3,

    #[num_enum(catch_all)]
    #[display("Other({_0})")]
    Other(u8),
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::Uncompressed
    }
}
