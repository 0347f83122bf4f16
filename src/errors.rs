use std::num::TryFromIntError;

use ed25519_dalek::SignatureError;
use snafu::{Backtrace, Snafu};

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

pub use crate::parsing::{Error as ParsingError, RemainingError};

/// Error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Signals packet versions and algorithms we do not know how to interpret.
    #[snafu(display("Unsupported: {message}"))]
    Unsupported { message: String },
    /// The packet stream violates the structure of an OpenPGP key or message.
    #[snafu(display("Structural: {message}"))]
    Structural { message: String },
    /// The caller asked for something that can not be done with the given keys.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument { message: String },
    /// Recipients and signer share no usable algorithm.
    #[snafu(display("Algorithm negotiation failed: {message}"))]
    AlgorithmNegotiation { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
    #[snafu(transparent)]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(transparent)]
    PacketParsing { source: ParsingError },
    #[snafu(transparent)]
    SignatureError { source: SignatureError },
    #[snafu(transparent)]
    AesKw { source: aes_kw::Error },
    #[snafu(transparent)]
    Rsa { source: rsa::errors::Error },
    #[snafu(transparent)]
    TryFromInt { source: TryFromIntError },
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    #[snafu(display("Modification Detection Code error"))]
    MdcError,
    #[snafu(display("AEAD authentication failed"))]
    AeadError,
}

impl Error {
    /// Errors a key ring reader may skip past, continuing with the next key.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Unsupported { .. } | Error::Structural { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    pub fn is_negotiation_failure(&self) -> bool {
        matches!(self, Error::AlgorithmNegotiation { .. })
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::InvalidKeyLength
    }
}

impl From<aead::Error> for Error {
    fn from(_: aead::Error) -> Error {
        Error::AeadError
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::Message {
            message: err.to_string(),
        }
    }
}

#[macro_export]
macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! structural_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Structural { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Structural { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! invalid_argument_err {
    ($e:expr) => {
        return Err($crate::errors::Error::InvalidArgument { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::InvalidArgument { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            bail!($fmt, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`: {}"#, left_val, right_val,
                           format_args!($($arg)+))
                }
            }
        }
    });
}

#[macro_export]
macro_rules! err_opt {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return Some(Err(err)),
        }
    };
}
