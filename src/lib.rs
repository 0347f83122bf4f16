//! # pgp-entity
//!
//! An OpenPGP (v4) entity model together with a streaming pipeline for
//! signing and encrypting messages.
//!
//! - [`composed::Entity`] holds a primary key with its identities, subkeys and
//!   revocations, and picks the right key for signing or encrypting at a given
//!   point in time.
//! - [`composed::read_key_ring`] parses transferable keys from a packet stream.
//! - [`composed::message`] produces signed and encrypted messages as a chain of
//!   [`sink::Sink`]s, and reads them back with
//!   [`read_message`](composed::message::read_message).
//!
//! Every time dependent operation takes a [`Config`], which carries the
//! evaluation instant along with the algorithm choices.
//!
//! ```no_run
//! use std::io::Write;
//!
//! use chrono::Utc;
//! use pgp_entity::composed::message::{encrypt, FileHints};
//! use pgp_entity::composed::EntityBuilder;
//! use pgp_entity::Config;
//!
//! # fn main() -> pgp_entity::errors::Result<()> {
//! let mut rng = rand::thread_rng();
//! let alice = EntityBuilder::default()
//!     .primary_user_id("Alice <alice@example.org>")
//!     .created_at(Utc::now())
//!     .generate(&mut rng)?;
//!
//! let config = Config::new(Utc::now());
//! let mut out = Vec::new();
//! let mut w = encrypt(&mut rng, &mut out, &[&alice], Some(&alice), &FileHints::default(), &config)?;
//! w.write_all(b"hello")?;
//! w.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::style, clippy::perf, clippy::complexity)]

#[macro_use]
pub mod errors;

pub mod composed;
pub mod config;
pub mod crypto;
pub mod normalize_lines;
pub mod packet;
pub mod parsing;
pub mod ser;
pub mod sink;
pub mod types;

pub use self::composed::{
    read_entity, read_key_ring, Entity, EntityBuilder, EntityList, Identity, Key, KeyRing, Subkey,
};
pub use self::config::{Config, ConfigBuilder, KeyType};
pub use self::errors::{Error, Result};
pub use self::sink::{BoxSink, Sink};
