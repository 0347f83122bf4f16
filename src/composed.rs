//! OpenPGP objects that are composed of multiple packets: keys ([`Entity`])
//! and messages.
//!
//! See <https://www.rfc-editor.org/rfc/rfc9580#name-packet-sequence-composition>
//!
//! An [`Entity`] is read from a packet stream with [`read_entity`] or
//! [`read_key_ring`], or generated with [`EntityBuilder`]. Its keys are picked
//! for an operation with [`Entity::encryption_key`] and
//! [`Entity::signing_key`], always evaluated at an explicit instant.
//!
//! Messages are produced by the streaming writers in [`message`].

mod certify;
mod entity;
mod generate;
mod key_ring;
pub mod message;
mod parser;
mod resolve;
mod revocation;
mod ser;

pub use self::entity::{Entity, Identity, Subkey};
pub use self::generate::{EntityBuilder, EntityParams};
pub use self::key_ring::{read_key_ring, EntityList, KeyRing};
pub use self::parser::read_entity;
pub use self::resolve::Key;
pub use self::revocation::is_revoked;
