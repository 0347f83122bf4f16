use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::composed::revocation::is_revoked;
use crate::packet::{PublicKey, SecretKey, Signature, UserId};
use crate::types::{Fingerprint, KeyId};

/// The components of an OpenPGP key: a primary public key, which must be a
/// signing key, one or more identities claimed by that key, and zero or more
/// subkeys, which may be encryption keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub primary_key: PublicKey,
    pub private_key: Option<SecretKey>,
    /// Indexed by [`Identity::name`].
    pub identities: BTreeMap<String, Identity>,
    /// Direct key revocations, verified against the primary key.
    pub revocations: Vec<Signature>,
    /// In the order they appeared in the key.
    pub subkeys: Vec<Subkey>,
}

/// An identity claimed by an [`Entity`], and the signatures made over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// By convention of the form `Full Name (comment) <email@example.com>`.
    pub name: String,
    pub user_id: UserId,
    /// The newest verified self-certification.
    pub self_signature: Option<Signature>,
    /// Verified self-issued certification revocations.
    pub revocations: Vec<Signature>,
    /// Every signature over this identity, including unverified third-party
    /// certifications. Never consulted for policy decisions.
    pub signatures: Vec<Signature>,
}

/// An additional key bound to an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subkey {
    pub public_key: PublicKey,
    pub private_key: Option<SecretKey>,
    /// The newest verified binding signature.
    pub sig: Signature,
    /// Verified subkey revocations.
    pub revocations: Vec<Signature>,
}

impl Entity {
    pub fn key_id(&self) -> KeyId {
        self.primary_key.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.primary_key.fingerprint()
    }

    /// The identity whose self-signature governs the primary key.
    ///
    /// Prefers identities with fewer revocations, then identities with a
    /// self-signature, then identities flagged as primary, then the newest
    /// self-signature. Only `None` for an entity without identities.
    pub fn primary_identity(&self) -> Option<&Identity> {
        let mut primary = None;
        for identity in self.identities.values() {
            if should_prefer_identity(primary, identity) {
                primary = Some(identity);
            }
        }
        primary
    }

    /// Whether a direct key revocation applies at `now`.
    ///
    /// Identity and subkey revocations are checked separately.
    pub fn revoked(&self, now: DateTime<Utc>) -> bool {
        is_revoked(&self.revocations, now)
    }

    /// Looks up a subkey by its key id.
    pub fn subkey(&self, id: KeyId) -> Option<&Subkey> {
        self.subkeys.iter().find(|subkey| subkey.key_id() == id)
    }

    /// The same entity without any secret key material.
    pub fn to_public(&self) -> Entity {
        Entity {
            private_key: None,
            subkeys: self
                .subkeys
                .iter()
                .map(|subkey| Subkey {
                    private_key: None,
                    ..subkey.clone()
                })
                .collect(),
            ..self.clone()
        }
    }
}

/// The ordered tie-break rules for [`Entity::primary_identity`]. A rule only
/// applies when all earlier rules were undecided.
fn should_prefer_identity(existing: Option<&Identity>, candidate: &Identity) -> bool {
    let Some(existing) = existing else {
        return true;
    };

    if existing.revocations.len() != candidate.revocations.len() {
        return existing.revocations.len() > candidate.revocations.len();
    }

    let Some(existing_sig) = &existing.self_signature else {
        return true;
    };
    let Some(candidate_sig) = &candidate.self_signature else {
        return false;
    };

    if existing_sig.is_primary() != candidate_sig.is_primary() {
        return candidate_sig.is_primary();
    }

    match (candidate_sig.created(), existing_sig.created()) {
        (Some(candidate), Some(existing)) => candidate > existing,
        (Some(_), None) => true,
        _ => false,
    }
}

impl Identity {
    pub fn new(user_id: UserId) -> Self {
        Identity {
            name: user_id.name(),
            user_id,
            self_signature: None,
            revocations: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Whether a self-issued revocation of this identity applies at `now`.
    pub fn revoked(&self, now: DateTime<Utc>) -> bool {
        is_revoked(&self.revocations, now)
    }
}

impl Subkey {
    pub fn key_id(&self) -> KeyId {
        self.public_key.key_id()
    }

    /// Whether a subkey revocation applies at `now`.
    pub fn revoked(&self, now: DateTime<Utc>) -> bool {
        is_revoked(&self.revocations, now)
    }
}
