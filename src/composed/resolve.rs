//! Picking the key of an [`Entity`] to use for an operation.

use chrono::{DateTime, Utc};

use crate::composed::entity::{Entity, Identity, Subkey};
use crate::composed::revocation::is_revoked;
use crate::packet::{PublicKey, SecretKey, Signature};
use crate::types::KeyId;

/// A specific public key of an [`Entity`]: either its primary key or one of
/// its subkeys.
#[derive(Debug, Clone, Copy)]
pub struct Key<'a> {
    pub entity: &'a Entity,
    pub public_key: &'a PublicKey,
    pub private_key: Option<&'a SecretKey>,
    /// The self-signature of the primary identity for the primary key, the
    /// binding signature for a subkey.
    pub self_signature: Option<&'a Signature>,
    pub revocations: &'a [Signature],
}

impl<'a> Key<'a> {
    pub(crate) fn primary(entity: &'a Entity, self_signature: Option<&'a Signature>) -> Self {
        Key {
            entity,
            public_key: &entity.primary_key,
            private_key: entity.private_key.as_ref(),
            self_signature,
            revocations: &entity.revocations,
        }
    }

    pub(crate) fn subkey(entity: &'a Entity, subkey: &'a Subkey) -> Self {
        Key {
            entity,
            public_key: &subkey.public_key,
            private_key: subkey.private_key.as_ref(),
            self_signature: Some(&subkey.sig),
            revocations: &subkey.revocations,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.public_key.key_id()
    }

    /// Whether the key itself has been revoked at `now`.
    ///
    /// Identity revocations are checked separately.
    pub fn revoked(&self, now: DateTime<Utc>) -> bool {
        is_revoked(self.revocations, now)
    }
}

/// What a subkey needs to be eligible for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    Encrypt,
    Sign,
}

impl Entity {
    /// The best key for encrypting a message to this entity at `now`.
    ///
    /// Picks the encryption subkey with the newest binding signature. Falls
    /// back to the primary key if its self-signature allows encryption, or
    /// carries no usage flags, and its algorithm can encrypt.
    pub fn encryption_key(&self, now: DateTime<Utc>) -> Option<Key<'_>> {
        let (_, self_sig) = self.usable_primary_identity(now)?;

        if let Some(subkey) = self.newest_subkey(now, Usage::Encrypt, KeyId::WILDCARD) {
            return Some(Key::subkey(self, subkey));
        }

        let allowed = !self_sig.has_key_flags() || self_sig.key_flags().encrypt_comms();
        if allowed && self.primary_key.can_encrypt() {
            return Some(Key::primary(self, Some(self_sig)));
        }

        None
    }

    /// The best key for signing with this entity at `now`.
    pub fn signing_key(&self, now: DateTime<Utc>) -> Option<Key<'_>> {
        self.signing_key_by_id(now, KeyId::WILDCARD)
    }

    /// The signing key with the given id, or the best one if `id` is the
    /// wildcard.
    ///
    /// Never falls back to a key with a different id.
    pub fn signing_key_by_id(&self, now: DateTime<Utc>, id: KeyId) -> Option<Key<'_>> {
        let (_, self_sig) = self.usable_primary_identity(now)?;

        if let Some(subkey) = self.newest_subkey(now, Usage::Sign, id) {
            return Some(Key::subkey(self, subkey));
        }

        let allowed = !self_sig.has_key_flags() || self_sig.key_flags().sign();
        if allowed && self.primary_key.can_sign() && id.matches(&self.primary_key.key_id()) {
            return Some(Key::primary(self, Some(self_sig)));
        }

        None
    }

    /// The primary identity and its self-signature, if the primary key is
    /// usable at all at `now`.
    fn usable_primary_identity(&self, now: DateTime<Utc>) -> Option<(&Identity, &Signature)> {
        let identity = self.primary_identity()?;
        let self_sig = identity.self_signature.as_ref()?;

        if self.primary_key.key_expired(self_sig, now)
            || self_sig.sig_expired(now)
            || self.revoked(now)
            || identity.revoked(now)
        {
            return None;
        }

        Some((identity, self_sig))
    }

    /// The eligible subkey with the newest binding; the first one seen wins
    /// ties.
    fn newest_subkey(&self, now: DateTime<Utc>, usage: Usage, id: KeyId) -> Option<&Subkey> {
        let mut candidate: Option<&Subkey> = None;

        for subkey in &self.subkeys {
            let sig = &subkey.sig;
            let flags = sig.key_flags();
            let capable = match usage {
                Usage::Encrypt => flags.encrypt_comms() && subkey.public_key.can_encrypt(),
                Usage::Sign => flags.sign() && subkey.public_key.can_sign(),
            };

            if sig.has_key_flags()
                && capable
                && !subkey.public_key.key_expired(sig, now)
                && !sig.sig_expired(now)
                && !subkey.revoked(now)
                && id.matches(&subkey.key_id())
            {
                let newer = match candidate {
                    None => true,
                    Some(current) => sig.created() > current.sig.created(),
                };
                if newer {
                    candidate = Some(subkey);
                }
            }
        }

        candidate
    }
}
