use chrono::{DateTime, Utc};

use crate::packet::{RevocationCode, Signature};

/// Whether any of `revocations` applies at `now`.
///
/// A revocation for a compromised key applies at every point in time, even
/// before its own creation. Any other revocation applies while it is not
/// expired.
pub fn is_revoked(revocations: &[Signature], now: DateTime<Utc>) -> bool {
    revocations.iter().any(|revocation| {
        revocation.revocation_reason_code() == Some(RevocationCode::KeyCompromised)
            || !revocation.sig_expired(now)
    })
}
