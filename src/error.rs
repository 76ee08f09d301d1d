//! Typed failures that callers are expected to inspect.
//!
//! Public functions return `anyhow::Result`; these types travel inside the
//! `anyhow::Error` and are recovered with `err.is::<T>()` /
//! `err.downcast_ref::<T>()` at the few places that branch on failure kind.

use crate::model::Collection;

/// The application secret was missing or the KDF itself failed.
///
/// Fatal: encryption cannot proceed, and callers must never fall back to
/// persisting plaintext.
#[derive(Debug, thiserror::Error)]
#[error("key derivation failed: {reason}")]
pub struct KeyDerivationFailed {
    pub reason: String,
}

/// A stored ciphertext could not be decrypted (wrong key, corruption,
/// tampering). The affected record is skipped and reported, never returned
/// as garbage or silently treated as empty.
#[derive(Debug, thiserror::Error)]
#[error("decryption failed for {context}")]
pub struct DecryptionFailed {
    pub context: String,
}

/// The local sqlite store could not complete an operation. No partial
/// write survives; the operation aborts.
#[derive(Debug, thiserror::Error)]
#[error("local store unavailable: {0}")]
pub struct LocalStoreUnavailable(#[from] pub rusqlite::Error);

/// Transport-level remote failure. Recoverable: the record stays `pending`
/// and is retried on the next connectivity event.
#[derive(Debug, thiserror::Error)]
#[error("remote unavailable: {reason}")]
pub struct RemoteUnavailable {
    pub reason: String,
}

/// The remote store answered but refused the operation. Not retried
/// blindly; surfaced to the caller.
#[derive(Debug, thiserror::Error)]
#[error("remote rejected {collection:?}/{id}: {reason}")]
pub struct RemoteRejected {
    pub collection: Collection,
    pub id: String,
    pub reason: String,
}

/// The bounded retry loop ran out of attempts (or connectivity dropped
/// mid-retry). The record stays `pending` for the next online transition.
#[derive(Debug, thiserror::Error)]
#[error("remote retry exhausted after {attempts} attempt(s)")]
pub struct RemoteRetryExhausted {
    pub attempts: u32,
}
