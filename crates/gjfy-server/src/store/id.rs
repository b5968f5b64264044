use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::model::SecretRecord;

/// Length of a derived id: 32 digest bytes in unpadded base64.
pub const DERIVED_ID_LEN: usize = 43;

/// Derive a URL-safe id from the full content of `record`.
///
/// Fields are fed to SHA-256 in a fixed order, strings length-prefixed, so
/// equal records always hash equal. The creation timestamp is part of the
/// input down to the nanosecond, which makes ids for the same secret created
/// at different instants distinct.
pub fn derive_id(record: &SecretRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update((record.secret.len() as u64).to_be_bytes());
    hasher.update(record.secret.as_bytes());
    hasher.update(record.max_clicks.to_be_bytes());
    hasher.update(record.clicks.to_be_bytes());
    hasher.update(record.date_added.timestamp().to_be_bytes());
    hasher.update(record.date_added.timestamp_subsec_nanos().to_be_bytes());
    hasher.update(record.valid_for.to_be_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
