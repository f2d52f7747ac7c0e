//! Shared id generation for workflow entities (approval requests,
//! break-glass events, sessions all use a 16-lowercase-hex-char id per
//! `spec.md` §3).

use rand::RngCore;

/// Generate a 16-lowercase-hex-character id from a CSPRNG.
pub fn new_entity_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
