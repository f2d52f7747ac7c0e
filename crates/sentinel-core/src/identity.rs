//! Identity fingerprinting (C1).
//!
//! Every credential request is stamped with a fingerprint of the shape
//! `sentinel:<sanitized-user>:<request-id>` before it is handed to the
//! session-token service as `SourceIdentity`. This module is the single
//! source of truth for producing and parsing that string — both the local
//! credential-process path and the remote token-vending service call the
//! same functions, per the spec's "single source of truth" invariant.

use crate::errors::{CoreError, Result};
use rand_core::RngCore;

/// Maximum length of the sanitized user segment of a fingerprint.
pub const MAX_USER_LEN: usize = 40;

/// Fixed length of the hex request-id segment.
pub const REQUEST_ID_LEN: usize = 8;

/// Fallback request-id used only if the CSPRNG itself fails. Callers never
/// see this as an error — the spec requires `new_request_id` to never fail
/// at the interface.
const FALLBACK_REQUEST_ID: &str = "00000000";

/// Cloud ARN partitions Sentinel understands when extracting a username.
const ARN_PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-us-gov", "aws-iso", "aws-iso-b"];

/// Generate an 8-lowercase-hex-character request id from a CSPRNG.
///
/// Falls back to a constant on RNG failure, logging but never returning an
/// error — downstream code treats a request id as infallible to produce.
pub fn new_request_id() -> String {
    let mut bytes = [0u8; REQUEST_ID_LEN / 2];
    match rand::rngs::OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(err) => {
            tracing::error!(error = %err, "CSPRNG failure generating request id, using fallback");
            FALLBACK_REQUEST_ID.to_string()
        }
    }
}

/// Strip every character outside `[A-Za-z0-9]` and truncate to
/// [`MAX_USER_LEN`]. An empty result means the identity was unusable and
/// the caller must fail the request.
pub fn sanitize_user(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_USER_LEN)
        .collect()
}

/// Extract `(sanitized_user, raw_user)` from an IAM principal ARN.
///
/// Accepts any of the known cloud partitions. The raw user is whatever
/// followed the last `/` (or `:`) in the ARN's resource segment; the
/// sanitized user is `sanitize_user(raw_user)`.
pub fn extract_username(arn: &str) -> Result<(String, String)> {
    let rest = ARN_PARTITIONS.iter().find_map(|partition| {
        let prefix = format!("arn:{partition}:");
        arn.strip_prefix(&prefix)
    });

    let Some(rest) = rest else {
        return Err(CoreError::invalid(format!(
            "ARN does not match a known partition: {arn}"
        )));
    };

    // rest looks like "sts::123456789012:assumed-role/RoleName/session-name"
    // or "iam::123456789012:user/alice". The raw user is the final path
    // segment.
    let raw_user = rest
        .rsplit(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::invalid(format!("ARN has no resource segment: {arn}")))?;

    Ok((sanitize_user(raw_user), raw_user.to_string()))
}

/// An immutable `sentinel:<user>:<request-id>` source-identity fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    user: String,
    request_id: String,
}

impl Fingerprint {
    /// Compose a fingerprint from an already-sanitized user and a request
    /// id. Returns an error if either component is invalid, keeping the
    /// total length within the 64-character bound the spec requires.
    pub fn format(user: &str, request_id: &str) -> Result<Self> {
        if user.is_empty() || user.len() > MAX_USER_LEN || !user.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::invalid(format!(
                "user segment is not a sanitized identity: {user:?}"
            )));
        }
        if request_id.len() != REQUEST_ID_LEN
            || !request_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(CoreError::invalid(format!(
                "request id is not {REQUEST_ID_LEN} lowercase hex chars: {request_id:?}"
            )));
        }
        Ok(Self {
            user: user.to_string(),
            request_id: request_id.to_string(),
        })
    }

    /// Mint a fresh fingerprint for `user` using a newly generated request
    /// id.
    pub fn new_for_user(user: &str) -> Result<Self> {
        Self::format(user, &new_request_id())
    }

    /// Parse a fingerprint string back into `(user, request_id)`.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("sentinel:")
            .ok_or_else(|| CoreError::invalid("fingerprint missing 'sentinel:' prefix"))?;
        let (user, request_id) = rest
            .split_once(':')
            .ok_or_else(|| CoreError::invalid("fingerprint missing request-id segment"))?;
        Self::format(user, request_id)
    }

    /// The sanitized user segment.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The 8-hex-character request id segment.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sentinel:{}:{}", self.user, self.request_id)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_user_drops_non_alphanumeric_and_truncates() {
        assert_eq!(sanitize_user("alice.smith@example.com"), "alicesmithexamplecom");
        let long = "a".repeat(100);
        assert_eq!(sanitize_user(&long).len(), MAX_USER_LEN);
        assert_eq!(sanitize_user("!!!"), "");
    }

    #[test]
    fn extract_username_handles_known_partitions() {
        for partition in ARN_PARTITIONS {
            let arn = format!("arn:{partition}:sts::123456789012:assumed-role/Role/alice");
            let (sanitized, raw) = extract_username(&arn).unwrap();
            assert_eq!(raw, "alice");
            assert_eq!(sanitized, "alice");
        }
    }

    #[test]
    fn extract_username_rejects_unknown_partition() {
        assert!(extract_username("arn:gcp:iam::x:user/alice").is_err());
    }

    #[test]
    fn fingerprint_length_is_bounded() {
        let user = "a".repeat(MAX_USER_LEN);
        let fp = Fingerprint::format(&user, "deadbeef").unwrap();
        assert!(fp.to_string().len() <= 64);
    }

    #[test]
    fn fingerprint_rejects_uppercase_request_id() {
        assert!(Fingerprint::format("alice", "DEADBEEF").is_err());
    }

    proptest! {
        #[test]
        fn parse_format_round_trips(
            user in "[A-Za-z0-9]{1,40}",
            request_id in "[0-9a-f]{8}",
        ) {
            let fp = Fingerprint::format(&user, &request_id).unwrap();
            let parsed = Fingerprint::parse(&fp.to_string()).unwrap();
            prop_assert_eq!(parsed.user(), user.as_str());
            prop_assert_eq!(parsed.request_id(), request_id.as_str());
        }
    }
}
