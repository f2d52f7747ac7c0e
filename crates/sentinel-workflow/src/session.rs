//! Session lifecycle (C6): server-mode sessions tracked so a
//! revocation is observable on the very next credential request.

use crate::errors::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_core::identity::new_request_id;
use sentinel_store::{Entity, EntityStore, Indexed, StateMachineEntity};
use serde::{Deserialize, Serialize};

/// Default soft session duration cap.
pub const DEFAULT_DURATION: ChronoDuration = ChronoDuration::hours(1);
/// Hard cap no session may exceed regardless of requested duration.
pub const HARD_DURATION_CAP: ChronoDuration = ChronoDuration::hours(4);

/// Lifecycle state of a [`ServerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Revoked,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }
}

/// A server-mode record tying a caller and profile to a server instance,
/// touched on each vend and revocable by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSession {
    pub id: String,
    pub user: String,
    pub profile: String,
    pub server_instance_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub request_count: u64,
    pub expires_at: DateTime<Utc>,
    pub revoked_by: Option<String>,
    pub revoked_reason: Option<String>,
}

impl Entity for ServerSession {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.last_access_at
    }
}

impl Indexed for ServerSession {
    fn index_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("user", self.user.clone()),
            ("status", format!("{:?}", self.status).to_lowercase()),
            ("profile", self.profile.clone()),
            ("server_instance", self.server_instance_id.clone()),
        ]
    }
}

impl StateMachineEntity for ServerSession {
    fn can_transition_to(&self, next: &Self) -> bool {
        if self.status.is_terminal() {
            // Touch writes don't change status; allow same-status
            // updates (counter increments) but never a resurrection.
            return self.status == next.status;
        }
        matches!(
            (self.status, next.status),
            (SessionStatus::Active, SessionStatus::Active)
                | (SessionStatus::Active, SessionStatus::Revoked)
                | (SessionStatus::Active, SessionStatus::Expired)
        )
    }
}

/// Create a new active session for `(user, profile)` on a freshly
/// minted server instance. `duration` is clamped to
/// `[0, HARD_DURATION_CAP]`, defaulting to [`DEFAULT_DURATION`] when
/// zero.
pub fn new_session(user: &str, profile: &str, duration: Option<ChronoDuration>, now: DateTime<Utc>) -> ServerSession {
    let duration = duration
        .filter(|d| *d > ChronoDuration::zero())
        .unwrap_or(DEFAULT_DURATION)
        .min(HARD_DURATION_CAP);

    // The entity id *is* the server instance id: the pipeline's revocation
    // check and touch path both look a session up by `server_instance_id`
    // via `EntityStore::get`, which keys on `Entity::id()`. Minting these
    // independently would make every lookup miss.
    let server_instance_id = new_request_id();
    ServerSession {
        id: server_instance_id.clone(),
        user: user.to_string(),
        profile: profile.to_string(),
        server_instance_id,
        status: SessionStatus::Active,
        created_at: now,
        last_access_at: now,
        request_count: 0,
        expires_at: now + duration,
        revoked_by: None,
        revoked_reason: None,
    }
}

/// Record one more credential vend against `session`. Callers treat
/// failures to persist a touch as fire-and-forget (Design Notes §9) —
/// this function only computes the next value; persisting it and
/// ignoring the store error is the caller's responsibility.
pub fn touch(session: &ServerSession, now: DateTime<Utc>) -> ServerSession {
    let mut next = session.clone();
    next.last_access_at = now;
    next.request_count += 1;
    next
}

/// Revoke an active session, recording who revoked it and why. Guarded
/// by the state machine: revoking an already-revoked or expired session
/// is an error, not a silent no-op.
pub fn revoke(session: &ServerSession, revoked_by: &str, reason: &str, now: DateTime<Utc>) -> Result<ServerSession> {
    if session.status != SessionStatus::Active {
        return Err(crate::errors::WorkflowError::InvalidState {
            message: format!("session {} is not active", session.id),
        });
    }
    let mut next = session.clone();
    next.status = SessionStatus::Revoked;
    next.revoked_by = Some(revoked_by.to_string());
    next.revoked_reason = Some(reason.to_string());
    next.last_access_at = now;
    Ok(next)
}

/// Check whether `session_id` is currently revoked, per the spec's
/// asymmetric fail behavior: a store failure **fails open** (logs a
/// warning, returns `false` — serve credentials), while an actually
/// revoked session **fails closed** (`true` — deny). Availability beats
/// strict revocation; strict revocation beats convenience.
pub async fn is_revoked<S>(store: &S, session_id: &str) -> bool
where
    S: EntityStore<ServerSession>,
{
    match store.get(session_id).await {
        Ok(session) => session.status == SessionStatus::Revoked,
        Err(err) if err.is_not_found() => false,
        Err(err) => {
            tracing::warn!(%session_id, %err, "session store unavailable during revocation check; failing open");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_store::InMemoryStore;

    fn now() -> DateTime<Utc> {
        "2026-01-15T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn duration_is_capped_at_hard_limit() {
        let session = new_session("alice", "prod", Some(ChronoDuration::hours(10)), now());
        assert_eq!(session.expires_at - session.created_at, HARD_DURATION_CAP);
    }

    #[test]
    fn touch_increments_counter_and_timestamp() {
        let session = new_session("alice", "prod", None, now());
        let touched = touch(&session, now() + ChronoDuration::minutes(1));
        assert_eq!(touched.request_count, 1);
        assert!(touched.last_access_at > session.last_access_at);
    }

    #[test]
    fn revoke_rejects_already_revoked_session() {
        let mut session = new_session("alice", "prod", None, now());
        session.status = SessionStatus::Revoked;
        let err = revoke(&session, "operator", "compromised", now()).unwrap_err();
        assert_eq!(err.category(), "invalid_state");
    }

    #[tokio::test]
    async fn is_revoked_fails_open_when_session_missing() {
        let store = InMemoryStore::<ServerSession>::new();
        assert!(!is_revoked(&store, "missing-session").await);
    }

    #[tokio::test]
    async fn is_revoked_fails_closed_on_revoked_session() {
        let store = InMemoryStore::<ServerSession>::new();
        let session = new_session("alice", "prod", None, now());
        let id = session.id.clone();
        store.create(session.clone()).await.unwrap();
        let revoked = revoke(&session, "operator", "compromised", now()).unwrap();
        store.update(session.last_access_at, revoked).await.unwrap();
        assert!(is_revoked(&store, &id).await);
    }
}
