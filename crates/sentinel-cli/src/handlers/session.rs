//! Operator session subcommands (C6): revoke, and a plain listing by
//! user for an operator deciding whether a revocation is warranted.

use chrono::Utc;
use sentinel_audit::{DecisionEntry, Logger};
use sentinel_workflow::session;

use crate::app::App;

/// `sentinel session revoke --session-id <id> --reason <r> --by <operator>`
pub async fn revoke(app: &App, session_id: String, operator: String, reason: String) -> i32 {
    let current = match app.session_store.get(&session_id).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("ERROR: {}", sanitize_store_error(&err));
            return 1;
        }
    };

    let now = Utc::now();
    let revoked = match session::revoke(&current, &operator, &reason, now) {
        Ok(revoked) => revoked,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    if let Err(err) = app.session_store.update(current.last_access_at, revoked).await {
        eprintln!("ERROR: {}", sanitize_store_error(&err));
        return 1;
    }

    let entry = DecisionEntry::deny(
        now,
        format!("revoke-{session_id}"),
        current.user.clone(),
        current.profile.clone(),
        "server",
        "operator-revoke",
        format!("session revoked by {operator}: {reason}"),
    );
    if let Err(err) = app.logger.log_decision(entry).await {
        tracing::error!(%err, "failed to write session-revocation audit entry");
    }

    println!("revoked session {session_id}");
    0
}

/// `sentinel session list --user <user>`
pub async fn list(app: &App, user: String) -> i32 {
    match app.session_store.list_by("user", &user, 50).await {
        Ok(sessions) => {
            for session in sessions {
                println!(
                    "{}\t{}\t{:?}\trequests={}\texpires={}",
                    session.id, session.profile, session.status, session.request_count, session.expires_at
                );
            }
            0
        }
        Err(err) => {
            eprintln!("ERROR: {}", sanitize_store_error(&err));
            1
        }
    }
}

fn sanitize_store_error(err: &sentinel_store::StoreError) -> String {
    if err.is_not_found() {
        "no matching session".to_string()
    } else {
        "internal error accessing session store".to_string()
    }
}
