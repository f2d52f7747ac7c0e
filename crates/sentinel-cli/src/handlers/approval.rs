//! Approval-workflow subcommands (C4): request, approve, deny, list.

use chrono::{Duration as ChronoDuration, Utc};
use sentinel_audit::{ApprovalEntry, Logger};
use sentinel_workflow::approval::{self, ApprovalStatus};

use crate::app::App;

/// `sentinel approval request --requester <u> --profile <p> --duration-mins <n> --justification <j>`
pub async fn request(app: &App, requester: String, profile: String, duration_mins: i64, justification: String) -> i32 {
    let now = Utc::now();
    let created = match approval::create_request(&requester, &profile, ChronoDuration::minutes(duration_mins), &justification, now) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    if let Err(err) = app.approval_store.create(created.clone()).await {
        eprintln!("ERROR: failed to persist approval request: {err}");
        return 1;
    }

    let entry = ApprovalEntry::new(now, "created", created.id.clone(), created.requester.clone(), created.profile.clone(), "pending", None);
    if let Err(err) = app.logger.log_approval(entry).await {
        tracing::error!(%err, "failed to write approval-request audit entry");
    }

    println!("created approval request {}", created.id);
    0
}

/// `sentinel approval decide --id <id> --approver <a> --approve|--deny [--comment <c>]`
pub async fn decide(app: &App, id: String, approver: String, approve: bool, comment: Option<String>) -> i32 {
    let current = match app.approval_store.get(&id).await {
        Ok(request) => request,
        Err(err) => {
            eprintln!("ERROR: {}", sanitize_store_error(&err));
            return 1;
        }
    };

    let now = Utc::now();
    // Operator-level approver restriction is out of scope for this
    // front door; the matching ApprovalPolicy rule's approver list (if
    // any) is enforced upstream where the policy is loaded.
    let next = match approval::decide(&current, &[], &approver, approve, comment, now) {
        Ok(next) => next,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    if let Err(err) = app.approval_store.update(current.updated_at, next.clone()).await {
        eprintln!("ERROR: failed to persist approval decision: {err}");
        return 1;
    }

    let status = if next.status == ApprovalStatus::Approved { "approved" } else { "denied" };
    let entry = ApprovalEntry::new(now, status, next.id.clone(), next.requester.clone(), next.profile.clone(), status, Some(approver));
    if let Err(err) = app.logger.log_approval(entry).await {
        tracing::error!(%err, "failed to write approval-decision audit entry");
    }

    println!("request {id} {status}");
    0
}

/// `sentinel approval list --requester <u>`
pub async fn list(app: &App, requester: String) -> i32 {
    match app.approval_store.list_by("requester", &requester, 50).await {
        Ok(requests) => {
            for request in requests {
                println!("{}\t{}\t{:?}\texpires={}", request.id, request.profile, request.status, request.expires_at);
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
        "no matching approval request".to_string()
    } else {
        "internal error accessing approval store".to_string()
    }
}
