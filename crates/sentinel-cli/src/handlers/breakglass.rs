//! Break-glass subcommands (C5): invoke, close, list.

use chrono::{Duration as ChronoDuration, Utc};
use sentinel_audit::{BreakGlassEntry, Logger};
use sentinel_workflow::breakglass::{self, RateLimitConfig, ReasonCode};

use crate::app::{breakglass_counters, App};

fn parse_reason(code: &str) -> Option<ReasonCode> {
    match code {
        "incident" => Some(ReasonCode::Incident),
        "maintenance" => Some(ReasonCode::Maintenance),
        "security" => Some(ReasonCode::Security),
        "recovery" => Some(ReasonCode::Recovery),
        "other" => Some(ReasonCode::Other),
        _ => None,
    }
}

/// `sentinel breakglass invoke --invoker <u> --profile <p> --reason <code> --duration-mins <n> --justification <j>`
pub async fn invoke(app: &App, invoker: String, profile: String, reason: String, duration_mins: i64, justification: String) -> i32 {
    let Some(reason_code) = parse_reason(&reason) else {
        eprintln!("ERROR: unknown reason code '{reason}' (expected incident|maintenance|security|recovery|other)");
        return 1;
    };

    let now = Utc::now();
    let settings = &app.config.breakglass_rate_limit;
    let window = ChronoDuration::seconds(settings.window_secs as i64);
    let counters = match breakglass_counters(app.breakglass_store.as_ref(), &invoker, &profile, window, now).await {
        Ok(counters) => counters,
        Err(err) => {
            eprintln!("ERROR: failed to compute rate-limit counters: {err}");
            return 1;
        }
    };

    let rate_limit_config = RateLimitConfig {
        cooldown: ChronoDuration::seconds(settings.cooldown_secs),
        user_quota: settings.user_quota,
        profile_quota: settings.profile_quota,
        escalation_warning_threshold: settings.escalation_warning_threshold,
    };
    if let Err(err) = breakglass::check_rate_limit(&rate_limit_config, &counters, now) {
        eprintln!("ERROR: {err}");
        return 1;
    }

    match breakglass::find_active(app.breakglass_store.as_ref(), &invoker, &profile, now).await {
        Ok(Some(existing)) => {
            eprintln!("ERROR: an active break-glass event ({}) already exists for {invoker}/{profile}", existing.id);
            return 1;
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    }

    let created = match breakglass::invoke(&invoker, &profile, reason_code, &justification, ChronoDuration::minutes(duration_mins), now) {
        Ok(event) => event,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    if let Err(err) = app.breakglass_store.create(created.clone()).await {
        eprintln!("ERROR: failed to persist break-glass event: {err}");
        return 1;
    }

    let entry = BreakGlassEntry::new(
        now,
        "invoked",
        created.id.clone(),
        created.invoker.clone(),
        created.profile.clone(),
        reason,
        "active",
        None,
    );
    if let Err(err) = app.logger.log_breakglass(entry).await {
        tracing::error!(%err, "failed to write break-glass invocation audit entry");
    }

    println!("invoked break-glass event {}", created.id);
    0
}

/// `sentinel breakglass close --id <id> --by <operator> --reason <r>`
pub async fn close(app: &App, id: String, closed_by: String, reason: String) -> i32 {
    let current = match app.breakglass_store.get(&id).await {
        Ok(event) => event,
        Err(err) => {
            eprintln!("ERROR: {}", sanitize_store_error(&err));
            return 1;
        }
    };

    let now = Utc::now();
    let next = match breakglass::close(&current, &closed_by, &reason, now) {
        Ok(next) => next,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    if let Err(err) = app.breakglass_store.update(current.updated_at, next.clone()).await {
        eprintln!("ERROR: failed to persist break-glass closure: {err}");
        return 1;
    }

    let entry = BreakGlassEntry::new(
        now,
        "closed",
        next.id.clone(),
        next.invoker.clone(),
        next.profile.clone(),
        format!("{:?}", next.reason_code).to_lowercase(),
        "closed",
        Some(closed_by),
    );
    if let Err(err) = app.logger.log_breakglass(entry).await {
        tracing::error!(%err, "failed to write break-glass closure audit entry");
    }

    println!("closed break-glass event {id}");
    0
}

/// `sentinel breakglass list --invoker <u>`
pub async fn list(app: &App, invoker: String) -> i32 {
    match app.breakglass_store.list_by("invoker", &invoker, 50).await {
        Ok(events) => {
            for event in events {
                println!("{}\t{}\t{:?}\texpires={}", event.id, event.profile, event.status, event.expires_at);
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
        "no matching break-glass event".to_string()
    } else {
        "internal error accessing break-glass store".to_string()
    }
}
