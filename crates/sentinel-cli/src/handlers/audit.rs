//! Audit log subcommands: tamper verification (C7) and cloud-side
//! fingerprint coverage (C16).

use chrono::{DateTime, Utc};
use sentinel_crypto::hmac_sign::HmacSigner;

use crate::app::{role_arn_for, App, FileAuditEvents};

/// `sentinel audit verify [--log-path <path>]`
pub async fn verify(app: &App, log_path: Option<std::path::PathBuf>) -> i32 {
    let path = log_path.unwrap_or_else(|| app.config.audit_log_path.clone());
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("ERROR: failed to read audit log {}: {err}", path.display());
            return 1;
        }
    };

    let secret = match hex::decode(&app.config.audit_hmac_secret_hex) {
        Ok(secret) => secret,
        Err(err) => {
            eprintln!("ERROR: audit_hmac_secret_hex is not valid hex: {err}");
            return 1;
        }
    };
    let signer = match HmacSigner::new(secret) {
        Ok(signer) => signer,
        Err(err) => {
            eprintln!("ERROR: invalid audit HMAC secret: {err}");
            return 1;
        }
    };

    let report = sentinel_audit::verify_log(&text, &signer);
    println!("ok={} invalid_sig={} parse_errors={}", report.ok, report.invalid_sig, report.parse_errors);
    for line in &report.failing_lines {
        println!("  line {}: {:?}", line.line_number, line.verdict);
    }
    report.exit_code()
}

/// `sentinel audit coverage --events-path <path> [--profile <p> | --role-arn <arn>] --start <rfc3339> --end <rfc3339>`
pub async fn coverage(
    app: &App,
    events_path: std::path::PathBuf,
    profile: Option<String>,
    role_arn: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> i32 {
    let events = match FileAuditEvents::load(&events_path) {
        Ok(events) => events,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    let role_arn = role_arn.or_else(|| profile.and_then(|profile| role_arn_for(&app.config, &profile)));
    let report = match sentinel_analysis::coverage::verify(&events, role_arn.as_deref(), start, end).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    println!(
        "total={} stamped={} unstamped={} pass_rate={:.3}",
        report.total, report.sentinel_stamped, report.unstamped, report.pass_rate
    );
    for sample in &report.sample_failures {
        println!("  unstamped: {} {} {:?}", sample.event_time, sample.role_arn, sample.source_identity);
    }
    0
}
