//! Audit coverage verifier (C16): given a window and an optional role,
//! reports what fraction of the cloud's own `AssumeRole`/session-
//! credential events carry a Sentinel fingerprint as their
//! `SourceIdentity`.

use chrono::{DateTime, Utc};
use sentinel_vending::{AuditEvent, AuditEventsService};

use crate::errors::Result;

/// `sentinel:<user>:<8-hex>` — matched loosely (no full
/// [`sentinel_core::identity::Fingerprint::parse`] call) since this
/// module only cares whether the cloud's own event shows a stamp, not
/// whether the stamp is a well-formed fingerprint.
fn looks_like_sentinel_stamp(source_identity: &str) -> bool {
    let Some(rest) = source_identity.strip_prefix("sentinel:") else {
        return false;
    };
    let Some((_, request_id)) = rest.rsplit_once(':') else {
        return false;
    };
    request_id.len() == 8 && request_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// A role-assumption event that failed the fingerprint check, kept as a
/// sample for an operator investigating a low pass rate.
#[derive(Debug, Clone, PartialEq)]
pub struct UnstampedSample {
    pub event_time: DateTime<Utc>,
    pub role_arn: String,
    pub source_identity: Option<String>,
}

/// Coverage statistics for a window of audit events.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub total: u64,
    pub sentinel_stamped: u64,
    pub unstamped: u64,
    pub pass_rate: f64,
    /// Up to [`SAMPLE_LIMIT`] unstamped events, for an operator to start
    /// an investigation from.
    pub sample_failures: Vec<UnstampedSample>,
}

/// Maximum number of unstamped samples retained in a [`CoverageReport`].
pub const SAMPLE_LIMIT: usize = 10;

/// Pure pass-rate computation: `total == 0` is trivially `1.0` (nothing
/// to fail), and `stamped` is clamped to `total` so a caller that
/// mis-counts can't produce a rate above `1.0`.
pub fn pass_rate(total: u64, stamped: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (stamped.min(total) as f64) / (total as f64)
}

/// Classify `events` into a [`CoverageReport`], computing `pass_rate`
/// with the pure [`pass_rate`] function.
pub fn classify(events: &[AuditEvent]) -> CoverageReport {
    let total = events.len() as u64;
    let mut sample_failures = Vec::new();
    let mut stamped = 0u64;

    for event in events {
        let is_stamped = event.source_identity.as_deref().is_some_and(looks_like_sentinel_stamp);
        if is_stamped {
            stamped += 1;
        } else if sample_failures.len() < SAMPLE_LIMIT {
            sample_failures.push(UnstampedSample {
                event_time: event.event_time,
                role_arn: event.role_arn.clone(),
                source_identity: event.source_identity.clone(),
            });
        }
    }

    CoverageReport {
        total,
        sentinel_stamped: stamped,
        unstamped: total - stamped,
        pass_rate: pass_rate(total, stamped),
        sample_failures,
    }
}

/// Query `service` for events against `role_arn` (or every role, if
/// `None`) in `[start, end]` and classify the result.
pub async fn verify(
    service: &dyn AuditEventsService,
    role_arn: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<CoverageReport> {
    let events = service.query(start, end, role_arn).await?;
    Ok(classify(&events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn ts() -> DateTime<Utc> {
        "2026-01-15T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn pass_rate_of_zero_events_is_trivially_complete() {
        assert_eq!(pass_rate(0, 0), 1.0);
    }

    #[test]
    fn pass_rate_clamps_stamped_above_total() {
        assert_eq!(pass_rate(5, 10), 1.0);
    }

    #[test]
    fn classify_separates_stamped_from_unstamped() {
        let events = vec![
            AuditEvent {
                event_time: ts(),
                role_arn: "arn:aws:iam::111111111111:role/dev".to_string(),
                source_identity: Some("sentinel:alice:deadbeef".to_string()),
            },
            AuditEvent {
                event_time: ts(),
                role_arn: "arn:aws:iam::111111111111:role/dev".to_string(),
                source_identity: None,
            },
            AuditEvent {
                event_time: ts(),
                role_arn: "arn:aws:iam::111111111111:role/dev".to_string(),
                source_identity: Some("not-a-fingerprint".to_string()),
            },
        ];
        let report = classify(&events);
        assert_eq!(report.total, 3);
        assert_eq!(report.sentinel_stamped, 1);
        assert_eq!(report.unstamped, 2);
        assert_eq!(report.sample_failures.len(), 2);
        assert!((report.pass_rate - (1.0 / 3.0)).abs() < 1e-9);
    }

    struct StubAuditEvents(Vec<AuditEvent>);

    #[async_trait]
    impl AuditEventsService for StubAuditEvents {
        async fn query(&self, _start: DateTime<Utc>, _end: DateTime<Utc>, _role_arn: Option<&str>) -> sentinel_vending::Result<Vec<AuditEvent>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn verify_queries_the_service_and_classifies() {
        let service = StubAuditEvents(vec![AuditEvent {
            event_time: ts(),
            role_arn: "arn:aws:iam::111111111111:role/dev".to_string(),
            source_identity: Some("sentinel:alice:deadbeef".to_string()),
        }]);
        let report = verify(&service, Some("arn:aws:iam::111111111111:role/dev"), ts(), ts()).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.pass_rate, 1.0);
    }
}
