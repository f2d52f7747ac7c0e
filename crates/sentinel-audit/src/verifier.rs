//! Offline verification of a signed audit log (C7 / spec.md §8 scenario
//! S6): re-sign every entry and flag any line whose signature no longer
//! matches, without trusting anything the file itself claims.

use crate::signed::SignedEnvelope;
use sentinel_crypto::hmac_sign::HmacSigner;
use serde::Serialize;

/// Outcome of verifying one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    Ok,
    InvalidSignature,
    ParseError(String),
}

/// Per-line detail, 1-indexed to match how an operator would `grep -n`
/// the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReport {
    pub line_number: usize,
    pub verdict: LineVerdict,
}

/// Aggregate verification result for a log file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub ok: usize,
    pub invalid_sig: usize,
    pub parse_errors: usize,
    #[serde(skip)]
    pub failing_lines: Vec<LineReport>,
}

impl VerifyReport {
    /// `0` if every line verified, `1` otherwise — the exit code
    /// contract a CLI verifier wraps around this.
    pub fn exit_code(&self) -> i32 {
        if self.invalid_sig == 0 && self.parse_errors == 0 {
            0
        } else {
            1
        }
    }
}

/// Re-sign every line of `log_text` against `signer` and tally the
/// result. Blank lines are skipped; everything else must parse as a
/// [`SignedEnvelope`] and verify.
pub fn verify_log(log_text: &str, signer: &HmacSigner) -> VerifyReport {
    let mut report = VerifyReport::default();

    for (idx, line) in log_text.lines().enumerate() {
        let line_number = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let envelope: SignedEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                report.parse_errors += 1;
                report.failing_lines.push(LineReport {
                    line_number,
                    verdict: LineVerdict::ParseError(err.to_string()),
                });
                continue;
            }
        };

        let entry_bytes = match serde_json::to_vec(&envelope.entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                report.parse_errors += 1;
                report.failing_lines.push(LineReport {
                    line_number,
                    verdict: LineVerdict::ParseError(err.to_string()),
                });
                continue;
            }
        };

        if signer.verify(&entry_bytes, &envelope.timestamp, &envelope.key_id, &envelope.signature) {
            report.ok += 1;
        } else {
            report.invalid_sig += 1;
            report.failing_lines.push(LineReport {
                line_number,
                verdict: LineVerdict::InvalidSignature,
            });
        }
    }

    report
}
