//! The [`Logger`] capability trait and its plain (unsigned) JSONL
//! implementation.

use crate::entries::{ApprovalEntry, BreakGlassEntry, DecisionEntry};
use crate::errors::{AuditError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

/// Append-only sink for the three audit entry kinds Sentinel emits.
/// Implementors must preserve write order but need not be append-atomic
/// across process restarts (the embedded log file is append-mode, not
/// transactional).
#[async_trait]
pub trait Logger: Send + Sync {
    async fn log_decision(&self, entry: DecisionEntry) -> Result<()>;
    async fn log_approval(&self, entry: ApprovalEntry) -> Result<()>;
    async fn log_breakglass(&self, entry: BreakGlassEntry) -> Result<()>;
}

/// Anything a [`JsonlLogger`] can append newline-delimited JSON to.
/// Implemented for any `std::io::Write`; tests typically hand it an
/// in-memory `Vec<u8>`, production code a `std::fs::File` opened in
/// append mode.
pub trait LineSink: Send {
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;
}

impl<W: Write + Send> LineSink for W {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self, "{line}")?;
        self.flush()
    }
}

/// Writes each entry as one raw (unsigned) JSON line. The baseline audit
/// sink; wrap it in [`crate::signed::SignedLogger`] to add a tamper-evident
/// envelope.
pub struct JsonlLogger<W: LineSink> {
    pub(crate) sink: Mutex<W>,
}

impl<W: LineSink> JsonlLogger<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub(crate) fn write_entry(&self, entry: &impl Serialize) -> Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|err| AuditError::write_failed(format!("serialize: {err}")))?;
        self.sink
            .lock()
            .write_line(&line)
            .map_err(|err| AuditError::write_failed(err.to_string()))
    }
}

#[async_trait]
impl<W: LineSink> Logger for JsonlLogger<W> {
    async fn log_decision(&self, entry: DecisionEntry) -> Result<()> {
        self.write_entry(&entry)
    }

    async fn log_approval(&self, entry: ApprovalEntry) -> Result<()> {
        self.write_entry(&entry)
    }

    async fn log_breakglass(&self, entry: BreakGlassEntry) -> Result<()> {
        self.write_entry(&entry)
    }
}
