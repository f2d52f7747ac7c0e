//! Webhook notifier (C8): POSTs the event as JSON with exponential
//! backoff on 5xx/network errors. 4xx responses are never retried.
//! Cancellation aborts an in-progress backoff sleep rather than letting
//! it run to completion.

use crate::errors::{NotifyError, Result};
use crate::event::NotifyEvent;
use crate::notifier::Notifier;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// A minimal cooperative-cancellation signal: a `watch` channel whose
/// value flips to `true` when the caller wants in-flight retries
/// abandoned. Cloning shares the same signal.
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// The sending half of a [`CancellationToken`] pair.
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Signal cancellation to every cloned [`CancellationToken`].
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    /// Build a fresh, not-yet-cancelled token and its cancelling handle.
    pub fn new() -> (CancellationHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancellationHandle { tx }, Self { rx })
    }

    /// A token that is never cancelled — used where no caller-driven
    /// cancellation is wired up (e.g. best-effort background retries).
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration`, returning early if cancellation fires first.
    /// Returns `true` if the sleep completed; `false` if cancelled.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = rx.wait_for(|cancelled| *cancelled) => false,
        }
    }
}

/// POSTs [`NotifyEvent`] JSON to a fixed URL, retrying 5xx/network
/// failures with `base_delay * 2^attempt` backoff up to `max_attempts`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
    base_delay: Duration,
    cancellation: CancellationToken,
}

impl WebhookNotifier {
    /// Build a webhook notifier with no caller-driven cancellation wired
    /// in (retries still respect `max_attempts`).
    pub fn new(client: reqwest::Client, url: impl Into<String>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            max_attempts,
            base_delay,
            cancellation: CancellationToken::never(),
        }
    }

    /// Build a webhook notifier whose retry backoff aborts when
    /// `cancellation` fires.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotifyEvent) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 0..self.max_attempts {
            if self.cancellation.is_cancelled() {
                return Err(NotifyError::transport("cancelled before delivery"));
            }

            let result = self.client.post(&self.url).json(event).send().await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) if response.status().is_client_error() => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(NotifyError::Rejected { status, body });
                }
                Ok(response) => {
                    last_error = format!("server returned {}", response.status());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.base_delay * 2u32.pow(attempt);
                if !self.cancellation.sleep_or_cancel(delay).await {
                    return Err(NotifyError::transport("cancelled during backoff"));
                }
            }
        }

        Err(NotifyError::RetryExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellation_short_circuits_before_first_attempt() {
        let (handle, token) = CancellationToken::new();
        handle.cancel();
        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/webhook",
            3,
            Duration::from_millis(1),
        )
        .with_cancellation(token);
        let event = NotifyEvent::new("approval.approved", "req-1", "bob", chrono::Utc::now());
        let err = notifier.notify(&event).await.unwrap_err();
        assert_eq!(err.category(), "transport");
    }

    #[tokio::test]
    async fn exhausts_retries_against_unreachable_host() {
        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/webhook",
            2,
            Duration::from_millis(1),
        );
        let event = NotifyEvent::new("approval.approved", "req-1", "bob", chrono::Utc::now());
        let err = notifier.notify(&event).await.unwrap_err();
        assert_eq!(err.category(), "retry_exhausted");
    }
}
