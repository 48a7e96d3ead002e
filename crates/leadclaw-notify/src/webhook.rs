//! Outbound webhook delivery with retry and exponential backoff.
//!
//! Delivery state machine: PENDING → (ATTEMPTING → {SUCCESS | RETRY})* →
//! {DELIVERED | EXHAUSTED}. Both terminal states produce exactly one
//! webhook-log row; `exitoso` carries the distinction. At-least-once with
//! bounded retries is the contract — there is no exactly-once guarantee.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use leadclaw_core::error::Result;

use crate::Dispatcher;

/// HTTP timeout for a single delivery attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often to retry and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff unit; the delay after attempt `n` is `base * 2^n`.
    pub base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base }
    }

    /// Delay before the attempt after `attempt` (1-based): 2·base after the
    /// first, 4·base after the second, and so on.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Wire payload for a lead event.
pub fn build_payload(event: &str, lead_id: &str, data: &Value) -> Value {
    json!({
        "evento": event,
        "lead_id": lead_id,
        "timestamp": Utc::now().to_rfc3339(),
        "datos": data,
    })
}

impl Dispatcher {
    /// Fire a lead event at the configured webhook endpoint.
    ///
    /// Returns `Ok(false)` without any HTTP traffic when webhooks are
    /// disabled or no base URL is configured.
    pub async fn send_webhook(&self, lead_id: &str, event: &str, data: &Value) -> Result<bool> {
        let config = self.db.webhook_config()?;
        if !config.enabled || config.base_url.trim().is_empty() {
            tracing::debug!(lead_id, event, "webhooks disabled or unconfigured");
            return Ok(false);
        }

        let payload = build_payload(event, lead_id, data);
        let policy = RetryPolicy::new(config.max_retries, self.retry_base);
        self.deliver_with_retries(lead_id, &config.base_url, &payload, policy)
            .await
    }

    /// POST `payload` to `url` until it lands or attempts run out, then write
    /// one log row for the whole sequence.
    ///
    /// Network errors and non-2xx responses are both retryable. Backoff
    /// sleeps race the shutdown token so a terminating process does not hang
    /// on `2 + 4 + ... + 2^n` seconds of pending retries.
    pub async fn deliver_with_retries(
        &self,
        lead_id: &str,
        url: &str,
        payload: &Value,
        policy: RetryPolicy,
    ) -> Result<bool> {
        let mut attempts = 0u32;
        let mut succeeded = false;
        let mut last_response: Option<Value> = None;
        let mut last_status: u16 = 0;

        while attempts < policy.max_attempts && !succeeded {
            attempts += 1;
            tracing::info!(lead_id, url, attempt = attempts, max = policy.max_attempts, "sending webhook");

            match self
                .http
                .post(url)
                .timeout(ATTEMPT_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => {
                    last_status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    last_response =
                        Some(serde_json::from_str(&text).unwrap_or(Value::String(text)));
                    succeeded = (200..300).contains(&last_status);
                    if succeeded {
                        tracing::info!(lead_id, status = last_status, "webhook delivered");
                    } else {
                        tracing::warn!(lead_id, status = last_status, attempt = attempts, "webhook rejected");
                    }
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16()).unwrap_or(0);
                    last_response = Some(Value::String(e.to_string()));
                    tracing::warn!(lead_id, attempt = attempts, "webhook attempt failed: {e}");
                }
            }

            if !succeeded && attempts < policy.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(policy.delay_after(attempts)) => {}
                    _ = self.shutdown.cancelled() => {
                        tracing::warn!(lead_id, "shutdown during webhook backoff, abandoning retries");
                        break;
                    }
                }
            }
        }

        self.db.insert_webhook_log(
            lead_id,
            url,
            payload,
            last_response.as_ref(),
            last_status,
            attempts.max(1),
            succeeded,
        )?;
        Ok(succeeded)
    }
}
