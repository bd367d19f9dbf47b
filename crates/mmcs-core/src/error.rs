// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the MMCS notifier.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across the notifier workspace.
///
/// Fatal variants (`Config`, `SchemaInvalid`, `SecretNotFound` at startup)
/// stop the process; everything else is contained at the smallest meaningful
/// scope — per request, per batch, per webhook, per notification — so one
/// failure never halts an entire cycle.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Configuration errors (missing API key, invalid endpoint).
    #[error("configuration error: {0}")]
    Config(String),

    /// Subscriber store request failure; the current cycle is skipped.
    #[error("subscriber store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The store's shape does not match expectations (missing table or columns).
    #[error("store schema invalid: {0}")]
    SchemaInvalid(String),

    /// The aggregator landing page did not yield a signing secret.
    #[error("signing secret not found: {0}")]
    SecretNotFound(String),

    /// A mid-run attempt to re-obtain the signing secret failed.
    #[error("signing secret refresh failed: {0}")]
    SecretRefreshFailed(String),

    /// Internal sentinel: the secret was refreshed after a 403; the caller
    /// must rebuild the signature with the fresh secret and retry once.
    #[error("signing secret refreshed, retry needed")]
    HmacRefreshNeeded,

    /// 429 from the aggregator after the retry budget was exhausted.
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    /// Network-level failure talking to an upstream.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Non-retryable upstream response (4xx other than 403/429).
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Webhook delivery failure; other webhooks and the cycle continue.
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Subscriber rows that could not be salvaged.
    #[error("corrupt subscriber data: {0}")]
    DataCorrupt(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NotifierError {
    /// True for errors the signed-request pipeline may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotifierError::RateLimited { .. } | NotifierError::Transport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(
            NotifierError::RateLimited { retry_after: None }.is_retryable()
        );
        assert!(
            NotifierError::Transport {
                message: "connection reset".into(),
                source: None,
            }
            .is_retryable()
        );
        assert!(
            !NotifierError::Upstream {
                status: 400,
                body: "bad request".into(),
            }
            .is_retryable()
        );
        assert!(!NotifierError::HmacRefreshNeeded.is_retryable());
    }

    #[test]
    fn display_includes_status_and_body() {
        let err = NotifierError::Upstream {
            status: 418,
            body: "teapot".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("418"), "got: {msg}");
        assert!(msg.contains("teapot"), "got: {msg}");
    }
}
