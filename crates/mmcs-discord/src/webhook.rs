// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook delivery with rate-limit handling.
//!
//! Batches to the same webhook are strictly sequential; parallelism across
//! webhooks is the caller's concern.

use std::time::Duration;

use chrono::Utc;
use mmcs_core::{Item, NotifierError, mask_webhook_url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::embed::{WebhookPayload, build_batches};

/// Timeout for one webhook POST.
const POST_TIMEOUT: Duration = Duration::from_secs(15);

/// Retry budget per batch on 429.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Pause between successful batches to the same webhook.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(300);

/// Fallback sleep when a 429 body carries no usable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// 429 response body from the webhook receiver. The body also carries a
/// `message` field; only the wait time matters here.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    /// Seconds to wait; may be fractional.
    #[serde(default)]
    retry_after: f64,
}

/// Posts batched item notifications to webhooks.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::Delivery {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }

    /// Delivers `items` for one saved search to one webhook, in batches of
    /// ten embeds. A batch that fails after retries aborts the remaining
    /// batches for this webhook; the caller logs and moves on.
    pub async fn deliver(
        &self,
        webhook_url: &str,
        search_term: &str,
        items: &[Item],
    ) -> Result<(), NotifierError> {
        let batches = build_batches(search_term, items, Utc::now());
        let batch_count = batches.len();

        for (i, batch) in batches.iter().enumerate() {
            self.post_batch(webhook_url, batch).await?;
            debug!(
                webhook = %mask_webhook_url(webhook_url),
                batch = i + 1,
                of = batch_count,
                "batch delivered"
            );
            if i + 1 < batch_count {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
        }

        Ok(())
    }

    /// Per-batch state machine: 200/204 succeed, 429 sleeps for the body's
    /// `retry_after` and retries, anything else fails the batch.
    async fn post_batch(
        &self,
        webhook_url: &str,
        payload: &WebhookPayload,
    ) -> Result<(), NotifierError> {
        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .client
                .post(webhook_url)
                .json(payload)
                .send()
                .await
                .map_err(|e| NotifierError::Delivery {
                    message: format!("webhook POST failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            match response.status().as_u16() {
                200 | 204 => return Ok(()),
                429 => {
                    let delay = response
                        .json::<RateLimitBody>()
                        .await
                        .ok()
                        .filter(|b| b.retry_after > 0.0)
                        .map(|b| Duration::from_secs_f64(b.retry_after))
                        .unwrap_or(DEFAULT_RETRY_AFTER);
                    if attempt < MAX_RATE_LIMIT_RETRIES {
                        warn!(
                            webhook = %mask_webhook_url(webhook_url),
                            attempt,
                            "webhook rate limited, retrying after {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(NotifierError::Delivery {
                        message: format!(
                            "webhook still rate limited after {MAX_RATE_LIMIT_RETRIES} retries"
                        ),
                        source: None,
                    });
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(NotifierError::Delivery {
                        message: format!("webhook returned {status}: {body}"),
                        source: None,
                    });
                }
            }
        }

        Err(NotifierError::Internal("retry budget exhausted".into()))
    }
}
