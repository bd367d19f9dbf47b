// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The subscriber store client.

use std::time::Duration;

use mmcs_core::types::is_valid_webhook_url;
use mmcs_core::{Notification, NotifierError, Subscriber, mask_webhook_url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Request timeout for store queries.
const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// The table holding subscriber rows.
const TABLE: &str = "unlocked_users";

/// Columns the notifier reads.
const COLUMNS: &str = "auth_user_id,email,username,discord_webhook_url,discord_notifications,\
                       notifications_subscription_active,notifications_subscription_expires_at";

/// One raw row of the `unlocked_users` table.
#[derive(Debug, Deserialize)]
struct SubscriberRow {
    #[serde(default)]
    auth_user_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    discord_webhook_url: Option<String>,
    /// Either a JSON array or a string containing a JSON array.
    #[serde(default)]
    discord_notifications: Option<Value>,
    #[serde(default)]
    notifications_subscription_active: bool,
    #[serde(default)]
    notifications_subscription_expires_at: Option<String>,
}

/// Read-only client for the subscriber store's REST endpoint.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(STORE_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::Store {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn get(&self, path_and_query: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path_and_query}", self.base_url))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    /// Verifies that the store is reachable and the table has the expected
    /// shape. Fatal at startup when it fails.
    pub async fn verify_schema(&self) -> Result<(), NotifierError> {
        let response = self
            .get(&format!("/rest/v1/{TABLE}?select={COLUMNS}&limit=1"))
            .send()
            .await
            .map_err(|e| NotifierError::Store {
                message: format!("failed to connect to store: {e}"),
                source: Some(Box::new(e)),
            })?;

        match response.status().as_u16() {
            404 => {
                return Err(NotifierError::SchemaInvalid(format!(
                    "table '{TABLE}' does not exist"
                )));
            }
            401 | 403 => {
                return Err(NotifierError::SchemaInvalid(format!(
                    "authentication failed (status {}); check the API key",
                    response.status()
                )));
            }
            200 | 206 => {}
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(NotifierError::SchemaInvalid(format!(
                    "store query failed (status {status}): {body}"
                )));
            }
        }

        let body = response.text().await.unwrap_or_default();
        if serde_json::from_str::<Vec<SubscriberRow>>(&body).is_err() {
            // An empty table decodes as an empty array of anything; only a
            // shape mismatch on real rows is a schema error.
            let empty_table = serde_json::from_str::<Vec<Value>>(&body)
                .map(|rows| rows.is_empty())
                .unwrap_or(false);
            if !empty_table {
                return Err(NotifierError::SchemaInvalid(format!(
                    "unexpected row shape in '{TABLE}': {body}"
                )));
            }
        }

        debug!(table = TABLE, "store schema verified");
        Ok(())
    }

    /// Counts active subscribers that have a global webhook configured.
    /// Diagnostic only; failures are reported, not fatal.
    pub async fn active_subscriber_count(&self) -> Result<usize, NotifierError> {
        let response = self
            .get(&format!(
                "/rest/v1/{TABLE}?select=auth_user_id\
                 &notifications_subscription_active=eq.true&discord_webhook_url=not.is.null"
            ))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| NotifierError::Store {
                message: format!("count query failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        if !matches!(response.status().as_u16(), 200 | 206) {
            return Err(NotifierError::Store {
                message: format!("count query returned {}", response.status()),
                source: None,
            });
        }

        let rows: Vec<Value> = response.json().await.map_err(|e| NotifierError::Store {
            message: format!("count response unparseable: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(rows.len())
    }

    /// Fetches the cycle's subscriber snapshot: rows with an active
    /// subscription flag that have a usable global webhook or at least one
    /// notification-level webhook. Expiry is evaluated later, per cycle.
    pub async fn fetch_active_subscribers(&self) -> Result<Vec<Subscriber>, NotifierError> {
        let response = self
            .get(&format!(
                "/rest/v1/{TABLE}?select={COLUMNS}&notifications_subscription_active=eq.true"
            ))
            .send()
            .await
            .map_err(|e| NotifierError::Store {
                message: format!("subscriber fetch failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        if response.status().as_u16() != 200 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Store {
                message: format!("subscriber fetch returned {status}: {body}"),
                source: None,
            });
        }

        let rows: Vec<SubscriberRow> =
            response.json().await.map_err(|e| NotifierError::Store {
                message: format!("subscriber rows unparseable: {e}"),
                source: Some(Box::new(e)),
            })?;

        let mut subscribers = Vec::with_capacity(rows.len());
        for row in rows {
            let subscriber = row_to_subscriber(row);
            let has_global = subscriber.global_webhook_url.is_some();
            let has_notification_webhooks = subscriber
                .notifications
                .iter()
                .any(|n| !n.webhooks.is_empty());

            if has_global || has_notification_webhooks {
                if let Some(url) = &subscriber.global_webhook_url {
                    debug!(
                        email = %subscriber.email,
                        webhook = %mask_webhook_url(url),
                        "including subscriber"
                    );
                }
                subscribers.push(subscriber);
            } else {
                debug!(email = %subscriber.email, "excluding subscriber, no webhooks configured");
            }
        }

        Ok(subscribers)
    }
}

fn row_to_subscriber(row: SubscriberRow) -> Subscriber {
    let global_webhook_url = row.discord_webhook_url.as_deref().and_then(|raw| {
        let cleaned = salvage_webhook_url(raw);
        if cleaned != raw.trim() {
            warn!(email = %row.email, "repaired webhook URL with appended JSON");
        }
        is_valid_webhook_url(&cleaned).then_some(cleaned)
    });

    let notifications = match row.discord_notifications {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match parse_notifications(&value) {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!(email = %row.email, error = %e, "failed to parse notifications column");
                Vec::new()
            }
        },
    };

    Subscriber {
        id: row.auth_user_id,
        email: row.email,
        username: row.username,
        global_webhook_url,
        subscription_active: row.notifications_subscription_active,
        subscription_expires_at: row.notifications_subscription_expires_at,
        notifications,
    }
}

/// Repairs webhook URLs that have had JSON data appended to them.
///
/// Truncates at the first `[{` or `{"` anchor (when not at the start) and
/// trims whitespace. Part of the ingest contract, not a defensive accident.
pub fn salvage_webhook_url(raw: &str) -> String {
    let mut url = raw.trim();
    for anchor in ["[{", "{\""] {
        if let Some(idx) = url.find(anchor)
            && idx > 0
        {
            url = url[..idx].trim();
        }
    }
    url.to_string()
}

/// Decodes the polymorphic notifications column: either a JSON array or a
/// string containing a JSON array.
pub fn parse_notifications(value: &Value) -> Result<Vec<Notification>, NotifierError> {
    let result = match value {
        Value::String(inner) => serde_json::from_str(inner),
        other => serde_json::from_value(other.clone()),
    };
    result.map_err(|e| NotifierError::DataCorrupt(format!("notifications column: {e}")))
}
