// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the notifier workspace.
//!
//! [`Subscriber`] and [`Notification`] mirror the subscriber store's rows;
//! [`Item`] and [`Shop`] mirror the aggregator's wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Required prefix for a usable outbound webhook URL.
pub const WEBHOOK_URL_PREFIX: &str = "https://discord.com/api/webhooks/";

/// One of the five aggregator-side marketplace identifiers.
///
/// The serde representation matches the aggregator's wire names
/// (`ayahoo`, `mercari`, `rakuma`, `rakuten`, `yahoo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shop {
    Ayahoo,
    Mercari,
    Rakuma,
    Rakuten,
    Yahoo,
}

impl Shop {
    /// The identifier used in aggregator URLs and item keys.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Shop::Ayahoo => "ayahoo",
            Shop::Mercari => "mercari",
            Shop::Rakuma => "rakuma",
            Shop::Rakuten => "rakuten",
            Shop::Yahoo => "yahoo",
        }
    }

    /// Human-readable marketplace name used in outbound embeds.
    pub fn human_name(&self) -> &'static str {
        match self {
            Shop::Mercari => "Mercari Japan",
            Shop::Rakuma => "Rakuten Rakuma",
            Shop::Rakuten => "Rakuten",
            Shop::Ayahoo => "Yahoo Auctions",
            Shop::Yahoo => "Yahoo PayPay Flea",
        }
    }
}

impl std::fmt::Display for Shop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A listing returned by the aggregator, identified within its shop by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    pub shop: Shop,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "img", default)]
    pub image: String,
    #[serde(rename = "price", default)]
    pub price_yen: i64,
    #[serde(rename = "converted_price", default)]
    pub price_usd: i64,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A saved search owned by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "searchTerm", default)]
    pub search_term: String,
    #[serde(default)]
    pub markets: Vec<String>,
    #[serde(default)]
    pub webhooks: Vec<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

/// An immutable cycle-local snapshot of a subscriber store row.
///
/// Built at the start of a cycle, discarded at its end. `notifications` is
/// populated by the store client after decoding the polymorphic column.
#[derive(Debug, Clone, Default)]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    pub username: String,
    /// Cleaned global webhook URL, if one is configured and valid.
    pub global_webhook_url: Option<String>,
    pub subscription_active: bool,
    pub subscription_expires_at: Option<String>,
    pub notifications: Vec<Notification>,
}

impl Subscriber {
    /// A subscriber is active iff the subscription flag is set and the
    /// expiry, when present, is still in the future. An unparseable expiry
    /// counts as expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if !self.subscription_active {
            return false;
        }
        match self.subscription_expires_at.as_deref() {
            None | Some("") => true,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(expires) => now < expires.with_timezone(&Utc),
                Err(_) => false,
            },
        }
    }
}

/// True when the string looks like a deliverable webhook URL.
pub fn is_valid_webhook_url(url: &str) -> bool {
    url.len() > 20 && url.starts_with(WEBHOOK_URL_PREFIX)
}

/// Mask most of a webhook URL for log output. Non-ASCII input (possible in
/// corrupt rows) is masked entirely rather than sliced.
pub fn mask_webhook_url(url: &str) -> String {
    if url.len() < 20 || !url.is_ascii() {
        return "***".to_string();
    }
    format!("{}...{}", &url[..20], &url[url.len() - 10..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subscriber(active: bool, expires: Option<&str>) -> Subscriber {
        Subscriber {
            id: "u1".into(),
            email: "u1@example.com".into(),
            username: "u1".into(),
            subscription_active: active,
            subscription_expires_at: expires.map(str::to_string),
            ..Subscriber::default()
        }
    }

    #[test]
    fn shop_wire_names_round_trip() {
        for shop in [
            Shop::Ayahoo,
            Shop::Mercari,
            Shop::Rakuma,
            Shop::Rakuten,
            Shop::Yahoo,
        ] {
            let json = serde_json::to_string(&shop).unwrap();
            assert_eq!(json, format!("\"{}\"", shop.wire_name()));
            let parsed: Shop = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, shop);
        }
    }

    #[test]
    fn item_decodes_aggregator_wire_format() {
        let raw = r#"{
            "shop": "mercari",
            "code": "m1",
            "name": "Tシャツ raglan",
            "url": "https://example.com/m1",
            "img": "https://img/1",
            "price": 1200,
            "converted_price": 8,
            "labels": ["new"]
        }"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        assert_eq!(item.shop, Shop::Mercari);
        assert_eq!(item.price_yen, 1200);
        assert_eq!(item.price_usd, 8);
        assert_eq!(item.image, "https://img/1");
    }

    #[test]
    fn item_tolerates_missing_optional_fields() {
        let item: Item =
            serde_json::from_str(r#"{"shop":"rakuma","code":"r1"}"#).unwrap();
        assert!(item.labels.is_empty());
        assert_eq!(item.price_yen, 0);
    }

    #[test]
    fn lifetime_subscription_is_active() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(subscriber(true, None).is_active(now));
        assert!(subscriber(true, Some("")).is_active(now));
    }

    #[test]
    fn expired_subscription_is_inactive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(!subscriber(true, Some("2026-02-28T23:59:59Z")).is_active(now));
        assert!(subscriber(true, Some("2026-03-01T00:00:01Z")).is_active(now));
    }

    #[test]
    fn unparseable_expiry_is_inactive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(!subscriber(true, Some("next tuesday")).is_active(now));
    }

    #[test]
    fn inactive_flag_overrides_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(!subscriber(false, None).is_active(now));
    }

    #[test]
    fn webhook_validity_gate() {
        assert!(is_valid_webhook_url(
            "https://discord.com/api/webhooks/123/abcdef"
        ));
        assert!(!is_valid_webhook_url("https://example.com/hook"));
        assert!(!is_valid_webhook_url(""));
    }

    #[test]
    fn webhook_masking_hides_the_token() {
        let url = "https://discord.com/api/webhooks/1234567890/secret-token-value";
        let masked = mask_webhook_url(url);
        assert!(masked.starts_with("https://discord.com/"));
        assert!(!masked.contains("secret-token"));
        assert_eq!(mask_webhook_url("short"), "***");
    }
}
