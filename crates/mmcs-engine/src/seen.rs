// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-level dedup tracking with bounded memory.
//!
//! Level one answers "has this notification ever seen this listing?"
//! (7-day window); level two answers "was this listing already delivered to
//! this webhook?" (24-hour window). Both maps are in-memory only — a restart
//! forgets everything, which is the documented duplicate-after-restart
//! caveat — and are bounded by lazy sweeps rather than background tasks.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use mmcs_core::Item;
use tracing::debug;

/// How long a `(notification, shop, code)` triple suppresses re-notification.
const SEEN_TTL_DAYS: i64 = 7;

/// Seen-map size above which an insert sweeps expired entries.
const SEEN_SWEEP_LEN: usize = 10_000;

/// How long a `(webhook, itemURL)` pair suppresses re-delivery.
const DELIVERED_TTL_HOURS: i64 = 24;

/// Delivered-map size above which an insert sweeps expired entries.
const DELIVERED_SWEEP_LEN: usize = 50_000;

/// Tracks first-seen items per notification and delivered items per webhook.
#[derive(Debug, Default)]
pub struct SeenTracker {
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
    delivered: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl SeenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen_key(notification_id: &str, item: &Item) -> String {
        format!("{notification_id}:{}:{}", item.shop, item.code)
    }

    fn delivered_key(webhook_url: &str, item_url: &str) -> String {
        format!("{webhook_url}:{item_url}")
    }

    /// Atomically records unseen items and returns them.
    ///
    /// The decision is first-writer-wins under the write lock: for each item
    /// absent from the map an entry is inserted and the item kept. An entry
    /// older than the 7-day window counts as new again (rare).
    pub fn record_if_new(
        &self,
        notification_id: &str,
        items: Vec<Item>,
        now: DateTime<Utc>,
    ) -> Vec<Item> {
        let ttl = Duration::days(SEEN_TTL_DAYS);
        let mut seen = self.seen.write().expect("seen map lock poisoned");

        if seen.len() > SEEN_SWEEP_LEN {
            let before = seen.len();
            seen.retain(|_, first_seen| now - *first_seen <= ttl);
            debug!(swept = before - seen.len(), "seen map swept");
        }

        let mut new_items = Vec::new();
        for item in items {
            let key = Self::seen_key(notification_id, &item);
            match seen.get(&key) {
                None => {
                    seen.insert(key, now);
                    new_items.push(item);
                }
                Some(first_seen) if now - *first_seen > ttl => {
                    debug!(code = %item.code, "seen entry expired, treating as new");
                    seen.insert(key, now);
                    new_items.push(item);
                }
                Some(_) => {}
            }
        }
        new_items
    }

    /// For each webhook, the subset of `items` not delivered to it within
    /// the 24-hour window. Items without a URL are skipped entirely; webhooks
    /// with nothing left are omitted.
    pub fn filter_undelivered(
        &self,
        webhook_urls: &[String],
        items: &[Item],
        now: DateTime<Utc>,
    ) -> Vec<(String, Vec<Item>)> {
        let ttl = Duration::hours(DELIVERED_TTL_HOURS);
        let delivered = self.delivered.read().expect("delivered map lock poisoned");

        webhook_urls
            .iter()
            .filter_map(|webhook| {
                let pending: Vec<Item> = items
                    .iter()
                    .filter(|item| !item.url.is_empty())
                    .filter(|item| {
                        match delivered.get(&Self::delivered_key(webhook, &item.url)) {
                            None => true,
                            Some(sent_at) => now - *sent_at > ttl,
                        }
                    })
                    .cloned()
                    .collect();
                (!pending.is_empty()).then(|| (webhook.clone(), pending))
            })
            .collect()
    }

    /// Records a successful delivery of `items` to `webhook_url`.
    pub fn mark_delivered(&self, webhook_url: &str, items: &[Item], now: DateTime<Utc>) {
        let ttl = Duration::hours(DELIVERED_TTL_HOURS);
        let mut delivered = self.delivered.write().expect("delivered map lock poisoned");

        if delivered.len() > DELIVERED_SWEEP_LEN {
            let before = delivered.len();
            delivered.retain(|_, sent_at| now - *sent_at <= ttl);
            debug!(swept = before - delivered.len(), "delivered map swept");
        }

        for item in items {
            if !item.url.is_empty() {
                delivered.insert(Self::delivered_key(webhook_url, &item.url), now);
            }
        }
    }

    #[cfg(test)]
    fn seen_len(&self) -> usize {
        self.seen.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmcs_core::Shop;

    fn item(shop: Shop, code: &str) -> Item {
        Item {
            shop,
            code: code.into(),
            name: "シャツ".into(),
            url: format!("https://example.com/{shop}/{code}"),
            image: String::new(),
            price_yen: 100,
            price_usd: 1,
            labels: vec![],
        }
    }

    #[test]
    fn first_sight_keeps_second_sight_drops() {
        let tracker = SeenTracker::new();
        let now = Utc::now();
        let items = vec![item(Shop::Mercari, "m1"), item(Shop::Rakuma, "r1")];

        let first = tracker.record_if_new("n1", items.clone(), now);
        assert_eq!(first.len(), 2);

        let second = tracker.record_if_new("n1", items, now);
        assert!(second.is_empty());
    }

    #[test]
    fn seen_state_is_scoped_per_notification() {
        let tracker = SeenTracker::new();
        let now = Utc::now();
        let items = vec![item(Shop::Mercari, "m1")];

        tracker.record_if_new("n1", items.clone(), now);
        let other = tracker.record_if_new("n2", items, now);
        assert_eq!(other.len(), 1, "each notification has its own seen window");
    }

    #[test]
    fn same_code_in_different_shops_is_distinct() {
        let tracker = SeenTracker::new();
        let now = Utc::now();

        tracker.record_if_new("n1", vec![item(Shop::Mercari, "x")], now);
        let kept = tracker.record_if_new("n1", vec![item(Shop::Rakuma, "x")], now);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn expired_seen_entry_fires_again() {
        let tracker = SeenTracker::new();
        let start = Utc::now();
        let items = vec![item(Shop::Mercari, "m1")];

        tracker.record_if_new("n1", items.clone(), start);

        let within = tracker.record_if_new("n1", items.clone(), start + Duration::days(6));
        assert!(within.is_empty());

        let past = tracker.record_if_new(
            "n1",
            items,
            start + Duration::days(7) + Duration::seconds(1),
        );
        assert_eq!(past.len(), 1);
    }

    #[test]
    fn seen_map_sweeps_expired_entries_past_cap() {
        let tracker = SeenTracker::new();
        let stale = Utc::now() - Duration::days(8);
        for i in 0..=SEEN_SWEEP_LEN {
            tracker.record_if_new("n1", vec![item(Shop::Mercari, &format!("c{i}"))], stale);
        }
        assert!(tracker.seen_len() > SEEN_SWEEP_LEN);

        tracker.record_if_new("n1", vec![item(Shop::Rakuma, "fresh")], Utc::now());
        assert_eq!(tracker.seen_len(), 1, "only the fresh entry survives");
    }

    #[test]
    fn delivered_round_trip_suppresses_redelivery() {
        let tracker = SeenTracker::new();
        let now = Utc::now();
        let webhook = "https://discord.com/api/webhooks/1/a".to_string();
        let items = vec![item(Shop::Mercari, "m1")];

        let pending = tracker.filter_undelivered(&[webhook.clone()], &items, now);
        assert_eq!(pending.len(), 1);

        tracker.mark_delivered(&webhook, &items, now);
        let after = tracker.filter_undelivered(&[webhook], &items, now);
        assert!(after.is_empty());
    }

    #[test]
    fn delivery_state_is_per_webhook() {
        let tracker = SeenTracker::new();
        let now = Utc::now();
        let hook_a = "https://discord.com/api/webhooks/1/a".to_string();
        let hook_b = "https://discord.com/api/webhooks/2/b".to_string();
        let items = vec![item(Shop::Mercari, "m1")];

        tracker.mark_delivered(&hook_a, &items, now);
        let pending = tracker.filter_undelivered(&[hook_a, hook_b.clone()], &items, now);
        assert_eq!(pending, vec![(hook_b, items)]);
    }

    #[test]
    fn delivered_window_expires_after_a_day() {
        let tracker = SeenTracker::new();
        let start = Utc::now();
        let webhook = "https://discord.com/api/webhooks/1/a".to_string();
        let items = vec![item(Shop::Mercari, "m1")];

        tracker.mark_delivered(&webhook, &items, start);
        let later = start + Duration::hours(25);
        let pending = tracker.filter_undelivered(&[webhook], &items, later);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn items_without_urls_are_never_delivered() {
        let tracker = SeenTracker::new();
        let now = Utc::now();
        let webhook = "https://discord.com/api/webhooks/1/a".to_string();
        let mut bare = item(Shop::Mercari, "m1");
        bare.url = String::new();

        let pending = tracker.filter_undelivered(&[webhook], &[bare], now);
        assert!(pending.is_empty());
    }
}
