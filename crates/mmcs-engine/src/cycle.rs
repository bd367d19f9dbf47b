// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cycle driver.
//!
//! Ticks once a minute and runs one processing pass over all active
//! subscribers. At most one cycle is in flight: an overlapping tick is
//! dropped, never queued, so latency for future cycles stays bounded under
//! sustained overload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use mmcs_core::clothing::filter_clothing;
use mmcs_core::markets::{normalize_markets, scope_to_supported};
use mmcs_core::{Item, Notification, Shop, Subscriber, mask_webhook_url};
use mmcs_discord::WebhookClient;
use mmcs_sendico::{SearchOptions, SendicoClient};
use mmcs_supabase::StoreClient;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::caches::{SearchCache, TranslationCache};
use crate::seen::SeenTracker;

/// Time between cycle starts.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Subscriber tasks in flight at once within a cycle.
const MAX_CONCURRENT_SUBSCRIBERS: usize = 15;

/// Webhook deliveries in flight at once across the process.
const MAX_CONCURRENT_WEBHOOKS: usize = 30;

/// Pages fetched per shop and search. 1 is fastest; page 1 typically holds
/// the newest listings. 2–3 catch more recent uploads at the cost of
/// latency.
const MAX_SEARCH_PAGES: u32 = 1;

/// The processing engine: owns every process-wide shared structure and
/// drives the periodic pass over subscribers.
pub struct Engine {
    store: StoreClient,
    sendico: Arc<SendicoClient>,
    webhooks: WebhookClient,
    translations: TranslationCache,
    searches: SearchCache,
    seen: SeenTracker,
    /// Per-(term, markets) guards so identical lookups from concurrent
    /// subscribers collapse into one upstream query instead of racing past
    /// the cache miss together. Cleared at the end of each cycle.
    flights: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    webhook_permits: Arc<Semaphore>,
    in_progress: Mutex<bool>,
}

/// Clears the in-progress flag on every exit path, panics included.
struct CycleGuard<'a>(&'a Mutex<bool>);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_progress) = self.0.lock() {
            *in_progress = false;
        }
    }
}

impl Engine {
    pub fn new(store: StoreClient, sendico: Arc<SendicoClient>, webhooks: WebhookClient) -> Self {
        Self {
            store,
            sendico,
            webhooks,
            translations: TranslationCache::new(),
            searches: SearchCache::new(),
            seen: SeenTracker::new(),
            flights: AsyncMutex::new(HashMap::new()),
            webhook_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_WEBHOOKS)),
            in_progress: Mutex::new(false),
        }
    }

    /// Runs the daemon loop: one immediate cycle, then one per tick, each
    /// spawned so a slow cycle delays nothing and overlapping ticks hit the
    /// interlock instead of queueing.
    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = TICK_INTERVAL.as_secs(), "cycle driver started");
        self.run_cycle_guarded().await;

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.tick().await; // the interval's immediate first tick
        loop {
            ticker.tick().await;
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                engine.run_cycle_guarded().await;
            });
        }
    }

    /// Runs one cycle unless another is already in flight. Returns whether
    /// the cycle ran.
    pub async fn run_cycle_guarded(self: &Arc<Self>) -> bool {
        {
            let mut in_progress = self.in_progress.lock().expect("cycle interlock poisoned");
            if *in_progress {
                info!("previous cycle still running, skipping this tick");
                return false;
            }
            *in_progress = true;
        }
        let _guard = CycleGuard(&self.in_progress);

        self.run_cycle().await;
        true
    }

    async fn run_cycle(self: &Arc<Self>) {
        let started = Instant::now();
        info!("starting notification cycle");

        let subscribers = match self.store.fetch_active_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(error = %e, "subscriber fetch failed, skipping cycle");
                return;
            }
        };
        if subscribers.is_empty() {
            info!("no active subscribers found");
            return;
        }

        let now = Utc::now();
        let active: Vec<Subscriber> = subscribers
            .into_iter()
            .filter(|subscriber| {
                let active = subscriber.is_active(now);
                if !active {
                    info!(email = %subscriber.email, "skipping subscriber, subscription expired");
                }
                active
            })
            .collect();
        if active.is_empty() {
            info!("no active subscriptions found");
            return;
        }

        info!(
            count = active.len(),
            max_concurrent = MAX_CONCURRENT_SUBSCRIBERS,
            "processing subscribers"
        );

        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_SUBSCRIBERS));
        let mut tasks = JoinSet::new();
        for subscriber in active {
            let engine = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("subscriber semaphore is never closed");
                engine.process_subscriber(&subscriber).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        let elapsed = started.elapsed();
        info!(duration_ms = elapsed.as_millis() as u64, "cycle finished");
        if elapsed > TICK_INTERVAL {
            warn!(
                "cycle took longer than the tick interval; \
                 reduce subscriber load or increase the interval"
            );
        }

        let swept = self.searches.sweep_expired(Utc::now());
        if swept > 0 {
            debug!(swept, "expired search cache entries removed");
        }
        self.flights.lock().await.clear();
    }

    /// Processes one subscriber's notifications strictly sequentially. The
    /// sequencing keeps per-subscriber logs coherent and avoids re-racing
    /// the same seen-map keys.
    async fn process_subscriber(self: &Arc<Self>, subscriber: &Subscriber) {
        if subscriber.notifications.is_empty() {
            debug!(email = %subscriber.email, "no notifications configured");
            return;
        }

        for notification in &subscriber.notifications {
            self.process_notification(subscriber, notification).await;
        }
    }

    async fn process_notification(
        self: &Arc<Self>,
        subscriber: &Subscriber,
        notification: &Notification,
    ) {
        debug!(term = %notification.search_term, "checking notification");

        let normalized = normalize_markets(&notification.markets);
        if !notification.markets.is_empty() && normalized.is_empty() {
            warn!(
                term = %notification.search_term,
                requested = ?notification.markets,
                "skipping notification, no recognized markets"
            );
            return;
        }

        let scoped = scope_to_supported(&normalized);
        if scoped.is_empty() {
            debug!(
                term = %notification.search_term,
                "no aggregator-supported markets in this notification"
            );
            return;
        }

        let market_keys: Vec<String> = scoped.iter().map(|(market, _)| market.clone()).collect();
        let shops: Vec<Shop> = scoped.iter().map(|(_, shop)| *shop).collect();

        let Some(items) = self
            .shared_search(&notification.search_term, &market_keys, &shops)
            .await
        else {
            return;
        };

        let now = Utc::now();
        let new_items = self.seen.record_if_new(&notification.id, items, now);
        if new_items.is_empty() {
            debug!(term = %notification.search_term, "no new items");
            return;
        }
        info!(
            count = new_items.len(),
            term = %notification.search_term,
            "new items found"
        );

        let clothing = filter_clothing(new_items);
        if clothing.is_empty() {
            debug!(term = %notification.search_term, "no clothing items after filtering");
            return;
        }

        let webhooks = resolve_webhooks(subscriber, notification);
        if webhooks.is_empty() {
            warn!(
                email = %subscriber.email,
                term = %notification.search_term,
                "no webhooks configured for this notification"
            );
            return;
        }

        let targets = self.seen.filter_undelivered(&webhooks, &clothing, now);
        if targets.is_empty() {
            debug!(term = %notification.search_term, "all items already delivered");
            return;
        }

        // Batches to one webhook stay sequential inside deliver();
        // different webhooks proceed in parallel under the process-wide cap.
        let mut deliveries = JoinSet::new();
        for (webhook, items) in targets {
            let engine = Arc::clone(self);
            let term = notification.search_term.clone();
            deliveries.spawn(async move {
                let _permit = engine
                    .webhook_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("webhook semaphore is never closed");
                match engine.webhooks.deliver(&webhook, &term, &items).await {
                    Ok(()) => {
                        engine.seen.mark_delivered(&webhook, &items, Utc::now());
                        info!(
                            webhook = %mask_webhook_url(&webhook),
                            count = items.len(),
                            "notification delivered"
                        );
                    }
                    Err(e) => {
                        warn!(
                            webhook = %mask_webhook_url(&webhook),
                            error = %e,
                            "delivery failed"
                        );
                    }
                }
            });
        }
        while deliveries.join_next().await.is_some() {}
    }

    /// Translate-then-search with both shared caches, serialized per
    /// `(term, markets)` pair so one cycle sends each distinct search
    /// upstream at most once. Returns `None` when translation fails.
    async fn shared_search(
        self: &Arc<Self>,
        search_term: &str,
        market_keys: &[String],
        shops: &[Shop],
    ) -> Option<Vec<Item>> {
        let flight_key = format!("{search_term}:{}", market_keys.join(","));
        let flight = {
            let mut flights = self.flights.lock().await;
            Arc::clone(flights.entry(flight_key).or_default())
        };
        let _in_flight = flight.lock().await;

        let term_jp = match self.translations.get(search_term) {
            Some(cached) => cached,
            None => match self.sendico.translate(search_term).await {
                Ok(translated) => {
                    self.translations.insert(search_term, &translated);
                    translated
                }
                Err(e) => {
                    warn!(term = %search_term, error = %e, "translation failed");
                    return None;
                }
            },
        };
        debug!(term = %search_term, term_jp = %term_jp, "translated");

        let cache_key = SearchCache::key(&term_jp, market_keys);
        if let Some(cached) = self.searches.get(&cache_key, Utc::now()) {
            debug!(
                count = cached.len(),
                "using search results shared across subscribers"
            );
            return Some(cached);
        }

        let opts = SearchOptions {
            term_jp: term_jp.clone(),
            ..SearchOptions::default()
        };
        let found = if MAX_SEARCH_PAGES > 1 {
            self.sendico
                .bulk_search_pages(shops, &opts, MAX_SEARCH_PAGES)
                .await
        } else {
            self.sendico.bulk_search(shops, &opts).await
        };
        self.searches.insert(&cache_key, &found, Utc::now());
        debug!(count = found.len(), shops = shops.len(), "search complete");
        Some(found)
    }
}

/// The webhooks a notification delivers to: its own list when present,
/// otherwise the subscriber's global webhook (already validated at ingest).
/// Entries that are not URLs are dropped.
fn resolve_webhooks(subscriber: &Subscriber, notification: &Notification) -> Vec<String> {
    let candidates: Vec<String> = if notification.webhooks.is_empty() {
        subscriber.global_webhook_url.iter().cloned().collect()
    } else {
        notification.webhooks.clone()
    };

    candidates
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| {
            let valid = url.starts_with("http");
            if !valid {
                warn!(webhook = %mask_webhook_url(url), "skipping invalid webhook");
            }
            valid
        })
        .collect()
}
