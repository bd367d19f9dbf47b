// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signed aggregator client.
//!
//! Holds the one piece of process-wide mutable state in this crate: the
//! signing secret, behind a reader/writer lock. Requests read the secret
//! concurrently; only the 403-triggered refresh takes the write side.

use std::collections::HashSet;
use std::time::Duration;

use mmcs_core::{Item, NotifierError, Shop};
use reqwest::Method;
use serde_json::json;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::secret::parse_secret;
use crate::sign::{self, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::{ApiEnvelope, SearchData, SearchOptions};

/// Retry budget for transport errors and 429s within one signed call.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (2s, 4s, 8s).
const BASE_DELAY: Duration = Duration::from_secs(2);

/// Maximum in-flight searches during a bulk fan-out.
const BULK_CONCURRENCY: usize = 5;

/// Stagger between shop launches in a single-page bulk search.
const BULK_STAGGER: Duration = Duration::from_millis(200);

/// Stagger between shop launches in a multi-page bulk search.
const MULTI_PAGE_STAGGER: Duration = Duration::from_millis(300);

/// Delay between page fetches within one shop.
const PAGE_DELAY: Duration = Duration::from_millis(200);

/// HMAC-signed client for the marketplace aggregator.
pub struct SendicoClient {
    client: reqwest::Client,
    base_url: String,
    secret: RwLock<String>,
}

impl SendicoClient {
    /// Creates a client and discovers the signing secret from the landing
    /// page. Fails with [`NotifierError::SecretNotFound`] when the page or
    /// the embedded key cannot be obtained.
    pub async fn new(base_url: impl Into<String>) -> Result<Self, NotifierError> {
        let base_url = base_url.into();
        let client = reqwest::Client::new();
        let secret = discover_secret(&client, &base_url).await?;
        debug!("signing secret discovered");

        Ok(Self {
            client,
            base_url,
            secret: RwLock::new(secret),
        })
    }

    /// Re-discovers the signing secret, replacing the shared copy.
    ///
    /// The only write to shared state in this crate; serialized by the
    /// secret's write lock.
    pub async fn refresh_secret(&self) -> Result<(), NotifierError> {
        let fresh = discover_secret(&self.client, &self.base_url)
            .await
            .map_err(|e| NotifierError::SecretRefreshFailed(e.to_string()))?;
        *self.secret.write().await = fresh;
        info!("signing secret refreshed");
        Ok(())
    }

    /// Translates an English search term to Japanese.
    pub async fn translate(&self, text: &str) -> Result<String, NotifierError> {
        let path = "/api/translate";
        let params = vec![
            ("from".to_string(), "en".to_string()),
            ("string".to_string(), text.to_string()),
            ("to".to_string(), "ja".to_string()),
        ];
        let body = json!({ "from": "en", "string": text, "to": "ja" });

        let response = self
            .send_signed(Method::POST, path, &params, Some(&body))
            .await?;
        let envelope: ApiEnvelope<String> = decode_json(response).await?;
        Ok(envelope.data)
    }

    /// Searches one shop for one page of items.
    pub async fn search(
        &self,
        shop: Shop,
        opts: &SearchOptions,
    ) -> Result<Vec<Item>, NotifierError> {
        let path = format!("/api/{}/items", shop.wire_name());
        let params = opts.to_params();

        let response = self
            .send_signed(Method::GET, &path, &params, None)
            .await?;
        let envelope: ApiEnvelope<SearchData> = decode_json(response).await?;
        Ok(envelope.data.items)
    }

    /// Searches pages `1..=max_pages` of one shop, deduplicating by item
    /// code across pages.
    ///
    /// Stops early on an empty page. An error on page 1 is fatal for the
    /// shop; an error on a later page is treated as "past the last page"
    /// and the items collected so far are returned.
    pub async fn search_pages(
        &self,
        shop: Shop,
        opts: &SearchOptions,
        max_pages: u32,
    ) -> Result<Vec<Item>, NotifierError> {
        let max_pages = max_pages.max(1);
        let mut all_items = Vec::new();
        let mut seen_codes = HashSet::new();

        for page in 1..=max_pages {
            let mut page_opts = opts.clone();
            page_opts.page = page;

            let items = match self.search(shop, &page_opts).await {
                Ok(items) => items,
                Err(e) if page > 1 => {
                    warn!(shop = %shop, page, error = %e, "error on later page, keeping items so far");
                    return Ok(all_items);
                }
                Err(e) => return Err(e),
            };

            if items.is_empty() {
                break;
            }
            for item in items {
                if seen_codes.insert(item.code.clone()) {
                    all_items.push(item);
                }
            }

            if page < max_pages {
                tokio::time::sleep(PAGE_DELAY).await;
            }
        }

        Ok(all_items)
    }

    /// Fans a single-page search out across shops with bounded concurrency
    /// and a polite stagger. Per-shop failures are logged and swallowed; the
    /// result is the union of the successful shops.
    pub async fn bulk_search(&self, shops: &[Shop], opts: &SearchOptions) -> Vec<Item> {
        self.fan_out(shops, BULK_STAGGER, |shop| {
            let mut page_opts = opts.clone();
            page_opts.page = 1;
            async move { self.search(shop, &page_opts).await }
        })
        .await
    }

    /// Multi-page variant of [`bulk_search`](Self::bulk_search).
    pub async fn bulk_search_pages(
        &self,
        shops: &[Shop],
        opts: &SearchOptions,
        max_pages: u32,
    ) -> Vec<Item> {
        self.fan_out(shops, MULTI_PAGE_STAGGER, |shop| {
            let opts = opts.clone();
            async move { self.search_pages(shop, &opts, max_pages).await }
        })
        .await
    }

    async fn fan_out<'a, F, Fut>(
        &'a self,
        shops: &[Shop],
        stagger: Duration,
        search_fn: F,
    ) -> Vec<Item>
    where
        F: Fn(Shop) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Item>, NotifierError>> + 'a,
    {
        let semaphore = Semaphore::new(BULK_CONCURRENCY);
        let tasks = shops.iter().enumerate().map(|(i, &shop)| {
            let semaphore = &semaphore;
            let fut = search_fn(shop);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("search semaphore is never closed");
                if i > 0 {
                    tokio::time::sleep(stagger).await;
                }
                match fut.await {
                    Ok(items) => items,
                    Err(NotifierError::RateLimited { .. }) => {
                        warn!(shop = %shop, "rate limited, skipping shop this cycle");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(shop = %shop, error = %e, "search failed, continuing with other shops");
                        Vec::new()
                    }
                }
            }
        });

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Sends a signed request, handling the 403 refresh contract: on
    /// [`NotifierError::HmacRefreshNeeded`] the signature is rebuilt with
    /// the fresh secret and the request retried exactly once. A second
    /// rejection is treated as non-recoverable.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, NotifierError> {
        match self.send_once(method.clone(), path, params, body).await {
            Err(NotifierError::HmacRefreshNeeded) => {
                match self.send_once(method, path, params, body).await {
                    Err(NotifierError::HmacRefreshNeeded) => Err(NotifierError::Upstream {
                        status: 403,
                        body: "signature rejected after secret refresh; likely invalid parameters"
                            .into(),
                    }),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// One pass of the per-request state machine: transport errors and 429
    /// retry in place with backoff; a 403 refreshes the secret and surfaces
    /// the refresh sentinel; any other non-200 is fatal for this call.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, NotifierError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..=MAX_RETRIES {
            let secret = self.secret.read().await.clone();
            let signed = sign::sign_request(&secret, path, params);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(SIGNATURE_HEADER, &signed.signature)
                .header(NONCE_HEADER, &signed.nonce)
                .header(TIMESTAMP_HEADER, signed.timestamp.to_string())
                .header("Content-Type", "application/json");
            request = match body {
                Some(json) => request.json(json),
                None => request.query(params),
            };

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let delay = BASE_DELAY * 2u32.pow(attempt);
                        warn!(attempt, error = %e, "transport error, retrying after {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(NotifierError::Transport {
                        message: format!("request to {path} failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            };

            let status = response.status().as_u16();
            match status {
                200 => return Ok(response),
                403 => {
                    let body_text = response.text().await.unwrap_or_default();
                    if body_text.contains("Access denied") || body_text.contains("403") {
                        info!("access denied, refreshing signing secret");
                        self.refresh_secret().await?;
                        return Err(NotifierError::HmacRefreshNeeded);
                    }
                    return Err(NotifierError::Upstream {
                        status: 403,
                        body: body_text,
                    });
                }
                429 => {
                    let retry_after = parse_retry_after(&response);
                    if attempt < MAX_RETRIES {
                        let delay =
                            retry_after.unwrap_or_else(|| BASE_DELAY * 2u32.pow(attempt));
                        warn!(path, attempt, "rate limited, retrying after {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(NotifierError::RateLimited { retry_after });
                }
                _ => {
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(NotifierError::Upstream {
                        status,
                        body: body_text,
                    });
                }
            }
        }

        Err(NotifierError::Internal("retry budget exhausted".into()))
    }
}

/// Fetches the landing page and extracts the signing secret.
async fn discover_secret(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<String, NotifierError> {
    let response = client
        .get(base_url)
        .send()
        .await
        .map_err(|e| NotifierError::SecretNotFound(format!("landing page fetch failed: {e}")))?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(NotifierError::SecretNotFound(format!(
            "landing page returned {status}"
        )));
    }

    let html = response
        .text()
        .await
        .map_err(|e| NotifierError::SecretNotFound(format!("landing page read failed: {e}")))?;
    parse_secret(&html)
}

/// Parses a `Retry-After` header (integer seconds).
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, NotifierError> {
    let body = response.text().await.map_err(|e| NotifierError::Transport {
        message: format!("failed to read response body: {e}"),
        source: Some(Box::new(e)),
    })?;
    serde_json::from_str(&body).map_err(|e| NotifierError::Upstream {
        status: 200,
        body: format!("unparseable response body: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encode_secret(plain: &str) -> String {
        base64::engine::general_purpose::STANDARD
            .encode(plain.as_bytes())
            .chars()
            .rev()
            .collect()
    }

    fn landing_page(secret: &str) -> String {
        let encoded = encode_secret(secret);
        format!(
            "<html><body><script id=\"__NUXT_DATA__\" type=\"application/json\">\
             [{{\"$sapi_tokens\":1}},[2],\"{encoded}\"]</script></body></html>"
        )
    }

    async fn mount_landing(server: &MockServer, secret: &str) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(secret)))
            .mount(server)
            .await;
    }

    fn search_body(items: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"code": 0, "data": {"items": items, "total_items": 1}})
    }

    #[tokio::test]
    async fn new_discovers_secret_from_landing_page() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;
        assert!(SendicoClient::new(server.uri()).await.is_ok());
    }

    #[tokio::test]
    async fn new_fails_without_landing_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let result = SendicoClient::new(server.uri()).await;
        assert!(matches!(result, Err(NotifierError::SecretNotFound(_))));
    }

    #[tokio::test]
    async fn translate_sends_signed_headers_and_decodes() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("POST"))
            .and(path("/api/translate"))
            .and(header_exists("X-Sendico-Signature"))
            .and(header_exists("X-Sendico-Nonce"))
            .and(header_exists("X-Sendico-Timestamp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "data": "ラグラン"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let ja = client.translate("raglan").await.unwrap();
        assert_eq!(ja, "ラグラン");
    }

    #[tokio::test]
    async fn search_decodes_items() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .and(query_param("search", "ラグラン"))
            .and(query_param("global", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([{"shop": "mercari", "code": "m1", "name": "Tシャツ"}]),
            )))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "ラグラン".into(),
            ..SearchOptions::default()
        };
        let items = client.search(Shop::Mercari, &opts).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code, "m1");
    }

    #[tokio::test]
    async fn forbidden_triggers_one_refresh_then_success() {
        let server = MockServer::start().await;

        // Landing page is fetched once at startup and once for the refresh.
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(landing_page("secret-1")))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([{"shop": "rakuma", "code": "r1", "name": "デニム"}]),
            )))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "デニム".into(),
            ..SearchOptions::default()
        };
        let items = client.search(Shop::Rakuma, &opts).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn persistent_forbidden_is_fatal() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "x".into(),
            ..SearchOptions::default()
        };
        let err = client.search(Shop::Rakuma, &opts).await.unwrap_err();
        match err {
            NotifierError::Upstream { status: 403, body } => {
                assert!(body.contains("invalid parameters"), "got: {body}");
            }
            other => panic!("expected Upstream 403, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_secret_refresh_failed() {
        let server = MockServer::start().await;

        // The landing page serves a secret once (startup), then disappears,
        // so the 403-triggered refresh cannot obtain a fresh secret.
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(landing_page("secret-1")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "x".into(),
            ..SearchOptions::default()
        };
        let err = client.search(Shop::Mercari, &opts).await.unwrap_err();
        assert!(matches!(err, NotifierError::SecretRefreshFailed(_)));
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after_and_retries() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([{"shop": "mercari", "code": "m1", "name": "ニット"}]),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "ニット".into(),
            ..SearchOptions::default()
        };
        let items = client.search(Shop::Mercari, &opts).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn other_client_errors_are_fatal() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "x".into(),
            ..SearchOptions::default()
        };
        let err = client.search(Shop::Mercari, &opts).await.unwrap_err();
        assert!(matches!(err, NotifierError::Upstream { status: 400, .. }));
    }

    #[tokio::test]
    async fn bulk_search_unions_successes_and_swallows_failures() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([{"shop": "mercari", "code": "m1", "name": "パーカー"}]),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .respond_with(ResponseTemplate::new(400).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "パーカー".into(),
            ..SearchOptions::default()
        };
        let items = client.bulk_search(&[Shop::Mercari, Shop::Rakuma], &opts).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].shop, Shop::Mercari);
    }

    #[tokio::test]
    async fn multi_page_search_dedups_and_stops_on_empty_page() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([
                    {"shop": "mercari", "code": "m1", "name": "a"},
                    {"shop": "mercari", "code": "m2", "name": "b"}
                ]),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([
                    {"shop": "mercari", "code": "m2", "name": "b"},
                    {"shop": "mercari", "code": "m3", "name": "c"}
                ]),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mercari/items"))
            .and(query_param("page", "3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(search_body(serde_json::json!([]))),
            )
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "x".into(),
            ..SearchOptions::default()
        };
        let items = client.search_pages(Shop::Mercari, &opts, 3).await.unwrap();
        let codes: Vec<&str> = items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn later_page_error_keeps_items_collected_so_far() {
        let server = MockServer::start().await;
        mount_landing(&server, "secret-1").await;

        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
                serde_json::json!([{"shop": "rakuma", "code": "r1", "name": "a"}]),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rakuma/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(400).set_body_string("past last page"))
            .mount(&server)
            .await;

        let client = SendicoClient::new(server.uri()).await.unwrap();
        let opts = SearchOptions {
            term_jp: "x".into(),
            ..SearchOptions::default()
        };
        let items = client.search_pages(Shop::Rakuma, &opts, 3).await.unwrap();
        assert_eq!(items.len(), 1);
    }
}
