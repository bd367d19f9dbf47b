// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Market identifier sets and the first two filter stages.
//!
//! Three sets, in order of restriction: *recognized* (the closed whitelist a
//! notification may name), *aggregator-supported* (the five Japanese markets
//! the aggregator can search), and `custom-*` identifiers (always rejected).

use crate::types::Shop;

/// Prefix for user-defined market identifiers; never processed.
const CUSTOM_PREFIX: &str = "custom-";

/// The closed whitelist of market identifiers a notification may request.
pub const RECOGNIZED_MARKETS: &[&str] = &[
    "mercari-jp",
    "paypay-fleamarket",
    "rakuma",
    "rakuten-jp",
    "xianyu",
    "yahoo-auctions",
    "depop",
    "ebay",
    "facebook",
    "gem",
    "grailed",
    "mercari-us",
    "poshmark",
    "shopgoodwill",
    "vinted",
    "secondstreet",
    "therealreal",
    "vestiaire",
    "2ndstreet-jp",
    "carousell-sg",
    "carousell-hk",
    "carousell-id",
    "carousell-my",
    "carousell-ph",
    "carousell-tw",
    "fruits-family",
    "kindal",
    "automated-searches",
    "avito",
    "ebay-global",
    "google-images-past-month",
    "instagram",
];

/// Maps an aggregator-supported market identifier to its wire-level shop.
pub fn shop_for_market(market: &str) -> Option<Shop> {
    match market {
        "mercari-jp" => Some(Shop::Mercari),
        "paypay-fleamarket" => Some(Shop::Yahoo),
        "rakuma" => Some(Shop::Rakuma),
        "rakuten-jp" => Some(Shop::Rakuten),
        "yahoo-auctions" => Some(Shop::Ayahoo),
        _ => None,
    }
}

/// Stage 1: normalize a notification's requested market list.
///
/// Strips `custom-*` identifiers and anything not on the recognized
/// whitelist. An empty request expands to all recognized markets; a
/// non-empty request that filters down to nothing stays empty (the caller
/// skips the notification). Idempotent.
pub fn normalize_markets(requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return RECOGNIZED_MARKETS.iter().map(|m| m.to_string()).collect();
    }

    requested
        .iter()
        .filter(|m| !m.starts_with(CUSTOM_PREFIX))
        .filter(|m| RECOGNIZED_MARKETS.contains(&m.as_str()))
        .cloned()
        .collect()
}

/// Stage 2: intersect normalized markets with the aggregator-supported set.
///
/// Returns `(market, shop)` pairs sorted by market identifier so downstream
/// cache keys are stable regardless of request order.
pub fn scope_to_supported(markets: &[String]) -> Vec<(String, Shop)> {
    let mut scoped: Vec<(String, Shop)> = markets
        .iter()
        .filter_map(|m| shop_for_market(m).map(|s| (m.clone(), s)))
        .collect();
    scoped.sort_by(|a, b| a.0.cmp(&b.0));
    scoped.dedup_by(|a, b| a.0 == b.0);
    scoped
}
