// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the aggregator API.

use mmcs_core::Item;
use serde::Deserialize;

/// Options for a single-shop search.
///
/// The aggregator requires a Japanese search term; translation happens
/// before this struct is built.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub term_jp: String,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// 1-based page number; values below 1 are treated as 1.
    pub page: u32,
}

impl SearchOptions {
    /// Ordered request parameters: `global, max_price?, min_price?, page,
    /// search`. The order is part of the signing contract.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("global".to_string(), "1".to_string())];
        if let Some(max) = self.max_price {
            params.push(("max_price".to_string(), max.to_string()));
        }
        if let Some(min) = self.min_price {
            params.push(("min_price".to_string(), min.to_string()));
        }
        params.push(("page".to_string(), self.page.max(1).to_string()));
        params.push(("search".to_string(), self.term_jp.clone()));
        params
    }
}

/// Envelope shared by all aggregator API responses.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: i64,
    pub data: T,
}

/// Payload of a search response.
#[derive(Debug, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub total_items: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_ordered_and_complete() {
        let opts = SearchOptions {
            term_jp: "ラグラン".into(),
            min_price: Some(500),
            max_price: Some(5000),
            page: 2,
        };
        let keys: Vec<String> = opts.to_params().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["global", "max_price", "min_price", "page", "search"]);
    }

    #[test]
    fn absent_prices_are_omitted() {
        let opts = SearchOptions {
            term_jp: "tee".into(),
            ..SearchOptions::default()
        };
        let keys: Vec<String> = opts.to_params().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["global", "page", "search"]);
    }

    #[test]
    fn page_zero_clamps_to_one() {
        let opts = SearchOptions {
            term_jp: "tee".into(),
            page: 0,
            ..SearchOptions::default()
        };
        let params = opts.to_params();
        let page = params.iter().find(|(k, _)| k == "page").unwrap();
        assert_eq!(page.1, "1");
    }

    #[test]
    fn search_envelope_decodes() {
        let raw = r#"{"code":0,"data":{"items":[{"shop":"rakuma","code":"r1"}],"total_items":40}}"#;
        let envelope: ApiEnvelope<SearchData> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.items.len(), 1);
        assert_eq!(envelope.data.total_items, 40);
    }
}
