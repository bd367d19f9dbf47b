// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embed and payload construction.

use chrono::{DateTime, SecondsFormat, Utc};
use mmcs_core::Item;
use serde::Serialize;

/// External limit on embeds per webhook message.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

/// Maximum embed title length, including the truncation suffix.
const MAX_TITLE_CHARS: usize = 200;

/// Embed accent color (blue).
const EMBED_COLOR: u32 = 3_447_003;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
}

/// One POST body: a content prelude plus at most ten embeds.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}

/// Truncates an embed title to the platform limit, appending `…` only when
/// truncation actually occurred. Operates on characters, not bytes; item
/// names are routinely Japanese.
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut truncated: String = title.chars().take(MAX_TITLE_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

/// Builds one embed for one item.
pub fn item_embed(item: &Item, search_term: &str, timestamp: DateTime<Utc>) -> Embed {
    let title = if item.name.is_empty() {
        search_term
    } else {
        &item.name
    };
    let price = format!("¥{} (${})", item.price_yen, item.price_usd);
    let media = (!item.image.is_empty()).then(|| EmbedMedia {
        url: item.image.clone(),
    });

    Embed {
        title: truncate_title(title),
        description: format!("Price: {price}"),
        url: item.url.clone(),
        color: EMBED_COLOR,
        fields: vec![
            EmbedField {
                name: "Price".into(),
                value: price,
                inline: true,
            },
            EmbedField {
                name: "Market".into(),
                value: item.shop.human_name().into(),
                inline: true,
            },
        ],
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        footer: EmbedFooter {
            text: format!("MMCS • {search_term}"),
        },
        thumbnail: media.clone(),
        image: media,
    }
}

/// Splits items into webhook payloads of at most ten embeds each, with the
/// first/continuation content preludes.
pub fn build_batches(search_term: &str, items: &[Item], now: DateTime<Utc>) -> Vec<WebhookPayload> {
    let total = items.len();
    items
        .chunks(MAX_EMBEDS_PER_MESSAGE)
        .enumerate()
        .map(|(batch_idx, chunk)| {
            let start = batch_idx * MAX_EMBEDS_PER_MESSAGE;
            let content = if batch_idx == 0 {
                if total > MAX_EMBEDS_PER_MESSAGE {
                    format!(
                        "🔔 **{total} new item(s) found for: {search_term}** (showing first {})",
                        chunk.len()
                    )
                } else {
                    format!("🔔 **{total} new item(s) found for: {search_term}**")
                }
            } else {
                format!(
                    "🔔 **More items for: {search_term}** ({}-{} of {total})",
                    start + 1,
                    start + chunk.len()
                )
            };

            WebhookPayload {
                content,
                embeds: chunk
                    .iter()
                    .map(|item| item_embed(item, search_term, now))
                    .collect(),
            }
        })
        .collect()
}
