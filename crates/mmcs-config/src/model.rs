// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the MMCS notifier.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level notifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Subscriber store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Marketplace aggregator settings.
    #[serde(default)]
    pub sendico: SendicoConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sendico: SendicoConfig::default(),
        }
    }
}

/// Subscriber store (Supabase REST) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the Supabase project.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Service-role key. Preferred: bypasses row-level security so all
    /// subscriber rows are visible.
    #[serde(default)]
    pub service_role_key: Option<String>,

    /// Anonymous key. Fallback only; logged with a warning.
    #[serde(default)]
    pub anon_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            service_role_key: None,
            anon_key: None,
        }
    }
}

fn default_store_url() -> String {
    "https://wbpfuuiznsmysbskywdx.supabase.co".to_string()
}

/// Marketplace aggregator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendicoConfig {
    /// Base URL of the aggregator.
    #[serde(default = "default_sendico_url")]
    pub base_url: String,
}

impl Default for SendicoConfig {
    fn default() -> Self {
        Self {
            base_url: default_sendico_url(),
        }
    }
}

fn default_sendico_url() -> String {
    "https://sendico.com".to_string()
}
