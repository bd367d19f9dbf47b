// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < `/etc/mmcs/mmcs.toml` < XDG config <
//! `./mmcs.toml` < `MMCS_*` environment variables. The subscriber store key
//! additionally honors the deployment contract of `SUPABASE_SERVICE_ROLE_KEY`
//! and `SUPABASE_ANON_KEY`, with an interactive prompt as the last resort.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use mmcs_core::NotifierError;
use tracing::warn;

use crate::model::NotifierConfig;

/// Environment variable for the preferred (RLS-bypassing) store key.
pub const SERVICE_ROLE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Environment variable for the fallback store key.
pub const ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<NotifierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NotifierConfig::default()))
        .merge(Toml::file("/etc/mmcs/mmcs.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mmcs/mmcs.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mmcs.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (for tests).
pub fn load_config_from_str(toml_content: &str) -> Result<NotifierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NotifierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// key names stay unambiguous: `MMCS_STORE_SERVICE_ROLE_KEY` maps to
/// `store.service_role_key`, not `store.service.role.key`.
fn env_provider() -> Env {
    Env::prefixed("MMCS_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("store_", "store.", 1)
            .replacen("sendico_", "sendico.", 1);
        mapped.into()
    })
}

/// Resolve the subscriber store API key.
///
/// Priority:
/// 1. `SUPABASE_SERVICE_ROLE_KEY` env var, then the config field
/// 2. `SUPABASE_ANON_KEY` env var, then the config field (warned: the anon
///    key is subject to row-level security and may hide subscriber rows)
/// 3. Interactive TTY prompt
///
/// Returns [`NotifierError::Config`] when no source yields a key.
pub fn resolve_store_key(config: &NotifierConfig) -> Result<String, NotifierError> {
    if let Ok(key) = std::env::var(SERVICE_ROLE_KEY_ENV)
        && !key.is_empty()
    {
        return Ok(key);
    }
    if let Some(key) = config.store.service_role_key.as_deref()
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    let anon = std::env::var(ANON_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| {
            config
                .store
                .anon_key
                .clone()
                .filter(|k| !k.is_empty())
        });
    if let Some(key) = anon {
        warn!("using anon key; service-role key is required to see all subscriber rows");
        return Ok(key);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        eprint!("Supabase service-role key (or anon key): ");
        let key = rpassword::read_password()
            .map_err(|e| NotifierError::Config(format!("failed to read store key: {e}")))?;
        if key.is_empty() {
            return Err(NotifierError::Config("store API key is required".into()));
        }
        return Ok(key);
    }

    Err(NotifierError::Config(format!(
        "no store API key; set {SERVICE_ROLE_KEY_ENV} or {ANON_KEY_ENV}, or run interactively"
    )))
}
