// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mmcs-notifier doctor` command implementation.
//!
//! Runs the startup checks without entering the daemon loop: configuration,
//! store credentials, store schema, subscriber count, and signing-secret
//! discovery.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use mmcs_config::{NotifierConfig, load_config, resolve_store_key};
use mmcs_core::NotifierError;
use mmcs_sendico::SendicoClient;
use mmcs_supabase::StoreClient;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    message: String,
    duration: Duration,
}

fn check(name: &'static str, started: Instant, status: CheckStatus, message: String) -> CheckResult {
    CheckResult {
        name,
        status,
        message,
        duration: started.elapsed(),
    }
}

/// Run the `doctor` command. Returns an error (non-zero exit) when any
/// check failed.
pub async fn run_doctor() -> Result<(), NotifierError> {
    let mut results = Vec::new();

    let started = Instant::now();
    let config = match load_config() {
        Ok(config) => {
            results.push(check(
                "config",
                started,
                CheckStatus::Pass,
                format!("store {}", config.store.url),
            ));
            config
        }
        Err(e) => {
            results.push(check("config", started, CheckStatus::Fail, e.to_string()));
            report(&results);
            return Err(NotifierError::Config(e.to_string()));
        }
    };

    let api_key = check_store_key(&config, &mut results);
    if let Some(api_key) = api_key {
        check_store(&config, &api_key, &mut results).await;
    }
    check_secret_discovery(&config, &mut results).await;

    report(&results);

    let failed = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
    if failed > 0 {
        return Err(NotifierError::Config(format!("{failed} check(s) failed")));
    }
    Ok(())
}

fn check_store_key(config: &NotifierConfig, results: &mut Vec<CheckResult>) -> Option<String> {
    let started = Instant::now();
    match resolve_store_key(config) {
        Ok(key) => {
            results.push(check(
                "store key",
                started,
                CheckStatus::Pass,
                "resolved".into(),
            ));
            Some(key)
        }
        Err(e) => {
            results.push(check("store key", started, CheckStatus::Fail, e.to_string()));
            None
        }
    }
}

async fn check_store(config: &NotifierConfig, api_key: &str, results: &mut Vec<CheckResult>) {
    let started = Instant::now();
    let store = match StoreClient::new(&config.store.url, api_key) {
        Ok(store) => store,
        Err(e) => {
            results.push(check("store schema", started, CheckStatus::Fail, e.to_string()));
            return;
        }
    };

    match store.verify_schema().await {
        Ok(()) => results.push(check(
            "store schema",
            started,
            CheckStatus::Pass,
            "table shape verified".into(),
        )),
        Err(e) => {
            results.push(check("store schema", started, CheckStatus::Fail, e.to_string()));
            return;
        }
    }

    let started = Instant::now();
    match store.active_subscriber_count().await {
        Ok(0) => results.push(check(
            "subscribers",
            started,
            CheckStatus::Warn,
            "no active subscribers with webhooks".into(),
        )),
        Ok(count) => results.push(check(
            "subscribers",
            started,
            CheckStatus::Pass,
            format!("{count} active with webhooks"),
        )),
        Err(e) => results.push(check("subscribers", started, CheckStatus::Warn, e.to_string())),
    }
}

async fn check_secret_discovery(config: &NotifierConfig, results: &mut Vec<CheckResult>) {
    let started = Instant::now();
    match SendicoClient::new(&config.sendico.base_url).await {
        Ok(_) => results.push(check(
            "signing secret",
            started,
            CheckStatus::Pass,
            "discovered from landing page".into(),
        )),
        Err(e) => results.push(check("signing secret", started, CheckStatus::Fail, e.to_string())),
    }
}

fn report(results: &[CheckResult]) {
    let use_color = std::io::stdout().is_terminal();

    println!();
    println!("  mmcs-notifier doctor");
    println!("  {}", "-".repeat(50));

    for result in results {
        let duration_ms = result.duration.as_millis();
        let line = if use_color {
            use colored::Colorize;
            match result.status {
                CheckStatus::Pass => format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✓".green(),
                    result.name,
                    result.message
                ),
                CheckStatus::Warn => format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "!".yellow(),
                    result.name,
                    result.message.yellow()
                ),
                CheckStatus::Fail => format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✗".red(),
                    result.name,
                    result.message.red()
                ),
            }
        } else {
            let tag = match result.status {
                CheckStatus::Pass => "[OK]  ",
                CheckStatus::Warn => "[WARN]",
                CheckStatus::Fail => "[FAIL]",
            };
            format!(
                "    {tag} {:<16} {} ({duration_ms}ms)",
                result.name, result.message
            )
        };
        println!("{line}");
    }
    println!();
}
