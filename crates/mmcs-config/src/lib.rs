// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the MMCS notifier.
//!
//! Endpoints and credentials live here; runtime tunables (tick interval,
//! concurrency caps, TTLs) are compile-time constants in the crates that
//! own them.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_str, resolve_store_key};
pub use model::NotifierConfig;
