// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The processing engine of the MMCS notifier.
//!
//! Owns all process-wide shared state — the translation and search caches
//! and the two dedup maps — and drives the periodic cycle over subscribers.

pub mod caches;
pub mod cycle;
pub mod seen;

pub use cycle::Engine;
