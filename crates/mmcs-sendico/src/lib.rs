// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-signed client for the Sendico marketplace aggregator.
//!
//! [`SendicoClient`] handles request signing, signing-secret discovery and
//! refresh, transient-error retry with backoff, translation, and the
//! bounded-concurrency search fan-out across shops.

pub mod client;
pub mod secret;
pub mod sign;
pub mod types;

pub use client::SendicoClient;
pub use types::SearchOptions;
