// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord webhook delivery for the MMCS notifier.
//!
//! [`embed`] turns items into batched webhook payloads within the
//! platform's 10-embed limit; [`webhook`] posts them, honoring the
//! `retry_after` rate-limit contract.

pub mod embed;
pub mod webhook;

pub use embed::build_batches;
pub use webhook::WebhookClient;
