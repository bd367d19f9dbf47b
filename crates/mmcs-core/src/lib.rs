// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the MMCS marketplace notifier.
//!
//! This crate provides the error type, domain types, market set handling,
//! and the clothing keyword filter shared by the rest of the workspace.
//! It has no I/O of its own.

pub mod clothing;
pub mod error;
pub mod markets;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::NotifierError;
pub use types::{Item, Notification, Shop, Subscriber, mask_webhook_url};
