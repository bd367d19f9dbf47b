// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only client for the subscriber store (Supabase REST).
//!
//! Fetches the cycle-local subscriber snapshot, verifies the table schema at
//! startup, and applies the two ingest salvage heuristics: webhook URLs with
//! JSON accidentally appended, and the array-or-string polymorphism of the
//! notifications column.

pub mod store;

pub use store::StoreClient;
