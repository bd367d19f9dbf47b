// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request signing for the aggregator API.
//!
//! Every API call carries three headers computed here: signature, nonce,
//! and timestamp. The signature is an HMAC-SHA256 over the request path,
//! the canonical parameter string (insertion order), the nonce, and the
//! unix timestamp, joined by newlines and hex-encoded.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Sendico-Signature";
/// Header carrying the request nonce.
pub const NONCE_HEADER: &str = "X-Sendico-Nonce";
/// Header carrying the unix timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Sendico-Timestamp";

/// The three signed header values for one request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature: String,
    pub nonce: String,
    pub timestamp: i64,
}

/// Canonical form of the ordered request parameters: `k=v` joined by `&`.
pub fn canonical_payload(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Computes the signature for `path` + `params` at `timestamp` with `nonce`.
pub fn sign(
    secret: &str,
    path: &str,
    params: &[(String, String)],
    nonce: &str,
    timestamp: i64,
) -> String {
    let message = format!(
        "{path}\n{payload}\n{nonce}\n{timestamp}",
        payload = canonical_payload(params)
    );
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signs a request with a fresh random nonce and the current time.
pub fn sign_request(secret: &str, path: &str, params: &[(String, String)]) -> SignedHeaders {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = hex::encode(nonce_bytes);
    let timestamp = chrono::Utc::now().timestamp();

    SignedHeaders {
        signature: sign(secret, path, params, &nonce, timestamp),
        nonce,
        timestamp,
    }
}
