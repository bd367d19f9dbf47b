// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signing-secret discovery from the aggregator landing page.
//!
//! The landing page embeds a Nuxt data script: a flattened JSON array in
//! which objects reference other array slots by index. The slot referenced
//! under `$sapi_tokens` holds an array of candidate-key pointers; the last
//! candidate, decoded, is the current signing secret.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use mmcs_core::NotifierError;
use serde_json::Value;

/// The id of the embedded data script on the landing page.
const NUXT_DATA_ID: &str = "__NUXT_DATA__";

/// The key whose value points at the candidate-key array.
const TOKENS_KEY: &str = "$sapi_tokens";

/// Extracts the signing secret from the landing page HTML.
pub fn parse_secret(html: &str) -> Result<String, NotifierError> {
    let payload = extract_nuxt_payload(html)
        .ok_or_else(|| NotifierError::SecretNotFound("data script tag not found".into()))?;

    let nodes: Vec<Value> = serde_json::from_str(payload).map_err(|e| {
        NotifierError::SecretNotFound(format!("data script is not a JSON array: {e}"))
    })?;

    let ptr = nodes
        .iter()
        .find_map(|node| node.as_object()?.get(TOKENS_KEY)?.as_u64())
        .ok_or_else(|| {
            NotifierError::SecretNotFound("no reference to the secret key array".into())
        })?;

    let key_ptrs = nodes
        .get(ptr as usize)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            NotifierError::SecretNotFound("secret key reference points at a non-array".into())
        })?;

    let mut candidates = Vec::with_capacity(key_ptrs.len());
    for key_ptr in key_ptrs {
        let idx = key_ptr.as_u64().ok_or_else(|| {
            NotifierError::SecretNotFound("candidate pointer is not an index".into())
        })?;
        let key = nodes
            .get(idx as usize)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NotifierError::SecretNotFound("candidate pointer resolves to a non-string".into())
            })?;
        candidates.push(key);
    }

    let last = candidates
        .last()
        .ok_or_else(|| NotifierError::SecretNotFound("candidate key array is empty".into()))?;

    decode_secret(last)
}

/// Returns the JSON text of the embedded data script, if present.
fn extract_nuxt_payload(html: &str) -> Option<&str> {
    let id_pos = html.find(NUXT_DATA_ID)?;
    let open_end = html[id_pos..].find('>')? + id_pos + 1;
    let close = html[open_end..].find("</script>")? + open_end;
    Some(html[open_end..close].trim())
}

/// Decodes an embedded candidate key into the usable secret.
///
/// Candidates are stored reversed and base64-encoded.
pub fn decode_secret(candidate: &str) -> Result<String, NotifierError> {
    let unreversed: String = candidate.chars().rev().collect();
    let bytes = BASE64.decode(unreversed.as_bytes()).map_err(|e| {
        NotifierError::SecretNotFound(format!("candidate key is not valid base64: {e}"))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| NotifierError::SecretNotFound(format!("decoded key is not UTF-8: {e}")))
}
