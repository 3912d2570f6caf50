//! Keyed integrity tags for metric payloads.
//!
//! The tag is an HMAC-SHA256 over `"{id}:{type}:{delta}"` followed by
//! `"{id}:{type}:{value}"` (value printed with six decimals), each part
//! present only when the corresponding field is set. Tags are hex-encoded.
//! An empty key disables tagging: the tag is the empty string.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Builds the string the MAC is computed over.
///
/// # Examples
///
/// ```
/// use oxmetrics_common::hash::signing_input;
///
/// assert_eq!(signing_input("PollCount", "counter", Some(5), None), "PollCount:counter:5");
/// assert_eq!(signing_input("Alloc", "gauge", None, Some(1.5)), "Alloc:gauge:1.500000");
/// ```
pub fn signing_input(id: &str, kind: &str, delta: Option<i64>, value: Option<f64>) -> String {
    let mut input = String::new();
    if let Some(delta) = delta {
        input.push_str(&format!("{id}:{kind}:{delta}"));
    }
    if let Some(value) = value {
        input.push_str(&format!("{id}:{kind}:{value:.6}"));
    }
    input
}

fn mac_for(key: &str, id: &str, kind: &str, delta: Option<i64>, value: Option<f64>) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signing_input(id, kind, delta, value).as_bytes());
    mac
}

/// Computes the hex-encoded tag, or an empty string when `key` is empty.
pub fn integrity_tag(
    key: &str,
    id: &str,
    kind: &str,
    delta: Option<i64>,
    value: Option<f64>,
) -> String {
    if key.is_empty() {
        return String::new();
    }
    hex::encode(mac_for(key, id, kind, delta, value).finalize().into_bytes())
}

/// Verifies `tag` against the fields in constant time.
///
/// With an empty key every tag is accepted. With a non-empty key an empty or
/// malformed tag is rejected.
pub fn verify_tag(
    key: &str,
    id: &str,
    kind: &str,
    delta: Option<i64>,
    value: Option<f64>,
    tag: &str,
) -> bool {
    if key.is_empty() {
        return true;
    }
    let Ok(expected) = hex::decode(tag) else {
        return false;
    };
    mac_for(key, id, kind, delta, value)
        .verify_slice(&expected)
        .is_ok()
}
