//! Merchant key resolution and display-name derivation.
//!
//! Everything here treats its input as hostile: the functions return `None`
//! (or a placeholder name) instead of failing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::UNKNOWN_MERCHANT;

const MAX_KEY_LEN: usize = 100;
const MAX_PAYLOAD_BYTES: usize = 4096;
const MAX_PAYLOAD_DEPTH: usize = 8;

/// Keys that would reach inherited fields in the page's own object model.
const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Longest first, so `.co.uk` wins over `.co`.
const KNOWN_SUFFIXES: &[&str] = &[
    ".co.uk", ".com.au", ".store", ".shop", ".com", ".net", ".org", ".biz", ".co", ".io", ".us",
];

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$")
        .expect("domain pattern is valid")
});

/// `true` for domain-like keys: dot-separated alphanumeric/hyphen labels,
/// 1 to 100 characters, no empty label, no label starting or ending with a hyphen.
pub fn is_valid_merchant_key(key: &str) -> bool {
    (1..=MAX_KEY_LEN).contains(&key.len()) && DOMAIN_RE.is_match(key)
}

/// The trimmed key, case preserved so the display name can split on it.
fn validated(key: &str) -> Option<String> {
    let key = key.trim();
    is_valid_merchant_key(key).then(|| key.to_string())
}

/// Decode the JSON payload embedded in a tile marker and pull the merchant key out of it.
pub fn from_payload(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() > MAX_PAYLOAD_BYTES || !raw.starts_with('{') || !raw.ends_with('}') {
        return None;
    }

    let value: Value = serde_json::from_str(raw).ok()?;
    if !value.is_object() || !is_plain(&value, 0) {
        return None;
    }

    let key = value
        .get("inventory")
        .and_then(|inventory| inventory.get("merchantTLD"))
        .or_else(|| value.get("merchantTLD"))
        .and_then(Value::as_str)?;

    validated(key)
}

/// Plain data only: bounded depth and no inherited-field keys at any level.
fn is_plain(value: &Value, depth: usize) -> bool {
    if depth > MAX_PAYLOAD_DEPTH {
        return false;
    }
    match value {
        Value::Object(map) => map.iter().all(|(key, child)| {
            !FORBIDDEN_KEYS.contains(&key.as_str()) && is_plain(child, depth + 1)
        }),
        Value::Array(items) => items.iter().all(|child| is_plain(child, depth + 1)),
        _ => true,
    }
}

/// Read a merchant key from the query parameter `param` of `url`.
pub fn from_query(url: &str, param: &str, percent_decode: bool) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    let raw = query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == param).then_some(value)
    })?;

    if percent_decode {
        let spaced = raw.replace('+', " ");
        let decoded = urlencoding::decode(&spaced).ok()?;
        validated(&decoded)
    } else {
        validated(raw)
    }
}

/// Human-readable name for a merchant key.
///
/// `bestBuy.com` becomes `Best Buy`, `1-800-flowers.com` becomes `1 800 Flowers`.
pub fn display_name(merchant_key: &str) -> String {
    let key = merchant_key.trim();
    let lower = key.to_ascii_lowercase();
    let base = KNOWN_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix) && lower.len() > suffix.len())
        .map_or(key, |suffix| &key[..key.len() - suffix.len()]);

    let name = fragments(base)
        .iter()
        .map(|fragment| title_case(fragment))
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        UNKNOWN_MERCHANT.to_string()
    } else {
        name
    }
}

fn fragments(base: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in base.chars() {
        if matches!(ch, '.' | '-' | '_' | '+' | ' ') {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase();
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn title_case(fragment: &str) -> String {
    let mut chars = fragment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
