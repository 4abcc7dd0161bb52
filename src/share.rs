//! Shareable URLs, via the `config` query parameter.
//!
//! Also reads the older multi-parameter format (`mv`, `t0_freq`,
//! `t0_vol`, ...) so links created before the single-token format still
//! load. Legacy values are plain numbers and lowercase words, so no
//! percent-decoding is attempted.

use serde_json::{Map, Number, Value};

use crate::codec::{self, MAX_DECODED_TONES, SharedConfig};
use crate::error::DecodeError;

/// Query parameter carrying the configuration token.
pub const CONFIG_PARAM: &str = "config";

const LEGACY_MASTER: &str = "mv";

/// Split a query string (leading `?` optional) into key/value pairs.
fn pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
}

/// First value of `key` in `query`.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    pairs(query).find(|(k, _)| *k == key).map(|(_, v)| v)
}

/// Split a legacy per-tone key like `t3_freq` into `(3, "freq")`.
fn legacy_tone_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix('t')?;
    let (index, suffix) = rest.split_once('_')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((index.parse().ok()?, suffix))
}

fn is_config_key(key: &str) -> bool {
    key == CONFIG_PARAM || key == LEGACY_MASTER || legacy_tone_key(key).is_some()
}

/// Configuration carried by a query string, if any.
///
/// The `config` token wins; otherwise the legacy parameters are read.
/// `None` means the query carries no configuration at all.
pub fn config_from_query(query: &str) -> Option<Result<SharedConfig, DecodeError>> {
    if let Some(token) = query_param(query, CONFIG_PARAM) {
        return Some(codec::decode(token));
    }
    let has_legacy = pairs(query).any(|(k, _)| k == LEGACY_MASTER || k == "t0_freq");
    has_legacy.then(|| decode_legacy_query(query))
}

/// Read the legacy multi-parameter format.
///
/// Tones are read from index 0 upward while `t<N>_freq` is present,
/// with the same per-field clamping and defaults as token decoding.
pub fn decode_legacy_query(query: &str) -> Result<SharedConfig, DecodeError> {
    let mut tones: Vec<Map<String, Value>> = Vec::new();
    let mut master = Value::Null;

    // Group every t<N>_<field> pair by N first; order in the query is free.
    let mut fields: Vec<(usize, &str, &str)> = Vec::new();
    for (key, raw) in pairs(query) {
        if key == LEGACY_MASTER {
            master = scalar(raw);
        } else if let Some((index, suffix)) = legacy_tone_key(key) {
            if index < MAX_DECODED_TONES {
                fields.push((index, suffix, raw));
            }
        }
    }

    let mut index = 0;
    while fields.iter().any(|(i, s, _)| *i == index && *s == "freq") {
        let mut tone = Map::new();
        for (_, suffix, raw) in fields.iter().filter(|(i, _, _)| *i == index) {
            if let Some(key) = codec::legacy_key(suffix) {
                tone.insert(key.to_string(), scalar(raw));
            }
        }
        tones.push(tone);
        index += 1;
    }

    let mut payload = Map::new();
    payload.insert("mv".to_string(), master);
    payload.insert(
        "t".to_string(),
        Value::Array(tones.into_iter().map(Value::Object).collect()),
    );
    codec::from_payload(&Value::Object(payload))
}

/// A raw query value as JSON: a number when it parses as a finite one.
fn scalar(raw: &str) -> Value {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Rewrite `base_url`'s query, dropping any configuration parameters and
/// appending `extra` pairs. The fragment is kept.
fn rewrite(base_url: &str, extra: Option<(&str, &str)>) -> String {
    let (without_fragment, fragment) = match base_url.split_once('#') {
        Some((u, f)) => (u, Some(f)),
        None => (base_url, None),
    };
    let (path, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let mut kept: Vec<String> = pairs(query)
        .filter(|(k, _)| !is_config_key(k))
        .map(|(k, v)| if v.is_empty() { k.to_string() } else { format!("{k}={v}") })
        .collect();
    if let Some((k, v)) = extra {
        kept.push(format!("{k}={v}"));
    }

    let mut url = path.to_string();
    if !kept.is_empty() {
        url.push('?');
        url.push_str(&kept.join("&"));
    }
    if let Some(f) = fragment {
        url.push('#');
        url.push_str(f);
    }
    url
}

/// `base_url` with its configuration replaced by `token`.
pub fn share_url(base_url: &str, token: &str) -> String {
    rewrite(base_url, Some((CONFIG_PARAM, token)))
}

/// `base_url` with every configuration parameter removed.
pub fn strip_config(base_url: &str) -> String {
    rewrite(base_url, None)
}
