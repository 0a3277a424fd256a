use chrono::{DateTime, NaiveDateTime};
use std::collections::BTreeMap;

use super::Rule;
use crate::classify::failure::{Accessor, Failure, HttpResponse};
use crate::classify::metadata::FailureMetadata;
use crate::classify::tokens::RATE_LIMITED;

/// `x-ratelimit-reset` values at or above this are epoch milliseconds, not seconds.
const EPOCH_MS_THRESHOLD: f64 = 1e12;

/// Turns rate-limit response headers into delay hints.
///
/// Recognised, first match wins: `retry-after` (seconds or HTTP date),
/// `ratelimit-reset-after` / `x-ratelimit-reset-after` (seconds),
/// `x-ratelimit-reset-ms` (epoch ms), `ratelimit-reset` / `x-ratelimit-reset`
/// (epoch seconds, or epoch ms when the value is large enough).
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitBackoff;

#[derive(Debug, PartialEq)]
enum Hint {
    Delay(u64),
    NotBefore(i64),
}

impl Rule for RateLimitBackoff {
    fn apply(&self, err: &dyn Failure) -> Vec<FailureMetadata> {
        let response = match err.accessor("response") {
            Accessor::Response(r) => r,
            _ => return Vec::new(),
        };
        let headers = first_values(response);
        let Some((hint, used)) = hint_from_headers(&headers) else {
            return Vec::new();
        };

        let status = (response.status >= 400).then_some(response.status);
        let mut meta = FailureMetadata::new(status).with_tags([RATE_LIMITED]);
        meta = match hint {
            Hint::Delay(ms) => meta.with_min_next_delay_ms(ms),
            Hint::NotBefore(ms) => meta.with_not_before_unix_ms(ms),
        };
        if let Some(value) = headers.get(used) {
            meta = meta.with_header(used, value.clone());
        }
        vec![meta]
    }
}

/// Lowercased header name -> first non-empty trimmed value.
fn first_values(response: &HttpResponse) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in &response.headers {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        out.entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
    }
    out
}

fn hint_from_headers(headers: &BTreeMap<String, String>) -> Option<(Hint, &'static str)> {
    if let Some(raw) = headers.get("retry-after") {
        if let Some(secs) = numeric(raw) {
            return Some((Hint::Delay(seconds_to_ms(secs)), "retry-after"));
        }
        if let Some(at) = parse_http_date(raw) {
            return Some((Hint::NotBefore(at), "retry-after"));
        }
        tracing::debug!(value = %raw, "unrecognised retry-after value");
    }

    for key in ["ratelimit-reset-after", "x-ratelimit-reset-after"] {
        if let Some(secs) = headers.get(key).and_then(|v| numeric(v)) {
            return Some((Hint::Delay(seconds_to_ms(secs)), key));
        }
    }

    if let Some(ms) = headers.get("x-ratelimit-reset-ms").and_then(|v| numeric(v)) {
        let ms = ms as i64;
        if ms > 0 {
            return Some((Hint::NotBefore(ms), "x-ratelimit-reset-ms"));
        }
    }

    for key in ["ratelimit-reset", "x-ratelimit-reset"] {
        let Some(n) = headers.get(key).and_then(|v| numeric(v)) else {
            continue;
        };
        if n <= 0.0 {
            continue;
        }
        let ms = if n >= EPOCH_MS_THRESHOLD {
            n as i64
        } else {
            (n * 1000.0).round() as i64
        };
        return Some((Hint::NotBefore(ms), key));
    }

    None
}

fn numeric(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn seconds_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round().max(0.0) as u64
}

/// IMF-fixdate, RFC 850 and asctime forms, as Unix epoch milliseconds.
fn parse_http_date(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}
