//! Human-readable duration tokens (`250`, `1.5s`, `2m`, `1h`) to and from milliseconds.
//!
//! Tokens without a unit are milliseconds. Formatting picks the shortest
//! rendering, preferring larger units on ties.

use crate::error::DurationError;

const UNITS: [(&str, u64); 3] = [("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parse a duration token into milliseconds.
///
/// Accepts `<digits>[.<digits>][ms|s|m|h]`, case-insensitive, surrounding
/// whitespace ignored. Fractional results are rounded to the nearest millisecond.
pub fn parse_ms(token: &str) -> Result<u64, DurationError> {
    let t = token.trim().to_ascii_lowercase();
    let invalid = || DurationError::InvalidFormat(token.to_string());

    let split = t
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(t.len());
    let (number, unit) = t.split_at(split);
    if !is_decimal(number) {
        return Err(invalid());
    }
    let n: f64 = number.parse().map_err(|_| invalid())?;

    let factor = match unit {
        "" | "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return Err(invalid()),
    };
    Ok((n * factor).round() as u64)
}

/// `[0-9]+(\.[0-9]+)?`
fn is_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    match parts.next() {
        Some(frac) => all_digits(int) && all_digits(frac),
        None => all_digits(int),
    }
}

/// Format milliseconds as the most compact token.
///
/// `0` is `0ms`; anything under a second is bare milliseconds (`250`). Larger
/// values try `s`, `m` and `h` with up to two decimals and keep the shortest
/// string; a unit is skipped when the value in that unit is below 1.
pub fn format_ms(ms: u64) -> String {
    if ms == 0 {
        return "0ms".to_string();
    }
    if ms < 1_000 {
        return ms.to_string();
    }

    let mut best = format!("{ms}ms");
    for (suffix, unit_ms) in UNITS {
        let value = ms as f64 / unit_ms as f64;
        if value < 1.0 {
            continue;
        }
        let candidate = format!("{}{}", trim_decimals(&format!("{value:.2}")), suffix);
        // UNITS ascends, so `<=` lets the larger unit win a tie.
        if candidate.len() <= best.len() {
            best = candidate;
        }
    }
    best
}

/// Format a percentage with up to three decimals, e.g. `12.5%`. Negative input clamps to `0%`.
pub fn format_percent(p: f64) -> String {
    let p = if p.is_finite() { p.max(0.0) } else { 0.0 };
    format!("{}%", trim_decimals(&format!("{p:.3}")))
}

fn trim_decimals(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!(parse_ms("250").unwrap(), 250);
        assert_eq!(parse_ms("250ms").unwrap(), 250);
        assert_eq!(parse_ms("1.5s").unwrap(), 1500);
        assert_eq!(parse_ms("2m").unwrap(), 120_000);
        assert_eq!(parse_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_ms(" 3S ").unwrap(), 3000);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "  ", "ms", "1.", ".5s", "1.5.2s", "10d", "-1s", "1 s"] {
            assert_eq!(
                parse_ms(bad),
                Err(DurationError::InvalidFormat(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn sub_second_is_bare_millis() {
        assert_eq!(format_ms(1), "1");
        assert_eq!(format_ms(250), "250");
        assert_eq!(format_ms(999), "999");
        assert_eq!(format_ms(0), "0ms");
    }

    #[test]
    fn seconds_and_above_choose_compact_unit() {
        assert_eq!(format_ms(1000), "1s");
        assert_eq!(format_ms(1500), "1.5s");
        assert_eq!(format_ms(60_000), "1m");
        assert_eq!(format_ms(61_000), "61s");
        assert_eq!(format_ms(90_000), "90s");
        assert_eq!(format_ms(3_600_000), "1h");
        assert_eq!(format_ms(5_400_000), "90m");
        assert_eq!(format_ms(7_200_000), "2h");
    }

    #[test]
    fn format_then_parse_for_compact_values() {
        for ms in [1, 250, 1000, 1500, 4000, 60_000, 3_600_000] {
            assert_eq!(parse_ms(&format_ms(ms)).unwrap(), ms);
        }
    }

    #[test]
    fn percent_trims_trailing_zeros() {
        assert_eq!(format_percent(20.0), "20%");
        assert_eq!(format_percent(12.5), "12.5%");
        assert_eq!(format_percent(0.1234), "0.123%");
        assert_eq!(format_percent(-3.0), "0%");
    }
}
