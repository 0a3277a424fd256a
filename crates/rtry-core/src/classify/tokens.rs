//! Failure tokens and tags derived directly from an error chain.

use std::error::Error as StdError;
use std::io;

use super::failure::{is_network_kind, AsDynError, Failure, OperationError};
use super::metadata::push_unique;

pub const CLASS_5XX: &str = "5XX";
pub const CLASS_4XX: &str = "4XX";
pub const ETIMEDOUT: &str = "ETIMEDOUT";
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const ECONNRESET: &str = "ECONNRESET";
pub const ECONNREFUSED: &str = "ECONNREFUSED";
pub const DEADLOCK: &str = "DEADLOCK";
pub const RATE_LIMITED: &str = "RATE_LIMITED";

/// What `on = []`, `default` or `standard` expands to.
pub const DEFAULTS: [&str; 7] = [
    CLASS_5XX,
    ETIMEDOUT,
    NETWORK_ERROR,
    ECONNRESET,
    ECONNREFUSED,
    DEADLOCK,
    RATE_LIMITED,
];

const TIMEOUT_PHRASES: &[&str] = &["timeout", "timed out"];
const RESET_PHRASES: &[&str] = &["connection reset"];
const REFUSED_PHRASES: &[&str] = &["refused"];
const NETWORK_PHRASES: &[&str] = &[
    "network error",
    "network timeout",
    "network is unreachable",
    "host unreachable",
    "no route to host",
];
const DEADLOCK_PHRASES: &[&str] = &[
    "deadlock",
    "lock wait timeout exceeded",
    "database is locked",
    "could not serialize access",
    "serialization failure",
];
const DEADLOCK_SQL_STATES: &[&str] = &["40001", "40P01"];
const DEADLOCK_VENDOR_CODES: &[i64] = &[1213, 1205];

/// True for tokens that ask for rate-limit handling (`429`, `RATE_LIMITED`, `THROTTLED`, ...).
pub fn is_rate_limit_token(token: &str) -> bool {
    let t = token.trim().to_ascii_uppercase();
    t == "429"
        || t.starts_with("RATE_LIMIT")
        || t == "TOO_MANY_REQUESTS"
        || t.starts_with("THROTTL")
        || (t.contains("RATE") && t.contains("LIMIT"))
}

/// Tags implied by the error itself and every error in its `source()` chain.
pub fn derive_tags(err: &dyn Failure) -> Vec<String> {
    let mut tags = Vec::new();
    let mut add = |tag: &str| push_unique(&mut tags, tag.to_string());

    if err.is_network_failure() {
        add(NETWORK_ERROR);
    }
    if err
        .db_error()
        .is_some_and(|db| is_deadlock_code(db.sql_state, db.vendor_code))
    {
        add(DEADLOCK);
    }

    let mut link: Option<&(dyn StdError + 'static)> = Some(err.as_dyn_error());
    while let Some(e) = link {
        let message = e.to_string().to_ascii_lowercase();
        if contains_any(&message, TIMEOUT_PHRASES) {
            add(ETIMEDOUT);
        }
        if contains_any(&message, RESET_PHRASES) {
            add(ECONNRESET);
        }
        if contains_any(&message, REFUSED_PHRASES) {
            add(ECONNREFUSED);
        }
        if contains_any(&message, NETWORK_PHRASES) {
            add(NETWORK_ERROR);
        }
        if contains_any(&message, DEADLOCK_PHRASES) {
            add(DEADLOCK);
        }

        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut => add(ETIMEDOUT),
                io::ErrorKind::ConnectionReset => add(ECONNRESET),
                io::ErrorKind::ConnectionRefused => add(ECONNREFUSED),
                _ => {}
            }
            if is_network_kind(io_err.kind()) {
                add(NETWORK_ERROR);
            }
        }
        if let Some(op) = e.downcast_ref::<OperationError>() {
            if op.is_network_failure() {
                add(NETWORK_ERROR);
            }
            if op
                .db_error()
                .is_some_and(|db| is_deadlock_code(db.sql_state, db.vendor_code))
            {
                add(DEADLOCK);
            }
        }

        link = e.source();
    }

    // Stable order regardless of which link produced a tag first.
    let order = [ETIMEDOUT, ECONNRESET, ECONNREFUSED, NETWORK_ERROR, DEADLOCK];
    tags.sort_by_key(|t| order.iter().position(|o| o == t));
    tags
}

fn is_deadlock_code(sql_state: Option<&str>, vendor_code: Option<i64>) -> bool {
    sql_state.is_some_and(|s| DEADLOCK_SQL_STATES.contains(&s.to_ascii_uppercase().as_str()))
        || vendor_code.is_some_and(|c| DEADLOCK_VENDOR_CODES.contains(&c))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
