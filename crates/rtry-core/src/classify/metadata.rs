use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Lowercase header name -> values in encounter order (deduplicated).
pub type Headers = BTreeMap<String, Vec<String>>;

/// Key/value context handed to each attempt; patches overwrite keys.
pub type Context = BTreeMap<String, Value>;

/// Structured retry hints derived from one failure.
///
/// Rules emit fragments of this; the classifier merges them into one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureMetadata {
    pub status_code: Option<u16>,
    /// Deduplicated, insertion order preserved.
    pub tags: Vec<String>,
    /// Merged into the context of the next attempt.
    pub context_patch: Context,
    /// Floor on the next delay.
    pub min_next_delay_ms: Option<u64>,
    /// Earliest Unix epoch millisecond at which the next attempt may start.
    pub not_before_unix_ms: Option<i64>,
    /// Headers that produced these hints, for diagnostics.
    pub headers: Headers,
}

impl FailureMetadata {
    pub fn new(status_code: Option<u16>) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            push_unique(&mut self.tags, tag.into());
        }
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_patch.insert(key.into(), value.into());
        self
    }

    pub fn with_min_next_delay_ms(mut self, ms: u64) -> Self {
        self.min_next_delay_ms = Some(ms);
        self
    }

    pub fn with_not_before_unix_ms(mut self, ms: i64) -> Self {
        self.not_before_unix_ms = Some(ms);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let values = self.headers.entry(name.to_ascii_lowercase()).or_default();
        push_unique(values, value.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Fold a later fragment into this one.
    ///
    /// Later non-null status wins, tags union, context keys overwrite,
    /// min-delay and not-before keep the maximum, headers append per name.
    pub fn merge(&mut self, later: FailureMetadata) {
        if later.status_code.is_some() {
            self.status_code = later.status_code;
        }
        for tag in later.tags {
            push_unique(&mut self.tags, tag);
        }
        self.context_patch.extend(later.context_patch);
        self.min_next_delay_ms = max_opt(self.min_next_delay_ms, later.min_next_delay_ms);
        self.not_before_unix_ms = max_opt(self.not_before_unix_ms, later.not_before_unix_ms);
        for (name, values) in later.headers {
            let merged = self.headers.entry(name.to_ascii_lowercase()).or_default();
            for v in values {
                push_unique(merged, v);
            }
        }
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
