use super::Rule;
use crate::classify::failure::{Accessor, Failure};
use crate::classify::metadata::FailureMetadata;

const DEFAULT_ACCESSORS: [&str; 2] = ["response", "code"];

/// Pulls a status code out of the failure by probing named accessors in order.
///
/// An accessor yielding a response contributes its status; one yielding an
/// integer contributes it when it is in the HTTP range. Missing and failing
/// accessors are skipped.
#[derive(Debug, Clone)]
pub struct MethodStatus {
    accessors: Vec<String>,
    tags: Vec<String>,
}

impl Default for MethodStatus {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESSORS)
    }
}

impl MethodStatus {
    pub fn new<I, S>(accessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accessors: accessors.into_iter().map(Into::into).collect(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

impl Rule for MethodStatus {
    fn apply(&self, err: &dyn Failure) -> Vec<FailureMetadata> {
        for name in &self.accessors {
            let status = match err.accessor(name) {
                Accessor::Response(r) => Some(r.status),
                Accessor::Int(n) if (100..=599).contains(&n) => u16::try_from(n).ok(),
                Accessor::Int(_) | Accessor::Missing | Accessor::Failed => None,
            };
            if let Some(status) = status {
                return vec![FailureMetadata::new(Some(status)).with_tags(self.tags.iter().cloned())];
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{HttpResponse, OperationError};
    use std::fmt;

    #[derive(Debug)]
    struct Flaky;

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("flaky")
        }
    }

    impl std::error::Error for Flaky {}

    impl Failure for Flaky {
        fn accessor(&self, name: &str) -> Accessor<'_> {
            match name {
                "status" => Accessor::Failed,
                "http_code" => Accessor::Int(502),
                _ => Accessor::Missing,
            }
        }
    }

    #[test]
    fn response_status_wins_over_code() {
        let e = OperationError::new("x")
            .with_response(HttpResponse::new(503))
            .with_code(404);
        let out = MethodStatus::default().apply(&e);
        assert_eq!(out[0].status_code, Some(503));
    }

    #[test]
    fn out_of_range_code_is_ignored() {
        let e = OperationError::new("x").with_code(42);
        assert!(MethodStatus::default().apply(&e).is_empty());
    }

    #[test]
    fn failing_accessors_are_skipped() {
        let rule = MethodStatus::new(["status", "missing", "http_code"]).with_tags(["UPSTREAM"]);
        let out = rule.apply(&Flaky);
        assert_eq!(out[0].status_code, Some(502));
        assert_eq!(out[0].tags, ["UPSTREAM"]);
    }
}
