use super::failure::Failure;
use super::metadata::FailureMetadata;
use super::rules::{AsAnyRule, Rule};
use super::tokens::derive_tags;

/// Ordered rule set that turns a failure into one merged [`FailureMetadata`].
#[derive(Debug, Default)]
pub struct Classifier {
    rules: Vec<Box<dyn Rule>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn add_rule(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn has_rule<R: Rule + 'static>(&self) -> bool {
        self.rules.iter().any(|r| r.as_any().is::<R>())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule in order and merge the fragments.
    ///
    /// After merging, tags implied by the error chain are appended, and the
    /// error's own code is used as status when no rule set one and it is an
    /// HTTP status.
    pub fn classify(&self, err: &dyn Failure) -> FailureMetadata {
        let mut merged = FailureMetadata::default();
        for rule in &self.rules {
            for fragment in rule.apply(err) {
                merged.merge(fragment);
            }
        }

        merged.merge(FailureMetadata::default().with_tags(derive_tags(err)));

        if merged.status_code.is_none() {
            merged.status_code = err
                .code()
                .filter(|c| (100..=599).contains(c))
                .and_then(|c| u16::try_from(c).ok());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::rules::{InstanceOf, MessageRegex, MethodStatus, RateLimitBackoff};
    use crate::classify::tokens::{ETIMEDOUT, RATE_LIMITED};
    use crate::classify::{HttpResponse, OperationError};

    /// Emits a fixed fragment for every failure.
    #[derive(Debug)]
    struct Fixed(FailureMetadata);

    impl Rule for Fixed {
        fn apply(&self, _: &dyn Failure) -> Vec<FailureMetadata> {
            vec![self.0.clone()]
        }
    }

    #[test]
    fn later_status_and_context_win_and_limits_take_max() {
        let classifier = Classifier::new()
            .with_rule(Fixed(
                FailureMetadata::new(Some(500))
                    .with_context("region", "a")
                    .with_min_next_delay_ms(2_000)
                    .with_not_before_unix_ms(10),
            ))
            .with_rule(Fixed(
                FailureMetadata::new(None)
                    .with_context("region", "b")
                    .with_min_next_delay_ms(500)
                    .with_not_before_unix_ms(20),
            ))
            .with_rule(Fixed(FailureMetadata::new(Some(503)).with_header("X-A", "1")))
            .with_rule(Fixed(FailureMetadata::new(None).with_header("x-a", "1").with_header("x-a", "2")));

        let m = classifier.classify(&OperationError::new("boom"));
        assert_eq!(m.status_code, Some(503));
        assert_eq!(m.context_patch["region"], "b");
        assert_eq!(m.min_next_delay_ms, Some(2_000));
        assert_eq!(m.not_before_unix_ms, Some(20));
        assert_eq!(m.headers["x-a"], ["1", "2"]);
    }

    #[test]
    fn rule_tags_come_before_derived_tags() {
        let classifier = Classifier::new()
            .with_rule(MessageRegex::new("timed out").with_tags(["SLOW", ETIMEDOUT]));
        let m = classifier.classify(&OperationError::new("upstream timed out"));
        assert_eq!(m.tags, ["SLOW", ETIMEDOUT]);
    }

    #[test]
    fn status_falls_back_to_http_range_code() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.classify(&OperationError::new("x").with_code(502)).status_code,
            Some(502)
        );
        assert_eq!(
            classifier.classify(&OperationError::new("x").with_code(2)).status_code,
            None
        );
    }

    #[test]
    fn rate_limited_response_end_to_end() {
        let classifier = Classifier::new()
            .with_rule(MethodStatus::default())
            .with_rule(RateLimitBackoff);
        let err = OperationError::new("too many requests")
            .with_response(HttpResponse::new(429).with_header("Retry-After", "1"));
        let m = classifier.classify(&err);
        assert_eq!(m.status_code, Some(429));
        assert!(m.has_tag(RATE_LIMITED));
        assert!(m.min_next_delay_ms.is_some_and(|ms| ms >= 1_000));
        assert_eq!(m.not_before_unix_ms, None);
    }

    #[test]
    fn has_rule_checks_concrete_type() {
        let classifier = Classifier::new().with_rule(InstanceOf::of::<std::io::Error>());
        assert!(classifier.has_rule::<InstanceOf>());
        assert!(!classifier.has_rule::<RateLimitBackoff>());
        assert_eq!(classifier.rule_count(), 1);
    }
}
