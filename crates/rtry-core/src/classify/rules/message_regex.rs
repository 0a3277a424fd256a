use regex::Regex;

use super::Rule;
use crate::classify::failure::Failure;
use crate::classify::metadata::FailureMetadata;

/// Matches the failure's message against a regular expression.
///
/// A pattern that does not compile never matches.
#[derive(Debug)]
pub struct MessageRegex {
    pattern: Option<Regex>,
    status_code: Option<u16>,
    tags: Vec<String>,
}

impl MessageRegex {
    pub fn new(pattern: &str) -> Self {
        let pattern = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid message pattern; rule will never match");
                None
            }
        };
        Self {
            pattern,
            status_code: None,
            tags: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
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

impl Rule for MessageRegex {
    fn apply(&self, err: &dyn Failure) -> Vec<FailureMetadata> {
        match &self.pattern {
            Some(re) if re.is_match(&err.to_string()) => {
                vec![FailureMetadata::new(self.status_code).with_tags(self.tags.iter().cloned())]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::OperationError;

    #[test]
    fn matching_message_yields_fragment() {
        let rule = MessageRegex::new(r"(?i)quota\s+exceeded").with_status(429).with_tags(["QUOTA"]);
        let out = rule.apply(&OperationError::new("Daily Quota  exceeded for project"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status_code, Some(429));
        assert!(rule.apply(&OperationError::new("ok")).is_empty());
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let rule = MessageRegex::new("([unclosed");
        assert!(rule.apply(&OperationError::new("([unclosed")).is_empty());
    }
}
