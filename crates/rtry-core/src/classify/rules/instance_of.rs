use std::error::Error as StdError;
use std::fmt;

use super::Rule;
use crate::classify::failure::{AsDynError, Failure};
use crate::classify::metadata::FailureMetadata;

/// Matches when the failure is of a given concrete error type.
pub struct InstanceOf {
    type_name: &'static str,
    matches: fn(&(dyn StdError + 'static)) -> bool,
    status_code: Option<u16>,
    tags: Vec<String>,
}

impl InstanceOf {
    pub fn of<T: StdError + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            matches: |e| e.is::<T>(),
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

impl fmt::Debug for InstanceOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceOf")
            .field("type", &self.type_name)
            .field("status_code", &self.status_code)
            .field("tags", &self.tags)
            .finish()
    }
}

impl Rule for InstanceOf {
    fn apply(&self, err: &dyn Failure) -> Vec<FailureMetadata> {
        if !(self.matches)(err.as_dyn_error()) {
            return Vec::new();
        }
        vec![FailureMetadata::new(self.status_code).with_tags(self.tags.iter().cloned())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::OperationError;
    use std::io;

    #[test]
    fn matches_only_the_named_type() {
        let rule = InstanceOf::of::<io::Error>().with_status(503).with_tags(["IO"]);
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        let out = rule.apply(&io_err);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status_code, Some(503));
        assert_eq!(out[0].tags, ["IO"]);

        assert!(rule.apply(&OperationError::new("disk")).is_empty());
    }
}
