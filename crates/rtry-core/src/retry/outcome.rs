use crate::classify::Failure;

/// Result of one attempt as seen by deciders and hooks.
#[derive(Debug, Clone, Copy)]
pub struct AttemptOutcome<'a> {
    error: Option<&'a dyn Failure>,
    status_code: Option<u16>,
    tags: &'a [String],
}

impl<'a> AttemptOutcome<'a> {
    pub fn success() -> Self {
        Self {
            error: None,
            status_code: None,
            tags: &[],
        }
    }

    pub fn failure(error: &'a dyn Failure, status_code: Option<u16>, tags: &'a [String]) -> Self {
        Self {
            error: Some(error),
            status_code,
            tags,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&'a dyn Failure> {
        self.error
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Deduplicated, in classification order.
    pub fn tags(&self) -> &'a [String] {
        self.tags
    }
}
