//! Retry deciders: approve or deny another attempt after a failure.

use std::fmt;

use crate::classify::tokens::{self, CLASS_4XX, CLASS_5XX};
use crate::retry::{AttemptContext, AttemptOutcome};

pub trait RetryDecider: fmt::Debug + Send + Sync {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, ctx: &AttemptContext) -> bool;
}

/// Retries every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryDecider for AlwaysRetry {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, _ctx: &AttemptContext) -> bool {
        !outcome.is_success()
    }
}

/// One entry in an `on` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Exact status code, e.g. `503`.
    Status(u16),
    /// Status class by hundreds digit, e.g. `5XX` is `Class(5)`.
    Class(u16),
    /// Failure tag, stored uppercase, e.g. `ETIMEDOUT`.
    Tag(String),
}

impl Token {
    pub fn parse(raw: &str) -> Token {
        let t = raw.trim().to_ascii_uppercase();
        if let Ok(status) = t.parse::<u16>() {
            return Token::Status(status);
        }
        if t == CLASS_5XX || t == CLASS_4XX {
            return Token::Class(u16::from(t.as_bytes()[0] - b'0'));
        }
        Token::Tag(t)
    }

    fn matches(&self, status: Option<u16>, tags: &[String]) -> bool {
        match self {
            Token::Status(code) => status == Some(*code),
            Token::Class(class) => status.is_some_and(|s| s / 100 == *class),
            Token::Tag(tag) => tags.iter().any(|t| t.eq_ignore_ascii_case(tag)),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Status(code) => write!(f, "{code}"),
            Token::Class(class) => write!(f, "{class}XX"),
            Token::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Retries when the failure's status or tags match any token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnTokens {
    tokens: Vec<Token>,
}

impl OnTokens {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Parse raw tokens; an empty list, `default` or `standard` expand to
    /// [`tokens::DEFAULTS`].
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut out = Vec::new();
        let mut push = |t: Token| {
            if !out.contains(&t) {
                out.push(t);
            }
        };
        if raw.is_empty() {
            tokens::DEFAULTS.iter().for_each(|t| push(Token::parse(t)));
        }
        for r in raw {
            let r = r.as_ref().trim();
            if r.eq_ignore_ascii_case("default") || r.eq_ignore_ascii_case("standard") {
                tokens::DEFAULTS.iter().for_each(|t| push(Token::parse(t)));
            } else if !r.is_empty() {
                push(Token::parse(r));
            }
        }
        Self { tokens: out }
    }

    pub fn defaults() -> Self {
        Self::parse::<&str>(&[])
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn set_tokens(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens;
    }
}

impl RetryDecider for OnTokens {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, _ctx: &AttemptContext) -> bool {
        if outcome.is_success() {
            return false;
        }
        self.tokens
            .iter()
            .any(|t| t.matches(outcome.status_code(), outcome.tags()))
    }
}

/// Composite OR: retries if any child decider approves. Stops at the first approval.
#[derive(Debug, Default)]
pub struct AnyOf {
    deciders: Vec<Box<dyn RetryDecider>>,
}

impl AnyOf {
    pub fn new(deciders: Vec<Box<dyn RetryDecider>>) -> Self {
        Self { deciders }
    }

    pub fn with(mut self, decider: impl RetryDecider + 'static) -> Self {
        self.deciders.push(Box::new(decider));
        self
    }
}

impl RetryDecider for AnyOf {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, ctx: &AttemptContext) -> bool {
        self.deciders.iter().any(|d| d.should_retry(outcome, ctx))
    }
}
