//! What the classifier can see on an error raised by an operation.

use std::error::Error as StdError;
use std::io;

/// A response-like value attached to an error: status plus raw headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header (name, value) pairs in received order; names may repeat.
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Structured database error fields (SQLSTATE and vendor error code).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbErrorInfo<'a> {
    pub sql_state: Option<&'a str>,
    pub vendor_code: Option<i64>,
}

/// Result of probing a named accessor on a failure.
#[derive(Debug, Clone, Copy)]
pub enum Accessor<'a> {
    /// The failure has no accessor by that name.
    Missing,
    /// The accessor exists but could not produce a value.
    Failed,
    Response(&'a HttpResponse),
    Int(i64),
}

/// View of any failure as a plain `dyn Error`, for downcasts and `source()` walks.
pub trait AsDynError {
    fn as_dyn_error(&self) -> &(dyn StdError + 'static);
}

impl<T: StdError + 'static> AsDynError for T {
    fn as_dyn_error(&self) -> &(dyn StdError + 'static) {
        self
    }
}

/// An error the classifier knows how to inspect.
///
/// Every method has a conservative default, so `impl Failure for MyError {}`
/// is enough to run under a policy; override the ones your error can answer.
pub trait Failure: StdError + AsDynError + Send + Sync + 'static {
    /// The error's own numeric code (HTTP status, errno, ...), if any.
    fn code(&self) -> Option<i64> {
        None
    }

    /// A response-like value carried by the error.
    fn response(&self) -> Option<&HttpResponse> {
        None
    }

    /// Probe an accessor by name. `response` and `code` are answered by default.
    fn accessor(&self, name: &str) -> Accessor<'_> {
        match name {
            "response" => self.response().map_or(Accessor::Missing, Accessor::Response),
            "code" => self.code().map_or(Accessor::Missing, Accessor::Int),
            _ => Accessor::Missing,
        }
    }

    fn db_error(&self) -> Option<DbErrorInfo<'_>> {
        None
    }

    /// True when the error is a network-layer failure by type, not by message.
    fn is_network_failure(&self) -> bool {
        false
    }
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// General-purpose failure for operations that do not have their own error type.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    code: Option<i64>,
    response: Option<HttpResponse>,
    sql_state: Option<String>,
    vendor_code: Option<i64>,
    network: bool,
    #[source]
    source: Option<BoxError>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            response: None,
            sql_state: None,
            vendor_code: None,
            network: false,
            source: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_response(mut self, response: HttpResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_db_error(mut self, sql_state: Option<&str>, vendor_code: Option<i64>) -> Self {
        self.sql_state = sql_state.map(str::to_ascii_uppercase);
        self.vendor_code = vendor_code;
        self
    }

    /// Mark as a network-layer failure.
    pub fn network(mut self) -> Self {
        self.network = true;
        self
    }

    pub fn caused_by(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Failure for OperationError {
    fn code(&self) -> Option<i64> {
        self.code
    }

    fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    fn db_error(&self) -> Option<DbErrorInfo<'_>> {
        if self.sql_state.is_none() && self.vendor_code.is_none() {
            return None;
        }
        Some(DbErrorInfo {
            sql_state: self.sql_state.as_deref().filter(|s| !s.is_empty()),
            vendor_code: self.vendor_code,
        })
    }

    fn is_network_failure(&self) -> bool {
        self.network
    }
}

impl Failure for io::Error {
    fn code(&self) -> Option<i64> {
        self.raw_os_error().map(i64::from)
    }

    fn is_network_failure(&self) -> bool {
        is_network_kind(self.kind())
    }
}

pub(crate) fn is_network_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accessors_answer_response_and_code() {
        let e = OperationError::new("boom")
            .with_code(503)
            .with_response(HttpResponse::new(429));
        assert!(matches!(e.accessor("code"), Accessor::Int(503)));
        assert!(matches!(e.accessor("response"), Accessor::Response(r) if r.status == 429));
        assert!(matches!(e.accessor("getStatus"), Accessor::Missing));
    }

    #[test]
    fn source_chain_is_visible_through_dyn_error() {
        let inner = io::Error::new(io::ErrorKind::TimedOut, "read timed out");
        let e = OperationError::new("query failed").caused_by(inner);
        let source = e.as_dyn_error().source().expect("has source");
        assert!(source.is::<io::Error>());
    }

    #[test]
    fn db_fields_are_optional() {
        assert!(OperationError::new("x").db_error().is_none());
        let e = OperationError::new("x").with_db_error(Some("40p01"), None);
        assert_eq!(e.db_error().unwrap().sql_state, Some("40P01"));
    }
}
