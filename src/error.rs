//! Error types for the ledger.
//!
//! Internally we use `anyhow` (`Res<T>`) so that context can be attached freely. At the boundary of
//! each operation that a caller may need to react to, errors are converted into the public
//! `Error`, which carries an `ErrorType` alongside the `anyhow` chain. Use `pub_result` to do the
//! conversion.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Internal result type with an `anyhow` error.
pub(crate) type Res<T> = anyhow::Result<T>;

/// Public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies an `Error` so that callers can decide how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A record id that does not exist was updated or deleted.
    NotFound,
    /// The backing store could not be reached or refused the request.
    StoreUnavailable,
    /// The signed-in identity (or lack of one) is not allowed to do this.
    Unauthorized,
    /// Record fields were rejected, e.g. an empty name.
    Invalid,
    /// Signing in or refreshing a session failed.
    Auth,
    /// The configuration is missing or malformed.
    Config,
    /// Reading or writing a local file failed.
    Io,
    /// The MCP service failed.
    Service,
    /// Anything else.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// The public error type.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    /// Wraps `inner` with the given `error_type`.
    pub fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// Creates an error from a message.
    pub fn msg(error_type: ErrorType, message: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(error_type, anyhow::Error::msg(message))
    }

    pub(crate) fn not_found(id: impl Display) -> Self {
        Self::msg(ErrorType::NotFound, format!("Record not found: {id}"))
    }

    pub(crate) fn unauthorized(message: impl Display) -> Self {
        Self::msg(ErrorType::Unauthorized, message.to_string())
    }

    pub(crate) fn invalid(message: impl Display) -> Self {
        Self::msg(ErrorType::Invalid, message.to_string())
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn is_not_found(&self) -> bool {
        self.error_type == ErrorType::NotFound
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.error_type, self.inner)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    /// Recovers the original `Error` if one is somewhere in the chain, otherwise `Internal`.
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<Error>() {
            Ok(error) => error,
            Err(inner) => Self {
                error_type: ErrorType::Internal,
                inner,
            },
        }
    }
}

/// Converts an internal result into the public `Result` with the given `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_pub_result_sets_type() {
        let r: std::result::Result<(), anyhow::Error> = Err(anyhow::anyhow!("boom"));
        let e = r.pub_result(ErrorType::StoreUnavailable).unwrap_err();
        assert_eq!(e.error_type(), ErrorType::StoreUnavailable);
        assert_eq!(e.to_string(), "boom");
    }

    #[test]
    fn test_type_survives_anyhow_round_trip() {
        let original = Error::not_found("abc");
        let wrapped: anyhow::Error = anyhow::Error::new(original);
        let back = Error::from(wrapped);
        assert!(back.is_not_found());
        assert!(back.to_string().contains("abc"));
    }

    #[test]
    fn test_context_is_displayed() {
        let r: Res<()> = Err(anyhow::anyhow!("inner")).context("outer");
        let e: Error = r.unwrap_err().into();
        assert_eq!(e.error_type(), ErrorType::Internal);
        assert_eq!(e.to_string(), "outer: inner");
    }

    #[test]
    fn test_error_type_display_and_parse() {
        assert_eq!(ErrorType::StoreUnavailable.to_string(), "store_unavailable");
        let parsed: ErrorType = "not_found".parse().unwrap();
        assert_eq!(parsed, ErrorType::NotFound);
    }
}
