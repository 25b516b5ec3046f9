//! Error handling for tandem.
//!
//! All fallible operations return [`Result`], whose error carries an
//! [`ErrorKind`] modelled after gRPC status codes plus the underlying error.
//! The kind is what callers branch on: the core for instance treats
//! [`ErrorKind::Unauthenticated`] from a status poll as "no data for now"
//! and [`ErrorKind::FailedPrecondition`] from a write as "no active device".
//!
//! Errors returned by the Web API keep the provider's status code, message
//! and reason in an [`ApiError`], reachable through [`Error::downcast`] or
//! the [`Error::reason`] shortcut.
//!
//! # Example
//!
//! ```rust
//! use tandem::error::{Error, ErrorKind, Result};
//!
//! fn check_volume(percent: u8) -> Result<()> {
//!     if percent > 100 {
//!         return Err(Error::out_of_range(format!("volume {percent} exceeds 100")));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Error kind and details of whatever went wrong.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error.
    pub kind: ErrorKind,

    /// Details of the underlying error.
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for tandem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions. The HTTP mapping in each variant's
/// documentation is the one used when decoding Web API responses.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// The operation was cancelled, typically because the core shut down.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP 500 and anything that fits no other category.
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP 400, or arguments rejected before any request was made.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP 504 and client-side timeouts.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP 404 for anything but a missing active device.
    #[error("not found")]
    NotFound = 5,

    /// HTTP 403, for example commands that require a premium account.
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP 429.
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// The target is not in a state to accept the operation. Used for the
    /// Web API's `NO_ACTIVE_DEVICE` reason and for commands without a
    /// resolvable target device.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// A value outside of its allowed range, such as a volume above 100.
    #[error("out of range")]
    OutOfRange = 11,

    /// Bugs and broken invariants.
    #[error("internal error")]
    Internal = 13,

    /// HTTP 502 and 503, and connection failures.
    #[error("service unavailable")]
    Unavailable = 14,

    /// A response body that could not be read completely.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,

    /// HTTP 401.
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,
}

/// Error details as reported by the Web API.
///
/// Error responses carry a JSON body of the form
/// `{ "error": { "status": 404, "message": "...", "reason": "..." } }`, where
/// `reason` is only present for player endpoints.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ApiError {
    /// HTTP status of the response.
    pub status: StatusCode,

    /// Human-readable message from the provider.
    pub message: String,

    /// Machine-readable reason, such as `NO_ACTIVE_DEVICE`.
    pub reason: Option<String>,
}

impl ApiError {
    /// Reason reported by the Web API when a player command has no device to
    /// act on.
    pub const NO_ACTIVE_DEVICE: &'static str = "NO_ACTIVE_DEVICE";
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Returns the Web API reason, if this error came from an API response
    /// that included one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.downcast::<ApiError>()
            .and_then(|api| api.reason.as_deref())
    }

    /// Whether the Web API reported that there is no active device, or the
    /// core could not resolve a target device on its own.
    #[must_use]
    pub fn is_no_active_device(&self) -> bool {
        self.kind == ErrorKind::FailedPrecondition
            && self
                .downcast::<ApiError>()
                .is_none_or(|api| api.reason.as_deref() == Some(ApiError::NO_ACTIVE_DEVICE))
    }

    /// Classifies a Web API error response.
    ///
    /// A 404 with reason `NO_ACTIVE_DEVICE` is a [`FailedPrecondition`]: the
    /// request was fine, the account just has nothing to play on.
    ///
    /// [`FailedPrecondition`]: ErrorKind::FailedPrecondition
    #[must_use]
    pub fn from_api(api: ApiError) -> Self {
        let kind = match api.status {
            StatusCode::BAD_REQUEST => ErrorKind::InvalidArgument,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
            StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
            StatusCode::NOT_FOUND
                if api.reason.as_deref() == Some(ApiError::NO_ACTIVE_DEVICE) =>
            {
                ErrorKind::FailedPrecondition
            }
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::ResourceExhausted,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Unavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::Unknown,
        };

        Self::new(kind, api)
    }

    /// Creates an error for operations that were cancelled.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for data that was cut off or corrupted in transit.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for operations that cannot proceed in the current
    /// state.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::failed_precondition("no active device");
    /// assert!(err.is_no_active_device());
    /// ```
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for broken invariants.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for arguments that fail validation.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing resources.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for values outside their valid range.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::out_of_range("volume must be between 0 and 100");
    /// assert_eq!(err.kind, ErrorKind::OutOfRange);
    /// ```
    pub fn out_of_range<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::OutOfRange, error)
    }

    /// Creates an error for denied permissions.
    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    /// Creates an error for exhausted quotas.
    pub fn resource_exhausted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ResourceExhausted, error)
    }

    /// Creates an error for missing or expired credentials.
    pub fn unauthenticated<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthenticated, error)
    }

    /// Creates an error for services that cannot be reached.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error that fits no other category.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats as "{kind}: {details}".
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected => {
                Self::unavailable(err)
            }
            Interrupted => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::unknown(err),
        }
    }
}

/// Maps transport-level failures. Status codes are not handled here: the
/// Web API client decodes those itself with [`Error::from_api`].
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_connect() {
            return Self::unavailable(err);
        }

        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if let Some(status) = err.status() {
            return Self::from_api(ApiError {
                status,
                message: err.to_string(),
                reason: None,
            });
        }

        Self::unknown(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, reason: Option<&str>) -> ApiError {
        ApiError {
            status: StatusCode::from_u16(status).unwrap(),
            message: "test".to_string(),
            reason: reason.map(ToString::to_string),
        }
    }

    #[test]
    fn no_active_device_is_a_failed_precondition() {
        let err = Error::from_api(api(404, Some(ApiError::NO_ACTIVE_DEVICE)));
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert!(err.is_no_active_device());
        assert_eq!(err.reason(), Some("NO_ACTIVE_DEVICE"));
    }

    #[test]
    fn plain_not_found_is_not_no_active_device() {
        let err = Error::from_api(api(404, None));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!err.is_no_active_device());
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(Error::from_api(api(401, None)).kind, ErrorKind::Unauthenticated);
        assert_eq!(Error::from_api(api(403, None)).kind, ErrorKind::PermissionDenied);
        assert_eq!(Error::from_api(api(429, None)).kind, ErrorKind::ResourceExhausted);
        assert_eq!(Error::from_api(api(503, None)).kind, ErrorKind::Unavailable);
        assert_eq!(Error::from_api(api(500, None)).kind, ErrorKind::Unknown);
    }

    #[test]
    fn locally_raised_precondition_counts_as_no_active_device() {
        assert!(Error::failed_precondition("no active device").is_no_active_device());
    }

    #[test]
    fn display_includes_kind_and_details() {
        let err = Error::out_of_range("volume 150 exceeds 100");
        assert_eq!(err.to_string(), "out of range: volume 150 exceeds 100");
    }
}
