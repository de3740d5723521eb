//! The filesystem-style error taxonomy every VIO backend maps its failures into.

use std::fmt;

/// Abstract error kinds a VIO operation can fail with.
///
/// This is the errno analogue for virtual-I/O backends: a backend never hands the
/// engine a raw HTTP status or transport error directly, it always maps through
/// one of these kinds first.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VioErrorKind {
    #[error("permission denied")]
    PermissionDenied,
    #[error("access denied")]
    AccessDenied,
    #[error("no such file or directory")]
    NoSuchEntry,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("try again")]
    TryAgain,
    #[error("no space left on device")]
    NoSpace,
    #[error("file too large")]
    TooLarge,
    #[error("I/O error")]
    IoError,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("lookup failed")]
    LookupFailed,
    #[error("connection failed")]
    ConnectFailed,
    #[error("operation timed out")]
    Timeout,
    #[error("unknown user")]
    UnknownUser,
    #[error("proxy authentication required")]
    ProxyAuth,
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("retry")]
    Retry,
    #[error("redirected")]
    Redirected,
    #[error("unexpected content")]
    WrongContent,
    #[error("bad file descriptor")]
    BadFd,
    #[error("out of memory")]
    NoMemory,
    #[error("generic error")]
    Generic,
}

/// A `VioErrorKind` paired with a human-readable message, the two-channel payload
/// carried alongside every failed operation (the third channel, `error_string`, is
/// a property of the session/backend that holds the most recent instance of this).
#[derive(Debug, Clone)]
pub struct VioError {
    pub kind: VioErrorKind,
    pub message: String,
}

impl VioError {
    pub fn new(kind: VioErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a `VioError` whose message is just the kind's default description.
    pub fn from_kind(kind: VioErrorKind) -> Self {
        Self {
            message: kind.to_string(),
            kind,
        }
    }
}

impl fmt::Display for VioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VioError {}

pub type VioResult<T> = Result<T, VioError>;

/// Transport-level failure kinds independent of any HTTP status code, corresponding
/// to the curl-style result codes a connection attempt can fail with before an
/// HTTP status is ever received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Ok,
    Generic,
    Lookup,
    Auth,
    ProxyAuth,
    Connect,
    Timeout,
    Precondition,
    Retry,
    Redirect,
}

impl TransportFailure {
    /// Maps directly to a `VioErrorKind`, bypassing the HTTP-status table entirely.
    ///
    /// `Generic` has no direct mapping: a generic transport failure is expected to
    /// be re-interpreted through the HTTP-status path by the caller (parsing a
    /// leading status code out of the session's last error string).
    pub fn map(self) -> Option<VioErrorKind> {
        match self {
            TransportFailure::Ok => None,
            TransportFailure::Generic => None,
            TransportFailure::Lookup => Some(VioErrorKind::LookupFailed),
            TransportFailure::Auth => Some(VioErrorKind::UnknownUser),
            TransportFailure::ProxyAuth => Some(VioErrorKind::ProxyAuth),
            TransportFailure::Connect => Some(VioErrorKind::ConnectFailed),
            TransportFailure::Timeout => Some(VioErrorKind::Timeout),
            TransportFailure::Precondition => Some(VioErrorKind::PreconditionFailed),
            TransportFailure::Retry => Some(VioErrorKind::Retry),
            TransportFailure::Redirect => Some(VioErrorKind::Redirected),
        }
    }
}

/// Parses a leading run of ASCII digits out of `s` as a status code, for
/// re-resolving a `TransportFailure::Generic` through the HTTP-status path:
/// "Any GENERIC maps through the HTTP-status path by first parsing a leading
/// integer from the session's last error string."
pub fn parse_leading_status(s: &str) -> Option<u16> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u16>().ok()
}

/// Maps an HTTP status code to a `VioErrorKind` per the error-mapper table.
///
/// Returns `None` for 2xx and 304, which are successes rather than errors.
pub fn map_http_status(status: u16) -> Option<VioErrorKind> {
    match status {
        200..=299 | 304 => None,
        401 | 402 | 405 | 407 => Some(VioErrorKind::PermissionDenied),
        301 | 303 | 404 | 410 => Some(VioErrorKind::NoSuchEntry),
        408 | 504 => Some(VioErrorKind::TryAgain),
        423 => Some(VioErrorKind::AccessDenied),
        400 | 403 | 409 | 411 | 412 | 414 | 415 | 424 | 501 => Some(VioErrorKind::InvalidArgument),
        507 => Some(VioErrorKind::NoSpace),
        413 => Some(VioErrorKind::TooLarge),
        503 => Some(VioErrorKind::ServiceUnavailable),
        400..=599 => Some(VioErrorKind::IoError),
        _ => Some(VioErrorKind::Generic),
    }
}
