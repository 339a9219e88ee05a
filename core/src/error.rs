//! Error types for the KraftCloud client kit.
//!
//! # Design
//! One crate-wide `Error` whose variants follow how far a call got before it
//! failed: local validation, the transport, the HTTP status line, the
//! envelope status, and finally the individual items of a batch. `Http`
//! keeps the raw body so callers can log it; `Item` keeps the server's
//! numeric code so callers can match on `ApiErrorCode`.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-side precondition failed. No request was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The request never produced an HTTP response.
    #[error("performing the request: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a status other than 200.
    #[error("API error: status code {status}, message: {body}")]
    Http { status: u16, body: String },

    /// HTTP 200 whose envelope reported `error`.
    #[error("{0}")]
    Envelope(String),

    /// A single item of a batch response carried an error code.
    #[error("{message} (code={code})")]
    Item { message: String, code: i64 },

    /// Several failures reported by one response.
    #[error("{}", Joined(.0))]
    Aggregate(Vec<Error>),

    /// The response body did not match the envelope schema.
    #[error("decoding response: {0}")]
    Decode(String),

    /// An autoscale policy carried a `type` this kit does not know.
    #[error("unknown autoscale policy type {0:?}")]
    UnknownPolicyType(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Options or transport could not be assembled.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Server error code carried by an [`Error::Item`], if it is a known one.
    pub fn api_code(&self) -> Option<ApiErrorCode> {
        match self {
            Error::Item { code, .. } => ApiErrorCode::from_code(*code),
            _ => None,
        }
    }

    /// Individual causes of this error. A non-aggregate error is its own
    /// single cause.
    pub fn causes(&self) -> Vec<&Error> {
        match self {
            Error::Aggregate(errors) => errors.iter().flat_map(Error::causes).collect(),
            other => vec![other],
        }
    }

    /// Combine zero or more errors. Returns `None` for an empty list and the
    /// error itself for a single one.
    pub fn join(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Aggregate(errors)),
        }
    }

    /// True when the underlying transport was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Cancelled))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Newline-joined display of aggregated errors.
struct Joined<'a>(&'a [Error]);

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Failures below the HTTP status line.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, connect, TLS or write failure.
    #[error("{0}")]
    Request(String),

    /// The response body could not be read.
    #[error("reading response body: {0}")]
    Body(String),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The per-request timeout elapsed.
    #[error("request timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Error categories defined by the API server. Propagated verbatim; the kit
/// never acts on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ApiErrorCode {
    NotSupported = 1,
    WrongMethod = 2,
    NoEndpoint = 3,
    TooMany = 4,
    Invalid = 5,
    NotFound = 6,
    Quota = 7,
    AlreadyExists = 8,
    WrongVmState = 9,
    TimedOut = 10,
    Malformed = 11,
    CertificateCnMismatch = 12,
    AutoscaleSizeOutOfRange = 13,
    AutoscalePolicyNotFound = 14,
    AutoscaleNotConfigured = 15,
    VolumeInUse = 16,
    Internal = 17,
}

impl ApiErrorCode {
    const ALL: [ApiErrorCode; 17] = [
        ApiErrorCode::NotSupported,
        ApiErrorCode::WrongMethod,
        ApiErrorCode::NoEndpoint,
        ApiErrorCode::TooMany,
        ApiErrorCode::Invalid,
        ApiErrorCode::NotFound,
        ApiErrorCode::Quota,
        ApiErrorCode::AlreadyExists,
        ApiErrorCode::WrongVmState,
        ApiErrorCode::TimedOut,
        ApiErrorCode::Malformed,
        ApiErrorCode::CertificateCnMismatch,
        ApiErrorCode::AutoscaleSizeOutOfRange,
        ApiErrorCode::AutoscalePolicyNotFound,
        ApiErrorCode::AutoscaleNotConfigured,
        ApiErrorCode::VolumeInUse,
        ApiErrorCode::Internal,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}
