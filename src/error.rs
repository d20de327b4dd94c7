//! Unified error type.

use http::StatusCode;

use crate::pin::ParseError;

/// A boxed error from an action dispatcher.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by pliny's fallible operations.
///
/// Infrastructure failures (binding, reading a body), malformed requests,
/// malformed route configuration and dispatcher failures all flow through
/// this one type. [`Error::status`] says how the default error handler
/// renders each of them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to read request body: {0}")]
    Read(#[source] hyper::Error),

    #[error("invalid uri: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    #[error("malformed query string: {0}")]
    Query(#[source] serde_urlencoded::de::Error),

    #[error("malformed json body: {0}")]
    Json(#[source] serde_json::Error),

    #[error("malformed form body: {0}")]
    Form(#[source] serde_urlencoded::de::Error),

    #[error("invalid route options: {0}")]
    Config(#[source] serde_json::Error),

    #[error("invalid pin: {0}")]
    Pin(#[from] ParseError),

    /// A domain-level failure reported by the dispatcher, with the status it
    /// should surface as.
    #[error("{reason}")]
    Rejected { status: StatusCode, reason: String },

    #[error("action failed: {0}")]
    Action(#[source] BoxError),
}

impl Error {
    /// A dispatcher failure that should surface with `status`.
    pub fn rejected(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::Rejected { status, reason: reason.into() }
    }

    /// Wraps an arbitrary dispatcher failure. Surfaces as `500`.
    pub fn action(err: impl Into<BoxError>) -> Self {
        Self::Action(err.into())
    }

    /// The HTTP status the default error handler responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Uri(_) | Self::Query(_) | Self::Json(_) | Self::Form(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
