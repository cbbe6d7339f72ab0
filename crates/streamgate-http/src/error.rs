use thiserror::Error;

/// Errors raised by the request/response value types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    /// The request body was already handed out once.
    #[error("request body already consumed")]
    BodyConsumed,

    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid header value for {0:?}")]
    InvalidHeaderValue(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}
