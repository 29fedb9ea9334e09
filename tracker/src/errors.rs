use thiserror::Error;

/// Failure to exchange credentials for a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication provider unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication provider error: {0}")]
    Provider(String),
}

/// Failure of a track fetch. Every variant sends the operator back to login.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Rejected query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,

    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Token cannot be sent as a header value")]
    InvalidToken,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
