use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unauthorized")]
    MissingToken,

    #[error("User is not authorized to access this resource with an explicit deny")]
    Forbidden,

    #[error("imsi needed")]
    MissingDevice,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::MissingToken => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::MissingDevice | Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Error::Json(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("API error: {}", self);
        } else {
            debug!("Rejected request: {}", self);
        }

        // The gateway spells the key "Message" on authorizer denials
        let body = match &self {
            Error::Forbidden => json!({ "Message": self.to_string() }),
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
