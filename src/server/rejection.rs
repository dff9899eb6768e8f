//! Mapping of errors and warp rejections onto the JSON error envelope

use super::api::ErrorResponse;
use crate::error::{BgCompositeError, ErrorKind};
use std::convert::Infallible;
use warp::{http::StatusCode, Rejection, Reply};

/// A crate error carried through warp's rejection machinery
#[derive(Debug)]
pub struct ApiError(pub BgCompositeError);

impl warp::reject::Reject for ApiError {}

impl From<BgCompositeError> for ApiError {
    fn from(error: BgCompositeError) -> Self {
        Self(error)
    }
}

/// Reject with a crate error
pub fn reject(error: BgCompositeError) -> Rejection {
    warp::reject::custom(ApiError(error))
}

/// HTTP status for a crate error
#[must_use]
pub fn status_for(error: &BgCompositeError) -> StatusCode {
    match error.kind() {
        ErrorKind::ClientInput => StatusCode::BAD_REQUEST,
        ErrorKind::Processing => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON `{"error": ...}` reply with the given status
pub fn error_reply(status: StatusCode, message: impl Into<String>) -> warp::reply::Response {
    let body = warp::reply::json(&ErrorResponse {
        error: message.into(),
    });
    warp::reply::with_status(body, status).into_response()
}

/// Convert every rejection into the error envelope
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(ApiError(error)) = err.find::<ApiError>() {
        let status = status_for(error);
        if status.is_server_error() {
            tracing::error!(error = %error, "Request failed");
        } else {
            tracing::debug!(error = %error, "Rejected client input");
        }
        (status, error.to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "Request body exceeds the configured size limit".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "Content-Length header required".to_string(),
        )
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        tracing::warn!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(error_reply(status, message))
}
