//! API error type and its response mapping.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chunkup_protocol::ApiResponse;
use chunkup_protocol::constants::code;
use chunkup_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    /// Protocol code carried in the `{code, message}` body.
    pub fn code(&self) -> u16 {
        match self {
            Self::Store(e) => e.code(),
            Self::BadRequest(_) => code::BAD_REQUEST,
            Self::Multipart(e) => e.status().as_u16(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(ApiResponse::error(self.code(), self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_codes() {
        let conflict = ApiError::from(StoreError::AlreadyStored {
            fingerprint: "abc".into(),
        });
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let missing = ApiError::from(StoreError::MissingChunk {
            fingerprint: "abc".into(),
            index: 1,
        });
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

        let io = ApiError::from(StoreError::Io(std::io::Error::other("disk")));
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
