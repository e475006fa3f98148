use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pbs_common::errors::PbsError;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps the request-path error taxonomy onto the status table in the error
/// handling design (§7): every `PbsError` already carries its own fixed
/// status via `status_code()`, so this is a thin `IntoResponse` adapter, not
/// a second classification.
pub struct ApiError(pub PbsError);

impl From<PbsError> for ApiError {
    fn from(err: PbsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
