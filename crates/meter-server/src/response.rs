//! The `/api/*` on-wire envelope (root spec §4.9: "JSON; `code: 0` = success,
//! nonzero = error with `msg`"). Every handler returns [`ApiResult`] so the
//! shape never diverges across endpoints (root spec §9, "dynamic summary
//! objects" design note).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 0, msg: None, data: Some(data) }
    }
}

impl ApiEnvelope<()> {
    pub fn ok_empty() -> Self {
        Self { code: 0, msg: None, data: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<Json<ApiEnvelope<T>>, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let envelope = ApiEnvelope::<()> { code: 1, msg: Some(self.to_string()), data: None };
        (status, Json(envelope)).into_response()
    }
}
