use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::chat_response::ErrorResponse;

pub const NO_PDF_UPLOADED: &str = "No PDF uploaded";
pub const NO_QUERY_PROVIDED: &str = "No query provided";

#[derive(Debug)]
pub enum ApiError {
    MissingPdf,
    MissingQuery,
    Multipart { status: StatusCode, message: String },
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingPdf => (StatusCode::BAD_REQUEST, NO_PDF_UPLOADED.to_string()),
            ApiError::MissingQuery => (StatusCode::BAD_REQUEST, NO_QUERY_PROVIDED.to_string()),
            ApiError::Multipart { status, message } => {
                log::warn!("Rejected multipart body: {}", message);
                (status, format!("Failed to read multipart: {}", message))
            }
            ApiError::Internal(err) => {
                log::error!("Chat request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err))
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
