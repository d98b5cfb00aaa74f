use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Html,
    Json,
};

use crate::chat_request::ChatForm;
use crate::chat_response::{ChatAnswer, HealthResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn home() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// `POST /chat`: answers `query` using the uploaded `pdf` as the only context.
pub async fn chat(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatAnswer>, ApiError> {
    let form = match multipart {
        Ok(multipart) => ChatForm::from_multipart(multipart).await?,
        Err(rejection) => {
            // Not a multipart body at all, so there cannot be a file in it.
            log::warn!("Chat request without multipart body: {}", rejection);
            ChatForm::default()
        }
    };

    let (upload, query) = form.into_parts()?;
    log::info!(
        "Chat request: {} ({} bytes), query of {} characters",
        upload.filename,
        upload.data.len(),
        query.chars().count()
    );

    let answer = state.query_service.answer(&upload, &query).await?;

    Ok(Json(ChatAnswer { answer }))
}
