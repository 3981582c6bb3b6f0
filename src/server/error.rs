use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::ErrorResponse;
use crate::record::ValidationError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// `message` is what the client sees; `source` is only logged.
    #[error("{message}: {source}")]
    Database {
        message: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl ServerError {
    /// Adapter for `map_err` that tags a database failure with its public message.
    pub fn database(message: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { message, source }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => {
                tracing::debug!("[SERVER] rejected submission: {e}");
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response()
            }
            Self::Database { message, source } => {
                tracing::error!("[SERVER] {message}: {source}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}
