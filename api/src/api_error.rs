use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quiz_engine::QuizError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        let (status, code) = match &err {
            QuizError::Extraction { .. } => (StatusCode::BAD_REQUEST, "extraction_failed"),
            QuizError::InvalidConfiguration(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            QuizError::EmbeddingProvider(_) => (StatusCode::BAD_GATEWAY, "embedding_provider_failed"),
            QuizError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            QuizError::Rendering(_) => (StatusCode::INTERNAL_SERVER_ERROR, "rendering_failed"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}: {}", self.code, self.message);
        } else {
            log::warn!("{}: {}", self.code, self.message);
        }

        let body = Json(ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_engine::ProviderError;

    #[test]
    fn test_status_mapping() {
        let extraction: ApiError = QuizError::extraction("a.pdf", "zero pages").into();
        assert_eq!(extraction.status(), StatusCode::BAD_REQUEST);

        let provider: ApiError = QuizError::Generation(ProviderError::Malformed("empty".into())).into();
        assert_eq!(provider.status(), StatusCode::BAD_GATEWAY);

        let rendering: ApiError = QuizError::Rendering("font".into()).into();
        assert_eq!(rendering.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
