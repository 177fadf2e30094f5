use thiserror::Error;

/// Failure reported by an external model provider (embedding or completion).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("failed to extract text from '{document}': {reason}")]
    Extraction { document: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(#[source] ProviderError),

    #[error("generation error: {0}")]
    Generation(#[source] ProviderError),

    #[error("rendering error: {0}")]
    Rendering(String),
}

impl QuizError {
    pub fn extraction(document: impl Into<String>, reason: impl ToString) -> Self {
        QuizError::Extraction {
            document: document.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        QuizError::InvalidConfiguration(message.into())
    }

    /// Dependency failures are the caller's signal to retry the whole request.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            QuizError::EmbeddingProvider(_) | QuizError::Generation(_)
        )
    }
}

impl From<lopdf::Error> for QuizError {
    fn from(err: lopdf::Error) -> Self {
        QuizError::Rendering(err.to_string())
    }
}

impl From<zip::result::ZipError> for QuizError {
    fn from(err: zip::result::ZipError) -> Self {
        QuizError::Rendering(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuizError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_names_document() {
        let err = QuizError::extraction("notes.pdf", "zero pages");
        assert_eq!(
            err.to_string(),
            "failed to extract text from 'notes.pdf': zero pages"
        );
        assert!(!err.is_provider_failure());
    }

    #[test]
    fn provider_errors_are_flagged_for_retry() {
        let err = QuizError::Generation(ProviderError::Status {
            status: 429,
            body: "quota exceeded".to_string(),
        });
        assert!(err.is_provider_failure());
        assert!(err.to_string().contains("429"));
    }
}
