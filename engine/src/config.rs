use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::chunker::ChunkSize;
use crate::error::{QuizError, Result};
use crate::vector_index::DistanceMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    /// Offline hashing embedder; completions still need a remote provider.
    Local,
}

impl ProviderKind {
    pub fn default_completion_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini | ProviderKind::Local => "gemini-2.5-flash",
            ProviderKind::OpenAi => "gpt-3.5-turbo",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "text-embedding-004",
            ProviderKind::OpenAi => "text-embedding-3-small",
            ProviderKind::Local => "hashing",
        }
    }

    fn key_variable(&self) -> &'static str {
        match self {
            ProviderKind::Gemini | ProviderKind::Local => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "local" => Ok(ProviderKind::Local),
            other => Err(QuizError::invalid(format!("unsupported provider: {other}"))),
        }
    }
}

/// Everything the pipeline needs, passed in at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    pub provider: ProviderKind,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub completion_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub chunk_size: ChunkSize,
    pub retrieval_k: usize,
    pub batch_ceiling: usize,
    pub embedding_batch_size: usize,
    pub embedding_dimension: usize,
    pub distance: DistanceMetric,
    pub request_timeout_secs: Option<u64>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        let provider = ProviderKind::Gemini;
        Self {
            provider,
            api_key: None,
            api_base: None,
            completion_model: provider.default_completion_model().to_string(),
            embedding_model: provider.default_embedding_model().to_string(),
            temperature: 0.3,
            max_output_tokens: 4096,
            chunk_size: ChunkSize::Words(200),
            retrieval_k: 5,
            batch_ceiling: 10,
            embedding_batch_size: 64,
            embedding_dimension: 384,
            distance: DistanceMetric::Euclidean,
            request_timeout_secs: Some(120),
        }
    }
}

impl QuizConfig {
    /// Reads `QUIZ_*` variables on top of the defaults. The vendor key comes
    /// from `GEMINI_API_KEY` or `OPENAI_API_KEY` depending on the provider.
    pub fn from_env() -> Result<Self> {
        let provider = match env_value::<ProviderKind>("QUIZ_PROVIDER")? {
            Some(provider) => provider,
            None if env::var("GEMINI_API_KEY").is_ok() => ProviderKind::Gemini,
            None if env::var("OPENAI_API_KEY").is_ok() => ProviderKind::OpenAi,
            None => ProviderKind::Gemini,
        };

        let mut config = QuizConfig {
            provider,
            api_key: env::var(provider.key_variable()).ok(),
            api_base: env::var("QUIZ_API_BASE").ok(),
            completion_model: env::var("QUIZ_COMPLETION_MODEL")
                .unwrap_or_else(|_| provider.default_completion_model().to_string()),
            embedding_model: env::var("QUIZ_EMBEDDING_MODEL")
                .unwrap_or_else(|_| provider.default_embedding_model().to_string()),
            ..QuizConfig::default()
        };

        if let Some(value) = env_value("QUIZ_TEMPERATURE")? {
            config.temperature = value;
        }
        if let Some(value) = env_value("QUIZ_MAX_OUTPUT_TOKENS")? {
            config.max_output_tokens = value;
        }
        if let Some(words) = env_value("QUIZ_CHUNK_WORDS")? {
            config.chunk_size = ChunkSize::Words(words);
        }
        if let Some(chars) = env_value("QUIZ_CHUNK_CHARS")? {
            config.chunk_size = ChunkSize::Chars(chars);
        }
        if let Some(value) = env_value("QUIZ_RETRIEVAL_K")? {
            config.retrieval_k = value;
        }
        if let Some(value) = env_value("QUIZ_BATCH_CEILING")? {
            config.batch_ceiling = value;
        }
        if let Some(value) = env_value("QUIZ_EMBEDDING_BATCH_SIZE")? {
            config.embedding_batch_size = value;
        }
        if let Some(value) = env_value("QUIZ_DISTANCE")? {
            config.distance = value;
        }
        if let Some(secs) = env_value::<u64>("QUIZ_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = (secs > 0).then_some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size.limit() == 0 {
            return Err(QuizError::invalid("chunk size must be greater than zero"));
        }
        if self.retrieval_k == 0 {
            return Err(QuizError::invalid("retrieval k must be greater than zero"));
        }
        if self.batch_ceiling == 0 {
            return Err(QuizError::invalid("batch ceiling must be greater than zero"));
        }
        if self.embedding_batch_size == 0 {
            return Err(QuizError::invalid("embedding batch size must be greater than zero"));
        }
        if self.provider == ProviderKind::Local && self.embedding_dimension == 0 {
            return Err(QuizError::invalid("embedding dimension must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(QuizError::invalid(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(QuizError::invalid("max output tokens must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// The key for remote calls, or an error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                QuizError::invalid(format!(
                    "{} environment variable not set",
                    self.provider.key_variable()
                ))
            })
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| QuizError::invalid(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
