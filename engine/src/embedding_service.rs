use async_trait::async_trait;
use reqwest::Client;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{ProviderError, QuizError, Result};
use crate::models::*;

/// Turns a batch of texts into one vector per text, in the same order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embeds all chunks in sub-batches of `batch_size`, preserving order.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(QuizError::invalid("embedding batch size must be greater than zero"));
    }
    log::info!("Generating embeddings for {} chunks", chunks.len());

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let embedded = provider
            .embed(batch)
            .await
            .map_err(QuizError::EmbeddingProvider)?;
        if embedded.len() != batch.len() {
            return Err(QuizError::EmbeddingProvider(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embedded.len()
            ))));
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Embeds a single query through the same provider path as the chunks.
pub async fn embed_query(provider: &dyn EmbeddingProvider, query: &str) -> Result<Vec<f32>> {
    let mut embedded = provider
        .embed(&[query.to_string()])
        .await
        .map_err(QuizError::EmbeddingProvider)?;
    embedded.pop().ok_or_else(|| {
        QuizError::EmbeddingProvider(ProviderError::Malformed(
            "no embedding returned for query".to_string(),
        ))
    })
}

/// Offline embedder: hashed term frequencies, L2-normalised.
///
/// Deterministic for a given build, so it needs no fitted vocabulary.
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn create_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimension];
        let words = tokenize(text);
        if words.is_empty() {
            return embedding;
        }

        let total_words = words.len() as f32;
        for (word, count) in count_words(&words) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let idx = (hasher.finish() % self.dimension as u64) as usize;
            embedding[idx] += count as f32 / total_words;
        }

        // Normalize the embedding
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Ok(batch.iter().map(|text| self.create_embedding(text)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| word.len() > 2)
        .collect()
}

fn count_words(words: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for word in words {
        *counts.entry(word.as_str()).or_insert(0) += 1;
    }
    counts
}

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiEmbeddingProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEmbeddingProvider {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, batch: &[String]) -> GeminiEmbedRequest {
        GeminiEmbedRequest {
            requests: batch
                .iter()
                .map(|text| GeminiEmbedContentRequest {
                    model: format!("models/{}", self.model),
                    content: GeminiContent {
                        parts: vec![GeminiPart { text: text.clone() }],
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(batch))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(ProviderError::Status { status, body });
        }

        let parsed: GeminiEmbedResponse = response.json().await?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: batch.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(ProviderError::Status { status, body });
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        order_embeddings(parsed, batch.len())
    }
}

/// The embeddings endpoint tags each vector with its input index; the order of
/// `data` itself is not guaranteed.
fn order_embeddings(
    response: EmbeddingsResponse,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            ProviderError::Malformed(format!("embedding index {} out of range", item.index))
        })?;
        *slot = Some(item.embedding);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| ProviderError::Malformed(format!("missing embedding for input {i}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, content: &str) -> Chunk {
        Chunk {
            index,
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
        }
    }

    #[tokio::test]
    async fn test_hashing_embeddings_are_normalized_and_fixed_size() {
        let provider = HashingEmbeddingProvider::new(64);
        let vectors = provider
            .embed(&["The sky is blue".to_string(), "".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 64));
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[1].iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_hashing_embeddings_are_deterministic() {
        let provider = HashingEmbeddingProvider::new(128);
        let text = vec!["Water boils at one hundred degrees".to_string()];
        let first = provider.embed(&text).await.unwrap();
        let second = provider.embed(&text).await.unwrap();
        assert_eq!(first, second);
    }

    struct CountingProvider {
        calls: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.lock().unwrap().push(batch.len());
            Ok(batch.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_batches_and_preserves_order() {
        let provider = CountingProvider {
            calls: std::sync::Mutex::new(Vec::new()),
        };
        let chunks: Vec<Chunk> = (1..=5).map(|i| chunk(i - 1, &"x".repeat(i))).collect();

        let vectors = embed_chunks(&provider, &chunks, 2).await.unwrap();

        assert_eq!(*provider.calls.lock().unwrap(), vec![2, 2, 1]);
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed(&self, _batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(vec![vec![0.0]])
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_rejects_count_mismatch() {
        let chunks = vec![chunk(0, "one"), chunk(1, "two")];
        let err = embed_chunks(&ShortProvider, &chunks, 10).await.unwrap_err();
        assert!(matches!(err, QuizError::EmbeddingProvider(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_openai_embeddings_are_reordered_by_index() {
        let response: EmbeddingsResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"index": 1, "embedding": [2.0]},
                {"index": 0, "embedding": [1.0]}
            ]
        }))
        .unwrap();
        let ordered = order_embeddings(response, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_openai_missing_embedding_is_malformed() {
        let response: EmbeddingsResponse = serde_json::from_value(serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        }))
        .unwrap();
        assert!(matches!(order_embeddings(response, 2), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_gemini_request_names_model_per_item() {
        let provider = GeminiEmbeddingProvider::new(Client::new(), "key", "text-embedding-004");
        let request = provider.build_request(&["a".to_string(), "b".to_string()]);
        assert_eq!(request.requests.len(), 2);
        assert_eq!(request.requests[0].model, "models/text-embedding-004");
        assert_eq!(request.requests[1].content.parts[0].text, "b");
    }
}
