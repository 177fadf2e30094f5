use std::sync::Arc;

use crate::embedding_service::{embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::models::*;
use crate::vector_index::VectorIndex;

pub struct Retriever {
    embedding_service: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedding_service: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedding_service }
    }

    /// Returns the texts of the `k` chunks closest to `query`, nearest first,
    /// separated by blank lines. Fewer chunks than `k` means all of them.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        chunks: &[Chunk],
        query: &str,
        k: usize,
    ) -> Result<String> {
        let relevant_chunks = self.find_relevant_chunks(index, chunks, query, k).await?;
        Ok(build_context(&relevant_chunks))
    }

    pub async fn find_relevant_chunks<'a>(
        &self,
        index: &VectorIndex,
        chunks: &'a [Chunk],
        query: &str,
        k: usize,
    ) -> Result<Vec<&'a Chunk>> {
        if chunks.is_empty() || index.is_empty() {
            log::warn!("No chunks available for retrieval");
            return Ok(Vec::new());
        }

        let query_embedding = embed_query(self.embedding_service.as_ref(), query).await?;
        let hits = index.search(&query_embedding, k.min(chunks.len()))?;

        let relevant_chunks: Vec<&Chunk> = hits
            .iter()
            .filter_map(|hit| chunks.get(hit.chunk_index))
            .collect();

        log::info!("Found {} relevant chunks", relevant_chunks.len());
        Ok(relevant_chunks)
    }
}

fn build_context(chunks: &[&Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
