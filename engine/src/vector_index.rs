use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ProviderError, QuizError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cosine similarity`; zero vectors are at distance 1 from everything.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm1: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm2: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm1 == 0.0 || norm2 == 0.0 {
                    1.0
                } else {
                    1.0 - dot_product / (norm1 * norm2)
                }
            }
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(QuizError::invalid(format!("unknown distance metric: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub chunk_index: usize,
    pub distance: f32,
}

/// Exact nearest-neighbour index over one request's chunk embeddings.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    metric: DistanceMetric,
}

impl VectorIndex {
    /// Every vector must share the first vector's dimension.
    pub fn build(vectors: Vec<Vec<f32>>, metric: DistanceMetric) -> Result<Self> {
        let dimension = vectors.first().map_or(0, Vec::len);

        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(QuizError::EmbeddingProvider(ProviderError::Malformed(format!(
                "embedding {position} has dimension {}, expected {dimension}",
                vector.len()
            ))));
        }

        log::debug!("Built index of {} vectors (dim {dimension})", vectors.len());
        Ok(Self {
            vectors,
            dimension,
            metric,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `k` closest vectors, nearest first; equal distances keep chunk
    /// order. `k` larger than the index returns everything.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(QuizError::EmbeddingProvider(ProviderError::Malformed(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension
            ))));
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(chunk_index, vector)| SearchHit {
                chunk_index,
                distance: self.metric.distance(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(k.min(self.vectors.len()));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(vectors: Vec<Vec<f32>>) -> VectorIndex {
        VectorIndex::build(vectors, DistanceMetric::Euclidean).unwrap()
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = index(vec![vec![5.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 2).unwrap();

        let order: Vec<_> = hits.iter().map(|h| h.chunk_index).collect();
        assert_eq!(order, vec![1, 2]);
        assert!((hits[0].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_prefer_lower_chunk_index() {
        let index = index(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, -1.0], vec![9.0, 9.0]]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let order: Vec<_> = hits.iter().map(|h| h.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_large_k_returns_every_chunk_once() {
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![(i * 7 % 11) as f32, 1.0]).collect();
        let index = index(vectors);
        let hits = index.search(&[4.0, 0.0], 100).unwrap();

        assert_eq!(hits.len(), 20);
        let mut seen: Vec<_> = hits.iter().map(|h| h.chunk_index).collect();
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_mixed_dimensions_are_rejected() {
        let err = VectorIndex::build(vec![vec![1.0, 2.0], vec![1.0]], DistanceMetric::Euclidean)
            .unwrap_err();
        assert!(matches!(err, QuizError::EmbeddingProvider(_)));
    }

    #[test]
    fn test_query_dimension_must_match() {
        let index = index(vec![vec![1.0, 2.0]]);
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = index(Vec::new());
        assert!(index.search(&[1.0, 2.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_cosine_distance() {
        let cosine = DistanceMetric::Cosine;
        assert!(cosine.distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine.distance(&[1.0, 0.0], &[0.0, 3.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
