pub mod archive;
pub mod chunker;
pub mod completion_service;
pub mod config;
pub mod document_processor;
pub mod embedding_service;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod query_service;
pub mod question_generator;
pub mod question_parser;
pub mod renderer;
pub mod vector_index;

pub use models::*;
pub use archive::{bundle, bundle_exam};
pub use chunker::{chunk_text, ChunkSize};
pub use completion_service::{CompletionParams, CompletionProvider, GeminiCompletionProvider, OpenAiCompletionProvider};
pub use config::{ProviderKind, QuizConfig};
pub use document_processor::{read_source, DocumentProcessor};
pub use embedding_service::{
    embed_chunks, EmbeddingProvider, GeminiEmbeddingProvider, HashingEmbeddingProvider, OpenAiEmbeddingProvider,
};
pub use error::{ProviderError, QuizError, Result};
pub use pipeline::{ExamOutput, QuizPipeline};
pub use query_service::Retriever;
pub use question_generator::QuestionGenerator;
pub use question_parser::{parse_completion, ParsedBatch};
pub use renderer::{render_answer_sheet, render_question_paper};
pub use vector_index::{DistanceMetric, SearchHit, VectorIndex};
