use reqwest::Client;
use std::sync::Arc;
use uuid::Uuid;

use crate::archive::bundle_exam;
use crate::chunker::chunk_text;
use crate::completion_service::{
    CompletionParams, CompletionProvider, GeminiCompletionProvider, OpenAiCompletionProvider,
};
use crate::config::{ProviderKind, QuizConfig};
use crate::document_processor::DocumentProcessor;
use crate::embedding_service::{
    embed_chunks, EmbeddingProvider, GeminiEmbeddingProvider, HashingEmbeddingProvider,
    OpenAiEmbeddingProvider,
};
use crate::error::{QuizError, Result};
use crate::models::*;
use crate::query_service::Retriever;
use crate::question_generator::QuestionGenerator;
use crate::renderer::{render_answer_sheet, render_question_paper};
use crate::vector_index::VectorIndex;

/// Everything one exam request produces.
#[derive(Debug, Clone)]
pub struct ExamOutput {
    pub request_id: Uuid,
    pub questions: QuestionSet,
    pub question_paper: RenderedDocument,
    pub answer_sheet: RenderedDocument,
    pub archive: Archive,
}

/// Extraction, retrieval, generation and rendering wired together.
///
/// Holds no per-request state; share one instance behind an `Arc` or a static.
pub struct QuizPipeline {
    config: QuizConfig,
    embedding_service: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    question_generator: QuestionGenerator,
}

struct Corpus {
    chunks: Vec<Chunk>,
    index: VectorIndex,
}

impl QuizPipeline {
    pub fn new(
        config: QuizConfig,
        embedding_service: Arc<dyn EmbeddingProvider>,
        completion_service: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let params = CompletionParams {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        };

        Ok(Self {
            retriever: Retriever::new(embedding_service.clone()),
            question_generator: QuestionGenerator::new(completion_service, params, config.batch_ceiling),
            embedding_service,
            config,
        })
    }

    /// Builds the HTTP providers named by `config.provider`.
    pub fn from_config(config: QuizConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Initializing quiz pipeline ({:?}, completion model {})",
            config.provider,
            config.completion_model
        );

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| QuizError::invalid(format!("failed to build HTTP client: {e}")))?;

        let api_key = config.require_api_key()?.to_string();
        let base = config.api_base.clone();

        let (embedder, completer): (Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>) =
            match config.provider {
                ProviderKind::Gemini => {
                    let mut embedder =
                        GeminiEmbeddingProvider::new(client.clone(), api_key.clone(), &config.embedding_model);
                    let mut completer =
                        GeminiCompletionProvider::new(client, api_key, &config.completion_model);
                    if let Some(base) = base {
                        embedder = embedder.with_base_url(base.clone());
                        completer = completer.with_base_url(base);
                    }
                    (Arc::new(embedder), Arc::new(completer))
                }
                ProviderKind::OpenAi => {
                    let mut embedder =
                        OpenAiEmbeddingProvider::new(client.clone(), api_key.clone(), &config.embedding_model);
                    let mut completer =
                        OpenAiCompletionProvider::new(client, api_key, &config.completion_model);
                    if let Some(base) = base {
                        embedder = embedder.with_base_url(base.clone());
                        completer = completer.with_base_url(base);
                    }
                    (Arc::new(embedder), Arc::new(completer))
                }
                ProviderKind::Local => {
                    let mut completer =
                        GeminiCompletionProvider::new(client, api_key, &config.completion_model);
                    if let Some(base) = base {
                        completer = completer.with_base_url(base);
                    }
                    (
                        Arc::new(HashingEmbeddingProvider::new(config.embedding_dimension)),
                        Arc::new(completer),
                    )
                }
            };

        Self::new(config, embedder, completer)
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    /// Runs retrieval and generation over text that is already extracted.
    pub async fn generate_from_text(&self, text: &str, spec: &GenerationSpec) -> Result<Vec<QuestionRecord>> {
        let request_id = Uuid::new_v4();
        let corpus = self.prepare(request_id, text).await?;
        self.generate_section(request_id, &corpus, spec).await
    }

    pub async fn generate_from_pdfs(&self, sources: Vec<PdfSource>, spec: &GenerationSpec) -> Result<Vec<QuestionRecord>> {
        let request_id = Uuid::new_v4();
        let text = extract(request_id, sources).await?;
        let corpus = self.prepare(request_id, &text).await?;
        self.generate_section(request_id, &corpus, spec).await
    }

    /// Generates every requested question type from the same documents and
    /// renders the question paper, answer sheet and their archive.
    ///
    /// Specs naming the same type are merged by adding their counts. Any
    /// extraction, provider or rendering failure fails the whole exam.
    pub async fn generate_exam(
        &self,
        sources: Vec<PdfSource>,
        specs: &[GenerationSpec],
        title: Option<TitleInfo>,
    ) -> Result<ExamOutput> {
        let request_id = Uuid::new_v4();
        let specs = merge_specs(specs)?;
        let title = title.or_else(|| specs.iter().find_map(|spec| spec.title.clone()));

        let text = extract(request_id, sources).await?;
        let corpus = self.prepare(request_id, &text).await?;

        let mut questions = QuestionSet::new();
        for spec in &specs {
            let spec = GenerationSpec {
                title: title.clone(),
                ..spec.clone()
            };
            let records = self.generate_section(request_id, &corpus, &spec).await?;
            questions.extend(spec.question_type, records);
        }

        let question_paper = render_question_paper(&questions, title.as_ref())?;
        let answer_sheet = render_answer_sheet(&questions, title.as_ref())?;
        let archive = bundle_exam(&question_paper, &answer_sheet)?;

        log::info!(
            "[{request_id}] Exam ready: {} questions, paper {} bytes, answers {} bytes",
            questions.len(),
            question_paper.len(),
            answer_sheet.len()
        );

        Ok(ExamOutput {
            request_id,
            questions,
            question_paper,
            answer_sheet,
            archive,
        })
    }

    async fn prepare(&self, request_id: Uuid, text: &str) -> Result<Corpus> {
        let chunks = chunk_text(text, self.config.chunk_size)?;
        log::info!("[{request_id}] Split text into {} chunks", chunks.len());
        if chunks.is_empty() {
            log::warn!("[{request_id}] Documents contain no text; generating without context");
        }

        let vectors = embed_chunks(
            self.embedding_service.as_ref(),
            &chunks,
            self.config.embedding_batch_size,
        )
        .await?;
        let index = VectorIndex::build(vectors, self.config.distance)?;

        Ok(Corpus { chunks, index })
    }

    async fn generate_section(
        &self,
        request_id: Uuid,
        corpus: &Corpus,
        spec: &GenerationSpec,
    ) -> Result<Vec<QuestionRecord>> {
        let query = retrieval_query(spec);
        let context = self
            .retriever
            .retrieve(&corpus.index, &corpus.chunks, &query, self.config.retrieval_k)
            .await?;

        log::info!(
            "[{request_id}] Generating {} {} questions from {} chars of context",
            spec.count,
            spec.question_type,
            context.len()
        );
        let records = self.question_generator.generate(&context, spec).await?;
        log::info!(
            "[{request_id}] Parsed {} {} questions",
            records.len(),
            spec.question_type
        );
        Ok(records)
    }
}

/// PDF parsing is CPU-bound, so it runs off the async workers.
async fn extract(request_id: Uuid, sources: Vec<PdfSource>) -> Result<String> {
    if sources.is_empty() {
        return Err(QuizError::invalid("at least one PDF document is required"));
    }
    log::info!("[{request_id}] Extracting text from {} documents", sources.len());

    let text = tokio::task::spawn_blocking(move || DocumentProcessor::new().extract_text(&sources))
        .await
        .map_err(|e| QuizError::extraction("document batch", e))??;

    log::info!("[{request_id}] Extracted {} characters", text.len());
    Ok(text)
}

fn merge_specs(specs: &[GenerationSpec]) -> Result<Vec<GenerationSpec>> {
    if specs.is_empty() {
        return Err(QuizError::invalid("at least one question type is required"));
    }

    let mut merged: Vec<GenerationSpec> = Vec::new();
    for spec in specs {
        if spec.count == 0 {
            return Err(QuizError::invalid(format!(
                "question count for {} must be at least 1",
                spec.question_type
            )));
        }
        match merged.iter_mut().find(|m| m.question_type == spec.question_type) {
            Some(existing) => existing.count += spec.count,
            None => merged.push(spec.clone()),
        }
    }
    merged.sort_by_key(|spec| spec.question_type);
    Ok(merged)
}

fn retrieval_query(spec: &GenerationSpec) -> String {
    let subject = spec
        .title
        .as_ref()
        .and_then(|title| title.subject.as_deref())
        .map(str::trim)
        .filter(|subject| !subject.is_empty());

    match subject {
        Some(subject) => format!(
            "Key concepts, definitions and facts about {subject} suitable for {} exam questions",
            spec.question_type
        ),
        None => format!(
            "Key concepts, definitions and facts suitable for {} exam questions",
            spec.question_type
        ),
    }
}
