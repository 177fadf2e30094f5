use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::QuizError;

/// A raw PDF as supplied by the caller. `name` identifies it in errors.
#[derive(Debug, Clone)]
pub struct PdfSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PdfSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
    pub word_count: usize,
}

/// Ordering of the variants is the section order of rendered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "mcq")]
    MultipleChoice,
    #[serde(rename = "short")]
    ShortAnswer,
    #[serde(rename = "long")]
    LongAnswer,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [
        QuestionType::MultipleChoice,
        QuestionType::ShortAnswer,
        QuestionType::LongAnswer,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::ShortAnswer => "short-answer",
            QuestionType::LongAnswer => "long-answer",
        }
    }

    pub fn section_title(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "Multiple Choice Questions",
            QuestionType::ShortAnswer => "Short Answer Questions",
            QuestionType::LongAnswer => "Long Answer Questions",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QuestionType {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(&['_', ' '][..], "-");
        match normalized.as_str() {
            "mcq" | "multiple-choice" | "multiplechoice" => Ok(QuestionType::MultipleChoice),
            "short" | "short-answer" => Ok(QuestionType::ShortAnswer),
            "long" | "long-answer" => Ok(QuestionType::LongAnswer),
            other => Err(QuizError::invalid(format!("unknown question type: {other}"))),
        }
    }
}

/// Free-text exam metadata printed in the document header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleInfo {
    pub institution: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub branch: Option<String>,
    pub marks: Option<String>,
    pub duration: Option<String>,
}

impl TitleInfo {
    pub fn is_empty(&self) -> bool {
        [
            &self.institution,
            &self.date,
            &self.subject,
            &self.branch,
            &self.marks,
            &self.duration,
        ]
        .iter()
        .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub question_type: QuestionType,
    pub count: usize,
    #[serde(default)]
    pub title: Option<TitleInfo>,
}

impl GenerationSpec {
    pub fn new(question_type: QuestionType, count: usize) -> Self {
        Self {
            question_type,
            count,
            title: None,
        }
    }

    pub fn with_title(mut self, title: TitleInfo) -> Self {
        self.title = Some(title);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

impl QuestionRecord {
    pub fn open(question_text: impl Into<String>, answer: Option<String>) -> Self {
        Self {
            question_text: question_text.into(),
            options: Vec::new(),
            correct_answer: answer,
        }
    }

    pub fn is_multiple_choice(&self) -> bool {
        !self.options.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionSet {
    sections: BTreeMap<QuestionType, Vec<QuestionRecord>>,
}

impl QuestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, question_type: QuestionType, records: Vec<QuestionRecord>) {
        self.sections.entry(question_type).or_default().extend(records);
    }

    pub fn get(&self, question_type: QuestionType) -> &[QuestionRecord] {
        self.sections
            .get(&question_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty sections in rendering order.
    pub fn sections(&self) -> impl Iterator<Item = (QuestionType, &[QuestionRecord])> {
        self.sections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, records)| (*kind, records.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument(Vec<u8>);

impl RenderedDocument {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive(Vec<u8>);

impl Archive {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

// Gemini wire types

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: GeminiContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiEmbedRequest {
    pub requests: Vec<GeminiEmbedContentRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiEmbedContentRequest {
    pub model: String,
    pub content: GeminiContent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiEmbedResponse {
    #[serde(default)]
    pub embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiEmbedding {
    pub values: Vec<f32>,
}

// OpenAI-compatible wire types

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub index: usize,
    pub embedding: Vec<f32>,
}
