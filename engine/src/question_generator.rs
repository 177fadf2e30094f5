use std::collections::HashSet;
use std::sync::Arc;

use crate::completion_service::{CompletionParams, CompletionProvider};
use crate::error::{QuizError, Result};
use crate::models::*;
use crate::question_parser::{parse_completion, ANSWER_MARKER};

pub struct QuestionGenerator {
    completion_service: Arc<dyn CompletionProvider>,
    params: CompletionParams,
    batch_ceiling: usize,
}

impl QuestionGenerator {
    pub fn new(
        completion_service: Arc<dyn CompletionProvider>,
        params: CompletionParams,
        batch_ceiling: usize,
    ) -> Self {
        Self {
            completion_service,
            params,
            batch_ceiling,
        }
    }

    /// Generates up to `spec.count` questions from `context`.
    ///
    /// The count is split into batches of at most the ceiling, one model call
    /// each. Unparseable or duplicate questions shrink the result instead of
    /// failing; a provider error fails the whole call.
    pub async fn generate(&self, context: &str, spec: &GenerationSpec) -> Result<Vec<QuestionRecord>> {
        if spec.count == 0 {
            return Err(QuizError::invalid("question count must be at least 1"));
        }
        if self.batch_ceiling == 0 {
            return Err(QuizError::invalid("batch ceiling must be at least 1"));
        }

        let kind = spec.question_type;
        let batches = batch_sizes(spec.count, self.batch_ceiling);
        let mut records: Vec<QuestionRecord> = Vec::with_capacity(spec.count);
        let mut seen: HashSet<String> = HashSet::new();

        for (batch_no, requested) in batches.iter().enumerate() {
            if records.len() >= spec.count {
                break;
            }

            let previous: Vec<&str> = records.iter().map(|r| r.question_text.as_str()).collect();
            let prompt = build_prompt(context, kind, *requested, &previous);

            log::debug!(
                "Requesting {} {} questions (batch {}/{})",
                requested,
                kind,
                batch_no + 1,
                batches.len()
            );
            let raw = self
                .completion_service
                .complete(&prompt, &self.params)
                .await
                .map_err(QuizError::Generation)?;

            let parsed = parse_completion(&raw, kind);
            if parsed.rejected > 0 {
                log::warn!(
                    "Dropped {} malformed {} questions in batch {}",
                    parsed.rejected,
                    kind,
                    batch_no + 1
                );
            }

            for record in parsed.records {
                if seen.insert(normalize(&record.question_text)) {
                    records.push(record);
                } else {
                    log::debug!("Skipping duplicate question: {}", record.question_text);
                }
            }
        }

        records.truncate(spec.count);
        if records.len() < spec.count {
            log::warn!(
                "Model produced {} of {} requested {} questions",
                records.len(),
                spec.count,
                kind
            );
        }
        Ok(records)
    }
}

/// Splits `count` into model calls of at most `ceiling` questions each.
pub fn batch_sizes(count: usize, ceiling: usize) -> Vec<usize> {
    if ceiling == 0 {
        return Vec::new();
    }
    let mut sizes = vec![ceiling; count / ceiling];
    if count % ceiling != 0 {
        sizes.push(count % ceiling);
    }
    sizes
}

fn normalize(question: &str) -> String {
    question
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_prompt(context: &str, kind: QuestionType, count: usize, previous: &[&str]) -> String {
    let layout = match kind {
        QuestionType::MultipleChoice => format!(
            r#"Write exactly {count} multiple-choice questions.

FORMAT (follow exactly, no extra commentary):
Q1: <question text>
A) <option>
B) <option>
C) <option>
D) <option>

RULES:
1. Every question has exactly four options labelled A) to D), one per line
2. Mark the single correct option with {marker} directly before its text, for example "C) {marker}Paris"
3. Leave one blank line between questions
4. Number the questions Q1 to Q{count}"#,
            marker = ANSWER_MARKER
        ),
        QuestionType::ShortAnswer | QuestionType::LongAnswer => {
            let answer_style = if kind == QuestionType::ShortAnswer {
                "one or two sentences"
            } else {
                "a detailed paragraph of 150 to 250 words"
            };
            format!(
                r#"Write exactly {count} {kind} questions and their answers.

Return the output in two sections:
Questions:
Q1: <question text>
Q2: <question text>

Answers:
A1: <answer to Q1>
A2: <answer to Q2>

RULES:
1. Each question is a single line starting with its number, Q1 to Q{count}
2. Each answer is {answer_style} and starts with the matching number, A1 to A{count}
3. Do not add options or any other commentary"#
            )
        }
    };

    let avoid = if previous.is_empty() {
        String::new()
    } else {
        let listed: Vec<String> = previous.iter().map(|q| format!("- {q}")).collect();
        format!(
            "\nDo not repeat any of these previously generated questions:\n{}\n",
            listed.join("\n")
        )
    };

    format!(
        r#"You are an expert educator creating an exam from study material. Base every question and answer solely on the context below.

{layout}
{avoid}
CONTEXT:
{context}
"#
    )
}
