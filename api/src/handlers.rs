use axum::{
    extract::Multipart,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use quiz_engine::{QuestionSet, QuizPipeline};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api_error::ApiError;
use crate::generate_form::GenerateForm;
use crate::QUIZ_PIPELINE;

#[derive(Serialize)]
pub struct ExamResponse {
    pub request_id: String,
    pub total_questions: usize,
    pub questions: QuestionSet,
}

fn pipeline() -> Result<&'static QuizPipeline, ApiError> {
    QUIZ_PIPELINE
        .get()
        .ok_or_else(|| ApiError::internal("quiz pipeline is not initialized"))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate(multipart: Multipart) -> Result<Json<ExamResponse>, ApiError> {
    let form = GenerateForm::from_multipart(multipart).await?;
    log::info!(
        "Generate request: {} documents, {} question types",
        form.sources.len(),
        form.specs.len()
    );

    let exam = pipeline()?
        .generate_exam(form.sources, &form.specs, form.title)
        .await?;

    Ok(Json(ExamResponse {
        request_id: exam.request_id.to_string(),
        total_questions: exam.questions.len(),
        questions: exam.questions,
    }))
}

pub async fn generate_archive(multipart: Multipart) -> Result<Response, ApiError> {
    let form = GenerateForm::from_multipart(multipart).await?;
    log::info!(
        "Archive request: {} documents, {} question types",
        form.sources.len(),
        form.specs.len()
    );

    let exam = pipeline()?
        .generate_exam(form.sources, &form.specs, form.title)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"exam.zip\""),
        ],
        exam.archive.into_bytes(),
    )
        .into_response())
}
