use axum::extract::Multipart;
use quiz_engine::{GenerationSpec, PdfSource, QuestionType, TitleInfo};

use crate::api_error::ApiError;

/// Upload form shared by `/generate` and `/generate/archive`.
///
/// `question_type` and `count` may repeat; the n-th count belongs to the
/// n-th question type.
pub struct GenerateForm {
    pub sources: Vec<PdfSource>,
    pub specs: Vec<GenerationSpec>,
    pub title: Option<TitleInfo>,
}

impl GenerateForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut sources = Vec::new();
        let mut types = Vec::new();
        let mut counts = Vec::new();
        let mut title = TitleInfo::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("invalid multipart data: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "documents" {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("document-{}.pdf", sources.len() + 1));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read {file_name}: {e}")))?;
                sources.push(PdfSource::new(file_name, bytes.to_vec()));
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read field {name}: {e}")))?;

            match name.as_str() {
                "question_type" => types.push(value),
                "count" => counts.push(value),
                "institution" => title.institution = Some(value),
                "date" => title.date = Some(value),
                "subject" => title.subject = Some(value),
                "branch" => title.branch = Some(value),
                "marks" => title.marks = Some(value),
                "duration" => title.duration = Some(value),
                other => log::debug!("Ignoring unknown form field: {other}"),
            }
        }

        if sources.is_empty() {
            return Err(ApiError::bad_request("at least one PDF must be uploaded as `documents`"));
        }

        Ok(Self {
            sources,
            specs: build_specs(&types, &counts)?,
            title: (!title.is_empty()).then_some(title),
        })
    }
}

fn build_specs(types: &[String], counts: &[String]) -> Result<Vec<GenerationSpec>, ApiError> {
    if types.is_empty() {
        return Err(ApiError::bad_request("at least one question_type is required"));
    }
    if types.len() != counts.len() {
        return Err(ApiError::bad_request(format!(
            "got {} question_type values but {} count values",
            types.len(),
            counts.len()
        )));
    }

    types
        .iter()
        .zip(counts)
        .map(|(kind, count)| {
            let question_type: QuestionType = kind.parse()?;
            let count: usize = count
                .trim()
                .parse()
                .map_err(|_| ApiError::bad_request(format!("count must be a positive integer, got '{count}'")))?;
            if count == 0 {
                return Err(ApiError::bad_request("count must be at least 1"));
            }
            Ok(GenerationSpec::new(question_type, count))
        })
        .collect()
}
