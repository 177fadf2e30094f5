use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{QuizError, Result};
use crate::models::{Archive, RenderedDocument};

pub const QUESTION_PAPER_NAME: &str = "question_paper.pdf";
pub const ANSWER_SHEET_NAME: &str = "answer_sheet.pdf";

/// Packs named documents into one deflated zip, in the given order.
///
/// Entries carry a fixed timestamp so the same documents always give the
/// same bytes.
pub fn bundle(documents: &[(&str, &RenderedDocument)]) -> Result<Archive> {
    let mut names = HashSet::new();
    for (name, _) in documents {
        if name.trim().is_empty() {
            return Err(QuizError::Rendering("archive member name is empty".to_string()));
        }
        if !names.insert(*name) {
            return Err(QuizError::Rendering(format!("duplicate archive member: {name}")));
        }
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (name, document) in documents {
        zip.start_file(*name, options)?;
        zip.write_all(document.as_bytes())
            .map_err(|e| QuizError::Rendering(format!("failed to write {name}: {e}")))?;
    }

    let bytes = zip.finish()?.into_inner();
    log::debug!("Bundled {} documents into {} bytes", documents.len(), bytes.len());
    Ok(Archive::new(bytes))
}

pub fn bundle_exam(question_paper: &RenderedDocument, answer_sheet: &RenderedDocument) -> Result<Archive> {
    bundle(&[
        (QUESTION_PAPER_NAME, question_paper),
        (ANSWER_SHEET_NAME, answer_sheet),
    ])
}
