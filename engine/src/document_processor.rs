use lopdf::Document as PdfDocument;
use std::any::Any;
use std::io::{Read, Seek, SeekFrom};
use std::panic;

use crate::error::{QuizError, Result};
use crate::models::PdfSource;

pub struct DocumentProcessor;

impl DocumentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts every source in order, with a newline between documents.
    ///
    /// The first unreadable document aborts the whole batch; the error names it.
    pub fn extract_text(&self, sources: &[PdfSource]) -> Result<String> {
        let texts = sources
            .iter()
            .map(|source| self.process_pdf(source))
            .collect::<Result<Vec<_>>>()?;
        let full_text = texts.join("\n");

        log::info!(
            "Processed {} documents ({} chars)",
            sources.len(),
            full_text.len()
        );
        Ok(full_text)
    }

    fn process_pdf(&self, source: &PdfSource) -> Result<String> {
        log::info!("Processing PDF: {} ({} bytes)", source.name, source.bytes.len());

        if !source.bytes.starts_with(b"%PDF-") {
            return Err(QuizError::extraction(&source.name, "missing %PDF header"));
        }

        let document = PdfDocument::load_mem(&source.bytes)
            .map_err(|e| QuizError::extraction(&source.name, e))?;

        if document.trailer.get(b"Encrypt").is_ok() {
            return Err(QuizError::extraction(
                &source.name,
                "document is encrypted and no credentials were provided",
            ));
        }

        let page_count = document.get_pages().len();
        if page_count == 0 {
            return Err(QuizError::extraction(&source.name, "document has zero pages"));
        }

        // pdf-extract panics on some fonts lopdf accepts, e.g. Type0 without descendants.
        let text = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&source.bytes))
            .map_err(|payload| QuizError::extraction(&source.name, panic_reason(payload.as_ref())))?
            .map_err(|e| QuizError::extraction(&source.name, e))?;

        log::debug!("{}: {} pages, {} chars", source.name, page_count, text.len());
        Ok(clean_text(&text))
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a whole stream into a [`PdfSource`] and seeks it back to where it
/// started, so the caller can hand the same stream on.
pub fn read_source<R: Read + Seek>(name: impl Into<String>, reader: &mut R) -> Result<PdfSource> {
    let name = name.into();
    let start = reader
        .stream_position()
        .map_err(|e| QuizError::extraction(&name, e))?;

    let mut bytes = Vec::new();
    let read = reader.read_to_end(&mut bytes);
    reader
        .seek(SeekFrom::Start(start))
        .map_err(|e| QuizError::extraction(&name, e))?;
    read.map_err(|e| QuizError::extraction(&name, e))?;

    Ok(PdfSource { name, bytes })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("text extraction aborted: {detail}")
}

/// Drops control characters (form feeds between pages, NULs) while keeping
/// line structure.
fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\u{c}' { '\n' } else { c })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionRecord, QuestionSet, QuestionType};
    use crate::renderer::render_question_paper;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Dictionary, Object, Stream};
    use std::io::Cursor;

    /// One page showing "Hello" in `font`, or no pages at all.
    fn build_pdf(font: Dictionary, with_page: bool, encrypt: Option<Dictionary>) -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(font);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        if with_page {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal("Hello")]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(encrypt) = encrypt {
            let encrypt_id = doc.add_object(encrypt);
            doc.trailer.set("Encrypt", encrypt_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn helvetica() -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }
    }

    fn rendered(name: &str, line: &str) -> PdfSource {
        let mut set = QuestionSet::new();
        set.extend(QuestionType::ShortAnswer, vec![QuestionRecord::open(line, None)]);
        let document = render_question_paper(&set, None).unwrap();
        PdfSource::new(name, document.into_bytes())
    }

    fn expect_extraction_error(sources: &[PdfSource], name: &str) {
        match DocumentProcessor::new().extract_text(sources) {
            Err(QuizError::Extraction { document, .. }) => assert_eq!(document, name),
            other => panic!("expected extraction error for {name}, got {other:?}"),
        }
    }

    #[test]
    fn test_documents_keep_order_with_newline_between() {
        let processor = DocumentProcessor::new();
        let first = rendered("first.pdf", "Aardvarks burrow underground.");
        let second = rendered("second.pdf", "Zebras graze on savannas.");

        let alone_first = processor.extract_text(std::slice::from_ref(&first)).unwrap();
        let alone_second = processor.extract_text(std::slice::from_ref(&second)).unwrap();
        let both = processor.extract_text(&[first, second]).unwrap();

        assert_eq!(both, format!("{alone_first}\n{alone_second}"));
        let aardvark = both.find("Aardvarks").unwrap();
        let zebra = both.find("Zebras").unwrap();
        assert!(aardvark < zebra);
    }

    #[test]
    fn test_plain_type1_font_extracts() {
        let bytes = build_pdf(helvetica(), true, None);
        let text = DocumentProcessor::new()
            .extract_text(&[PdfSource::new("hello.pdf", bytes)])
            .unwrap();
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_extractor_panic_names_document() {
        let broken_font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Foo",
        };
        let sources = vec![
            PdfSource::new("fine.pdf", build_pdf(helvetica(), true, None)),
            PdfSource::new("type0.pdf", build_pdf(broken_font, true, None)),
        ];
        expect_extraction_error(&sources, "type0.pdf");
    }

    #[test]
    fn test_zero_page_document_is_rejected() {
        let sources = vec![PdfSource::new("empty.pdf", build_pdf(helvetica(), false, None))];
        expect_extraction_error(&sources, "empty.pdf");
    }

    #[test]
    fn test_encrypted_document_is_rejected() {
        let encrypt = dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => Object::string_literal(vec![0x4f_u8; 32]),
            "U" => Object::string_literal(vec![0x55_u8; 32]),
            "P" => -4,
        };
        let sources = vec![PdfSource::new("locked.pdf", build_pdf(helvetica(), true, Some(encrypt)))];
        expect_extraction_error(&sources, "locked.pdf");
    }

    #[test]
    fn test_extract_invalid_pdf_fails_with_document_name() {
        let processor = DocumentProcessor::new();
        let sources = vec![PdfSource::new("notes.txt", b"This is not a PDF".to_vec())];

        match processor.extract_text(&sources) {
            Err(QuizError::Extraction { document, .. }) => assert_eq!(document, "notes.txt"),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_truncated_pdf_fails() {
        let processor = DocumentProcessor::new();
        let sources = vec![PdfSource::new("broken.pdf", b"%PDF-1.5\n%garbage".to_vec())];
        assert!(matches!(
            processor.extract_text(&sources),
            Err(QuizError::Extraction { .. })
        ));
    }

    #[test]
    fn test_empty_collection_yields_empty_text() {
        let processor = DocumentProcessor::new();
        assert_eq!(processor.extract_text(&[]).unwrap(), "");
    }

    #[test]
    fn test_read_source_rewinds_stream() {
        let mut cursor = Cursor::new(b"%PDF-1.4 fake".to_vec());
        cursor.set_position(2);

        let source = read_source("fake.pdf", &mut cursor).unwrap();
        assert_eq!(source.bytes, b"DF-1.4 fake");
        assert_eq!(cursor.position(), 2);

        let again = read_source("fake.pdf", &mut cursor).unwrap();
        assert_eq!(again.bytes, source.bytes);
    }

    #[test]
    fn test_clean_text_replaces_form_feeds() {
        assert_eq!(clean_text("page one\u{c}page two\u{0}"), "page one\npage two");
    }
}
