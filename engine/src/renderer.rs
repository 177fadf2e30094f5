//! PDF layout for question papers and answer sheets.
//!
//! Both documents go through the same [`Layout`]: a cursor that walks down a
//! US-letter page, wraps text to the printable width and starts a new page
//! (repeating the running section title) when the bottom margin is reached.
//! Only the standard Helvetica faces are used, so nothing is embedded.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{QuizError, Result};
use crate::models::*;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const LINE_HEIGHT: f32 = 14.0;

const TITLE_SIZE: f32 = 16.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 11.0;

/// Average Helvetica advance width as a fraction of the font size.
const AVG_CHAR_WIDTH: f32 = 0.52;
const OPTION_INDENT: f32 = 18.0;
const QUESTION_GAP: f32 = 8.0;
const SECTION_GAP: f32 = 12.0;

const SECTION_LETTERS: [char; 3] = ['A', 'B', 'C'];
const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sheet {
    Questions,
    Answers,
}

impl Sheet {
    fn heading(&self) -> &'static str {
        match self {
            Sheet::Questions => "Question Paper",
            Sheet::Answers => "Answer Sheet",
        }
    }
}

pub fn render_question_paper(questions: &QuestionSet, title: Option<&TitleInfo>) -> Result<RenderedDocument> {
    render(questions, title, Sheet::Questions)
}

/// Same layout as the question paper with each question's answer printed
/// beneath it, or "Answer not available" when the model gave none.
pub fn render_answer_sheet(questions: &QuestionSet, title: Option<&TitleInfo>) -> Result<RenderedDocument> {
    render(questions, title, Sheet::Answers)
}

fn render(questions: &QuestionSet, title: Option<&TitleInfo>, sheet: Sheet) -> Result<RenderedDocument> {
    let mut layout = Layout::new();

    if let Some(title) = title.filter(|t| !t.is_empty()) {
        write_header(&mut layout, title, sheet);
    }

    for (position, (kind, records)) in questions.sections().enumerate() {
        let letter = SECTION_LETTERS.get(position).copied().unwrap_or('X');
        layout.begin_section(format!("Section {letter}: {}", kind.section_title()));

        for (i, record) in records.iter().enumerate() {
            let (number, text) = split_number(&record.question_text, i + 1);
            layout.paragraph(&format!("Q{number}. {text}"), Font::Regular, BODY_SIZE, 0.0);

            if sheet == Sheet::Questions {
                for (letter, option) in OPTION_LETTERS.iter().zip(&record.options) {
                    layout.paragraph(&format!("{letter}) {option}"), Font::Regular, BODY_SIZE, OPTION_INDENT);
                }
            } else {
                let answer = answer_text(record);
                layout.paragraph(&answer, Font::Bold, BODY_SIZE, OPTION_INDENT);
            }
            layout.gap(QUESTION_GAP);
        }
        layout.end_section();
    }

    let pages = layout.finish();
    log::debug!("Laid out {} on {} pages", sheet.heading().to_lowercase(), pages.len());
    write_document(pages)
}

fn write_header(layout: &mut Layout, title: &TitleInfo, sheet: Sheet) {
    if let Some(institution) = non_blank(&title.institution) {
        layout.centered(institution, Font::Bold, TITLE_SIZE);
    }
    layout.centered(sheet.heading(), Font::Bold, HEADING_SIZE);
    layout.gap(LINE_HEIGHT / 2.0);

    let left: Vec<String> = [("Subject", &title.subject), ("Branch", &title.branch), ("Date", &title.date)]
        .into_iter()
        .filter_map(|(label, value)| non_blank(value).map(|v| format!("{label}: {v}")))
        .collect();
    let right: Vec<String> = [("Max. Marks", &title.marks), ("Duration", &title.duration)]
        .into_iter()
        .filter_map(|(label, value)| non_blank(value).map(|v| format!("{label}: {v}")))
        .collect();

    for row in 0..left.len().max(right.len()) {
        layout.columns(
            left.get(row).map(String::as_str).unwrap_or(""),
            right.get(row).map(String::as_str).unwrap_or(""),
        );
    }

    layout.rule();
    layout.gap(SECTION_GAP);
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn question_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?i)\s*q(\d+)\s*[:.)]\s*").unwrap())
}

/// Prefers a leading `Q<N>:` in the text over the sequential number.
fn split_number(question: &str, sequential: usize) -> (usize, &str) {
    if let Some(caps) = question_number().captures(question) {
        if let Ok(number) = caps[1].parse::<usize>() {
            return (number, question[caps[0].len()..].trim());
        }
    }
    (sequential, question.trim())
}

fn answer_text(record: &QuestionRecord) -> String {
    let Some(answer) = record.correct_answer.as_deref().filter(|a| !a.trim().is_empty()) else {
        return "Answer not available".to_string();
    };

    match record
        .options
        .iter()
        .position(|option| option == answer)
        .and_then(|idx| OPTION_LETTERS.get(idx))
    {
        Some(letter) => format!("Answer: {letter}) {answer}"),
        None => format!("Answer: {answer}"),
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    text.graphemes(true).count() as f32 * size * AVG_CHAR_WIDTH
}

/// Greedy word wrap. Words wider than a whole line are split by grapheme.
fn wrap(text: &str, width: f32, size: f32) -> Vec<String> {
    let max_chars = ((width / (size * AVG_CHAR_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let graphemes: Vec<&str> = word.graphemes(true).collect();

        if graphemes.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            for piece in graphemes.chunks(max_chars) {
                lines.push(piece.concat());
            }
            if let Some(last) = lines.pop() {
                current_len = last.graphemes(true).count();
                current = last;
            }
            continue;
        }

        let needed = if current.is_empty() { graphemes.len() } else { current_len + 1 + graphemes.len() };
        if needed > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += graphemes.len();
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Standard fonts use WinAnsiEncoding; anything outside Latin-1 is folded
/// to an ASCII look-alike or `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            '\u{2013}' | '\u{2014}' => b'-',
            '\u{2022}' => b'*',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) <= 0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
    section: Option<String>,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
            section: None,
        }
    }

    fn printable_width() -> f32 {
        PAGE_WIDTH - 2.0 * MARGIN
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;

        if let Some(section) = self.section.clone() {
            self.line(&format!("{section} (contd.)"), Font::Bold, HEADING_SIZE, MARGIN);
            self.gap(LINE_HEIGHT / 2.0);
        }
    }

    fn line(&mut self, text: &str, font: Font, size: f32, x: f32) {
        let baseline = self.y - size;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
            Operation::new("Td", vec![x.into(), baseline.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_text(text))]),
            Operation::new("ET", vec![]),
        ]);
        self.y -= size.max(LINE_HEIGHT);
    }

    fn paragraph(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        for line in wrap(text, Self::printable_width() - indent, size) {
            self.ensure_space(LINE_HEIGHT);
            self.line(&line, font, size, MARGIN + indent);
        }
    }

    fn centered(&mut self, text: &str, font: Font, size: f32) {
        for line in wrap(text, Self::printable_width(), size) {
            self.ensure_space(size.max(LINE_HEIGHT));
            let x = (PAGE_WIDTH - text_width(&line, size)) / 2.0;
            self.line(&line, font, size, x.max(MARGIN));
        }
    }

    fn columns(&mut self, left: &str, right: &str) {
        self.ensure_space(LINE_HEIGHT);
        let column = Self::printable_width() / 2.0;
        let y = self.y;
        if !left.is_empty() {
            self.line(left, Font::Regular, BODY_SIZE, MARGIN);
        }
        if !right.is_empty() {
            self.y = y;
            self.line(right, Font::Regular, BODY_SIZE, MARGIN + column);
        }
        self.y = y - LINE_HEIGHT;
    }

    fn rule(&mut self) {
        self.ensure_space(LINE_HEIGHT);
        let y = self.y - LINE_HEIGHT / 2.0;
        self.current.extend([
            Operation::new("w", vec![0.75_f32.into()]),
            Operation::new("m", vec![MARGIN.into(), y.into()]),
            Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]),
            Operation::new("S", vec![]),
        ]);
        self.y -= LINE_HEIGHT;
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    /// A section title is never left alone at the bottom of a page.
    fn begin_section(&mut self, title: String) {
        self.section = None;
        self.ensure_space(HEADING_SIZE + 2.0 * LINE_HEIGHT);
        self.line(&title, Font::Bold, HEADING_SIZE, MARGIN);
        self.gap(LINE_HEIGHT / 2.0);
        self.section = Some(title);
    }

    fn end_section(&mut self) {
        self.section = None;
        self.gap(SECTION_GAP);
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn media_box() -> Vec<Object> {
    vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()]
}

fn write_document(pages: Vec<Vec<Operation>>) -> Result<RenderedDocument> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular_id,
            Font::Bold.resource_name() => bold_id,
        },
    });

    let mut kids: Vec<ObjectId> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box(),
        });
        kids.push(page_id);
    }

    let page_count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids.into_iter().map(Object::from).collect::<Vec<_>>(),
        "Count" => page_count,
        "MediaBox" => media_box(),
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| QuizError::Rendering(format!("failed to write PDF: {e}")))?;
    Ok(RenderedDocument::new(bytes))
}
