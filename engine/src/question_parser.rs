//! Line-oriented parser for model completions.
//!
//! A completion is split at the first `Answers:` header. The part before it is
//! fed line by line through a small state machine that assembles question
//! blocks; the part after it is a numbered answer list matched back to the
//! questions by their `Q<N>` number.
//!
//! A block that breaks the expected layout is dropped on its own and counted
//! in [`ParsedBatch::rejected`]; the rest of the batch is unaffected.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{QuestionRecord, QuestionType};

/// Flags the correct multiple-choice option.
pub const ANSWER_MARKER: char = '*';

pub const OPTIONS_PER_QUESTION: usize = 4;

macro_rules! regex {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pattern).unwrap())
    }};
}

fn question_line() -> &'static Regex {
    regex!(r"^(?i)\**\s*(?:q|question)\s*(\d+)\s*[:.)\-]\**\s*(.*)$")
}

fn option_line() -> &'static Regex {
    regex!(r"^(\*)?\s*(?:[-•]\s*)?(\*)?\s*\(?([A-Da-d])\s*[).:]\s*(.*)$")
}

fn inline_answer_line() -> &'static Regex {
    regex!(r"^(?i)[*\s]*(?:correct\s+)?(?:answer|ans)\s*[:\-]+[*\s]*(.*)$")
}

fn answers_header() -> &'static Regex {
    regex!(r"^(?i)[#*\s]*(?:\d+[.)]\s*)?(?:answers|answer\s+key)\s*:?[*\s]*$")
}

fn questions_header() -> &'static Regex {
    regex!(r"^(?i)[#*\s]*(?:\d+[.)]\s*)?questions?\s*:?[*\s]*$")
}

fn numbered_answer_line() -> &'static Regex {
    regex!(r"^(?i)[*\s]*(a|ans|answer|q|question)?\s*(\d+)\s*[:.)\-][*\s]*(.*)$")
}

fn option_reference() -> &'static Regex {
    regex!(r"^(?i)\(?([a-d])\)?(?:\s*[).:]\s*.*)?$")
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedBatch {
    pub records: Vec<QuestionRecord>,
    /// Question blocks that were started but did not match the layout.
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Blank,
    Question { number: u32, text: String },
    InlineAnswer(String),
    Choice { text: String, marked: bool },
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingQuestion,
    InQuestion,
    InOptions,
    InAnswer,
    Skipping,
}

#[derive(Debug, Default)]
struct Block {
    number: u32,
    text: String,
    options: Vec<(String, bool)>,
    answer: Option<String>,
}

struct BlockParser {
    kind: QuestionType,
    state: State,
    current: Option<Block>,
    finished: Vec<Block>,
    rejected: usize,
}

impl BlockParser {
    fn new(kind: QuestionType) -> Self {
        Self {
            kind,
            state: State::AwaitingQuestion,
            current: None,
            finished: Vec::new(),
            rejected: 0,
        }
    }

    fn classify(&self, raw: &str) -> Line {
        let line = raw.trim();
        if line.is_empty() || questions_header().is_match(line) {
            return Line::Blank;
        }
        if let Some(caps) = question_line().captures(line) {
            if let Ok(number) = caps[1].parse() {
                return Line::Question {
                    number,
                    text: clean_fragment(&caps[2]),
                };
            }
        }
        if let Some(caps) = inline_answer_line().captures(line) {
            return Line::InlineAnswer(clean_fragment(&caps[1]));
        }
        if self.kind == QuestionType::MultipleChoice {
            if let Some(caps) = option_line().captures(line) {
                let leading_marker = caps.get(1).is_some() || caps.get(2).is_some();
                let body = caps[4].trim();
                let marked = leading_marker
                    || body.starts_with(ANSWER_MARKER)
                    || body.ends_with(ANSWER_MARKER);
                return Line::Choice {
                    text: strip_marker(body),
                    marked,
                };
            }
        }
        Line::Text(line.to_string())
    }

    fn feed(&mut self, raw: &str) {
        let line = self.classify(raw);

        match (self.state, line) {
            (_, Line::Blank) => {}

            (_, Line::Question { number, text }) => {
                self.finish_block();
                self.current = Some(Block {
                    number,
                    text,
                    ..Block::default()
                });
                self.state = State::InQuestion;
            }

            (State::InQuestion | State::InOptions, Line::InlineAnswer(answer)) => {
                if let Some(block) = self.current.as_mut() {
                    block.answer = Some(answer);
                }
                self.state = State::InAnswer;
            }
            (State::InAnswer, Line::InlineAnswer(more)) => self.append_answer(&more),

            (State::InQuestion | State::InOptions, Line::Choice { text, marked }) => {
                let too_many = match self.current.as_mut() {
                    Some(block) if !text.is_empty() => {
                        block.options.push((text, marked));
                        block.options.len() > OPTIONS_PER_QUESTION
                    }
                    _ => true,
                };
                if too_many {
                    self.reject_block();
                } else {
                    self.state = State::InOptions;
                }
            }
            (State::InAnswer, Line::Choice { .. }) => self.reject_block(),

            (State::InQuestion, Line::Text(text)) => {
                if let Some(block) = self.current.as_mut() {
                    append_text(&mut block.text, &text);
                }
            }
            (State::InOptions, Line::Text(_)) => self.reject_block(),
            (State::InAnswer, Line::Text(text)) => self.append_answer(&text),

            // Preamble before the first question, or the tail of a rejected block.
            (State::AwaitingQuestion | State::Skipping, _) => {}
        }
    }

    fn append_answer(&mut self, text: &str) {
        if let Some(block) = self.current.as_mut() {
            append_text(block.answer.get_or_insert_with(String::new), text);
        }
    }

    fn reject_block(&mut self) {
        if self.current.take().is_some() {
            self.rejected += 1;
        }
        self.state = State::Skipping;
    }

    fn finish_block(&mut self) {
        let Some(block) = self.current.take() else {
            return;
        };
        let valid = !block.text.is_empty()
            && match self.kind {
                QuestionType::MultipleChoice => block.options.len() == OPTIONS_PER_QUESTION,
                QuestionType::ShortAnswer | QuestionType::LongAnswer => true,
            };
        if valid {
            self.finished.push(block);
        } else {
            log::debug!("Dropping malformed question block Q{}", block.number);
            self.rejected += 1;
        }
        self.state = State::AwaitingQuestion;
    }

    fn finish(mut self) -> (Vec<Block>, usize) {
        self.finish_block();
        (self.finished, self.rejected)
    }
}

/// Parses one raw completion into question records of the given type.
pub fn parse_completion(raw: &str, kind: QuestionType) -> ParsedBatch {
    let lines: Vec<&str> = raw.lines().collect();
    let split = lines
        .iter()
        .position(|line| answers_header().is_match(line.trim()))
        .unwrap_or(lines.len());

    let mut parser = BlockParser::new(kind);
    for line in &lines[..split] {
        parser.feed(line);
    }
    let (blocks, rejected) = parser.finish();

    let answers = if split < lines.len() {
        parse_answer_section(&lines[split + 1..])
    } else {
        HashMap::new()
    };

    let records = blocks
        .into_iter()
        .map(|block| {
            let listed = answers.get(&block.number).cloned();
            build_record(block, kind, listed)
        })
        .collect();

    ParsedBatch { records, rejected }
}

fn build_record(block: Block, kind: QuestionType, listed_answer: Option<String>) -> QuestionRecord {
    let fallback = block.answer.or(listed_answer).filter(|a| !a.is_empty());

    match kind {
        QuestionType::MultipleChoice => {
            let marked: Vec<&String> = block
                .options
                .iter()
                .filter(|(_, marked)| *marked)
                .map(|(text, _)| text)
                .collect();

            let options: Vec<String> = block.options.iter().map(|(text, _)| text.clone()).collect();
            let correct_answer = match marked.as_slice() {
                [only] => Some((*only).clone()),
                _ => fallback.and_then(|answer| resolve_option(&answer, &options)),
            };

            QuestionRecord {
                question_text: block.text,
                options,
                correct_answer,
            }
        }
        QuestionType::ShortAnswer | QuestionType::LongAnswer => {
            QuestionRecord::open(block.text, fallback)
        }
    }
}

/// Maps an answer like `C`, `(c)`, `C) Paris` or `Paris` onto one of the options.
fn resolve_option(answer: &str, options: &[String]) -> Option<String> {
    let answer = strip_marker(answer);

    if let Some(caps) = option_reference().captures(&answer) {
        let letter = caps[1].to_ascii_lowercase().chars().next()?;
        let idx = (letter as u8).checked_sub(b'a')? as usize;
        return options.get(idx).cloned();
    }

    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(&answer))
        .cloned()
}

/// Numbered entries of an answer section, keyed by question number.
///
/// Once an `A<N>:` style line has been seen, bare `1.` / `2)` lines belong to
/// the answer being read (numbered lists inside long answers). A bare number
/// never replaces an entry that already exists.
fn parse_answer_section(lines: &[&str]) -> HashMap<u32, String> {
    let mut answers: HashMap<u32, String> = HashMap::new();
    let mut current: Option<u32> = None;
    let mut prefixed = false;

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = numbered_answer_line().captures(line) {
            let has_prefix = caps.get(1).is_some();
            if let Ok(number) = caps[2].parse::<u32>() {
                let starts_entry = has_prefix || (!prefixed && !answers.contains_key(&number));
                if starts_entry {
                    prefixed |= has_prefix;
                    let text = clean_fragment(&caps[3]);
                    match answers.get_mut(&number) {
                        Some(existing) => append_text(existing, &text),
                        None => {
                            answers.insert(number, text);
                        }
                    }
                    current = Some(number);
                    continue;
                }
            }
        }
        if let Some(answer) = current.and_then(|n| answers.get_mut(&n)) {
            append_text(answer, line);
        }
    }

    answers
}

fn append_text(target: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

fn strip_marker(text: &str) -> String {
    text.trim_matches(|c: char| c == ANSWER_MARKER || c.is_whitespace())
        .to_string()
}

fn clean_fragment(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_mcq_block() {
        let raw = "Q1: What colour is the sky?\nA) Green\nB) *Blue\nC) Red\nD) Yellow";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);

        assert_eq!(batch.rejected, 0);
        assert_eq!(batch.records.len(), 1);
        let record = &batch.records[0];
        assert_eq!(record.question_text, "What colour is the sky?");
        assert_eq!(record.options, vec!["Green", "Blue", "Red", "Yellow"]);
        assert_eq!(record.correct_answer.as_deref(), Some("Blue"));
    }

    #[test]
    fn test_marker_whitespace_variants() {
        let raw = "\
Q1: First?
A) one
B)   *  two
C) three
D) four

Q2: Second?
*A) alpha
B) beta
C) gamma
D) delta

Q3: Third?
A) x
B) y
C) z *
D) w";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        let answers: Vec<_> = batch
            .records
            .iter()
            .map(|r| r.correct_answer.clone().unwrap())
            .collect();
        assert_eq!(answers, vec!["two", "alpha", "z"]);
        for record in &batch.records {
            assert!(record.options.contains(record.correct_answer.as_ref().unwrap()));
        }
    }

    #[test]
    fn test_missing_marker_leaves_answer_unset() {
        let raw = "Q1: Pick one\nA) a1\nB) b1\nC) c1\nD) d1";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].correct_answer, None);
    }

    #[test]
    fn test_two_markers_are_ambiguous() {
        let raw = "Q1: Pick one\nA) *a1\nB) *b1\nC) c1\nD) d1";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        assert_eq!(batch.records[0].correct_answer, None);
    }

    #[test]
    fn test_malformed_block_is_dropped_alone() {
        let raw = "\
Q1: Only three options
A) one
B) two
C) *three

Q2: Stray prose inside options
A) one
this line does not belong here
B) two
C) three
D) four

Q3: Five options
A) one
B) two
C) three
D) four
E) five

Q4: Good question
A) *right
B) wrong
C) wrong again
D) still wrong";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].question_text, "Good question");
        assert_eq!(batch.rejected, 3);
    }

    #[test]
    fn test_fifth_lettered_option_rejects_block() {
        let raw = "Q1: Too many\nA) 1\nB) 2\nC) 3\nD) 4\nA) 5\nQ2: Fine\nA) *1\nB) 2\nC) 3\nD) 4";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].question_text, "Fine");
        assert_eq!(batch.rejected, 1);
    }

    #[test]
    fn test_mcq_answer_key_fills_missing_marker() {
        let raw = "\
Questions:
Q1: Capital of France?
A) Berlin
B) Madrid
C) Paris
D) Rome

Answers:
A1: C";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        assert_eq!(batch.records[0].correct_answer.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_bold_question_prefix_and_preamble() {
        let raw = "Here are your questions:\n\n**Q1:** Which gas do plants absorb?\nA) Oxygen\nB) *Carbon dioxide\nC) Helium\nD) Neon";
        let batch = parse_completion(raw, QuestionType::MultipleChoice);
        assert_eq!(batch.records[0].question_text, "Which gas do plants absorb?");
        assert_eq!(batch.records[0].correct_answer.as_deref(), Some("Carbon dioxide"));
    }

    #[test]
    fn test_short_answers_from_answer_section() {
        let raw = "\
Questions:
Q1: What colour is the sky?

Q2: At what temperature does water boil?

Answers:
A1: Blue.
A2: 100C at sea level.";
        let batch = parse_completion(raw, QuestionType::ShortAnswer);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].correct_answer.as_deref(), Some("Blue."));
        assert_eq!(batch.records[1].correct_answer.as_deref(), Some("100C at sea level."));
        assert!(batch.records.iter().all(|r| r.options.is_empty()));
    }

    #[test]
    fn test_long_answers_join_continuation_lines() {
        let raw = "\
Q1: Explain the water cycle.
Answers:
A1: Water evaporates from oceans.
It condenses into clouds.

It falls back as rain.";
        let batch = parse_completion(raw, QuestionType::LongAnswer);
        assert_eq!(
            batch.records[0].correct_answer.as_deref(),
            Some("Water evaporates from oceans. It condenses into clouds. It falls back as rain.")
        );
    }

    #[test]
    fn test_numbered_list_inside_answer_stays_with_it() {
        let raw = "\
Q1: Describe the water cycle.
Q2: What is a delta?
Answers:
A1: The water cycle has three stages:
1. Evaporation from oceans
2. Condensation into clouds
3. Precipitation as rain
A2: A landform at a river mouth.";
        let batch = parse_completion(raw, QuestionType::LongAnswer);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.records[0].correct_answer.as_deref(),
            Some(
                "The water cycle has three stages: 1. Evaporation from oceans \
                 2. Condensation into clouds 3. Precipitation as rain"
            )
        );
        assert_eq!(
            batch.records[1].correct_answer.as_deref(),
            Some("A landform at a river mouth.")
        );
    }

    #[test]
    fn test_bare_numbered_answer_list() {
        let raw = "Q1: Sky colour?\nQ2: Boiling point?\nAnswers:\n1. Blue\n2) 100C\n1. not an overwrite";
        let batch = parse_completion(raw, QuestionType::ShortAnswer);
        assert_eq!(
            batch.records[0].correct_answer.as_deref(),
            Some("Blue")
        );
        assert_eq!(
            batch.records[1].correct_answer.as_deref(),
            Some("100C 1. not an overwrite")
        );
    }

    #[test]
    fn test_inline_answers_are_accepted() {
        let raw = "Q1: What colour is the sky?\nAnswer: Blue\nQ2: Why?\nAns - Because.";
        let batch = parse_completion(raw, QuestionType::ShortAnswer);
        let answers: Vec<_> = batch.records.iter().map(|r| r.correct_answer.clone()).collect();
        assert_eq!(answers, vec![Some("Blue".to_string()), Some("Because.".to_string())]);
    }

    #[test]
    fn test_question_without_answer_is_kept() {
        let raw = "Q1: First?\nQ2: Second?\nAnswers:\nA2: Yes";
        let batch = parse_completion(raw, QuestionType::ShortAnswer);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].correct_answer, None);
        assert_eq!(batch.records[1].correct_answer.as_deref(), Some("Yes"));
    }

    #[test]
    fn test_multi_line_question_text() {
        let raw = "Q1: Consider the passage about rivers.\nWhat is a delta?";
        let batch = parse_completion(raw, QuestionType::ShortAnswer);
        assert_eq!(
            batch.records[0].question_text,
            "Consider the passage about rivers. What is a delta?"
        );
    }

    #[test]
    fn test_empty_question_is_rejected() {
        let batch = parse_completion("Q1:\nQ2: Real one?", QuestionType::ShortAnswer);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected, 1);
    }

    #[test]
    fn test_garbage_yields_nothing() {
        let batch = parse_completion("I'm sorry, I can't help with that.", QuestionType::LongAnswer);
        assert!(batch.records.is_empty());
        assert_eq!(batch.rejected, 0);
    }

    #[test]
    fn test_resolve_option_by_letter_and_text() {
        let options: Vec<String> = ["w", "x", "y", "z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolve_option("(b)", &options).as_deref(), Some("x"));
        assert_eq!(resolve_option("D) z", &options).as_deref(), Some("z"));
        assert_eq!(resolve_option("Y", &options).as_deref(), Some("y"));
        assert_eq!(resolve_option("nothing", &options), None);
    }
}
