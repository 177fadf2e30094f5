use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};
use crate::models::Chunk;

/// Upper bound for a chunk, measured in words or in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSize {
    Words(usize),
    Chars(usize),
}

impl ChunkSize {
    pub fn limit(&self) -> usize {
        match self {
            ChunkSize::Words(n) | ChunkSize::Chars(n) => *n,
        }
    }
}

/// Splits `text` on whitespace into ordered chunks.
///
/// Chunks never break a word. In `Chars` mode a single word longer than the
/// limit becomes a chunk of its own, which is the only way a chunk can exceed
/// the configured size.
pub fn chunk_text(text: &str, size: ChunkSize) -> Result<Vec<Chunk>> {
    if size.limit() == 0 {
        return Err(QuizError::invalid("chunk size must be greater than zero"));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let groups: Vec<Vec<&str>> = match size {
        ChunkSize::Words(max_words) => words.chunks(max_words).map(<[&str]>::to_vec).collect(),
        ChunkSize::Chars(max_chars) => pack_by_chars(&words, max_chars),
    };

    let chunks: Vec<Chunk> = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| Chunk {
            index,
            word_count: group.len(),
            content: group.join(" "),
        })
        .collect();

    log::info!("Created {} chunks from {} words", chunks.len(), words.len());
    Ok(chunks)
}

fn pack_by_chars<'a>(words: &[&'a str], max_chars: usize) -> Vec<Vec<&'a str>> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for word in words {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

        if needed > max_chars && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }

        current_len = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        current.push(word);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
