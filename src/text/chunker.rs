//! Text chunker for synthesis.
//!
//! Splits input text into bounded-size units on semantic boundaries:
//! - Paragraphs (blank lines) never share a chunk
//! - Sentences are packed greedily up to `max_chunk_chars`
//! - Oversized sentences fall back to clauses, then words, then characters
//!
//! A post-split filter drops chunks that a TTS model handles badly
//! (stack traces, markup soup, symbol runs). Survivors are re-sequenced
//! contiguously from 0.

use crate::defaults;

/// A bounded unit of text submitted to synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the surviving chunk sequence, contiguous from 0.
    pub sequence: u32,
    /// The text to synthesize.
    pub content: String,
}

/// Configuration for the chunker and its filter.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Soft upper bound on characters per chunk.
    pub max_chunk_chars: usize,
    /// Chunks shorter than this (after trimming) are dropped.
    pub min_chunk_chars: usize,
    /// Chunks whose symbol ratio exceeds this are dropped.
    pub max_symbol_ratio: f32,
    /// Chunks whose alphabetic ratio is below this are dropped.
    pub min_alphabetic_ratio: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
            min_chunk_chars: 3,
            max_symbol_ratio: 0.15,
            min_alphabetic_ratio: 0.30,
        }
    }
}

/// Leading tokens that mark code, stack traces or markup.
const CODE_LEADING_TOKENS: &[&str] = &[
    "at ",
    "@",
    "import ",
    "export ",
    "const ",
    "let ",
    "var ",
    "function ",
    "class ",
    "=>",
    "{",
    "}",
    "[",
    "]",
];

/// Characters counted as symbols by the filter.
const SYMBOL_CHARS: &[char] = &[
    '{', '}', '(', ')', '[', ']', ';', ':', '@', '#', '$', '%', '^', '&', '*', '<', '>', '=', '/',
    '\\', '|', '`', '~',
];

/// Sentence terminators that need trailing whitespace to end a sentence.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', ';', '…'];

/// Terminators that end a sentence immediately (CJK full-width forms).
const WIDE_TERMINATORS: &[char] = &['。', '！', '？', '；'];

/// Closing characters that stay attached to the sentence they close.
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»', '」', '』'];

/// Clause punctuation used to break an oversized sentence.
const CLAUSE_BREAKS: &[char] = &[',', ':', '—', '–', '，', '、', '：'];

/// Splits text into synthesizable chunks.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    /// Creates a chunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default filter settings and a custom bound.
    pub fn with_max_chars(max_chunk_chars: usize) -> Self {
        Self::new(ChunkerConfig {
            max_chunk_chars,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split and filter `text`, numbering survivors from 0.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        split_semantic(text, self.config.max_chunk_chars.max(1))
            .into_iter()
            .filter(|piece| self.is_speakable(piece))
            .enumerate()
            .map(|(i, content)| TextChunk {
                sequence: i as u32,
                content,
            })
            .collect()
    }

    /// Returns true if the chunk is likely to synthesize cleanly.
    pub fn is_speakable(&self, chunk: &str) -> bool {
        let trimmed = chunk.trim();
        let total = trimmed.chars().count();
        if total < self.config.min_chunk_chars {
            return false;
        }

        if trimmed == ";"
            || CODE_LEADING_TOKENS
                .iter()
                .any(|token| trimmed.starts_with(token))
        {
            return false;
        }

        let symbols = trimmed.chars().filter(|c| SYMBOL_CHARS.contains(c)).count();
        if symbols as f32 / total as f32 > self.config.max_symbol_ratio {
            return false;
        }

        let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
        letters as f32 / total as f32 >= self.config.min_alphabetic_ratio
    }
}

/// Split `text` into chunks with the default configuration.
pub fn chunk(text: &str, max_chunk_chars: usize) -> Vec<TextChunk> {
    TextChunker::with_max_chars(max_chunk_chars).chunk(text)
}

/// Paragraph- and sentence-aware split, before filtering.
fn split_semantic(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for paragraph in paragraphs(text) {
        let mut pieces = Vec::new();
        for sentence in sentences(&paragraph) {
            if char_len(&sentence) > max_chars {
                pieces.extend(split_long_sentence(&sentence, max_chars));
            } else {
                pieces.push(sentence);
            }
        }
        chunks.extend(pack(pieces, max_chars));
    }

    chunks
}

/// Paragraphs separated by blank lines, with inner whitespace collapsed.
fn paragraphs(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                result.push(collapse_whitespace(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        result.push(collapse_whitespace(&current.join(" ")));
    }

    result.retain(|p| !p.is_empty());
    result
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sentences of a single (whitespace-collapsed) paragraph.
fn sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut result = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let wide = WIDE_TERMINATORS.contains(&c);
        if wide || SENTENCE_TERMINATORS.contains(&c) {
            // Absorb runs like "?!" or "..." and trailing closers.
            let mut end = i + 1;
            while end < chars.len()
                && (SENTENCE_TERMINATORS.contains(&chars[end])
                    || WIDE_TERMINATORS.contains(&chars[end])
                    || CLOSERS.contains(&chars[end]))
            {
                end += 1;
            }
            let at_boundary = end >= chars.len() || chars[end].is_whitespace();
            if wide || at_boundary {
                let sentence: String = chars[start..end].iter().collect();
                let sentence = sentence.trim();
                if !sentence.is_empty() {
                    result.push(sentence.to_string());
                }
                start = end;
            }
            i = end;
        } else {
            i += 1;
        }
    }

    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        let tail = tail.trim();
        if !tail.is_empty() {
            result.push(tail.to_string());
        }
    }

    result
}

/// Break an oversized sentence at clauses, then words, then characters.
fn split_long_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    for c in sentence.chars() {
        current.push(c);
        if CLAUSE_BREAKS.contains(&c) {
            let clause = current.trim().to_string();
            if !clause.is_empty() {
                clauses.push(clause);
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        clauses.push(tail.to_string());
    }

    let mut pieces = Vec::new();
    for clause in clauses {
        if char_len(&clause) <= max_chars {
            pieces.push(clause);
            continue;
        }
        let mut words = Vec::new();
        for word in clause.split_whitespace() {
            if char_len(word) <= max_chars {
                words.push(word.to_string());
            } else {
                words.extend(hard_split(word, max_chars));
            }
        }
        pieces.extend(pack(words, max_chars));
    }

    pack(pieces, max_chars)
}

/// Split on character boundaries into pieces of at most `max_chars`.
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Greedily join pieces with single spaces while staying within the bound.
fn pack(pieces: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut packed = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);
        if buffer.is_empty() {
            buffer = piece;
            buffer_len = piece_len;
        } else if buffer_len + 1 + piece_len <= max_chars {
            buffer.push(' ');
            buffer.push_str(&piece);
            buffer_len += 1 + piece_len;
        } else {
            packed.push(std::mem::take(&mut buffer));
            buffer = piece;
            buffer_len = piece_len;
        }
    }
    if !buffer.is_empty() {
        packed.push(buffer);
    }

    packed
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
