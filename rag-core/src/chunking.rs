//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait, two [`TextSplitter`]s and the
//! default strategy that chains them:
//!
//! - [`MarkdownSplitter`]: recursive split on markdown structure (headings,
//!   code fences, rules, paragraphs, lines, words, characters)
//! - [`FixedWidthSplitter`]: fixed character windows with exact overlap
//! - [`TwoStageChunker`]: structural pass followed by a fixed-width pass

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations must copy the parent document's metadata onto every chunk
/// without adding or removing keys.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the document content is empty.
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Splits raw text into smaller pieces.
pub trait TextSplitter: Send + Sync {
    fn split_text(&self, text: &str) -> Vec<String>;
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// A split point recognised by [`MarkdownSplitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// A newline followed by one to six `#` and a space.
    Heading,
    /// A newline, three or more of the given character, and a newline.
    Rule(char),
    Literal(&'static str),
    /// Every character is its own piece.
    Char,
}

const MARKDOWN_SEPARATORS: [Separator; 9] = [
    Separator::Heading,
    Separator::Literal("```\n"),
    Separator::Rule('*'),
    Separator::Rule('-'),
    Separator::Rule('_'),
    Separator::Literal("\n\n"),
    Separator::Literal("\n"),
    Separator::Literal(" "),
    Separator::Char,
];

impl Separator {
    /// Find the next match at or after byte offset `from`, as a byte range.
    fn find(self, text: &str, from: usize) -> Option<(usize, usize)> {
        match self {
            Separator::Literal(lit) => {
                text[from..].find(lit).map(|pos| (from + pos, from + pos + lit.len()))
            }
            Separator::Heading => text[from..].match_indices('\n').find_map(|(pos, _)| {
                let start = from + pos;
                let rest = &text[start + 1..];
                let hashes = rest.chars().take_while(|c| *c == '#').count();
                ((1..=6).contains(&hashes) && rest[hashes..].starts_with(' '))
                    .then_some((start, start + 1 + hashes + 1))
            }),
            Separator::Rule(marker) => text[from..].match_indices('\n').find_map(|(pos, _)| {
                let start = from + pos;
                let rest = &text[start + 1..];
                let run = rest.chars().take_while(|c| *c == marker).count();
                (run >= 3 && rest[run..].starts_with('\n')).then_some((start, start + run + 2))
            }),
            Separator::Char => (from < text.len()).then_some((from, from)),
        }
    }

    /// Split `text` at every match, keeping each separator at the start of the
    /// piece that follows it. Empty pieces are dropped.
    fn split<'a>(self, text: &'a str) -> Vec<&'a str> {
        if self == Separator::Char {
            return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
        }

        let mut pieces = Vec::new();
        let mut piece_start = 0;
        let mut search_from = 0;
        while let Some((start, end)) = self.find(text, search_from) {
            if start > piece_start {
                pieces.push(&text[piece_start..start]);
            }
            piece_start = start;
            search_from = end;
        }
        if piece_start < text.len() {
            pieces.push(&text[piece_start..]);
        }
        pieces
    }
}

/// Recursive, structure-aware splitter for markdown text.
///
/// Text is split on the highest-priority separator present in it, pieces are
/// greedily merged up to `chunk_size` characters, and any piece that is still
/// too large is split again with the next separator. A structural unit is
/// only broken when it cannot fit in `chunk_size` on its own.
#[derive(Debug, Clone)]
pub struct MarkdownSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl MarkdownSplitter {
    /// Create a new `MarkdownSplitter`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: target maximum number of characters per block
    /// * `chunk_overlap`: characters carried from one block into the next
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    fn split_recursive(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| *sep == Separator::Char || sep.find(text, 0).is_some())
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or(Separator::Char);
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let mut blocks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in separator.split(text) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                blocks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                blocks.push(piece.to_string());
            } else {
                blocks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            blocks.extend(self.merge(&pending));
        }

        blocks
    }

    /// Greedily join pieces into blocks of at most `chunk_size` characters,
    /// carrying up to `chunk_overlap` characters of trailing pieces forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_trimmed(&mut blocks, &current);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut blocks, &current);
        blocks
    }
}

fn push_trimmed(blocks: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
}

impl TextSplitter for MarkdownSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &MARKDOWN_SEPARATORS)
    }
}

/// Splits text into fixed-width character windows.
///
/// Windows start every `chunk_size - chunk_overlap` characters and the last
/// window is the first one that reaches the end of the text, so the final
/// `chunk_overlap` characters of each chunk open the next one.
#[derive(Debug, Clone)]
pub struct FixedWidthSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedWidthSplitter {
    /// Create a new `FixedWidthSplitter`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl TextSplitter for FixedWidthSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let len = bounds.len() - 1;
        if len == 0 || self.chunk_size == 0 {
            return Vec::new();
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(len);
            chunks.push(text[bounds[start]..bounds[end]].to_string());
            if end == len {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// The default chunking strategy: a markdown structural pass followed by a
/// fixed-width pass over each structural block.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{ChunkingConfig, TwoStageChunker};
///
/// let chunker = TwoStageChunker::new(&ChunkingConfig::default());
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone)]
pub struct TwoStageChunker {
    structural: MarkdownSplitter,
    fixed: FixedWidthSplitter,
}

impl TwoStageChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            structural: MarkdownSplitter::new(
                config.markdown_chunk_size,
                config.markdown_chunk_overlap,
            ),
            fixed: FixedWidthSplitter::new(
                config.recursive_chunk_size,
                config.recursive_chunk_overlap,
            ),
        }
    }

    /// Run only the structural pass. Exposed for inspection and tests.
    pub fn structural_blocks(&self, text: &str) -> Vec<String> {
        self.structural.split_text(text)
    }
}

impl Default for TwoStageChunker {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default())
    }
}

impl Chunker for TwoStageChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        if document.content.is_empty() {
            return Err(RagError::InvalidInput("document content must not be empty".to_string()));
        }

        let chunks = self
            .structural
            .split_text(&document.content)
            .iter()
            .flat_map(|block| self.fixed.split_text(block))
            .map(|content| Chunk { content, metadata: document.metadata.clone() })
            .collect();

        Ok(chunks)
    }
}
