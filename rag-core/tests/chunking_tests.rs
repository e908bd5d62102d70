//! Property tests for the default chunking strategy.

use proptest::prelude::*;
use rag_core::chunking::{Chunker, FixedWidthSplitter, TextSplitter, TwoStageChunker};
use rag_core::config::ChunkingConfig;
use rag_core::document::{Document, Metadata};
use serde_json::Value;

fn arb_metadata() -> impl Strategy<Value = Metadata> {
    proptest::collection::hash_map(
        "[a-z_]{1,10}",
        prop_oneof![
            "[a-zA-Z0-9 ]{0,20}".prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ],
        0..5,
    )
}

/// Markdown-ish text: headings, paragraphs, words and occasional unicode.
fn arb_markdown() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "# [A-Za-z ]{1,20}\n".prop_map(String::from),
            "## [A-Za-z ]{1,20}\n".prop_map(String::from),
            "[a-zé ]{1,120}\n\n".prop_map(String::from),
            "[A-Z]{50,400}".prop_map(String::from),
        ],
        1..30,
    )
    .prop_map(|parts| format!("# Notes\n{}", parts.concat()))
}

/// **Property: chunk metadata preservation**
/// *For any* document, every chunk carries exactly the document's metadata.
mod prop_metadata_preservation {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn chunks_inherit_document_metadata(
            content in arb_markdown(),
            metadata in arb_metadata(),
        ) {
            let document = Document::new(content, metadata);
            let chunks = TwoStageChunker::default().chunk(&document).unwrap();

            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                prop_assert_eq!(&chunk.metadata, &document.metadata);
                prop_assert!(chunk.content.chars().count() <= 200);
            }
        }
    }
}

/// **Property: fixed-width overlap**
/// *For any* text and `overlap < size`, consecutive chunks share exactly
/// `overlap` characters and every chunk but the last is `size` long.
mod prop_fixed_width_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn adjacent_chunks_share_exact_overlap(
            text in "[a-zäö漢 ]{1,600}",
            size in 1usize..120,
            overlap_seed in 0usize..120,
        ) {
            let overlap = overlap_seed % size;
            let chunks = FixedWidthSplitter::new(size, overlap).split_text(&text);

            prop_assert!(!chunks.is_empty());
            for pair in chunks.windows(2) {
                let left: Vec<char> = pair[0].chars().collect();
                let right: Vec<char> = pair[1].chars().collect();
                prop_assert_eq!(left.len(), size);
                prop_assert_eq!(&left[size - overlap..], &right[..overlap]);
            }

            // The windows cover the text without gaps.
            let step = size - overlap;
            let total = text.chars().count();
            let last = chunks.last().unwrap().chars().count();
            prop_assert_eq!((chunks.len() - 1) * step + last, total);
        }
    }
}

#[test]
fn custom_sizes_are_respected() {
    let config = ChunkingConfig {
        markdown_chunk_size: 100,
        markdown_chunk_overlap: 0,
        recursive_chunk_size: 40,
        recursive_chunk_overlap: 10,
    };
    let chunker = TwoStageChunker::new(&config);
    let document = Document::new("x".repeat(250), Metadata::new());

    let blocks = chunker.structural_blocks(&document.content);
    assert_eq!(blocks.iter().map(String::len).collect::<Vec<_>>(), vec![100, 100, 50]);

    // 100 chars → windows at 0, 30, 60 (reaches 100); 50 chars → 0, 30 (reaches 50)
    let chunks = chunker.chunk(&document).unwrap();
    assert_eq!(chunks.len(), 3 + 3 + 2);
}
