//! Property tests for overlapping chunking.

use pmind_core::Document;
use pmind_rag::chunk_documents;
use proptest::prelude::*;

/// Text with words, sentence ends, paragraph breaks and multibyte chars
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zA-Zé]{1,9}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("!\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("ü日本".to_string()),
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn chunks_reconstruct_document_and_respect_size(
        text in arb_text(),
        (chunk_size, overlap) in arb_sizes(),
    ) {
        let document = Document::new(text.clone(), "prop.txt").unwrap();
        let chunks = chunk_documents(&[document], chunk_size, overlap).unwrap();

        if text.trim().is_empty() {
            prop_assert!(chunks.is_empty());
            return Ok(());
        }

        prop_assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.sequence_index, i);
            prop_assert!(chunk.len() <= chunk_size);
            prop_assert!(!chunk.is_empty());
        }

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }

        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(overlap));
        }
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn chunking_is_deterministic(text in arb_text(), (chunk_size, overlap) in arb_sizes()) {
        let document = Document::new(text, "prop.txt").unwrap();
        let first = chunk_documents(std::slice::from_ref(&document), chunk_size, overlap).unwrap();
        let second = chunk_documents(&[document], chunk_size, overlap).unwrap();
        prop_assert_eq!(first, second);
    }
}
