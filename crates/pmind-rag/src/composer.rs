//! Grounded prompt assembly and generation

use tracing::debug;

use pmind_core::{Chunk, GenerationResult, Generator, Result, RetryConfig, retry_transient};

/// Separates chunk texts inside the context block
pub const CONTEXT_DELIMITER: &str = "\n---\n";

const GROUNDED_INSTRUCTION: &str = "You are a helpful assistant. Use only the following context to answer the question. \
     If the answer isn't in the context, say 'I don't know'.";

/// Used in place of a context block when retrieval found nothing relevant
pub const NO_CONTEXT_INSTRUCTION: &str = "No relevant context was found for this question. \
     Do not answer from general knowledge. Reply only that you don't know the answer.";

/// Build the prompt for `query` over `chunks`, in retrieval order
pub fn build_prompt(query: &str, chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return format!(
            "You are a helpful assistant. {}\nQuestion: {}\nAnswer:",
            NO_CONTEXT_INSTRUCTION, query
        );
    }

    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);

    format!(
        "{}\nContext: {}\nQuestion: {}\nAnswer:",
        GROUNDED_INSTRUCTION, context, query
    )
}

/// Turns a query and its retrieved chunks into an answer
pub struct AnswerComposer<'a> {
    generator: &'a dyn Generator,
    retry: RetryConfig,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(generator: &'a dyn Generator, retry: RetryConfig) -> Self {
        Self { generator, retry }
    }

    /// Generate an answer. The generator output is returned verbatim.
    pub async fn compose(&self, query: &str, chunks: &[Chunk]) -> Result<GenerationResult> {
        let prompt = build_prompt(query, chunks);
        debug!(
            model = self.generator.model_id(),
            chunks = chunks.len(),
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );

        retry_transient(&self.retry, "generate", || self.generator.generate(&prompt)).await
    }
}
