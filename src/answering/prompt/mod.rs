
use crate::embeddings::chunking::Chunk;

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Messages sent to the generation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Retrieved chunks joined in ranked order
#[inline]
pub fn context_block(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// System instructions followed by the context block, with the question as the user message
#[inline]
pub fn build_prompt(system_prompt: &str, chunks: &[Chunk], question: &str) -> Prompt {
    let system = format!(
        "{}\n----------------\n{}",
        system_prompt.trim_end(),
        context_block(chunks)
    );

    Prompt {
        system,
        user: question.trim().to_string(),
    }
}
