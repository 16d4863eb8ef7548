// Answering pipeline
// Retrieval-augmented question answering over the vector index

pub mod chat;
pub mod prompt;


use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::Chunk;
use crate::index::VectorIndex;
use crate::{DocuError, Result};

pub use chat::ChatClient;
pub use prompt::{Prompt, build_prompt, context_block};

const SOURCE_PREVIEW_CHARS: usize = 100;

/// Turns a prompt into generated text
pub trait Generator {
    fn generate(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// One answered question with the chunks it was grounded on, best first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Chunk>,
}

impl ConversationTurn {
    /// One display line per source
    #[inline]
    pub fn source_lines(&self) -> Vec<String> {
        self.sources.iter().map(format_source).collect()
    }
}

/// `doc_name (page N): <first 100 chars>...`
#[inline]
pub fn format_source(chunk: &Chunk) -> String {
    format!(
        "{} (page {}): {}",
        chunk.metadata.display_name(),
        chunk.metadata.page_label(),
        chunk.preview(SOURCE_PREVIEW_CHARS)
    )
}

/// Append-only question and answer history for one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Turns in the order they were asked
    #[inline]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Turns for display, most recent first
    #[inline]
    pub fn newest_first(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().rev()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Result of asking a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered(ConversationTurn),
    /// Nothing has been indexed yet; not an error
    NoIndex,
}

/// Retrieves the best chunks for a question and asks the generator to answer from them
pub struct AnsweringPipeline<'a> {
    embedder: &'a dyn Embedder,
    generator: &'a dyn Generator,
    system_prompt: String,
    top_k: usize,
}

impl<'a> AnsweringPipeline<'a> {
    #[inline]
    pub fn new(
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
        system_prompt: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            system_prompt: system_prompt.into(),
            top_k,
        }
    }

    #[inline]
    pub fn from_config(
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
        config: &Config,
    ) -> Self {
        Self::new(
            embedder,
            generator,
            config.generation.system_prompt.clone(),
            config.retrieval.top_k,
        )
    }

    #[inline]
    pub fn embedder(&self) -> &'a dyn Embedder {
        self.embedder
    }

    /// Answer without touching any history
    #[inline]
    pub fn answer(&self, index: Option<&VectorIndex>, question: &str) -> Result<AnswerOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocuError::Validation("Question must not be empty".to_string()));
        }

        let Some(index) = index else {
            info!("No index available; nothing to answer from");
            return Ok(AnswerOutcome::NoIndex);
        };

        debug!("Retrieving top {} chunks for question", self.top_k);
        let sources: Vec<Chunk> = index
            .search(self.embedder, question, self.top_k)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();

        let prompt = build_prompt(&self.system_prompt, &sources, question);
        debug!(
            "Generating answer from {} sources ({} context chars)",
            sources.len(),
            prompt.system.len()
        );

        let answer = self
            .generator
            .generate(&prompt.system, &prompt.user)
            .map_err(|e| DocuError::Generation(format!("{e:#}")))?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DocuError::Generation(
                "Generation service returned an empty answer".to_string(),
            ));
        }

        Ok(AnswerOutcome::Answered(ConversationTurn {
            question: question.to_string(),
            answer: answer.to_string(),
            sources,
        }))
    }

    /// Answer and record the turn. On failure the conversation is left untouched.
    #[inline]
    pub fn ask(
        &self,
        index: Option<&VectorIndex>,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<AnswerOutcome> {
        let outcome = self.answer(index, question).inspect_err(|e| {
            warn!("Question failed: {}", e);
        })?;

        if let AnswerOutcome::Answered(turn) = &outcome {
            conversation.push(turn.clone());
        }
        Ok(outcome)
    }
}
