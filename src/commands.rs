use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use tracing::{error, info};

use crate::answering::{
    AnswerOutcome, AnsweringPipeline, ChatClient, ConversationTurn, Generator,
};
use crate::config::Config;
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::index::VectorIndex;
use crate::indexer::AddPageOutcome;
use crate::session::Session;
use crate::sources::web::browser::ChromeRenderer;

const NO_INDEX_MESSAGE: &str =
    "No documents or web pages indexed yet. Please add some before asking questions.";
const REINDEX_REMINDER: &str = "Please run re-indexing: docu-whisperer reindex";

fn embedding_client(config: &Config) -> Result<EmbeddingClient> {
    EmbeddingClient::new(&config.embedding).context("Failed to initialize embedding client")
}

fn chat_client(config: &Config) -> Result<ChatClient> {
    ChatClient::new(&config.generation).context("Failed to initialize chat client")
}

/// Answer a single question
#[inline]
pub fn ask(config: &Config, question: &str) -> Result<()> {
    let embedder = embedding_client(config)?;
    let generator = chat_client(config)?;
    let mut session = Session::from_config(config);

    ask_in_session(config, &mut session, &embedder, &generator, question)
}

fn ask_in_session(
    config: &Config,
    session: &mut Session,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    question: &str,
) -> Result<()> {
    let pipeline = AnsweringPipeline::from_config(embedder, generator, config);

    match session.ask(&pipeline, question)? {
        AnswerOutcome::Answered(turn) => print_turn(&turn, "Answer:"),
        AnswerOutcome::NoIndex => println!("{NO_INDEX_MESSAGE}"),
    }
    Ok(())
}

/// Interactive question loop. `history` prints the conversation, `exit` ends it.
#[inline]
pub fn chat(config: &Config) -> Result<()> {
    let embedder = embedding_client(config)?;
    let generator = chat_client(config)?;
    let mut session = Session::from_config(config);

    eprintln!(
        "{}",
        style("Ask questions about your documents. Type 'history' to review, 'exit' to quit.")
            .cyan()
    );

    loop {
        let line: String = Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;

        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "history" => print_history(&session),
            question => {
                if let Err(e) =
                    ask_in_session(config, &mut session, &embedder, &generator, question)
                {
                    error!("Question failed: {:#}", e);
                    eprintln!("{} {:#}", style("Error:").red().bold(), e);
                }
            }
        }
    }

    print_history(&session);
    Ok(())
}

fn print_turn(turn: &ConversationTurn, heading: &str) {
    println!("{}", style(heading).bold());
    println!();
    println!("{}", turn.answer);
    println!();
    println!("{}", style("Sources:").bold());
    for line in turn.source_lines() {
        println!("  - {line}");
    }
}

fn print_history(session: &Session) {
    let conversation = session.conversation();
    if conversation.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Conversation History").bold().underlined());
    for turn in conversation.newest_first() {
        println!();
        println!("{} {}", style("Q:").bold(), turn.question);
        println!("{} {}", style("A:").bold(), turn.answer);
        for line in turn.source_lines() {
            println!("  - {line}");
        }
    }
}

/// Render a web page and add it to the index
#[inline]
pub fn add_url(config: &Config, url: &str) -> Result<()> {
    let embedder = embedding_client(config)?;
    let renderer = ChromeRenderer::new(config.browser.clone());
    let mut session = Session::from_config(config);

    info!("Adding web page: {}", url);
    match session.add_web_page(&embedder, &renderer, url)? {
        AddPageOutcome::Added { url, chunks } => {
            println!("{} Indexed {} chunks from {}", style("✓").green(), chunks, url);
        }
        AddPageOutcome::AlreadyRegistered(url) => {
            println!("That URL is already indexed: {url}");
        }
    }
    Ok(())
}

/// Copy a Word or PDF document into the document store
#[inline]
pub fn add_document(config: &Config, path: &std::path::Path) -> Result<()> {
    let mut session = Session::from_config(config);
    let stored = session.add_document(path)?;

    println!("Stored {}", stored.display());
    println!("{}", style(REINDEX_REMINDER).yellow());
    Ok(())
}

/// Show stored documents, registered web pages and the indexed chunk count
#[inline]
pub fn list_documents(config: &Config) -> Result<()> {
    let embedder = embedding_client(config)?;
    let mut session = Session::from_config(config);
    let listing = session.listing(&embedder)?;

    print_titles("Word Documents (.docx):", &listing.word);
    print_titles("PDF Documents (.pdf):", &listing.pdf);
    print_titles("Web Pages:", &listing.web);

    println!();
    println!("Total indexed chunks: {}", listing.total_chunks_label());
    if listing.total_chunks.is_some() {
        println!("{}", style("Index ready.").green());
    } else {
        println!("No documents indexed yet. Add files or web pages to get started.");
    }
    Ok(())
}

fn print_titles(heading: &str, titles: &[String]) {
    println!("{}", style(heading).bold());
    if titles.is_empty() {
        println!("  None");
    }
    for (i, title) in titles.iter().enumerate() {
        println!("  {}. {}", i + 1, title);
    }
}

/// Remove a stored document by file name, or a registered web page by URL
#[inline]
pub fn remove(config: &Config, target: &str) -> Result<()> {
    let mut session = Session::from_config(config);
    let lower = target.trim().to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        if !session.remove_url(target)? {
            anyhow::bail!("Web page is not registered: {}", target.trim());
        }
        println!("Web page removed.");
    } else {
        session.remove_document(target.trim())?;
        println!("File removed.");
    }

    println!("{}", style(REINDEX_REMINDER).yellow());
    Ok(())
}

/// Rebuild the index from every stored document and registered web page
#[inline]
pub fn reindex(config: &Config) -> Result<()> {
    let embedder = embedding_client(config)?;
    let renderer = ChromeRenderer::new(config.browser.clone());
    let mut session = Session::from_config(config);

    let stats = session.reindex(&embedder, &renderer)?;

    println!("Re-indexing complete!");
    println!("  Documents indexed: {}", stats.documents_indexed);
    if stats.documents_failed > 0 {
        println!("  Documents skipped: {}", stats.documents_failed);
    }
    println!("  Web pages indexed: {}", stats.pages_indexed);
    for (url, reason) in &stats.pages_failed {
        println!("  {} {} was removed: {}", style("⚠").yellow(), url, reason);
    }
    println!("  Total chunks: {}", stats.chunks_created);
    Ok(())
}

/// Show storage paths, index state and configured services
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    let session = Session::from_config(config);
    let index_path = config.index_path();

    println!("📊 DocuWhisperer Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("📁 Storage:");
    println!("   Config:    {}", config.config_file_path().display());
    println!("   Documents: {}", config.documents_dir().display());
    println!("   Index:     {}", index_path.display());
    println!("   Web pages: {}", config.registry_path().display());
    println!();

    println!("📄 Sources:");
    match session.cache().store().get_doc_paths() {
        Ok((word, pdf)) => {
            println!("   Word documents: {}", word.len());
            println!("   PDF documents:  {}", pdf.len());
        }
        Err(e) => println!("   ❌ Could not read document store - {}", e),
    }
    println!("   Web pages:      {}", session.registry().len());
    println!();

    println!("🔍 Vector Index:");
    match VectorIndex::load(&index_path) {
        Ok(Some(index)) => {
            println!("   ✅ Present: {} chunks", index.len());
            println!("   📋 Model: {}", index.model());
            println!("   🔢 Dimensions: {}", index.dimension());
            println!(
                "   🕒 Updated: {}",
                index.updated_at().format("%Y-%m-%d %H:%M:%S")
            );
            if index.model() != config.embedding.model {
                println!(
                    "   ⚠️  Configured model is {}; {}",
                    config.embedding.model, REINDEX_REMINDER
                );
            }
        }
        Ok(None) => println!("   ❌ Not built yet"),
        Err(e) => println!("   ❌ Unreadable - {}", e),
    }
    println!();

    println!("🤖 Services:");
    println!(
        "   Embedding:  {} ({})",
        config.embedding.model, config.embedding.base_url
    );
    println!(
        "   Generation: {} ({})",
        config.generation.model, config.generation.base_url
    );
    let key_state = if config.embedding.resolved_api_key().is_some() {
        "configured"
    } else {
        "missing"
    };
    println!("   API key:    {key_state}");

    Ok(())
}
