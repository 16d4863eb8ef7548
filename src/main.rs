use clap::{Parser, Subcommand};
use docu_whisperer::{DocuError, Result};
use docu_whisperer::commands::{
    add_document, add_url, ask, chat, list_documents, reindex, remove, show_status,
};
use docu_whisperer::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docu-whisperer")]
#[command(about = "Ask questions about your Word, PDF and web documents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, documents, the index and the URL registry
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding and generation services
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ask a single question
    Ask {
        /// The question to answer from the indexed content
        question: String,
    },
    /// Ask questions interactively and keep a conversation history
    Chat,
    /// Copy a Word (.docx) or PDF (.pdf) file into the document store
    Add {
        /// Path of the document to add
        path: PathBuf,
    },
    /// Render a web page and add it to the index
    AddUrl {
        /// Page URL, starting with http:// or https://
        url: String,
    },
    /// List documents, web pages and the indexed chunk count
    List,
    /// Remove a stored document or a registered web page
    Remove {
        /// Document file name or web page URL
        target: String,
    },
    /// Rebuild the index from all documents and web pages
    Reindex,
    /// Show storage paths, index state and configured services
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => get_config_dir().map_err(|e| DocuError::Config(e.to_string()))?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&home)?;
        } else {
            run_interactive_config(&home)?;
        }
        return Ok(());
    }

    let config = Config::load(&home)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ask { question } => ask(&config, &question)?,
        Commands::Chat => chat(&config)?,
        Commands::Add { path } => add_document(&config, &path)?,
        Commands::AddUrl { url } => add_url(&config, &url)?,
        Commands::List => list_documents(&config)?,
        Commands::Remove { target } => remove(&config, &target)?,
        Commands::Reindex => reindex(&config)?,
        Commands::Status => show_status(&config)?,
    }

    Ok(())
}
