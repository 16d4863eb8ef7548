// Configuration management module
// TOML settings, storage path resolution and the interactive setup command

pub mod interactive;
pub mod settings;


pub use crate::embeddings::chunking::ChunkingConfig;
pub use crate::sources::web::browser::BrowserConfig;
pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, GenerationConfig, RetrievalConfig, StorageConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
