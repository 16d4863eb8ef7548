// Shared fixtures for the integration tests
#![allow(dead_code, unused_imports)]

#[path = "../../src/testing.rs"]
mod fakes;

pub(crate) use fakes::{EchoGenerator, FakeOutcome, FakeRenderer, KeywordEmbedder, write_pdf};

use docu_whisperer::config::Config;
use std::fs;
use tempfile::TempDir;

/// A configuration rooted in a fresh temporary home directory
pub fn temp_config() -> (Config, TempDir) {
    let home = TempDir::new().expect("should create TempDir");
    let config = Config {
        base_dir: home.path().to_path_buf(),
        ..Config::default()
    };
    fs::create_dir_all(config.documents_dir()).expect("should create documents dir");
    (config, home)
}
