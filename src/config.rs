use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::parser::{LinePattern, Parser, DEFAULT_COMMENT_MARKERS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub directory: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_patterns")]
    pub patterns: Vec<LinePattern>,
    #[serde(default = "default_comment_markers")]
    pub comment_markers: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            comment_markers: default_comment_markers(),
        }
    }
}

fn default_patterns() -> Vec<LinePattern> {
    LinePattern::DEFAULT_ORDER.to_vec()
}
fn default_comment_markers() -> Vec<String> {
    DEFAULT_COMMENT_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl ParserConfig {
    pub fn build(&self) -> Parser {
        Parser::new(self.patterns.clone(), self.comment_markers.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate ingest
    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must not be empty");
    }
    for pattern in &config.ingest.include_globs {
        Glob::new(pattern)
            .with_context(|| format!("ingest.include_globs: invalid glob '{}'", pattern))?;
    }

    // Validate parser
    if config.parser.patterns.is_empty() {
        anyhow::bail!("parser.patterns must list at least one pattern");
    }
    if config.parser.comment_markers.iter().any(|m| m.is_empty()) {
        anyhow::bail!("parser.comment_markers must not contain empty strings");
    }

    Ok(config)
}
