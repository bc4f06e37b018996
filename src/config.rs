//! Configuration file support for gbnf-gate.
//!
//! Loads settings from `gbnf-gate.toml` (or `$GBNF_GATE_CONFIG`).
//! CLI arguments override config file values.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub grammar: GrammarConfig,
    pub vocab: VocabConfig,
}

#[derive(Debug, Clone)]
pub struct GrammarConfig {
    pub path: Option<PathBuf>,
    pub root: String,
}

#[derive(Debug, Clone)]
pub struct VocabConfig {
    pub path: Option<PathBuf>,
    pub eog: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grammar: GrammarConfig {
                path: None,
                root: "root".to_string(),
            },
            vocab: VocabConfig {
                path: None,
                eog: None,
            },
        }
    }
}

impl Config {
    /// Load config from default locations, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("GBNF_GATE_CONFIG") {
            Some(PathBuf::from(path))
        } else {
            Self::find_config_file()
        };

        match config_path {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Find config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = vec![PathBuf::from("gbnf-gate.toml")];
        if let Some(dir) = dirs_config() {
            candidates.push(dir.join("gbnf-gate.toml"));
        }
        candidates.into_iter().find(|c| c.exists())
    }

    /// Load and parse a TOML config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_toml(&content)
    }

    /// Parse TOML content into Config (simple parser, no external TOML crate)
    fn parse_toml(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let kv_map = parse_toml_simple(content);

        for (key, value) in &kv_map {
            match key.as_str() {
                "grammar.path" => config.grammar.path = Some(PathBuf::from(value)),
                "grammar.root" => config.grammar.root = value.clone(),
                "vocab.path" => config.vocab.path = Some(PathBuf::from(value)),
                "vocab.eog" => config.vocab.eog = value.parse().ok(),
                _ => {} // ignore unknown keys
            }
        }

        Ok(config)
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# gbnf-gate configuration file

[grammar]
# path = "grammars/json.gbnf"
root = "root"

[vocab]
# path = "vocab.json"
# eog = 2
"#
        .to_string()
    }
}

/// Simple TOML parser handling `[section]` headers and `key = value` pairs
fn parse_toml_simple(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut section = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            // Strip quotes
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            let full_key = if section.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", section, key)
            };
            map.insert(full_key, value.to_string());
        }
    }
    map
}

/// Get platform config directory
fn dirs_config() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(|d| PathBuf::from(d).join("gbnf-gate"))
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config").join("gbnf-gate"))
        })
}
