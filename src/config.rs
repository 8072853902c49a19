use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::warn;

use crate::encoding::DEFAULT_ENCODINGS;
use crate::error::SyncError;

pub const TOKEN_ENV_VAR: &str = "READWISE_TOKEN";
pub const CREDENTIALS_FILE: &str = ".credentials";
pub const CREDENTIALS_KEY: &str = "READWISE_ACCESS_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(about = "Syncs PocketBook highlights to Readwise", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
    /// Override the notes directory from the config file.
    #[arg(long = "notes-dir")]
    pub notes_dir: Option<PathBuf>,
    /// Override the sync state file location.
    #[arg(long = "state-file")]
    pub state_file: Option<PathBuf>,
    /// Group, parse and diff, but upload nothing and leave state untouched.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marginalia")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

fn default_notes_dir() -> PathBuf {
    PathBuf::from("/Volumes/PB700K3/Notes")
}

fn default_api_url() -> String {
    "https://readwise.io/api/v2/highlights/".to_string()
}

fn default_state_file() -> PathBuf {
    default_config_dir().join("state.json")
}

fn default_batch_size() -> usize {
    100
}

fn default_encodings() -> Vec<String> {
    DEFAULT_ENCODINGS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_notes_dir")]
    pub notes_dir: PathBuf,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Candidate text encodings, tried in order when decoding export files.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_dir: default_notes_dir(),
            api_url: default_api_url(),
            state_file: default_state_file(),
            batch_size: default_batch_size(),
            encodings: default_encodings(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to built-in defaults when it does
    /// not exist. The tool works with zero setup.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let yaml_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let yaml_with_env = substitute_env_vars(&yaml_str);
        let mut config: Config = serde_yaml::from_str(&yaml_with_env)
            .with_context(|| format!("config {} is not valid YAML", path.display()))?;

        config.batch_size = config.batch_size.max(1);
        Ok(config)
    }

    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.notes_dir {
            self.notes_dir = dir.clone();
        }
        if let Some(state_file) = &cli.state_file {
            self.state_file = state_file.clone();
        }
        self
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references in the raw config text
/// before deserializing.
fn substitute_env_vars(yaml_str: &str) -> String {
    let mut result = yaml_str.to_string();
    let mut offset = 0;

    while let Some(start) = result[offset..].find("${") {
        let actual_start = offset + start;
        if let Some(end) = result[actual_start..].find("}") {
            let var_name = &result[actual_start + 2..actual_start + end];

            let env_value = if let Some(default_start) = var_name.find(":-") {
                let actual_var = &var_name[..default_start];
                let default_val = &var_name[default_start + 2..];
                env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
            } else {
                env::var(var_name).unwrap_or_else(|_| {
                    warn!("environment variable '{}' not found", var_name);
                    String::new()
                })
            };

            result.replace_range(actual_start..actual_start + end + 1, &env_value);
            offset = actual_start + env_value.len();
        } else {
            break;
        }
    }

    result
}

/// Resolve the Readwise access token: environment first, then the
/// `.credentials` key=value file in the config directory. Checked before any
/// filesystem or network work happens.
pub fn load_token(config_dir: &Path) -> Result<String, SyncError> {
    if let Ok(token) = env::var(TOKEN_ENV_VAR)
        && !token.trim().is_empty()
    {
        return Ok(token.trim().to_string());
    }

    token_from_credentials_file(&config_dir.join(CREDENTIALS_FILE)).ok_or(SyncError::MissingToken)
}

fn token_from_credentials_file(path: &Path) -> Option<String> {
    let vars = dotenvy::from_path_iter(path).ok()?;
    for item in vars {
        let Ok((key, value)) = item else {
            continue;
        };
        if key == CREDENTIALS_KEY && !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }
    None
}
