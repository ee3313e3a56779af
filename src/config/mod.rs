//! Configuration (layered: code > env > `~/.roci/chat.toml` > defaults).

use std::path::{Path, PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::context::budget::{
    TokenBudget, DEFAULT_THRESHOLD_FLOOR_TOKENS, DEFAULT_THRESHOLD_RATIO,
};
use crate::context::trim::DEFAULT_MAX_EVICTIONS;
use crate::error::ChatError;

pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

const ENV_CONTEXT_WINDOW: &str = "ROCI_CHAT_CONTEXT_WINDOW";
const ENV_MAX_EVICTIONS: &str = "ROCI_CHAT_MAX_EVICTIONS";
const ENV_MAX_ITERATIONS: &str = "ROCI_CHAT_MAX_ITERATIONS";
const ENV_HISTORY_DIR: &str = "ROCI_CHAT_HISTORY_DIR";

/// Runtime settings for a chat session.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Context window of the active model, in tokens.
    #[builder(default = DEFAULT_CONTEXT_WINDOW)]
    pub context_window: usize,
    /// Fraction of the window kept free.
    #[builder(default = DEFAULT_THRESHOLD_RATIO)]
    pub threshold_ratio: f64,
    /// Minimum number of tokens kept free.
    #[builder(default = DEFAULT_THRESHOLD_FLOOR_TOKENS)]
    pub threshold_floor_tokens: usize,
    /// Eviction steps per trim pass.
    #[builder(default = DEFAULT_MAX_EVICTIONS)]
    pub max_evictions: usize,
    /// Model requests per turn before the loop is aborted. Unbounded when unset.
    pub max_iterations: Option<usize>,
    /// Directory the session saves past chats to. Chats stay in memory when unset.
    pub history_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChatConfig {
    /// Defaults overridden by `ROCI_CHAT_*` variables (a `.env` file is honored).
    pub fn from_env() -> Result<Self, ChatError> {
        let _ = dotenvy::dotenv();
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// `~/.roci/chat.toml` if present, then environment overrides.
    pub fn load() -> Result<Self, ChatError> {
        let _ = dotenvy::dotenv();
        let path = default_roci_dir().join("chat.toml");
        let base = if path.exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ChatError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CONTEXT_WINDOW) {
            self.context_window = parse_count(ENV_CONTEXT_WINDOW, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_EVICTIONS) {
            self.max_evictions = parse_count(ENV_MAX_EVICTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ITERATIONS) {
            self.max_iterations = Some(parse_count(ENV_MAX_ITERATIONS, &value)?);
        }
        if let Some(value) = lookup(ENV_HISTORY_DIR).filter(|v| !v.trim().is_empty()) {
            self.history_dir = Some(PathBuf::from(value));
        }
        Ok(self)
    }

    /// Budget used by the estimator and trimmer.
    pub fn budget(&self) -> TokenBudget {
        TokenBudget {
            context_window: self.context_window,
            threshold_ratio: self.threshold_ratio,
            threshold_floor_tokens: self.threshold_floor_tokens,
        }
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ChatError> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::Configuration(format!("{key} must be a non-negative integer, got '{value}'")))
}

pub(crate) fn default_roci_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".roci"))
        .unwrap_or_else(|| PathBuf::from(".roci"))
}
