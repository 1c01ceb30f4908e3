mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;

use crate::error::ConfigError;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings that cannot work together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                field: "chunking",
                reason,
            })?;
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be at least 1"));
        }
        if self.embedding.dimension == 0 {
            return Err(invalid("embedding.dimension", "must be at least 1"));
        }
        if self.embedding.max_input_tokens == 0 {
            return Err(invalid("embedding.max_input_tokens", "must be at least 1"));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be at least 1"));
        }
        if self.retrieval.context_budget_tokens == 0 {
            return Err(invalid("retrieval.context_budget_tokens", "must be at least 1"));
        }
        if let Some(t) = self.retrieval.score_threshold
            && !(0.0..=1.0).contains(&t)
        {
            return Err(invalid("retrieval.score_threshold", "must be within [0, 1]"));
        }
        if self.retrieval.query_timeout_secs == 0 {
            return Err(invalid("retrieval.query_timeout_secs", "must be at least 1"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs", "must be at least 1"));
        }
        if self.ingest.concurrency == 0 {
            return Err(invalid("ingest.concurrency", "must be at least 1"));
        }
        Ok(())
    }

    /// The provider API key, required before any provider is built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] when neither env var was set.
    pub fn api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.secrets.api_key.as_ref().ok_or(ConfigError::MissingApiKey)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}
