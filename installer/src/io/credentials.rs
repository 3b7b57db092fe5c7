//! Completion credentials, read once at startup.

use std::fmt;

use tracing::debug;

use crate::io::config::CompletionConfig;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{var} environment variable not set")]
    Missing { var: String },
}

/// API keys for the completion endpoints. Immutable for the whole run.
#[derive(Clone)]
pub struct Credentials {
    pub primary: String,
    /// Absent when the fallback variable is unset; disables the fallback path.
    pub fallback: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("primary", &"<redacted>")
            .field("fallback", &self.fallback.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials through `lookup` (normally the process environment).
    ///
    /// Blank values count as unset. A missing primary key is fatal.
    pub fn from_lookup<F>(cfg: &CompletionConfig, lookup: F) -> Result<Self, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let primary = read(&cfg.primary.api_key_env).ok_or_else(|| CredentialError::Missing {
            var: cfg.primary.api_key_env.clone(),
        })?;
        let fallback = if cfg.fallback_model.trim().is_empty() {
            None
        } else {
            read(&cfg.fallback.api_key_env)
        };
        debug!(fallback = fallback.is_some(), "credentials loaded");
        Ok(Self { primary, fallback })
    }

    /// Load `.env` (if present) and read credentials from the environment.
    pub fn from_env(cfg: &CompletionConfig) -> Result<Self, CredentialError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => debug!("no .env file"),
            Err(err) => tracing::warn!(err = %err, "failed to load .env"),
        }
        Self::from_lookup(cfg, |var| std::env::var(var).ok())
    }
}
