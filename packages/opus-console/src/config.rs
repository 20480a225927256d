use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use opus_client::DEFAULT_BASE_URL;

use crate::poller::{PollerConfig, DEFAULT_POLL_INTERVAL};

/// Default location of the saved session file.
pub const DEFAULT_SESSION_PATH: &str = ".opus-console/session.json";

/// Console configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub session_path: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let poll_interval = match present("OPUS_POLL_INTERVAL_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .context("OPUS_POLL_INTERVAL_MS must be a whole number of milliseconds")?;
                if millis == 0 {
                    bail!("OPUS_POLL_INTERVAL_MS must be greater than zero");
                }
                Duration::from_millis(millis)
            }
            None => defaults.poll_interval,
        };

        Ok(Self {
            api_url: present("OPUS_API_URL").unwrap_or(defaults.api_url),
            api_token: present("OPUS_API_TOKEN"),
            poll_interval,
            session_path: present("OPUS_SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_path),
        })
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
        }
    }
}
