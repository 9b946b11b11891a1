use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::driver::wait::{Backoff, Waits};

/// Run settings. Later sources win: built-in defaults, `registry_scraper.toml`
/// (or the file passed with `--config`), `SCRAPER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub webdriver_url: String,
    pub batch_size: usize,
    pub headless: bool,
    pub element_timeout_secs: u64,
    pub results_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub context_timeout_secs: u64,
    /// Time the operator gets to sign in before the run gives up.
    pub login_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            webdriver_url: "http://localhost:9515".to_string(),
            batch_size: 20,
            headless: false,
            element_timeout_secs: 10,
            results_timeout_secs: 10,
            page_timeout_secs: 10,
            context_timeout_secs: 10,
            login_timeout_secs: 300,
            poll_interval_ms: 200,
            max_poll_interval_ms: 2000,
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("registry_scraper").required(false),
        };
        let settings = Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix("SCRAPER").try_parsing(true))
            .build()
            .context("Failed to read settings")?;
        settings
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn waits(&self) -> Waits {
        Waits {
            element: Duration::from_secs(self.element_timeout_secs),
            results: Duration::from_secs(self.results_timeout_secs),
            page: Duration::from_secs(self.page_timeout_secs),
            context: Duration::from_secs(self.context_timeout_secs),
            login: Duration::from_secs(self.login_timeout_secs),
            backoff: Backoff {
                initial: Duration::from_millis(self.poll_interval_ms.max(1)),
                max: Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms)),
            },
        }
    }
}
