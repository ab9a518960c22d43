use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::poller::PollConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "synthesiaApiKey")]
    pub synthesia_key: String,
    #[serde(rename = "synthesiaApiRoot")]
    pub synthesia_root: String,
    #[serde(rename = "redditApiRoot")]
    #[serde(default = "default_reddit_root")]
    pub reddit_root: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_wait_secs")]
    pub poll_max_wait_secs: u64,
    #[serde(default = "default_poll_max_retries")]
    pub poll_max_retries: u32,
    #[serde(default = "default_poll_retry_delay_ms")]
    pub poll_retry_delay_ms: u64,
    #[serde(default = "default_max_unknown_statuses")]
    pub max_unknown_statuses: u32,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_reddit_root() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_poll_max_wait_secs() -> u64 {
    30 * 60
}

fn default_poll_max_retries() -> u32 {
    3
}

fn default_poll_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_unknown_statuses() -> u32 {
    5
}

fn default_download_timeout_secs() -> u64 {
    10 * 60
}

/// Environment names accepted for each setting, original camelCase first
const ENV_SYNTHESIA_KEY: &[&str] = &["synthesiaApiKey", "SYNTHESIA_API_KEY"];
const ENV_SYNTHESIA_ROOT: &[&str] = &["synthesiaApiRoot", "SYNTHESIA_API_ROOT"];
const ENV_REDDIT_ROOT: &[&str] = &["redditApiRoot", "REDDIT_API_ROOT"];
const ENV_OUTPUT_DIR: &[&str] = &["NARRATOR_OUTPUT_DIR"];
const ENV_POLL_INTERVAL: &[&str] = &["NARRATOR_POLL_INTERVAL_SECS"];
const ENV_POLL_MAX_WAIT: &[&str] = &["NARRATOR_POLL_MAX_WAIT_SECS"];
const ENV_POLL_RETRIES: &[&str] = &["NARRATOR_POLL_MAX_RETRIES"];
const ENV_POLL_RETRY_DELAY: &[&str] = &["NARRATOR_POLL_RETRY_DELAY_MS"];
const ENV_MAX_UNKNOWN: &[&str] = &["NARRATOR_MAX_UNKNOWN_STATUSES"];
const ENV_DOWNLOAD_TIMEOUT: &[&str] = &["NARRATOR_DOWNLOAD_TIMEOUT_SECS"];

impl Config {
    /// Config with default tuning for the given credentials and API roots
    pub fn new(synthesia_key: &str, synthesia_root: &str, reddit_root: &str) -> Self {
        Self {
            synthesia_key: synthesia_key.to_string(),
            synthesia_root: synthesia_root.to_string(),
            reddit_root: reddit_root.to_string(),
            user_agent: default_user_agent(),
            output_dir: default_output_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_wait_secs: default_poll_max_wait_secs(),
            poll_max_retries: default_poll_max_retries(),
            poll_retry_delay_ms: default_poll_retry_delay_ms(),
            max_unknown_statuses: default_max_unknown_statuses(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(*name).filter(|v| !v.trim().is_empty()))
        };
        let parse_u64 = |names: &[&str], default: u64| -> Result<u64> {
            match get(names) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a whole number, got {:?}", names[0], raw)),
                None => Ok(default),
            }
        };

        let mut config = Config::new(
            &get(ENV_SYNTHESIA_KEY).unwrap_or_default(),
            &get(ENV_SYNTHESIA_ROOT).unwrap_or_default(),
            &get(ENV_REDDIT_ROOT).unwrap_or_else(default_reddit_root),
        );
        if let Some(dir) = get(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        config.poll_interval_secs = parse_u64(ENV_POLL_INTERVAL, config.poll_interval_secs)?;
        config.poll_max_wait_secs = parse_u64(ENV_POLL_MAX_WAIT, config.poll_max_wait_secs)?;
        config.poll_max_retries =
            u32::try_from(parse_u64(ENV_POLL_RETRIES, config.poll_max_retries.into())?)
                .context("NARRATOR_POLL_MAX_RETRIES is out of range")?;
        config.poll_retry_delay_ms = parse_u64(ENV_POLL_RETRY_DELAY, config.poll_retry_delay_ms)?;
        config.max_unknown_statuses =
            u32::try_from(parse_u64(ENV_MAX_UNKNOWN, config.max_unknown_statuses.into())?)
                .context("NARRATOR_MAX_UNKNOWN_STATUSES is out of range")?;
        config.download_timeout_secs =
            parse_u64(ENV_DOWNLOAD_TIMEOUT, config.download_timeout_secs)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.synthesia_key.trim().is_empty() {
            anyhow::bail!("synthesiaApiKey missing");
        }
        if self.synthesia_root.trim().is_empty() {
            anyhow::bail!("synthesiaApiRoot missing");
        }
        if self.reddit_root.trim().is_empty() {
            anyhow::bail!("redditApiRoot missing");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.poll_max_wait_secs == 0 {
            anyhow::bail!("poll_max_wait_secs must be greater than zero");
        }
        if self.download_timeout_secs == 0 {
            anyhow::bail!("download_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            max_wait: Some(Duration::from_secs(self.poll_max_wait_secs)),
            max_query_retries: self.poll_max_retries,
            retry_delay: Duration::from_millis(self.poll_retry_delay_ms),
            max_unknown_statuses: self.max_unknown_statuses.max(1),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
