use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// `0` disables the per-chapter timeout.
    #[serde(default = "default_chapter_timeout_secs")]
    pub chapter_timeout_secs: u64,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_chapter_timeout_secs() -> u64 {
    600
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("scripts/interrupted_script.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("scripts")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            retry_delay_ms: default_retry_delay_ms(),
            chapter_timeout_secs: default_chapter_timeout_secs(),
            snapshot_path: default_snapshot_path(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Reads `path`; a missing file means all defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config: {}", path.display()));
            }
        };
        Self::from_json(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;

        if config.api_base.trim().is_empty() {
            anyhow::bail!("config.json: api_base missing");
        }

        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn chapter_timeout(&self) -> Option<Duration> {
        (self.chapter_timeout_secs > 0).then(|| Duration::from_secs(self.chapter_timeout_secs))
    }

    /// Bearer token, ignoring blank keys.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}
