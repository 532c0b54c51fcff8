use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SchedulerError;

/// Longest lookback accepted for `fetch_days_back`, about ten years.
pub const MAX_FETCH_DAYS_BACK: u32 = 3650;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Duration string such as "1h" or "15m30s".
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_fetch_days_back")]
    pub fetch_days_back: u32,
    #[serde(default = "default_max_pages_per_run")]
    pub max_pages_per_run: u32,
    #[serde(default = "default_api_delay_seconds")]
    pub api_delay_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            fetch_days_back: default_fetch_days_back(),
            max_pages_per_run: default_max_pages_per_run(),
            api_delay_seconds: default_api_delay_seconds(),
        }
    }
}

impl SchedulerConfig {
    pub fn parse_interval(&self) -> Result<Duration, SchedulerError> {
        parse_duration(&self.interval).map_err(|reason| SchedulerError::InvalidInterval {
            value: self.interval.clone(),
            reason,
        })
    }

    pub fn check_fetch_days_back(&self) -> Result<(), SchedulerError> {
        if self.fetch_days_back > MAX_FETCH_DAYS_BACK {
            return Err(SchedulerError::InvalidLookback {
                days: self.fetch_days_back,
                max: MAX_FETCH_DAYS_BACK,
            });
        }
        Ok(())
    }

    pub fn api_delay(&self) -> Duration {
        Duration::from_secs(self.api_delay_seconds)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_fetch_days_back() -> u32 {
    30
}

fn default_max_pages_per_run() -> u32 {
    10
}

fn default_api_delay_seconds() -> u64 {
    2
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            environment: default_environment(),
        }
    }
}

fn default_source_url() -> String {
    "http://127.0.0.1:8085/api".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nfse-sync")
}

fn default_store_path() -> PathBuf {
    default_base_dir().join("nfse.db")
}

pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
    if let Some(p) = config.store.path.to_str() {
        config.store.path = expand_tilde(p);
    }
    Ok(config)
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = default_base_dir();
    tokio::fs::create_dir_all(&base).await?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[scheduler]
enabled = true
# Go-style duration: "30m", "1h", "1h30m"
interval = "1h"
# Upper bound on how far back a tenant window may reach
fetch_days_back = 30
max_pages_per_run = 10
# Pause between pages of the same tenant
api_delay_seconds = 2

[source]
base_url = "http://127.0.0.1:8085/api"
environment = "production"

[store]
path = "~/.nfse-sync/nfse.db"
"#,
        )
        .await?;
    }

    Ok(config_path)
}

/// Parse a Go-style duration string ("90s", "1h30m", "250ms").
/// A bare integer is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return non_zero(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number at '{rest}'"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("bad number '{}': {e}", &rest[..digits]))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "" => return Err(format!("missing unit after '{value}'")),
            unit => return Err(format!("unknown unit '{unit}'")),
        };
        total += part;
        rest = &rest[unit_len..];
    }

    non_zero(total)
}

fn non_zero(d: Duration) -> Result<Duration, String> {
    if d.is_zero() {
        Err("duration must be greater than zero".to_string())
    } else {
        Ok(d)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
