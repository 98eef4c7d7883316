use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub quiz: QuizConfig,
  #[serde(default)]
  pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  /// Request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a cached read stays fresh (seconds)
  #[serde(default = "default_cache_ttl_secs")]
  pub ttl_secs: u64,
  /// Consecutive failures before a key stops retrying
  #[serde(default = "default_max_retry_attempts")]
  pub max_retry_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
  /// Per-question countdown when the server does not set one (seconds)
  #[serde(default = "default_timer_secs")]
  pub default_timer_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
  #[serde(default = "default_billing_ttl_secs")]
  pub ttl_secs: u64,
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_cache_ttl_secs() -> u64 {
  300
}

fn default_max_retry_attempts() -> u32 {
  3
}

fn default_timer_secs() -> u64 {
  30
}

fn default_billing_ttl_secs() -> u64 {
  60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_cache_ttl_secs(),
      max_retry_attempts: default_max_retry_attempts(),
    }
  }
}

impl Default for QuizConfig {
  fn default() -> Self {
    Self {
      default_timer_secs: default_timer_secs(),
    }
  }
}

impl Default for BillingConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_billing_ttl_secs(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

impl QuizConfig {
  pub fn default_timer(&self) -> Duration {
    Duration::from_secs(self.default_timer_secs)
  }
}

impl BillingConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./studysync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/studysync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/studysync/config.yaml\n\
                 with at least:\n  api:\n    url: https://study.example.com/api/"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("studysync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("studysync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks STUDYSYNC_TOKEN first, then STUDYSYNC_API_TOKEN as fallback.
  /// A missing token is not an error: requests go out unauthenticated and
  /// every cache key stays closed until one is provided.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STUDYSYNC_TOKEN")
      .or_else(|_| std::env::var("STUDYSYNC_API_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
