use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_PAGE_SIZE;

/// API base used when nothing else is configured.
pub const FALLBACK_API_BASE: &str = "http://localhost:8000";

/// Environment variables checked for the API base, in order.
const API_BASE_VARS: &[&str] = &["LOOKUP_DASH_API_BASE", "API_BASE"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub lookup: LookupConfig,
  /// Directory for daily log files (stderr only if unset)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
  /// Byte budget for cached pages; writes beyond it are skipped
  #[serde(default = "default_quota_bytes")]
  pub quota_bytes: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      quota_bytes: default_quota_bytes(),
    }
  }
}

fn default_quota_bytes() -> Option<u64> {
  Some(5 * 1024 * 1024)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Delay before the next page is prefetched
  #[serde(default = "default_prefetch_delay_ms")]
  pub prefetch_delay_ms: u64,
}

impl Default for LookupConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      prefetch_delay_ms: default_prefetch_delay_ms(),
    }
  }
}

fn default_page_size() -> u32 {
  DEFAULT_PAGE_SIZE
}

fn default_prefetch_delay_ms() -> u64 {
  1500
}

impl LookupConfig {
  pub fn prefetch_delay(&self) -> Duration {
    Duration::from_millis(self.prefetch_delay_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./lookup-dash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lookup-dash/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("lookup-dash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lookup-dash").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is valid and means "all defaults"
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Resolve the API base URL.
  ///
  /// Environment variables win over the config file; trailing slashes are removed.
  pub fn api_base(&self) -> String {
    let from_env = API_BASE_VARS
      .iter()
      .filter_map(|var| std::env::var(var).ok())
      .find(|v| !v.trim().is_empty());

    resolve_api_base(from_env.as_deref(), self.api.base_url.as_deref())
  }
}

fn resolve_api_base(from_env: Option<&str>, from_config: Option<&str>) -> String {
  let configured = from_env
    .or(from_config)
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .unwrap_or(FALLBACK_API_BASE);

  configured.trim_end_matches('/').to_string()
}
