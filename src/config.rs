use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  /// UI refresh and query polling interval
  pub tick_rate_ms: u64,
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      tick_rate_ms: 250,
      log: LogConfig::default(),
    }
  }
}

/// Behaviour of the simulated backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Artificial delay before every response
  pub latency_ms: u64,
  /// Number of todos per page
  pub page_size: usize,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      latency_ms: 3000,
      page_size: 5,
    }
  }
}

impl ApiConfig {
  pub fn latency(&self) -> Duration {
    Duration::from_millis(self.latency_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive, overridden by RUST_LOG
  pub level: String,
  /// Directory for log files (defaults to $XDG_DATA_HOME/todoq/logs)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl LogConfig {
  pub fn dir(&self) -> PathBuf {
    self.dir.clone().unwrap_or_else(|| {
      dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todoq")
        .join("logs")
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./todoq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/todoq/config.yaml
  ///
  /// Without a config file the built-in defaults are used.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("todoq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("todoq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Reject settings the app cannot run with.
  pub fn validate(&self) -> Result<()> {
    if self.api.page_size == 0 {
      return Err(eyre!("api.page_size must be at least 1"));
    }
    if self.tick_rate_ms == 0 {
      return Err(eyre!("tick_rate_ms must be at least 1"));
    }
    Ok(())
  }

  pub fn tick_rate(&self) -> Duration {
    Duration::from_millis(self.tick_rate_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.latency(), Duration::from_secs(3));
    assert_eq!(config.api.page_size, 5);
    assert_eq!(config.tick_rate(), Duration::from_millis(250));
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml("api:\n  latency_ms: 500\n").unwrap();
    assert_eq!(config.api.latency_ms, 500);
    assert_eq!(config.api.page_size, 5);
    assert_eq!(config.tick_rate_ms, 250);
  }

  #[test]
  fn test_log_dir_override() {
    let config = Config::from_yaml("log:\n  level: debug\n  dir: /tmp/todoq\n").unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.dir(), PathBuf::from("/tmp/todoq"));
  }

  #[test]
  fn test_zero_page_size_rejected() {
    let config = Config::from_yaml("api:\n  page_size: 0\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/todoq.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
