use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;
use crate::error::ConfigError;

/// Settings for one circuit breaker, keyed by collaborator name in
/// [`AppConfig::breakers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
  pub failure_threshold: u32,
  pub retry_timeout_ms: u64,
  pub call_timeout_ms: u64,
}

impl Default for BreakerSettings {
  fn default() -> Self {
    Self {
      failure_threshold: 5,
      retry_timeout_ms: 30_000,
      call_timeout_ms: 10_000,
    }
  }
}

impl BreakerSettings {
  pub fn retry_timeout(&self) -> Duration {
    Duration::from_millis(self.retry_timeout_ms)
  }

  pub fn call_timeout(&self) -> Duration {
    Duration::from_millis(self.call_timeout_ms)
  }

  pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
    if self.failure_threshold < 1 {
      return Err(ConfigError::invalid(
        format!("breakers.{name}.failure_threshold"),
        "must be at least 1",
      ));
    }
    if self.retry_timeout_ms == 0 {
      return Err(ConfigError::invalid(
        format!("breakers.{name}.retry_timeout_ms"),
        "must be greater than zero",
      ));
    }
    if self.call_timeout_ms == 0 {
      return Err(ConfigError::invalid(
        format!("breakers.{name}.call_timeout_ms"),
        "must be greater than zero",
      ));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
  /// Ceiling on the cumulative time spent sleeping between attempts.
  pub max_total_wait_ms: u64,
  pub jitter: bool,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: RetryBackoff::Exponential,
      initial_delay_ms: 200,
      max_delay_ms: 5_000,
      max_total_wait_ms: 15_000,
      jitter: true,
    }
  }
}

impl RetrySettings {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_attempts < 1 {
      return Err(ConfigError::invalid(
        "retry.max_attempts",
        "must be at least 1",
      ));
    }
    if self.max_delay_ms < self.initial_delay_ms {
      return Err(ConfigError::invalid(
        "retry.max_delay_ms",
        "must not be smaller than initial_delay_ms",
      ));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  /// Upper bound on node executions in a single drive of a session.
  pub max_steps_per_run: u32,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      max_steps_per_run: 100,
    }
  }
}

/// Connection settings for an HTTP collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorSettings {
  pub base_url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_token: Option<String>,
}

impl Default for CollaboratorSettings {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      api_token: None,
    }
  }
}

/// Top-level runtime configuration.
///
/// Every section has defaults, so a missing or partial file still yields a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub breakers: BTreeMap<String, BreakerSettings>,
  pub retry: RetrySettings,
  pub engine: EngineSettings,
  pub platform: CollaboratorSettings,
  pub messaging: CollaboratorSettings,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_url: Option<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    let mut breakers = BTreeMap::new();
    for name in ["platform", "messaging", "webhook"] {
      breakers.insert(name.to_string(), BreakerSettings::default());
    }
    Self {
      breakers,
      retry: RetrySettings::default(),
      engine: EngineSettings::default(),
      platform: CollaboratorSettings::default(),
      messaging: CollaboratorSettings::default(),
      database_url: None,
    }
  }
}

impl AppConfig {
  /// Load configuration from a JSON file. A missing file yields the defaults.
  ///
  /// Breakers listed in the file are merged over the default `platform`,
  /// `messaging` and `webhook` breakers, so overriding one keeps the others.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      return Ok(Self::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    for (name, settings) in Self::default().breakers {
      config.breakers.entry(name).or_insert(settings);
    }
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, settings) in &self.breakers {
      settings.validate(name)?;
    }
    self.retry.validate()?;
    if self.engine.max_steps_per_run == 0 {
      return Err(ConfigError::invalid(
        "engine.max_steps_per_run",
        "must be greater than zero",
      ));
    }
    Ok(())
  }
}
