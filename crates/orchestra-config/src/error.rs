use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The configuration file could not be read.
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The configuration file is not valid JSON for the expected schema.
  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// A setting is outside its allowed range.
  #[error("invalid setting '{setting}': {message}")]
  Invalid { setting: String, message: String },
}

impl ConfigError {
  pub(crate) fn invalid(setting: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Invalid {
      setting: setting.into(),
      message: message.into(),
    }
  }
}
