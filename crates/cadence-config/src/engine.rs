use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_max_depth() -> usize {
  8
}

/// Process-wide engine settings.
///
/// Plans may override the timeouts; `max_depth` bounds sub-plan nesting for
/// every plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  #[serde(default = "default_max_depth")]
  pub max_depth: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stage_timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub write_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_depth: default_max_depth(),
      stage_timeout_ms: None,
      write_timeout_ms: None,
    }
  }
}

impl EngineConfig {
  /// Load settings from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config: EngineConfig =
      serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      })?;
    config.validate()?;
    Ok(config)
  }

  /// Load settings from `path` if it exists, otherwise use the defaults.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_depth == 0 {
      return Err(ConfigError::Invalid {
        message: "max_depth must be at least 1".to_string(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{ "stage_timeout_ms": 1500 }"#).unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.max_depth, 8);
    assert_eq!(config.stage_timeout_ms, Some(1500));
    assert_eq!(config.write_timeout_ms, None);
  }

  #[test]
  fn test_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::load_or_default(&dir.path().join("engine.json")).unwrap();
    assert_eq!(config, EngineConfig::default());
  }

  #[test]
  fn test_zero_depth_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{ "max_depth": 0 }"#).unwrap();

    assert!(matches!(
      EngineConfig::load(&path),
      Err(ConfigError::Invalid { .. })
    ));
  }
}
