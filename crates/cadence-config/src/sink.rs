use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stable identifier of a result destination.
///
/// The string forms (`object-store`, `database`, `http-api`) are part of the
/// wire contract with hosts and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
  ObjectStore,
  Database,
  HttpApi,
}

impl SinkKind {
  pub const ALL: [SinkKind; 3] = [SinkKind::ObjectStore, SinkKind::Database, SinkKind::HttpApi];

  pub fn as_str(&self) -> &'static str {
    match self {
      SinkKind::ObjectStore => "object-store",
      SinkKind::Database => "database",
      SinkKind::HttpApi => "http-api",
    }
  }
}

impl fmt::Display for SinkKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SinkKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SinkKind::ALL
      .into_iter()
      .find(|kind| kind.as_str() == s)
      .ok_or_else(|| ConfigError::UnknownSinkKind {
        value: s.to_string(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_names_match_display() {
    for kind in SinkKind::ALL {
      let json = serde_json::to_string(&kind).unwrap();
      assert_eq!(json, format!("\"{}\"", kind));
      assert_eq!(kind.as_str().parse::<SinkKind>().unwrap(), kind);
    }
  }

  #[test]
  fn test_unknown_kind() {
    let err = "s3".parse::<SinkKind>().unwrap_err();
    assert!(matches!(err, ConfigError::UnknownSinkKind { value } if value == "s3"));
  }
}
