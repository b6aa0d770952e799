use std::path::Path;

use crate::error::ConfigError;
use crate::plan::PlanDef;

/// Load every `*.json` plan in `dir`, sorted by file name.
///
/// A missing directory yields no plans.
pub fn load_plan_dir(dir: &Path) -> Result<Vec<PlanDef>, ConfigError> {
  if !dir.exists() {
    return Ok(Vec::new());
  }

  let io_err = |source| ConfigError::Io {
    path: dir.to_path_buf(),
    source,
  };

  let mut paths = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(io_err)? {
    let path = entry.map_err(io_err)?.path();
    if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
      paths.push(path);
    }
  }
  paths.sort();

  let mut plans = Vec::with_capacity(paths.len());
  for path in paths {
    plans.push(PlanDef::from_json_file(&path)?);
  }

  Ok(plans)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_loads_sorted_json_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("b.json"),
      r#"{ "plan_id": "second", "steps": [] }"#,
    )
    .unwrap();
    std::fs::write(
      dir.path().join("a.json"),
      r#"{ "plan_id": "first", "steps": [] }"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let plans = load_plan_dir(dir.path()).unwrap();
    let ids: Vec<_> = plans.iter().map(|p| p.plan_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);
  }

  #[test]
  fn test_parse_error_names_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{").unwrap();

    match load_plan_dir(dir.path()) {
      Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("broken.json")),
      other => panic!("expected parse error, got {:?}", other),
    }
  }

  #[test]
  fn test_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_plan_dir(&dir.path().join("plans")).unwrap().is_empty());
  }
}
