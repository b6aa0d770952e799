//! Sub-plan input rendering using minijinja templates.
//!
//! String leaves of a sub-plan's `input` are rendered against the parent
//! run's input, exposed as `data`:
//! ```json
//! { "user": "{{ data.user_id }}", "note": "order for {{ data.name | title }}" }
//! ```
//! A string that is a single `{{ expr }}` keeps the JSON type of its result.

use minijinja::{Environment, Value};
use serde_json::json;
use thiserror::Error;

/// A template in a sub-plan input failed to render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to render '{template}': {message}")]
pub struct InputError {
  pub template: String,
  pub message: String,
}

/// Render `template` against `parent`. A null template forwards `parent`.
pub fn render_input(
  template: &serde_json::Value,
  parent: &serde_json::Value,
) -> Result<serde_json::Value, InputError> {
  if template.is_null() {
    return Ok(parent.clone());
  }

  let env = Environment::new();
  let context = Value::from_serialize(json!({ "data": parent }));
  render_value(&env, template, &context)
}

fn render_value(
  env: &Environment,
  value: &serde_json::Value,
  context: &Value,
) -> Result<serde_json::Value, InputError> {
  match value {
    serde_json::Value::String(s) if s.contains("{{") || s.contains("{%") => {
      let rendered = env
        .render_str(s, context.clone())
        .map_err(|e| InputError {
          template: s.clone(),
          message: e.to_string(),
        })?;
      if is_pure_template(s) {
        if let Ok(parsed) = serde_json::from_str(&rendered) {
          return Ok(parsed);
        }
      }
      Ok(serde_json::Value::String(rendered))
    }
    serde_json::Value::Array(items) => items
      .iter()
      .map(|v| render_value(env, v, context))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(fields) => {
      let mut rendered = serde_json::Map::new();
      for (k, v) in fields {
        rendered.insert(k.clone(), render_value(env, v, context)?);
      }
      Ok(serde_json::Value::Object(rendered))
    }
    _ => Ok(value.clone()),
  }
}

fn is_pure_template(s: &str) -> bool {
  let trimmed = s.trim();
  trimmed.starts_with("{{")
    && trimmed.ends_with("}}")
    && trimmed.matches("{{").count() == 1
    && trimmed.matches("}}").count() == 1
}
