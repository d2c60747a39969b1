//! Purpose: Render `{{ env_var(...) }}` references inside YAML-derived values.
//! Exports: `render_value`, `render_str`, `process_env`.
//! Role: Pre-processing step for project files such as `selectors.yml`.
//! Invariants: Only string leaves are rendered; keys and non-strings are untouched.
//! Invariants: A missing variable without a default is a `Config` error.
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

const ENV_VAR_PATTERN: &str =
    r#"\{\{\s*env_var\(\s*['"]([^'"]+)['"]\s*(?:,\s*['"]([^'"]*)['"]\s*)?\)\s*\}\}"#;

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENV_VAR_PATTERN).expect("env_var pattern is valid"))
}

pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn render_str(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String, Error> {
    let mut missing = None;
    let rendered = env_var_regex().replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name).or_else(|| caps.get(2).map(|default| default.as_str().to_string())) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(Error::new(ErrorKind::Config)
            .with_message(format!("env var required but not provided: '{name}'"))
            .with_hint("Export the variable or pass a default: env_var('NAME', 'default')."));
    }
    Ok(rendered.into_owned())
}

pub fn render_value(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Value, Error> {
    Ok(match value {
        Value::String(text) => Value::String(render_str(&text, lookup)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| render_value(item, lookup))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| Ok((key, render_value(item, lookup)?)))
                .collect::<Result<_, Error>>()?,
        ),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::{render_str, render_value};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TARGET_TAG" => Some("nightly".to_string()),
            _ => None,
        }
    }

    #[test]
    fn replaces_known_variables() {
        let rendered = render_str("tag:{{ env_var('TARGET_TAG') }}", &lookup).expect("render");
        assert_eq!(rendered, "tag:nightly");
    }

    #[test]
    fn falls_back_to_default() {
        let rendered =
            render_str(r#"{{env_var("MISSING", "hourly")}}"#, &lookup).expect("render");
        assert_eq!(rendered, "hourly");
    }

    #[test]
    fn missing_without_default_is_config_error() {
        let err = render_str("{{ env_var('MISSING') }}", &lookup).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().unwrap().contains("MISSING"));
    }

    #[test]
    fn walks_nested_values_and_leaves_other_templates() {
        let value = json!({
            "union": ["tag:{{ env_var('TARGET_TAG') }}", "{{ var('x') }}", 3]
        });
        let rendered = render_value(value, &lookup).expect("render");
        assert_eq!(rendered, json!({"union": ["tag:nightly", "{{ var('x') }}", 3]}));
    }
}
