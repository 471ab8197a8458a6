//! Environment variable interpolation for tap config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`
//!
//! A `$` that does not start one of the forms above (for example the anchor
//! at the end of a `search_pattern` like `\.csv$`) is left untouched.

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escaped dollar
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: braced name
            (?:(:?-)([^}]*))?          # 2: default operator, 3: default value
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: bare name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// How a `${VAR...}` reference falls back when the variable is missing.
#[derive(Debug, Clone, Copy)]
enum Fallback<'a> {
    /// No default given.
    Required,
    /// `${VAR-default}`: only when unset.
    Unset(&'a str),
    /// `${VAR:-default}`: when unset or empty.
    UnsetOrEmpty(&'a str),
}

fn fallback<'a>(caps: &Captures<'a>) -> Fallback<'a> {
    let default = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    match caps.get(2).map(|m| m.as_str()) {
        Some(":-") => Fallback::UnsetOrEmpty(default),
        Some(_) => Fallback::Unset(default),
        None => Fallback::Required,
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains('\n') || value.contains('\r') => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::UnsetOrEmpty(default)) if value.is_empty() => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::Unset(default) | Fallback::UnsetOrEmpty(default)) => {
            Ok(default.to_string())
        }
        (Err(_), Fallback::Required) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            let whole = &caps[0];
            if whole == "$$" {
                return "$".to_string();
            }

            let (name, fallback) = match (caps.get(1), caps.get(4)) {
                (Some(braced), _) => (braced.as_str(), fallback(caps)),
                (None, Some(bare)) => (bare.as_str(), Fallback::Required),
                (None, None) => return whole.to_string(),
            };

            resolve(name, fallback).unwrap_or_else(|message| {
                errors.push(message);
                whole.to_string()
            })
        })
        .into_owned();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names and restores them afterwards
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the state captured above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        with_env_vars(&[("TAP_TEST_BUCKET", Some("raw-data"))], || {
            let result = interpolate(r#"{"a": "$TAP_TEST_BUCKET", "b": "${TAP_TEST_BUCKET}"}"#);
            assert!(result.is_ok());
            assert_eq!(result.text, r#"{"a": "raw-data", "b": "raw-data"}"#);
        });
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        with_env_vars(
            &[("TAP_TEST_MISS1", None), ("TAP_TEST_MISS2", None)],
            || {
                let result = interpolate("a: $TAP_TEST_MISS1, b: ${TAP_TEST_MISS2}");
                assert!(!result.is_ok());
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("TAP_TEST_MISS1"));
                assert!(result.errors[1].contains("not set"));
            },
        );
    }

    #[test]
    fn test_defaults() {
        with_env_vars(
            &[("TAP_TEST_UNSET", None), ("TAP_TEST_EMPTY", Some(""))],
            || {
                assert_eq!(interpolate("${TAP_TEST_UNSET:-x}").text, "x");
                assert_eq!(interpolate("${TAP_TEST_UNSET-x}").text, "x");
                assert_eq!(interpolate("${TAP_TEST_EMPTY:-x}").text, "x");
                assert_eq!(interpolate("${TAP_TEST_EMPTY-x}").text, "");
            },
        );
    }

    #[test]
    fn test_set_variable_wins_over_default() {
        with_env_vars(&[("TAP_TEST_SET", Some("actual"))], || {
            let result = interpolate("${TAP_TEST_SET:-default}");
            assert_eq!(result.text, "actual");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_regex_anchor_left_alone() {
        let input = r#"{"search_pattern": "orders/.*\\.csv$"}"#;
        let result = interpolate(input);
        assert!(result.is_ok());
        assert_eq!(result.text, input);
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("TAP_TEST_INJECT", Some("line1\nline2"))], || {
            let result = interpolate("value: $TAP_TEST_INJECT");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }
}
