//! Configuration validation.
//!
//! Flags unknown or misspelled keys and values the wizard cannot run with.

use std::path::{Path, PathBuf};

use crate::{
    loader::{find_config_file, parse_config, parse_config_value},
    schema::{LazyTraderConfig, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "polling.interval_secs"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Known sections and their keys.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("backend", &["base_url", "request_timeout_secs"]),
    ("polling", &["interval_secs", "check_timeout_secs"]),
    ("wizard", &["message_delay_ms"]),
];

/// Validate a config file at the given path, or the discovered one when
/// `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path.map(Path::to_path_buf).or_else(find_config_file) else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(raw) => validate_str(&raw, &config_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate raw config text. `path` only selects the format by extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: e.to_string(),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &mut diagnostics);

    match parse_config(raw, path) {
        Ok(config) => check_values(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: e.to_string(),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    let sections: Vec<&str> = KNOWN_KEYS.iter().map(|(s, _)| *s).collect();

    for (key, child) in root {
        let Some((_, fields)) = KNOWN_KEYS.iter().find(|(s, _)| s == key) else {
            diagnostics.push(unknown_field(key.clone(), key, &sections));
            continue;
        };
        let Some(table) = child.as_object() else {
            continue;
        };
        for field in table.keys().filter(|f| !fields.contains(&f.as_str())) {
            diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields));
        }
    }
}

fn unknown_field(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
        None => "unknown field".to_string(),
    };
    Diagnostic {
        severity: Severity::Error,
        category: "unknown-field",
        path,
        message,
    }
}

fn check_values(config: &LazyTraderConfig, diagnostics: &mut Vec<Diagnostic>) {
    let base_url = config.backend.base_url.trim();
    if base_url.is_empty() {
        diagnostics.push(value_error("backend.base_url", "must not be empty"));
    } else {
        match url::Url::parse(base_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {
                if u.scheme() == "http" && !is_local(&u) {
                    diagnostics.push(Diagnostic {
                        severity: Severity::Warning,
                        category: "value",
                        path: "backend.base_url".into(),
                        message: "plain http to a non-local backend".into(),
                    });
                }
            },
            Ok(u) => diagnostics.push(value_error(
                "backend.base_url",
                &format!("unsupported scheme \"{}\"", u.scheme()),
            )),
            Err(e) => diagnostics.push(value_error("backend.base_url", &format!("invalid url: {e}"))),
        }
    }

    if config.backend.request_timeout_secs == 0 {
        diagnostics.push(value_error("backend.request_timeout_secs", "must be greater than 0"));
    }
    if config.polling.check_timeout_secs == 0 {
        diagnostics.push(value_error("polling.check_timeout_secs", "must be greater than 0"));
    }

    let interval = config.polling.interval_secs;
    if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&interval) {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "value",
            path: "polling.interval_secs".into(),
            message: format!(
                "{interval} is outside {MIN_POLL_INTERVAL_SECS}..={MAX_POLL_INTERVAL_SECS} and will be clamped"
            ),
        });
    }
}

fn is_local(u: &url::Url) -> bool {
    matches!(u.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

fn value_error(path: &str, message: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        category: "value",
        path: path.into(),
        message: message.into(),
    }
}

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut curr = Vec::with_capacity(b.len() + 1);
        curr.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr.push((prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1));
        }
        prev = curr;
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn toml(raw: &str) -> ValidationResult {
        validate_str(raw, Path::new("lazytrader.toml"))
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("polling", "polling"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("poling", "polling"), 1);
        assert_eq!(levenshtein("backnd", "backend"), 1);
    }

    #[test]
    fn default_config_is_clean() {
        let result = toml("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_section_with_suggestion() {
        let result = toml("[poling]\ninterval_secs = 3\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "poling")
            .expect("unknown section flagged");
        assert_eq!(d.category, "unknown-field");
        assert!(d.message.contains("polling"));
        assert!(result.has_errors());
    }

    #[test]
    fn unknown_nested_field() {
        let result = toml("[polling]\nintervl_secs = 3\ncheck_timeout_secs = 5\n");
        let unknown: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.category == "unknown-field")
            .collect();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].path, "polling.intervl_secs");
        assert!(unknown[0].message.contains("interval_secs"));
    }

    #[test]
    fn bad_values() {
        let result = toml(
            "[backend]\nbase_url = \"ftp://example.com\"\nrequest_timeout_secs = 0\n\n[polling]\ninterval_secs = 120\n",
        );
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.path == "backend.base_url"));
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "backend.request_timeout_secs")
        );
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn plain_http_remote_is_warning() {
        let result = toml("[backend]\nbase_url = \"http://trader.example.com\"\n");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn syntax_error() {
        let result = toml("[backend\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error() {
        let result = toml("[polling]\ninterval_secs = \"fast\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn validates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazytrader.yaml");
        std::fs::write(&path, "wizard:\n  message_delay: 10\n").unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(result.diagnostics.iter().any(|d| d.path == "wizard.message_delay"));
    }
}
