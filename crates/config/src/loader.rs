use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    schema::LazyTraderConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "lazytrader.toml",
    "lazytrader.yaml",
    "lazytrader.yml",
    "lazytrader.json",
];

/// Overrides the backend base URL.
pub const ENV_BACKEND_URL: &str = "LAZYTRADER_BACKEND_URL";
/// Overrides the link-status poll interval, in seconds.
pub const ENV_POLL_INTERVAL: &str = "LAZYTRADER_POLL_INTERVAL_SECS";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<LazyTraderConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env
/// overrides.
///
/// Search order:
/// 1. `./lazytrader.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/lazytrader/lazytrader.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `LazyTraderConfig::default()` when nothing is found or the
/// file fails to load.
pub fn discover_and_load() -> LazyTraderConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                LazyTraderConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            LazyTraderConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/lazytrader/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lazytrader").map(|d| d.config_dir().to_path_buf())
}

/// Apply `LAZYTRADER_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut LazyTraderConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an injectable lookup, so tests do not
/// have to touch the process environment.
fn apply_env_overrides_with(config: &mut LazyTraderConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
        debug!(url = %url, "backend url overridden from env");
        config.backend.base_url = url.trim().to_string();
    }
    if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.polling.interval_secs = secs,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid {ENV_POLL_INTERVAL}"),
        }
    }
}

fn format_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<LazyTraderConfig> {
    match format_of(path) {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

/// Parse into a format-neutral JSON value, used by validation to walk keys.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    match format_of(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazytrader.toml");
        std::fs::write(
            &path,
            "[backend]\nbase_url = \"https://app.example.com\"\n\n[polling]\ninterval_secs = 4\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.backend.base_url, "https://app.example.com");
        assert_eq!(cfg.polling.interval_secs, 4);
        assert_eq!(cfg.wizard.message_delay_ms, 500);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("lazytrader.yaml");
        std::fs::write(&yaml, "polling:\n  check_timeout_secs: 2\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().polling.check_timeout_secs, 2);

        let json = dir.path().join("lazytrader.json");
        std::fs::write(&json, r#"{"wizard": {"message_delay_ms": 0}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().wizard.message_delay_ms, 0);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazytrader.ini");
        std::fs::write(&path, "x=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/nonexistent/lazytrader.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = LazyTraderConfig::default();
        let lookup = |name: &str| match name {
            ENV_BACKEND_URL => Some(" https://staging.example.com ".to_string()),
            ENV_POLL_INTERVAL => Some("5".to_string()),
            _ => None,
        };
        apply_env_overrides_with(&mut cfg, lookup);
        assert_eq!(cfg.backend.base_url, "https://staging.example.com");
        assert_eq!(cfg.polling.interval_secs, 5);
    }

    #[test]
    fn invalid_env_interval_is_ignored() {
        let mut cfg = LazyTraderConfig::default();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == ENV_POLL_INTERVAL).then(|| "soon".to_string())
        });
        assert_eq!(cfg.polling.interval_secs, 3);
    }
}
