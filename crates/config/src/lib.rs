//! Configuration loading, env overrides and validation.
//!
//! Config files: `lazytrader.toml`, `lazytrader.yaml` or `lazytrader.json`,
//! searched in `./` then `~/.config/lazytrader/`.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{BackendConfig, LazyTraderConfig, PollingConfig, WizardConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
