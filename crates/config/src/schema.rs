//! Config schema types for the backend gateway, the link poller and the
//! terminal wizard.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
/// Longest accepted poll interval.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyTraderConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub wizard: WizardConfig,
}

/// Where the setup backend lives and how long a single request may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the web backend. Defaults to "http://localhost:3000".
    pub base_url: String,
    /// Timeout applied to every backend request. Defaults to 30.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Link-status polling while the user connects the Telegram bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between two link-status checks. Defaults to 3.
    pub interval_secs: u64,
    /// A single check that takes longer than this is abandoned. Defaults to 10.
    pub check_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            check_timeout_secs: 10,
        }
    }
}

impl PollingConfig {
    /// Poll interval, clamped to the accepted range.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(
            self.interval_secs
                .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
        )
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs.max(1))
    }
}

/// Terminal wizard presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Pause before a bot reply is printed. Defaults to 500.
    pub message_delay_ms: u64,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: 500,
        }
    }
}

impl WizardConfig {
    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }
}
