//! In-process backend used by `lazytrader setup --simulate` and tests.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use {async_trait::async_trait, rand::Rng, tracing::debug};

use crate::{
    error::{GatewayError, Result},
    gateway::BackendGateway,
    types::{DeploymentResult, LinkInfo, LinkStatus, LinkedAccount},
};

/// Fake backend that issues random addresses and link codes and reports the
/// link as confirmed after a fixed number of status checks.
pub struct SimulatedGateway {
    bot_username: String,
    account_username: String,
    checks_until_linked: u32,
    latency: Duration,
    checks: AtomicU32,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            bot_username: "ostium_bot".into(),
            account_username: "trader".into(),
            checks_until_linked: 3,
            latency: Duration::from_millis(300),
            checks: AtomicU32::new(0),
        }
    }

    /// Number of status checks answered `linked: false` before the link
    /// confirms.
    #[must_use]
    pub fn with_checks_until_linked(mut self, checks: u32) -> Self {
        self.checks_until_linked = checks;
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_account_username(mut self, username: impl Into<String>) -> Self {
        self.account_username = username.into();
        self
    }

    /// Status checks answered so far.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn random_address() -> String {
    let bytes: [u8; 20] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

fn generate_link_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

#[async_trait]
impl BackendGateway for SimulatedGateway {
    async fn generate_agent(&self, wallet_address: &str) -> Result<String> {
        self.round_trip().await;
        if wallet_address.trim().is_empty() {
            return Err(GatewayError::rejected("wallet address is required"));
        }
        let agent = random_address();
        debug!(wallet = wallet_address, agent = %agent, "simulated agent generated");
        Ok(agent)
    }

    async fn generate_link(&self, agent_address: &str) -> Result<LinkInfo> {
        self.round_trip().await;
        if agent_address.trim().is_empty() {
            return Err(GatewayError::rejected("agent address is required"));
        }
        let link_code = generate_link_code();
        Ok(LinkInfo {
            deep_link: format!("https://t.me/{}?start={link_code}", self.bot_username),
            bot_username: self.bot_username.clone(),
            link_code,
        })
    }

    async fn check_link_status(&self, link_code: &str) -> Result<LinkStatus> {
        self.round_trip().await;
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(link_code, check = n, "simulated link status check");
        if n <= self.checks_until_linked {
            return Ok(LinkStatus::pending());
        }
        let id: u64 = rand::rng().random_range(10_000_000..100_000_000);
        Ok(LinkStatus::linked(LinkedAccount {
            external_username: self.account_username.clone(),
            external_id: id.to_string(),
        }))
    }

    async fn create_agent(
        &self,
        agent_address: &str,
        linked_account_id: &str,
    ) -> Result<DeploymentResult> {
        self.round_trip().await;
        if agent_address.is_empty() || linked_account_id.is_empty() {
            return Err(GatewayError::rejected("agent and linked account are required"));
        }
        let suffix: u32 = rand::rng().random();
        Ok(DeploymentResult {
            success: true,
            deployment_id: Some(format!("dep_{suffix:08x}")),
        })
    }
}
