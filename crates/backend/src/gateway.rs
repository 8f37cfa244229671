use async_trait::async_trait;

use crate::{
    error::Result,
    types::{DeploymentResult, LinkInfo, LinkStatus},
};

/// The four backend operations the setup wizard depends on.
///
/// Each call is a single round trip; retries are the caller's business.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Derive a fresh agent address for `wallet_address`.
    async fn generate_agent(&self, wallet_address: &str) -> Result<String>;

    /// Issue a one-time Telegram link code for `agent_address`.
    async fn generate_link(&self, agent_address: &str) -> Result<LinkInfo>;

    /// Ask whether the user has sent `link_code` to the bot yet.
    async fn check_link_status(&self, link_code: &str) -> Result<LinkStatus>;

    /// Deploy the agent bound to the linked Telegram account.
    async fn create_agent(
        &self,
        agent_address: &str,
        linked_account_id: &str,
    ) -> Result<DeploymentResult>;
}
