//! `reqwest` client for the web backend's `/api/lazy-trading/*` routes.
//!
//! Every response body carries a `success` flag and either the payload
//! fields or an `error` message.

use {
    async_trait::async_trait,
    reqwest::{Client, StatusCode},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::debug,
    url::Url,
};

use lazytrader_config::BackendConfig;

use crate::{
    error::{GatewayError, Result},
    gateway::BackendGateway,
    types::{DeploymentResult, LinkInfo, LinkStatus},
};

const GENERATE_AGENT_PATH: &str = "api/lazy-trading/generate-agent";
const GENERATE_LINK_PATH: &str = "api/lazy-trading/generate-link";
const CHECK_LINK_STATUS_PATH: &str = "api/lazy-trading/check-link-status";
const CREATE_AGENT_PATH: &str = "api/lazy-trading/create-agent";

/// HTTP implementation of [`BackendGateway`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAgentRequest<'a> {
    user_wallet: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAgentResponse {
    agent_address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateLinkRequest<'a> {
    agent_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentRequest<'a> {
    agent_address: &'a str,
    telegram_user_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    deployment_id: Option<String>,
    #[serde(default)]
    deployment: Option<DeploymentRef>,
}

#[derive(Deserialize)]
struct DeploymentRef {
    id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    /// Use an existing client; `base_url` is normalized to end with `/` so
    /// route joins keep any path prefix.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "backend POST");
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        decode(status, &text)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "backend GET");
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        decode(status, &text)
    }
}

/// Unwrap the `success`/`error` envelope into the payload type.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !status.is_success() => {
            return Err(GatewayError::Rejected(format!("HTTP {}", status.as_u16())));
        },
        Err(e) => return Err(GatewayError::Decode(e.to_string())),
    };

    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(status.is_success());

    if !status.is_success() || !success {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| {
                if status.is_success() {
                    "request failed".to_string()
                } else {
                    format!("HTTP {}", status.as_u16())
                }
            });
        return Err(GatewayError::Rejected(message));
    }

    serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn generate_agent(&self, wallet_address: &str) -> Result<String> {
        let resp: GenerateAgentResponse = self
            .post(GENERATE_AGENT_PATH, &GenerateAgentRequest {
                user_wallet: wallet_address,
            })
            .await?;
        Ok(resp.agent_address)
    }

    async fn generate_link(&self, agent_address: &str) -> Result<LinkInfo> {
        self.post(GENERATE_LINK_PATH, &GenerateLinkRequest { agent_address })
            .await
    }

    async fn check_link_status(&self, link_code: &str) -> Result<LinkStatus> {
        self.get(CHECK_LINK_STATUS_PATH, &[("linkCode", link_code)])
            .await
    }

    async fn create_agent(
        &self,
        agent_address: &str,
        linked_account_id: &str,
    ) -> Result<DeploymentResult> {
        let resp: CreateAgentResponse = self
            .post(CREATE_AGENT_PATH, &CreateAgentRequest {
                agent_address,
                telegram_user_id: linked_account_id,
            })
            .await?;
        Ok(DeploymentResult {
            success: resp.success,
            deployment_id: resp
                .deployment_id
                .or_else(|| resp.deployment.and_then(|d| d.id)),
        })
    }
}
