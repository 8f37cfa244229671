//! Request/response contract with the setup backend.
//!
//! Four round trips: generate an agent address, issue a Telegram link code,
//! check whether the link was confirmed, deploy the agent.

pub mod error;
pub mod gateway;
pub mod http;
pub mod simulated;
pub mod types;

pub use {
    error::{GatewayError, Result},
    gateway::BackendGateway,
    http::HttpGateway,
    simulated::SimulatedGateway,
    types::{DeploymentResult, LinkInfo, LinkStatus, LinkedAccount},
};
