//! Maps wallet connection events onto orchestrator instances.
//!
//! One instance per connected wallet address. A disconnect or a switch to
//! another address tears the current instance down and discards it along
//! with its processed markers.

use std::sync::Arc;

use {lazytrader_backend::BackendGateway, tracing::info};

use crate::{
    error::Result,
    orchestrator::{EffectObserver, OrchestratorOptions, SetupOrchestrator},
};

/// What the wallet collaborator reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletConnection {
    pub address: Option<String>,
    pub connected: bool,
}

impl WalletConnection {
    pub fn connected(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            connected: true,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    fn active_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|a| self.connected && !a.is_empty())
    }
}

struct Instance {
    address: String,
    orchestrator: SetupOrchestrator,
}

pub struct WizardHost {
    gateway: Arc<dyn BackendGateway>,
    options: OrchestratorOptions,
    observer: Option<EffectObserver>,
    current: Option<Instance>,
}

impl WizardHost {
    pub fn new(gateway: Arc<dyn BackendGateway>, options: OrchestratorOptions) -> Self {
        Self {
            gateway,
            options,
            observer: None,
            current: None,
        }
    }

    /// Every instance this host creates reports its effects to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: EffectObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn current(&self) -> Option<&SetupOrchestrator> {
        self.current.as_ref().map(|i| &i.orchestrator)
    }

    /// Apply a wallet event and return the instance now in charge, if any.
    pub fn on_wallet(&mut self, wallet: &WalletConnection) -> Result<Option<&SetupOrchestrator>> {
        let Some(address) = wallet.active_address() else {
            self.shutdown();
            return Ok(None);
        };

        if self
            .current
            .as_ref()
            .is_some_and(|i| i.address != address)
        {
            info!(wallet = address, "wallet changed, restarting setup");
            self.shutdown();
        }

        if self.current.is_none() {
            let orchestrator = match &self.observer {
                Some(observer) => SetupOrchestrator::with_observer(
                    Arc::clone(&self.gateway),
                    self.options,
                    Arc::clone(observer),
                ),
                None => SetupOrchestrator::new(Arc::clone(&self.gateway), self.options),
            };
            orchestrator.connect_wallet(address)?;
            self.current = Some(Instance {
                address: address.to_string(),
                orchestrator,
            });
        }
        Ok(self.current())
    }

    /// Tear down and discard the current instance.
    pub fn shutdown(&mut self) {
        if let Some(instance) = self.current.take() {
            instance.orchestrator.teardown();
        }
    }
}

impl Drop for WizardHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lazytrader_backend::SimulatedGateway;

    use {
        super::*,
        crate::{effects::EffectMarker, step::WizardStep},
    };

    fn host() -> WizardHost {
        let gateway = SimulatedGateway::new().with_latency(Duration::ZERO);
        WizardHost::new(Arc::new(gateway), OrchestratorOptions::default())
    }

    #[test]
    fn connect_creates_instance() {
        let mut host = host();
        let o = host
            .on_wallet(&WalletConnection::connected("0xABC"))
            .unwrap()
            .unwrap();
        assert_eq!(o.snapshot().wallet_address.as_deref(), Some("0xABC"));
        assert!(o.markers().contains(EffectMarker::WalletConnected));
    }

    #[test]
    fn repeated_connect_keeps_instance() {
        let mut host = host();
        let first = host
            .on_wallet(&WalletConnection::connected("0xABC"))
            .unwrap()
            .cloned()
            .unwrap();
        host.on_wallet(&WalletConnection::connected("0xABC")).unwrap();
        assert!(!first.is_disposed());
        assert_eq!(first.markers().len(), 1);
    }

    #[tokio::test]
    async fn address_change_starts_over() {
        let mut host = host();
        let first = host
            .on_wallet(&WalletConnection::connected("0xABC"))
            .unwrap()
            .cloned()
            .unwrap();
        first.generate_agent().await.unwrap();
        assert_eq!(first.snapshot().step, WizardStep::Agent);

        let second = host
            .on_wallet(&WalletConnection::connected("0x999"))
            .unwrap()
            .cloned()
            .unwrap();
        assert!(first.is_disposed());
        assert_eq!(second.snapshot().step, WizardStep::Idle);
        assert_eq!(second.snapshot().wallet_address.as_deref(), Some("0x999"));
        assert_eq!(second.markers().len(), 1);
    }

    #[test]
    fn disconnect_tears_down() {
        let mut host = host();
        let first = host
            .on_wallet(&WalletConnection::connected("0xABC"))
            .unwrap()
            .cloned()
            .unwrap();
        assert!(host.on_wallet(&WalletConnection::disconnected()).unwrap().is_none());
        assert!(first.is_disposed());
        assert!(host.current().is_none());
    }

    #[test]
    fn connected_without_address_is_a_disconnect() {
        let mut host = host();
        let wallet = WalletConnection {
            address: None,
            connected: true,
        };
        assert!(host.on_wallet(&wallet).unwrap().is_none());
    }
}
