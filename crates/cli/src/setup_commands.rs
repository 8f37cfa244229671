use std::sync::Arc;

use anyhow::{Result, bail};

use {
    lazytrader_backend::{BackendGateway, HttpGateway, SimulatedGateway},
    lazytrader_config::LazyTraderConfig,
    lazytrader_onboarding::{WizardStep, run_setup},
};

pub async fn handle_setup(
    config: &LazyTraderConfig,
    wallet: &str,
    simulate: bool,
    auto_confirm: bool,
) -> Result<()> {
    let gateway: Arc<dyn BackendGateway> = if simulate {
        Arc::new(SimulatedGateway::new())
    } else {
        Arc::new(HttpGateway::from_config(&config.backend)?)
    };

    let state = run_setup(gateway, config, wallet, auto_confirm).await?;

    if state.step == WizardStep::Complete {
        return Ok(());
    }
    eprintln!("Setup stopped at step {}.", state.step);
    if let Some(error) = state.error {
        bail!("last action failed: {error}");
    }
    Ok(())
}
