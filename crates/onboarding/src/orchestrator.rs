//! Setup orchestrator.
//!
//! Owns the [`SetupState`] of one wizard instance, gates every action on the
//! current step and the in-flight set, runs the gateway calls and fires each
//! step's entry effect once. The state lock is never held across an await:
//! an action validates and marks itself in flight under the lock, awaits the
//! gateway with the lock released, then re-checks and applies the result.

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    tokio::sync::watch,
    tracing::{debug, info, warn},
};

use {
    lazytrader_backend::{BackendGateway, DeploymentResult},
    lazytrader_config::{LazyTraderConfig, PollingConfig},
};

use crate::{
    effects::{EntryEffect, ProcessedMarkers},
    error::{Error, Result},
    poller::{PollPhase, PollReport, PollReportFn, PollingCoordinator},
    state::{SetupState, set_once},
    step::{Operation, WizardAction, WizardStep},
};

/// Receives every entry effect right after it fires.
pub type EffectObserver = Arc<dyn Fn(&EntryEffect) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub poll_interval: Duration,
    pub check_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for OrchestratorOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            poll_interval: config.interval(),
            check_timeout: config.check_timeout(),
        }
    }
}

/// How an accepted action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Advanced(WizardStep),
    /// The gateway call failed; the message is also in `SetupState::error`.
    Failed(String),
    PollingStarted,
    AlreadyPolling,
    /// The response arrived after teardown or after the step moved on.
    Discarded,
}

struct Core {
    state: SetupState,
    markers: ProcessedMarkers,
}

struct Shared {
    gateway: Arc<dyn BackendGateway>,
    poller: Arc<PollingCoordinator>,
    core: Mutex<Core>,
    snapshot: watch::Sender<SetupState>,
    observer: Option<EffectObserver>,
    disposed: AtomicBool,
}

/// Handle to one wizard instance. Clones share the same state.
#[derive(Clone)]
pub struct SetupOrchestrator {
    shared: Arc<Shared>,
}

impl SetupOrchestrator {
    pub fn new(gateway: Arc<dyn BackendGateway>, options: OrchestratorOptions) -> Self {
        Self::build(gateway, options, None)
    }

    pub fn with_observer(
        gateway: Arc<dyn BackendGateway>,
        options: OrchestratorOptions,
        observer: EffectObserver,
    ) -> Self {
        Self::build(gateway, options, Some(observer))
    }

    pub fn from_config(gateway: Arc<dyn BackendGateway>, config: &LazyTraderConfig) -> Self {
        Self::new(gateway, OrchestratorOptions::from(&config.polling))
    }

    fn build(
        gateway: Arc<dyn BackendGateway>,
        options: OrchestratorOptions,
        observer: Option<EffectObserver>,
    ) -> Self {
        let poller = PollingCoordinator::new(
            Arc::clone(&gateway),
            options.poll_interval,
            options.check_timeout,
        );
        let (snapshot, _) = watch::channel(SetupState::new());
        Self {
            shared: Arc::new(Shared {
                gateway,
                poller,
                core: Mutex::new(Core {
                    state: SetupState::new(),
                    markers: ProcessedMarkers::new(),
                }),
                snapshot,
                observer,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn snapshot(&self) -> SetupState {
        self.shared.lock().state.clone()
    }

    /// Receiver that sees every published state change.
    pub fn subscribe(&self) -> watch::Receiver<SetupState> {
        self.shared.snapshot.subscribe()
    }

    pub fn markers(&self) -> ProcessedMarkers {
        self.shared.lock().markers.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn poller_phase(&self) -> PollPhase {
        self.shared.poller.phase()
    }

    /// Fire whatever entry effects the current state calls for and have not
    /// fired yet. Calling it again without a state change returns nothing.
    pub fn observe(&self) -> Vec<EntryEffect> {
        if self.is_disposed() {
            return Vec::new();
        }
        let core = self.shared.lock();
        self.shared.settle(core)
    }

    /// Wallet-connected event. Only consumed while idle; returns whether it
    /// changed anything.
    pub fn connect_wallet(&self, address: &str) -> Result<bool> {
        self.shared.ensure_live()?;
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::WalletNotConnected);
        }

        let mut core = self.shared.lock();
        self.shared.ensure_live()?;
        if core.state.step != WizardStep::Idle {
            debug!(step = %core.state.step, "wallet event outside idle ignored");
            return Ok(false);
        }
        if core.state.wallet_address.is_some() {
            return Ok(false);
        }
        set_once(&mut core.state.wallet_address, address.to_string());
        info!(wallet = address, "wallet connected");
        self.shared.settle(core);
        Ok(true)
    }

    pub async fn generate_agent(&self) -> Result<ActionOutcome> {
        let action = WizardAction::GenerateAgent;
        let wallet = self.shared.begin(action, |state| {
            state
                .wallet_address
                .clone()
                .ok_or(Error::WalletNotConnected)
        })?;

        info!(%action, wallet = %wallet, "generating agent");
        let result = self.shared.gateway.generate_agent(&wallet).await;
        Ok(self.shared.complete(action, result, |state, agent| {
            set_once(&mut state.agent_address, agent);
            Ok(())
        }))
    }

    pub async fn generate_link(&self) -> Result<ActionOutcome> {
        let action = WizardAction::GenerateLink;
        let agent = self.shared.begin(action, |state| {
            state
                .agent_address
                .clone()
                .ok_or(Error::MissingData("agent address"))
        })?;

        info!(%action, agent = %agent, "generating link code");
        let result = self.shared.gateway.generate_link(&agent).await;
        Ok(self.shared.complete(action, result, |state, link| {
            state.set_link(link);
            Ok(())
        }))
    }

    /// Start the link poller. Normally triggered by the link-generated entry
    /// effect; calling it again while polling is a no-op.
    pub fn start_polling(&self) -> Result<ActionOutcome> {
        self.shared.start_polling()
    }

    pub async fn create_agent(&self) -> Result<ActionOutcome> {
        let action = WizardAction::CreateAgent;
        let (agent, account_id) = self.shared.begin(action, |state| {
            let agent = state
                .agent_address
                .clone()
                .ok_or(Error::MissingData("agent address"))?;
            let account = state
                .linked_account
                .as_ref()
                .ok_or(Error::MissingData("linked account"))?;
            Ok((agent, account.external_id.clone()))
        })?;

        info!(%action, agent = %agent, "deploying agent");
        let result = self.shared.gateway.create_agent(&agent, &account_id).await;
        Ok(self
            .shared
            .complete(action, result, |state, deployment: DeploymentResult| {
                if !deployment.success {
                    return Err("agent deployment failed".into());
                }
                set_once(&mut state.deployment_result, deployment);
                Ok(())
            }))
    }

    pub async fn dispatch(&self, action: WizardAction) -> Result<ActionOutcome> {
        match action {
            WizardAction::GenerateAgent => self.generate_agent().await,
            WizardAction::GenerateLink => self.generate_link().await,
            WizardAction::StartPolling => self.start_polling(),
            WizardAction::CreateAgent => self.create_agent().await,
        }
    }

    /// The one action a correctly gated front-end should offer now.
    pub fn available_action(&self) -> Option<WizardAction> {
        if self.is_disposed() {
            return None;
        }
        let core = self.shared.lock();
        let state = &core.state;
        if state.is_loading() {
            return None;
        }
        match state.step {
            WizardStep::Idle if state.wallet_address.is_some() => Some(WizardAction::GenerateAgent),
            WizardStep::Agent => Some(WizardAction::GenerateLink),
            WizardStep::TelegramLink if !state.is_polling() => Some(WizardAction::StartPolling),
            WizardStep::CreateAgent => Some(WizardAction::CreateAgent),
            _ => None,
        }
    }

    /// Dispose of this instance. Stops the poller; every later response,
    /// poll report or action is dropped or rejected.
    pub fn teardown(&self) {
        // Flipped under the core lock so no response can be half applied.
        let step = {
            let core = self.shared.lock();
            if self.shared.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            core.state.step
        };
        self.shared.poller.stop();
        info!(%step, "setup wizard torn down");
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Validate `action` against the step and the in-flight set, read its
    /// input and mark it in flight.
    fn begin<T>(
        self: &Arc<Self>,
        action: WizardAction,
        input: impl FnOnce(&SetupState) -> Result<T>,
    ) -> Result<T> {
        let mut core = self.lock();
        self.ensure_live()?;
        let step = core.state.step;
        if step != action.required_step() {
            warn!(%action, %step, "action not available in current step");
            return Err(Error::InvalidTransition { action, step });
        }
        let op = action.operation();
        if core.state.is_busy(op) {
            debug!(%action, "action already in flight");
            return Err(Error::AlreadyInFlight(op));
        }

        let value = input(&core.state)?;
        core.state.in_flight.insert(op);
        core.state.error = None;
        self.settle(core);
        Ok(value)
    }

    /// Apply a gateway response for `action`.
    fn complete<T>(
        self: &Arc<Self>,
        action: WizardAction,
        result: lazytrader_backend::Result<T>,
        apply: impl FnOnce(&mut SetupState, T) -> std::result::Result<(), String>,
    ) -> ActionOutcome {
        let mut core = self.lock();
        if self.is_disposed() {
            debug!(%action, "response after teardown dropped");
            return ActionOutcome::Discarded;
        }
        core.state.in_flight.remove(&action.operation());
        if core.state.step != action.required_step() {
            debug!(%action, step = %core.state.step, "stale response dropped");
            self.settle(core);
            return ActionOutcome::Discarded;
        }

        let applied = result
            .map_err(|e| e.to_string())
            .and_then(|value| apply(&mut core.state, value))
            .and_then(|()| {
                core.state
                    .advance_to(action.success_step())
                    .map_err(|e| e.to_string())
            });
        let outcome = match applied {
            Ok(()) => {
                info!(%action, step = %core.state.step, "step advanced");
                ActionOutcome::Advanced(core.state.step)
            },
            Err(message) => {
                warn!(%action, error = %message, "action failed");
                core.state.error = Some(message.clone());
                ActionOutcome::Failed(message)
            },
        };
        self.settle(core);
        outcome
    }

    fn start_polling(self: &Arc<Self>) -> Result<ActionOutcome> {
        let mut core = self.lock();
        self.ensure_live()?;
        let step = core.state.step;
        if step != WizardStep::TelegramLink {
            return Err(Error::InvalidTransition {
                action: WizardAction::StartPolling,
                step,
            });
        }
        if core.state.is_polling() {
            debug!("polling already active");
            return Ok(ActionOutcome::AlreadyPolling);
        }
        let link_code = core
            .state
            .link_code
            .clone()
            .ok_or(Error::MissingData("link code"))?;

        let weak = Arc::downgrade(self);
        let report: PollReportFn = Arc::new(move |report| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_poll_report(report);
            }
        });
        if !self.poller.start(link_code, report) {
            debug!("poller was already running");
        }
        core.state.in_flight.insert(Operation::Polling);
        core.state.poll_error = None;
        self.settle(core);
        Ok(ActionOutcome::PollingStarted)
    }

    fn apply_poll_report(self: &Arc<Self>, report: PollReport) {
        let mut core = self.lock();
        if self.is_disposed() {
            debug!("poll report after teardown dropped");
            return;
        }
        let state = &mut core.state;
        if !state.step.is_linking() {
            debug!(step = %state.step, "poll report outside linking dropped");
            return;
        }

        match report {
            PollReport::Pending => state.poll_error = None,
            PollReport::Confirming => {
                state.poll_error = None;
                if state.step == WizardStep::TelegramLink
                    && let Err(e) = state.advance_to(WizardStep::TelegramConnect)
                {
                    warn!(error = %e, "cannot enter telegram-connect");
                }
            },
            PollReport::Linked(account) => {
                state.in_flight.remove(&Operation::Polling);
                state.poll_error = None;
                info!(username = %account.external_username, "telegram account linked");
                set_once(&mut state.linked_account, account);
                if let Err(e) = state.advance_to(WizardStep::CreateAgent) {
                    warn!(error = %e, "cannot enter create-agent");
                }
            },
            PollReport::Failed(message) => state.poll_error = Some(message),
        }
        self.settle(core);
    }

    /// Claim due entry effects, publish the state and release the lock, then
    /// perform the effects.
    fn settle(self: &Arc<Self>, mut core: MutexGuard<'_, Core>) -> Vec<EntryEffect> {
        let Core { state, markers } = &mut *core;
        let effects = markers.claim(state);
        self.snapshot.send_if_modified(|published| {
            if published == state {
                return false;
            }
            published.clone_from(state);
            true
        });
        drop(core);

        for effect in &effects {
            self.perform(effect);
        }
        effects
    }

    fn perform(self: &Arc<Self>, effect: &EntryEffect) {
        if self.is_disposed() {
            return;
        }
        debug!(marker = ?effect.marker(), "entry effect fired");
        if let Some(observer) = &self.observer {
            observer(effect);
        }
        if matches!(effect, EntryEffect::LinkGenerated { .. })
            && let Err(e) = self.start_polling()
        {
            warn!(error = %e, "could not start link polling");
        }
    }
}
