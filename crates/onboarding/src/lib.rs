//! Lazy Trader setup wizard.
//!
//! Flow: idle → agent → telegram-link → (telegram-connect) → create-agent →
//! complete. [`SetupOrchestrator`] owns the state and talks to the backend,
//! [`PollingCoordinator`] waits for the Telegram link, and [`transcript`]
//! turns state into what a chat front-end shows.

pub mod effects;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod poller;
pub mod state;
pub mod step;
pub mod transcript;
pub mod wizard;

pub use {
    effects::{EffectMarker, EntryEffect, ProcessedMarkers},
    error::{Error, Result},
    host::{WalletConnection, WizardHost},
    orchestrator::{ActionOutcome, EffectObserver, OrchestratorOptions, SetupOrchestrator},
    poller::{PollPhase, PollReport, PollingCoordinator},
    state::SetupState,
    step::{Operation, WizardAction, WizardStep},
    transcript::{ChatMessage, ChatTranscript, Control, Role, controls},
    wizard::run_setup,
};
