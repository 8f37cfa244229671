//! Wizard steps, user actions and the legal transitions between steps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps of the setup wizard, in order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    /// Waiting for a wallet and the user's go.
    #[default]
    Idle,
    /// Agent address generated.
    Agent,
    /// Link code issued, waiting for the user to message the bot.
    TelegramLink,
    /// The bot saw the code; the backend is still resolving the account.
    TelegramConnect,
    /// Account linked, ready to deploy.
    CreateAgent,
    Complete,
}

/// Forward edges of the step graph. `TelegramConnect` may be skipped when
/// the first positive status check already carries the account.
const TRANSITIONS: &[(WizardStep, WizardStep)] = &[
    (WizardStep::Idle, WizardStep::Agent),
    (WizardStep::Agent, WizardStep::TelegramLink),
    (WizardStep::TelegramLink, WizardStep::TelegramConnect),
    (WizardStep::TelegramLink, WizardStep::CreateAgent),
    (WizardStep::TelegramConnect, WizardStep::CreateAgent),
    (WizardStep::CreateAgent, WizardStep::Complete),
];

impl WizardStep {
    pub const ALL: &'static [WizardStep] = &[
        Self::Idle,
        Self::Agent,
        Self::TelegramLink,
        Self::TelegramConnect,
        Self::CreateAgent,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Agent => "agent",
            Self::TelegramLink => "telegram-link",
            Self::TelegramConnect => "telegram-connect",
            Self::CreateAgent => "create-agent",
            Self::Complete => "complete",
        }
    }

    /// Whether `self → next` is an edge of the step graph.
    pub fn can_advance_to(self, next: WizardStep) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    /// Steps during which the link poller is expected to be running.
    pub fn is_linking(self) -> bool {
        matches!(self, Self::TelegramLink | Self::TelegramConnect)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrent-operation markers kept in `SetupState::in_flight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    GeneratingAgent,
    GeneratingLink,
    CreatingAgent,
    Polling,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GeneratingAgent => "generating-agent",
            Self::GeneratingLink => "generating-link",
            Self::CreatingAgent => "creating-agent",
            Self::Polling => "polling",
        })
    }
}

/// Actions a presentation layer can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardAction {
    GenerateAgent,
    GenerateLink,
    StartPolling,
    CreateAgent,
}

impl WizardAction {
    /// The only step in which the action may run.
    pub fn required_step(self) -> WizardStep {
        match self {
            Self::GenerateAgent => WizardStep::Idle,
            Self::GenerateLink => WizardStep::Agent,
            Self::StartPolling => WizardStep::TelegramLink,
            Self::CreateAgent => WizardStep::CreateAgent,
        }
    }

    /// Step entered when the action succeeds.
    pub fn success_step(self) -> WizardStep {
        match self {
            Self::GenerateAgent => WizardStep::Agent,
            Self::GenerateLink => WizardStep::TelegramLink,
            Self::StartPolling => WizardStep::CreateAgent,
            Self::CreateAgent => WizardStep::Complete,
        }
    }

    pub fn operation(self) -> Operation {
        match self {
            Self::GenerateAgent => Operation::GeneratingAgent,
            Self::GenerateLink => Operation::GeneratingLink,
            Self::StartPolling => Operation::Polling,
            Self::CreateAgent => Operation::CreatingAgent,
        }
    }
}

impl fmt::Display for WizardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GenerateAgent => "generate-agent",
            Self::GenerateLink => "generate-link",
            Self::StartPolling => "start-polling",
            Self::CreateAgent => "create-agent",
        })
    }
}
