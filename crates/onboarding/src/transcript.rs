//! Chat-style presentation of the wizard: the transcript a front-end renders
//! and the single control it shows below it.

use {chrono::Local, serde::Serialize};

use crate::{
    effects::EntryEffect,
    state::SetupState,
    step::{WizardAction, WizardStep},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bot,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub text: String,
    /// Local wall-clock time, `HH:MM`.
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
    next_id: u64,
    last_error: Option<String>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTranscript {
    /// A transcript holding the welcome message.
    pub fn new() -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
            next_id: 1,
            last_error: None,
        };
        transcript.push(
            Role::Bot,
            "Welcome to Ostium Lazy Trader.\n\
             I can help you set up an automated trading agent.\n\
             To get started, please connect your wallet.",
        );
        transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages appended after the first `seen`.
    pub fn since(&self, seen: usize) -> &[ChatMessage] {
        self.messages.get(seen..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, role: Role, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            id: self.next_id,
            role,
            text: text.into(),
            timestamp: Local::now().format("%H:%M").to_string(),
        });
        self.next_id += 1;
    }

    /// Echo the user's own action into the chat.
    pub fn record_action(&mut self, action: WizardAction) {
        let text = match action {
            WizardAction::GenerateAgent => "Generate my agent.",
            WizardAction::GenerateLink => "Link my Telegram account.",
            WizardAction::CreateAgent => "Create and deploy agent.",
            WizardAction::StartPolling => return,
        };
        self.push(Role::User, text);
    }

    pub fn apply_effect(&mut self, effect: &EntryEffect) {
        match effect {
            EntryEffect::WalletConnected { wallet_address } => {
                self.push(
                    Role::User,
                    format!("Connected wallet: {}", short_address(wallet_address)),
                );
                self.push(
                    Role::Bot,
                    "Great! Your wallet is connected.\n\
                     Now, let's generate your unique Ostium agent address.",
                );
            },
            EntryEffect::AgentGenerated { agent_address } => self.push(
                Role::Bot,
                format!(
                    "Agent generated successfully!\n{agent_address}\n\
                     Next, link your Telegram account to receive notifications and control \
                     your agent."
                ),
            ),
            EntryEffect::LinkGenerated { link } => self.push(
                Role::Bot,
                format!(
                    "Here is your Telegram connection link:\n{}\n\
                     Open it, or send the code {} to @{}.\n\
                     I'm waiting for your connection...",
                    link.deep_link, link.link_code, link.bot_username
                ),
            ),
            EntryEffect::TelegramConnected { account } => self.push(
                Role::Bot,
                format!(
                    "Telegram connected!\nVerified user: @{}\n\
                     Everything looks good. Ready to deploy your Lazy Trader agent?",
                    account.external_username
                ),
            ),
            EntryEffect::Completed { deployment_id } => {
                let mut text = String::from(
                    "Agent deployed successfully!\nYour Ostium Lazy Trader is now active.",
                );
                if let Some(id) = deployment_id {
                    text.push_str(&format!("\nDeployment ID: {id}"));
                }
                text.push_str("\nYou can now manage your trades directly from Telegram.");
                self.push(Role::Bot, text);
            },
        }
    }

    /// Add an error message when `error` differs from the last one seen.
    /// Returns whether a message was added.
    pub fn sync_error(&mut self, error: Option<&str>) -> bool {
        if self.last_error.as_deref() == error {
            return false;
        }
        self.last_error = error.map(str::to_owned);
        match error {
            Some(message) => {
                self.push(Role::Bot, format!("Error: {message}"));
                true
            },
            None => false,
        }
    }
}

/// `0x1234...abcd` form of an address; short inputs are returned as is.
pub fn short_address(address: &str) -> String {
    match (address.get(..6), address.get(address.len().saturating_sub(4)..)) {
        (Some(head), Some(tail)) if address.len() > 10 => format!("{head}...{tail}"),
        _ => address.to_string(),
    }
}

/// What the front-end shows under the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// No wallet yet.
    ConnectWallet,
    Button {
        action: WizardAction,
        label: &'static str,
    },
    Waiting(&'static str),
    Processing,
    Complete,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectWallet => "Connect wallet to start conversation...",
            Self::Button { label, .. } | Self::Waiting(label) => *label,
            Self::Processing => "Processing...",
            Self::Complete => "Setup Complete",
        }
    }

    pub fn action(&self) -> Option<WizardAction> {
        match self {
            Self::Button { action, .. } => Some(*action),
            _ => None,
        }
    }
}

/// The control for `state`. Link polling does not count as processing.
pub fn controls(state: &SetupState) -> Control {
    if state.is_loading() {
        return Control::Processing;
    }
    match state.step {
        WizardStep::Idle if state.wallet_address.is_none() => Control::ConnectWallet,
        WizardStep::Idle => Control::Button {
            action: WizardAction::GenerateAgent,
            label: "Start Setup",
        },
        WizardStep::Agent => Control::Button {
            action: WizardAction::GenerateLink,
            label: "Link Telegram",
        },
        WizardStep::TelegramLink if !state.is_polling() => Control::Button {
            action: WizardAction::StartPolling,
            label: "Check Telegram Link",
        },
        WizardStep::TelegramLink => Control::Waiting("Waiting for Telegram connection..."),
        WizardStep::TelegramConnect => Control::Waiting("Verifying connection..."),
        WizardStep::CreateAgent => Control::Button {
            action: WizardAction::CreateAgent,
            label: "Confirm & Create Agent",
        },
        WizardStep::Complete => Control::Complete,
    }
}
