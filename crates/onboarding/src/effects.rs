//! One-time entry effects.
//!
//! State can be observed any number of times (re-renders, poll ticks), but
//! the side effect that belongs to a step (a chat message, starting the
//! poller) must fire once. Each effect has a marker; [`ProcessedMarkers::claim`]
//! hands out the effects whose data is present and whose marker is absent,
//! recording the marker as it goes. No I/O and no framework types here.

use std::collections::BTreeSet;

use serde::Serialize;

use lazytrader_backend::{LinkInfo, LinkedAccount};

use crate::{state::SetupState, step::WizardStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectMarker {
    WalletConnected,
    AgentGenerated,
    LinkGenerated,
    TelegramConnected,
    Completed,
}

impl EffectMarker {
    pub const ALL: &'static [EffectMarker] = &[
        Self::WalletConnected,
        Self::AgentGenerated,
        Self::LinkGenerated,
        Self::TelegramConnected,
        Self::Completed,
    ];
}

/// An effect to perform once, carrying the data it was triggered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEffect {
    WalletConnected { wallet_address: String },
    AgentGenerated { agent_address: String },
    /// Also the trigger for starting the link poller.
    LinkGenerated { link: LinkInfo },
    TelegramConnected { account: LinkedAccount },
    Completed { deployment_id: Option<String> },
}

impl EntryEffect {
    pub fn marker(&self) -> EffectMarker {
        match self {
            Self::WalletConnected { .. } => EffectMarker::WalletConnected,
            Self::AgentGenerated { .. } => EffectMarker::AgentGenerated,
            Self::LinkGenerated { .. } => EffectMarker::LinkGenerated,
            Self::TelegramConnected { .. } => EffectMarker::TelegramConnected,
            Self::Completed { .. } => EffectMarker::Completed,
        }
    }

    /// The effect `marker` calls for in `state`, if its step is current and
    /// the data it needs is there.
    fn due(marker: EffectMarker, state: &SetupState) -> Option<Self> {
        match marker {
            EffectMarker::WalletConnected => {
                state
                    .wallet_address
                    .clone()
                    .map(|wallet_address| Self::WalletConnected { wallet_address })
            },
            EffectMarker::AgentGenerated => (state.step == WizardStep::Agent)
                .then(|| state.agent_address.clone())
                .flatten()
                .map(|agent_address| Self::AgentGenerated { agent_address }),
            EffectMarker::LinkGenerated => (state.step == WizardStep::TelegramLink)
                .then(|| state.link())
                .flatten()
                .map(|link| Self::LinkGenerated { link }),
            EffectMarker::TelegramConnected => (state.step == WizardStep::CreateAgent)
                .then(|| state.linked_account.clone())
                .flatten()
                .map(|account| Self::TelegramConnected { account }),
            EffectMarker::Completed => match (&state.step, &state.deployment_result) {
                (WizardStep::Complete, Some(result)) if result.success => Some(Self::Completed {
                    deployment_id: result.deployment_id.clone(),
                }),
                _ => None,
            },
        }
    }
}

/// Markers of the effects already fired by one wizard instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedMarkers {
    fired: BTreeSet<EffectMarker>,
}

impl ProcessedMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, marker: EffectMarker) -> bool {
        self.fired.contains(&marker)
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EffectMarker> + '_ {
        self.fired.iter().copied()
    }

    /// Effects `state` calls for that have not fired yet. Does not record
    /// anything.
    pub fn pending(&self, state: &SetupState) -> Vec<EntryEffect> {
        EffectMarker::ALL
            .iter()
            .filter(|m| !self.contains(**m))
            .filter_map(|m| EntryEffect::due(*m, state))
            .collect()
    }

    /// Record and return the pending effects. The caller must perform every
    /// returned effect; a second call with the same state returns nothing.
    pub fn claim(&mut self, state: &SetupState) -> Vec<EntryEffect> {
        let due = self.pending(state);
        for effect in &due {
            self.fired.insert(effect.marker());
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use {super::*, lazytrader_backend::DeploymentResult};

    fn linked_state() -> SetupState {
        SetupState {
            step: WizardStep::TelegramLink,
            wallet_address: Some("0xABC".into()),
            agent_address: Some("0xDEF".into()),
            link_code: Some("123456".into()),
            bot_username: Some("ostium_bot".into()),
            deep_link: Some("https://t.me/ostium_bot?start=123456".into()),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_due_when_empty() {
        let mut markers = ProcessedMarkers::new();
        assert!(markers.claim(&SetupState::new()).is_empty());
        assert!(markers.is_empty());
    }

    #[test]
    fn repeated_observation_fires_once() {
        let mut markers = ProcessedMarkers::new();
        let state = linked_state();

        let first = markers.claim(&state);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].marker(), EffectMarker::WalletConnected);
        assert_eq!(first[1].marker(), EffectMarker::LinkGenerated);

        for _ in 0..5 {
            assert!(markers.claim(&state).is_empty());
        }
        assert_eq!(markers.len(), 2);
    }

    #[test]
    fn pending_does_not_record() {
        let markers = ProcessedMarkers::new();
        let state = linked_state();
        assert_eq!(markers.pending(&state).len(), 2);
        assert_eq!(markers.pending(&state).len(), 2);
        assert!(markers.is_empty());
    }

    #[test]
    fn marker_waits_for_data() {
        let mut markers = ProcessedMarkers::new();
        let mut state = SetupState {
            step: WizardStep::Agent,
            ..Default::default()
        };
        assert!(markers.claim(&state).is_empty());
        assert!(!markers.contains(EffectMarker::AgentGenerated));

        state.agent_address = Some("0xDEF".into());
        assert_eq!(markers.claim(&state), vec![EntryEffect::AgentGenerated {
            agent_address: "0xDEF".into()
        }]);
        assert!(markers.contains(EffectMarker::AgentGenerated));
    }

    #[test]
    fn failed_deployment_is_not_completion() {
        let mut markers = ProcessedMarkers::new();
        let mut state = SetupState {
            step: WizardStep::Complete,
            deployment_result: Some(DeploymentResult {
                success: false,
                deployment_id: None,
            }),
            ..Default::default()
        };
        assert!(markers.claim(&state).is_empty());

        state.deployment_result = Some(DeploymentResult {
            success: true,
            deployment_id: Some("dep_1".into()),
        });
        assert_eq!(markers.claim(&state), vec![EntryEffect::Completed {
            deployment_id: Some("dep_1".into())
        }]);
    }

    #[test]
    fn step_data_from_an_earlier_step_does_not_refire() {
        let mut markers = ProcessedMarkers::new();
        let mut state = linked_state();
        markers.claim(&state);

        state.step = WizardStep::CreateAgent;
        state.linked_account = Some(LinkedAccount {
            external_username: "alice".into(),
            external_id: "1".into(),
        });
        let fired = markers.claim(&state);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].marker(), EffectMarker::TelegramConnected);
        assert_eq!(markers.len(), 3);
    }
}
