//! The record the orchestrator owns and publishes to the presentation layer.

use std::collections::BTreeSet;

use serde::Serialize;

use lazytrader_backend::{DeploymentResult, LinkInfo, LinkedAccount};

use crate::{
    error::{Error, Result},
    step::{Operation, WizardStep},
};

/// Snapshot of wizard progress. Optional fields fill in step order and are
/// never overwritten once set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupState {
    pub step: WizardStep,
    pub wallet_address: Option<String>,
    pub agent_address: Option<String>,
    pub link_code: Option<String>,
    pub bot_username: Option<String>,
    pub deep_link: Option<String>,
    pub linked_account: Option<LinkedAccount>,
    pub deployment_result: Option<DeploymentResult>,
    /// Last failed action; cleared when the next action starts.
    pub error: Option<String>,
    /// Last failed link-status check; cleared by the next successful one.
    pub poll_error: Option<String>,
    pub in_flight: BTreeSet<Operation>,
}

impl SetupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, op: Operation) -> bool {
        self.in_flight.contains(&op)
    }

    pub fn is_polling(&self) -> bool {
        self.is_busy(Operation::Polling)
    }

    /// A user-triggered request is outstanding. Polling does not count: the
    /// UI stays responsive while waiting for the link.
    pub fn is_loading(&self) -> bool {
        self.in_flight.iter().any(|op| *op != Operation::Polling)
    }

    /// The link details, once all three have been issued.
    pub fn link(&self) -> Option<LinkInfo> {
        Some(LinkInfo {
            link_code: self.link_code.clone()?,
            bot_username: self.bot_username.clone()?,
            deep_link: self.deep_link.clone()?,
        })
    }

    pub(crate) fn advance_to(&mut self, next: WizardStep) -> Result<()> {
        if !self.step.can_advance_to(next) {
            return Err(Error::IllegalStep {
                from: self.step,
                to: next,
            });
        }
        self.step = next;
        Ok(())
    }

    pub(crate) fn set_link(&mut self, link: LinkInfo) {
        set_once(&mut self.link_code, link.link_code);
        set_once(&mut self.bot_username, link.bot_username);
        set_once(&mut self.deep_link, link.deep_link);
    }
}

/// Write `value` into an empty slot; a filled slot keeps its value.
pub(crate) fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}
