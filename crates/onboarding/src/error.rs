use crate::step::{Operation, WizardAction, WizardStep};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{action} is not available in step {step}")]
    InvalidTransition {
        action: WizardAction,
        step: WizardStep,
    },

    #[error("{0} already in progress")]
    AlreadyInFlight(Operation),

    #[error("no wallet connected")]
    WalletNotConnected,

    #[error("missing {0}")]
    MissingData(&'static str),

    #[error("illegal step change {from} -> {to}")]
    IllegalStep { from: WizardStep, to: WizardStep },

    #[error("setup wizard has been torn down")]
    Disposed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
