//! Terminal front-end for the setup wizard.

use std::{io::Write, sync::Arc, time::Duration};

use {
    tokio::{
        io::{AsyncBufReadExt, BufReader, Lines, Stdin},
        sync::mpsc,
    },
    tracing::{info, warn},
};

use {lazytrader_backend::BackendGateway, lazytrader_config::LazyTraderConfig};

use crate::{
    effects::EntryEffect,
    error::{Error, Result},
    host::{WalletConnection, WizardHost},
    orchestrator::{ActionOutcome, EffectObserver, OrchestratorOptions},
    state::SetupState,
    transcript::{ChatMessage, ChatTranscript, Control, Role, controls},
};

/// Give up after this many failed actions in a row when nobody is there to
/// decide whether to retry.
const MAX_UNATTENDED_FAILURES: u32 = 3;

/// Run the wizard for `wallet` until the agent is deployed, the user quits,
/// or Ctrl-C. With `auto_confirm` every action runs without prompting.
pub async fn run_setup(
    gateway: Arc<dyn BackendGateway>,
    config: &LazyTraderConfig,
    wallet: &str,
    auto_confirm: bool,
) -> Result<SetupState> {
    let (effects_tx, mut effects) = mpsc::unbounded_channel::<EntryEffect>();
    let observer: EffectObserver = Arc::new(move |effect: &EntryEffect| {
        let _ = effects_tx.send(effect.clone());
    });

    let mut host = WizardHost::new(gateway, OrchestratorOptions::from(&config.polling))
        .with_observer(observer);
    let orchestrator = host
        .on_wallet(&WalletConnection::connected(wallet))?
        .cloned()
        .ok_or(Error::WalletNotConnected)?;

    let mut updates = orchestrator.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::new(config.wizard.message_delay());
    let mut failures = 0;

    loop {
        while let Ok(effect) = effects.try_recv() {
            screen.transcript.apply_effect(&effect);
        }
        let state = orchestrator.snapshot();
        screen.transcript.sync_error(state.error.as_deref());
        screen.flush().await?;

        match controls(&state) {
            Control::Complete => break,
            Control::Button { action, label } => {
                if !auto_confirm && !confirm(&mut stdin, label).await? {
                    info!(step = %state.step, "setup stopped by user");
                    break;
                }
                screen.transcript.record_action(action);
                screen.flush().await?;

                match orchestrator.dispatch(action).await? {
                    ActionOutcome::Failed(_) => failures += 1,
                    _ => failures = 0,
                }
                if auto_confirm && failures >= MAX_UNATTENDED_FAILURES {
                    warn!(%action, failures, "giving up after repeated failures");
                    break;
                }
            },
            control @ (Control::Waiting(_) | Control::Processing | Control::ConnectWallet) => {
                screen.status(control.label(), state.poll_error.as_deref());
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    },
                    Some(effect) = effects.recv() => screen.transcript.apply_effect(&effect),
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        info!(step = %state.step, "setup interrupted");
                        break;
                    },
                }
            },
        }
    }

    let state = orchestrator.snapshot();
    host.shutdown();
    Ok(state)
}

/// Ask before running an action. `false` on `q` or end of input.
async fn confirm(stdin: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<bool> {
    print!("[{label}] press Enter to continue, q to quit > ");
    std::io::stdout().flush()?;
    Ok(match stdin.next_line().await? {
        Some(line) => !line.trim().eq_ignore_ascii_case("q"),
        None => false,
    })
}

struct Screen {
    transcript: ChatTranscript,
    printed: usize,
    message_delay: Duration,
    last_status: Option<String>,
}

impl Screen {
    fn new(message_delay: Duration) -> Self {
        Self {
            transcript: ChatTranscript::new(),
            printed: 0,
            message_delay,
            last_status: None,
        }
    }

    /// Print messages not shown yet. Bot replies get a short pause first.
    async fn flush(&mut self) -> Result<()> {
        let pending = self.transcript.since(self.printed).to_vec();
        for message in &pending {
            if message.role == Role::Bot && !self.message_delay.is_zero() {
                tokio::time::sleep(self.message_delay).await;
            }
            print_message(message);
            self.printed += 1;
            self.last_status = None;
        }
        std::io::stdout().flush()?;
        Ok(())
    }

    fn status(&mut self, label: &str, poll_error: Option<&str>) {
        let line = match poll_error {
            Some(e) => format!("{label} (last check failed: {e}, retrying)"),
            None => label.to_string(),
        };
        if self.last_status.as_deref() != Some(line.as_str()) {
            println!("  ... {line}");
            self.last_status = Some(line);
        }
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::Bot => "bot",
        Role::User => "you",
    };
    let mut lines = message.text.lines();
    println!(
        "[{}] {who}: {}",
        message.timestamp,
        lines.next().unwrap_or_default()
    );
    for line in lines {
        println!("{:width$}{line}", "", width = message.timestamp.len() + who.len() + 5);
    }
}
