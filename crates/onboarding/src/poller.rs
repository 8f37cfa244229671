//! Link-status poller.
//!
//! Checks the backend on a fixed interval until the link is confirmed or the
//! poller is stopped. Ticks are request-chained: each check runs under its
//! own timeout before the next tick is taken, so a hung request cannot stall
//! the loop.

use std::{
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use {
    serde::Serialize,
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use lazytrader_backend::{BackendGateway, LinkedAccount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Idle,
    Running,
    Stopped,
}

/// What a single status check found, reported upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollReport {
    /// Not linked yet.
    Pending,
    /// The bot saw the code but the account is not resolved yet.
    Confirming,
    /// Linked. The poller has already stopped itself.
    Linked(LinkedAccount),
    /// The check failed; polling continues.
    Failed(String),
}

/// Callback receiving every report of the current run.
pub type PollReportFn = Arc<dyn Fn(PollReport) + Send + Sync>;

struct PollRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollRun {
    fn cancel(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

struct PollerInner {
    phase: PollPhase,
    /// Bumped on every start so reports from an earlier run are dropped.
    generation: u64,
    run: Option<PollRun>,
}

pub struct PollingCoordinator {
    gateway: Arc<dyn BackendGateway>,
    interval: Duration,
    check_timeout: Duration,
    inner: Mutex<PollerInner>,
}

impl PollingCoordinator {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        interval: Duration,
        check_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            interval,
            check_timeout,
            inner: Mutex::new(PollerInner {
                phase: PollPhase::Idle,
                generation: 0,
                run: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PollerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> PollPhase {
        self.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == PollPhase::Running
    }

    /// Start polling `link_code`. Returns `false` without doing anything
    /// when a run is already active.
    pub fn start(self: &Arc<Self>, link_code: String, report: PollReportFn) -> bool {
        let mut inner = self.lock();
        if inner.phase == PollPhase::Running {
            debug!(link_code = %link_code, "poller already running");
            return false;
        }

        inner.generation += 1;
        let generation = inner.generation;
        let cancel = CancellationToken::new();

        let task = PollTask {
            coordinator: Arc::downgrade(self),
            gateway: Arc::clone(&self.gateway),
            link_code: link_code.clone(),
            interval: self.interval,
            check_timeout: self.check_timeout,
            cancel: cancel.clone(),
            generation,
            report,
        };
        let handle = tokio::spawn(task.run());

        inner.phase = PollPhase::Running;
        inner.run = Some(PollRun { cancel, handle });
        info!(
            link_code = %link_code,
            generation,
            interval_ms = self.interval.as_millis() as u64,
            "link polling started"
        );
        true
    }

    /// Stop the current run. Safe to call any number of times.
    pub fn stop(&self) {
        let run = {
            let mut inner = self.lock();
            if inner.phase != PollPhase::Running {
                return;
            }
            inner.phase = PollPhase::Stopped;
            inner.run.take()
        };
        if let Some(run) = run {
            run.cancel();
        }
        info!("link polling stopped");
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.phase == PollPhase::Running && inner.generation == generation
    }

    /// Called from the loop when the link is confirmed. Returns `false` if
    /// the run was stopped or replaced in the meantime.
    fn finish(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.phase != PollPhase::Running || inner.generation != generation {
            return false;
        }
        inner.phase = PollPhase::Stopped;
        if let Some(run) = inner.run.take() {
            // The loop exits on its own right after this; aborting it here
            // would cancel the report still to be delivered.
            run.cancel.cancel();
        }
        true
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(run) = inner.run.take() {
            run.cancel();
        }
    }
}

/// One polling run, owned by its spawned task.
struct PollTask {
    coordinator: Weak<PollingCoordinator>,
    gateway: Arc<dyn BackendGateway>,
    link_code: String,
    interval: Duration,
    check_timeout: Duration,
    cancel: CancellationToken,
    generation: u64,
    report: PollReportFn,
}

impl PollTask {
    async fn run(self) {
        let Self {
            coordinator,
            gateway,
            link_code,
            interval,
            check_timeout,
            cancel,
            generation,
            report,
        } = self;

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let still_current = || {
            !cancel.is_cancelled()
                && coordinator
                    .upgrade()
                    .is_some_and(|c| c.is_current(generation))
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            if !still_current() {
                debug!(link_code = %link_code, generation, "stale poll tick ignored");
                break;
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(check_timeout, gateway.check_link_status(&link_code)) => r,
            };
            if !still_current() {
                debug!(
                    link_code = %link_code,
                    generation,
                    "poll result arrived after stop, dropped"
                );
                break;
            }

            match outcome {
                Ok(Ok(status)) if status.linked => match status.account {
                    Some(account) => {
                        let Some(c) = coordinator.upgrade() else { break };
                        if c.finish(generation) {
                            info!(
                                link_code = %link_code,
                                username = %account.external_username,
                                "link confirmed"
                            );
                            report(PollReport::Linked(account));
                        }
                        break;
                    },
                    None => {
                        debug!(link_code = %link_code, "link seen, account not resolved yet");
                        report(PollReport::Confirming);
                    },
                },
                Ok(Ok(_)) => {
                    debug!(link_code = %link_code, "not linked yet");
                    report(PollReport::Pending);
                },
                Ok(Err(e)) => {
                    warn!(link_code = %link_code, error = %e, "link status check failed");
                    report(PollReport::Failed(e.to_string()));
                },
                Err(_) => {
                    warn!(
                        link_code = %link_code,
                        timeout_ms = check_timeout.as_millis() as u64,
                        "link status check timed out"
                    );
                    report(PollReport::Failed("link status check timed out".into()));
                },
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use {
        async_trait::async_trait,
        lazytrader_backend::{DeploymentResult, GatewayError, LinkInfo, LinkStatus, Result},
    };

    use super::*;

    /// Answers status checks from a script; the last entry repeats.
    struct ScriptedStatus {
        script: Mutex<VecDeque<Result<LinkStatus>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<LinkStatus>>) -> Arc<Self> {
            Self::with_delay(script, Duration::ZERO)
        }

        fn with_delay(script: Vec<Result<LinkStatus>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendGateway for ScriptedStatus {
        async fn generate_agent(&self, _: &str) -> Result<String> {
            unreachable!()
        }

        async fn generate_link(&self, _: &str) -> Result<LinkInfo> {
            unreachable!()
        }

        async fn check_link_status(&self, _: &str) -> Result<LinkStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(GatewayError::rejected(e.to_string())),
                }
            }
        }

        async fn create_agent(&self, _: &str, _: &str) -> Result<DeploymentResult> {
            unreachable!()
        }
    }

    fn alice() -> LinkedAccount {
        LinkedAccount {
            external_username: "alice".into(),
            external_id: "42".into(),
        }
    }

    fn collector() -> (PollReportFn, Arc<Mutex<Vec<PollReport>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let report: PollReportFn = Arc::new(move |r| sink.lock().unwrap().push(r));
        (report, seen)
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn poller(gateway: Arc<dyn BackendGateway>) -> Arc<PollingCoordinator> {
        PollingCoordinator::new(gateway, Duration::from_millis(10), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn stops_after_link_confirmed() {
        let gw = ScriptedStatus::new(vec![
            Ok(LinkStatus::pending()),
            Ok(LinkStatus::pending()),
            Ok(LinkStatus::pending()),
            Ok(LinkStatus::linked(alice())),
        ]);
        let p = poller(gw.clone());
        let (report, seen) = collector();

        assert_eq!(p.phase(), PollPhase::Idle);
        assert!(p.start("123456".into(), report));
        assert!(p.is_running());

        wait_for(|| p.phase() == PollPhase::Stopped).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![
            PollReport::Pending,
            PollReport::Pending,
            PollReport::Pending,
            PollReport::Linked(alice()),
        ]);
        assert_eq!(gw.calls(), 4);
    }

    #[tokio::test]
    async fn transient_failure_keeps_polling() {
        let gw = ScriptedStatus::new(vec![
            Err(GatewayError::Timeout),
            Ok(LinkStatus::pending()),
            Ok(LinkStatus::linked(alice())),
        ]);
        let p = poller(gw.clone());
        let (report, seen) = collector();
        p.start("123456".into(), report);

        wait_for(|| p.phase() == PollPhase::Stopped).await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0], PollReport::Failed("request timed out".into()));
        assert_eq!(seen.last(), Some(&PollReport::Linked(alice())));
        assert_eq!(gw.calls(), 3);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let gw = ScriptedStatus::new(vec![Ok(LinkStatus::pending())]);
        let p = poller(gw);
        let (report, _) = collector();
        assert!(p.start("1".into(), Arc::clone(&report)));
        assert!(!p.start("1".into(), report));
        p.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_silences_reports() {
        let gw = ScriptedStatus::new(vec![Ok(LinkStatus::pending())]);
        let p = poller(gw.clone());
        let (report, seen) = collector();
        p.start("1".into(), report);

        wait_for(|| gw.calls() >= 2).await;
        p.stop();
        p.stop();
        assert_eq!(p.phase(), PollPhase::Stopped);

        let calls = gw.calls();
        let reports = seen.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(gw.calls(), calls);
        assert_eq!(seen.lock().unwrap().len(), reports);
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let p = poller(ScriptedStatus::new(vec![Ok(LinkStatus::pending())]));
        p.stop();
        assert_eq!(p.phase(), PollPhase::Idle);
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let gw = ScriptedStatus::new(vec![Ok(LinkStatus::pending())]);
        let p = poller(gw.clone());
        let (report, seen) = collector();
        p.start("1".into(), Arc::clone(&report));
        p.stop();
        assert!(p.start("1".into(), report));
        assert!(p.is_running());
        wait_for(|| !seen.lock().unwrap().is_empty()).await;
        p.stop();
    }

    #[tokio::test]
    async fn hung_check_times_out() {
        let gw = ScriptedStatus::with_delay(vec![Ok(LinkStatus::pending())], Duration::from_secs(30));
        let p = PollingCoordinator::new(gw, Duration::from_millis(10), Duration::from_millis(20));
        let (report, seen) = collector();
        p.start("1".into(), report);

        wait_for(|| seen.lock().unwrap().len() >= 2).await;
        p.stop();
        let seen = seen.lock().unwrap().clone();
        assert!(
            seen.iter()
                .all(|r| *r == PollReport::Failed("link status check timed out".into()))
        );
    }

    #[tokio::test]
    async fn stop_during_inflight_check_drops_result() {
        let gw = ScriptedStatus::with_delay(
            vec![Ok(LinkStatus::linked(alice()))],
            Duration::from_millis(50),
        );
        let p = poller(gw.clone());
        let (report, seen) = collector();
        p.start("1".into(), report);

        wait_for(|| gw.calls() == 1).await;
        p.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn linked_without_account_keeps_polling() {
        let gw = ScriptedStatus::new(vec![
            Ok(LinkStatus {
                linked: true,
                account: None,
            }),
            Ok(LinkStatus::linked(alice())),
        ]);
        let p = poller(gw);
        let (report, seen) = collector();
        p.start("1".into(), report);

        wait_for(|| p.phase() == PollPhase::Stopped).await;
        assert_eq!(seen.lock().unwrap().clone(), vec![
            PollReport::Confirming,
            PollReport::Linked(alice()),
        ]);
    }

    #[tokio::test]
    async fn dropping_the_coordinator_ends_the_loop() {
        let gw = ScriptedStatus::new(vec![Ok(LinkStatus::pending())]);
        let p = poller(gw.clone());
        let (report, _) = collector();
        p.start("1".into(), report);
        wait_for(|| gw.calls() >= 1).await;

        drop(p);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls = gw.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(gw.calls(), calls);
    }
}
