//! Process shutdown: stop accepting requests, then wait for background work.

use std::sync::Arc;
use std::time::Duration;

use tokio::{signal, sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use super::tracker::CompletionTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every registered unit finished.
    Idle,
    /// The configured drain timeout elapsed first.
    TimedOut { outstanding: usize },
}

#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    phase: Arc<watch::Sender<Phase>>,
    tracker: CompletionTracker,
    drain_timeout: Option<Duration>,
}

impl ShutdownCoordinator {
    pub fn new(tracker: CompletionTracker, drain_timeout: Option<Duration>) -> Self {
        let (phase, _rx) = watch::channel(Phase::Running);
        Self {
            phase: Arc::new(phase),
            tracker,
            drain_timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Move from `Running` to `Draining`. Returns `false` when shutdown was
    /// already under way.
    pub fn begin_draining(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once draining has begun. Suitable for axum's graceful shutdown.
    pub fn draining(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.phase.subscribe();
        async move {
            let _ = rx.wait_for(|phase| *phase != Phase::Running).await;
        }
    }

    /// Resolves once the coordinator reached `Terminated`.
    pub async fn terminated(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == Phase::Terminated).await;
    }

    /// Begin draining on SIGINT/SIGTERM (Ctrl-C elsewhere).
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = termination_signal() => {
                    info!("termination signal received");
                    coordinator.begin_draining();
                }
                _ = coordinator.draining() => {}
            }
        })
    }

    /// Enter `Draining` (if not already), wait for outstanding work, then
    /// enter `Terminated`. In-flight work is never cancelled.
    pub async fn drain(&self) -> DrainOutcome {
        self.begin_draining();
        info!(
            outstanding = self.tracker.outstanding(),
            "draining background work"
        );

        let outcome = match self.drain_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.tracker.wait_idle()).await {
                Ok(()) => DrainOutcome::Idle,
                Err(_) => {
                    let outstanding = self.tracker.outstanding();
                    warn!(
                        outstanding,
                        timeout_secs = limit.as_secs(),
                        "drain timeout elapsed with background work outstanding"
                    );
                    DrainOutcome::TimedOut { outstanding }
                }
            },
            None => {
                self.tracker.wait_idle().await;
                DrainOutcome::Idle
            }
        };

        self.phase.send_replace(Phase::Terminated);
        info!("shutdown complete");
        outcome
    }
}

async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
