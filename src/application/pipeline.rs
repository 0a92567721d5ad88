//! Wiring for the background pipeline.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use super::mail::{MailQueue, MailRenderer, MailTransport, MailWorker, SenderDefaults, mail_queue};
use super::shutdown::{DrainOutcome, ShutdownCoordinator};
use super::sink::{ErrorSink, ErrorStream, error_sink};
use super::tasks::BackgroundTasks;
use super::tracker::CompletionTracker;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_capacity: NonZeroUsize,
    pub sender: SenderDefaults,
    pub drain_timeout: Option<Duration>,
}

/// Shared handles to the running pipeline.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub tracker: CompletionTracker,
    pub sink: ErrorSink,
    pub queue: MailQueue,
    pub tasks: BackgroundTasks,
    pub shutdown: ShutdownCoordinator,
}

impl Pipeline {
    /// Build the tracker, sink and queue, and spawn the mail worker.
    ///
    /// The caller owns the returned [`ErrorStream`]; the worker stops once
    /// every [`MailQueue`] clone has been dropped.
    pub fn start(
        config: PipelineConfig,
        renderer: Arc<dyn MailRenderer>,
        transport: Arc<dyn MailTransport>,
    ) -> (Self, ErrorStream, JoinHandle<()>) {
        let tracker = CompletionTracker::new();
        let (sink, errors) = error_sink();
        let (queue, receiver) = mail_queue(
            config.queue_capacity.get(),
            tracker.clone(),
            sink.clone(),
        );
        let worker =
            MailWorker::new(renderer, transport, config.sender, sink.clone()).spawn(receiver);
        let tasks = BackgroundTasks::new(tracker.clone(), sink.clone());
        let shutdown = ShutdownCoordinator::new(tracker.clone(), config.drain_timeout);

        (
            Self {
                tracker,
                sink,
                queue,
                tasks,
                shutdown,
            },
            errors,
            worker,
        )
    }

    /// Drain outstanding work, release these handles and stop the worker.
    ///
    /// After a timed-out drain the worker is aborted rather than awaited:
    /// a stuck task may still hold a [`MailQueue`] clone, which keeps the
    /// queue open forever.
    pub async fn shut_down(self, worker: JoinHandle<()>) -> DrainOutcome {
        let outcome = self.shutdown.drain().await;
        drop(self);

        match outcome {
            DrainOutcome::Idle => {
                if let Err(err) = worker.await {
                    warn!(error = %err, "mail worker ended abnormally");
                }
            }
            DrainOutcome::TimedOut { outstanding } => {
                warn!(outstanding, "abandoning background work still in flight");
                worker.abort();
            }
        }

        outcome
    }
}
