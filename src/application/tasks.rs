//! Fire-and-forget background tasks launched from request handlers.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use super::documents::DocumentError;
use super::mail::MailError;
use super::repos::RepoError;
use super::sink::{ErrorSink, PipelineError};
use super::tracker::CompletionTracker;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Identifies a background task in logs and error reports.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub name: &'static str,
    pub recipient: Option<String>,
}

impl TaskContext {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            recipient: None,
        }
    }

    pub fn for_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Launches tracked tasks whose failures land in the error sink.
#[derive(Clone, Debug)]
pub struct BackgroundTasks {
    tracker: CompletionTracker,
    sink: ErrorSink,
}

impl BackgroundTasks {
    pub fn new(tracker: CompletionTracker, sink: ErrorSink) -> Self {
        Self { tracker, sink }
    }

    /// Register and launch `task`; returns without waiting for it.
    ///
    /// The registration is released when the task body ends, after any
    /// failure (including a panic) has been reported.
    pub fn spawn<F>(&self, context: TaskContext, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let guard = self.tracker.register();
        let sink = self.sink.clone();
        let span = info_span!(
            "background_task",
            task = context.name,
            recipient = context.recipient.as_deref().unwrap_or(""),
        );
        counter!("plandesk_background_tasks_total", "task" => context.name).increment(1);

        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = AssertUnwindSafe(task).catch_unwind().await;
                let error = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some(error),
                    Err(payload) => Some(TaskError::panicked(payload)),
                };

                let elapsed_ms = started.elapsed().as_millis() as u64;
                match error {
                    None => debug!(elapsed_ms, "background task finished"),
                    Some(error) => {
                        let mut report = PipelineError::new(error).with_task(context.name);
                        if let Some(recipient) = context.recipient {
                            report = report.with_recipient(recipient);
                        }
                        sink.report(report);
                    }
                }

                drop(guard);
            }
            .instrument(span),
        )
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }
}
