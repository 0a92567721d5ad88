//! Error sink for asynchronous pipeline failures.
//!
//! Every failure in the background pipeline ends here instead of in an HTTP
//! response. Writers hold a cloneable [`ErrorSink`]; the single
//! [`ErrorStream`] is the read side and is usually handed to
//! [`ErrorStream::spawn_logger`].

use std::fmt;

use metrics::counter;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::error;

use super::mail::{MailError, RenderError};
use super::tasks::TaskError;

/// Pipeline stage in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Render,
    Attach,
    Send,
    Task,
    Queue,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Attach => "attach",
            Stage::Send => "send",
            Stage::Task => "task",
            Stage::Queue => "queue",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FailureKind {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Transport(#[from] MailError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("mail queue closed before the message could be submitted")]
    QueueClosed,
}

impl FailureKind {
    /// Stage implied by the failure when the caller has no better context.
    pub fn stage(&self) -> Stage {
        match self {
            FailureKind::Render(_) => Stage::Render,
            FailureKind::Transport(MailError::Attachment { .. }) => Stage::Attach,
            FailureKind::Transport(_) => Stage::Send,
            FailureKind::Task(_) => Stage::Task,
            FailureKind::QueueClosed => Stage::Queue,
        }
    }
}

/// One terminal failure of a background unit.
#[derive(Debug, Error)]
#[error("{stage} failed: {kind}")]
pub struct PipelineError {
    pub stage: Stage,
    pub recipient: Option<String>,
    pub template: Option<String>,
    pub task: Option<String>,
    #[source]
    pub kind: FailureKind,
}

impl PipelineError {
    pub fn new(kind: impl Into<FailureKind>) -> Self {
        let kind = kind.into();
        Self {
            stage: kind.stage(),
            recipient: None,
            template: None,
            task: None,
            kind,
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Emit the failure at error level with its structured fields.
    pub fn log(&self) {
        error!(
            stage = self.stage.as_str(),
            recipient = self.recipient.as_deref().unwrap_or(""),
            template = self.template.as_deref().unwrap_or(""),
            task = self.task.as_deref().unwrap_or(""),
            error = %self.kind,
            "background work failed"
        );
    }
}

/// Create the sink and its single reader.
pub fn error_sink() -> (ErrorSink, ErrorStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ErrorSink { tx }, ErrorStream { rx })
}

/// Write side of the error sink.
#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<PipelineError>,
}

impl ErrorSink {
    pub fn report(&self, error: PipelineError) {
        counter!("plandesk_pipeline_errors_total", "stage" => error.stage.as_str()).increment(1);
        if let Err(mpsc::error::SendError(error)) = self.tx.send(error) {
            // Reader is gone (late shutdown); keep the failure visible.
            error.log();
        }
    }
}

/// Read side of the error sink. Not cloneable.
#[derive(Debug)]
pub struct ErrorStream {
    rx: mpsc::UnboundedReceiver<PipelineError>,
}

impl ErrorStream {
    /// Wait for the next failure. `None` once every [`ErrorSink`] is dropped.
    pub async fn next(&mut self) -> Option<PipelineError> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<PipelineError> {
        self.rx.try_recv().ok()
    }

    /// Everything reported so far, without waiting.
    pub fn drain_pending(&mut self) -> Vec<PipelineError> {
        let mut pending = Vec::new();
        while let Some(error) = self.try_next() {
            pending.push(error);
        }
        pending
    }

    /// Log every failure until all writers are gone. Resolves to the number
    /// of failures seen.
    pub fn spawn_logger(mut self) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut seen = 0usize;
            while let Some(error) = self.next().await {
                error.log();
                seen += 1;
            }
            seen
        })
    }
}
