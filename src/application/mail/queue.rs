use tokio::sync::mpsc;
use tracing::debug;

use super::JobMessage;
use crate::application::sink::{ErrorSink, FailureKind, PipelineError};
use crate::application::tracker::{CompletionTracker, WorkGuard};

/// A message together with the registration that keeps the tracker busy
/// until its delivery attempt ends.
#[derive(Debug)]
pub struct QueuedMessage {
    pub message: JobMessage,
    pub guard: WorkGuard,
}

/// Create a bounded mail queue. `capacity` must be non-zero.
pub fn mail_queue(
    capacity: usize,
    tracker: CompletionTracker,
    sink: ErrorSink,
) -> (MailQueue, MailReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailQueue { tx, tracker, sink }, MailReceiver { rx })
}

/// Submission side of the mail queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct MailQueue {
    tx: mpsc::Sender<QueuedMessage>,
    tracker: CompletionTracker,
    sink: ErrorSink,
}

impl MailQueue {
    /// Queue `message` for delivery, waiting while the queue is full.
    ///
    /// Never fails from the caller's point of view: a closed queue is
    /// reported to the error sink and the registration released.
    pub async fn submit(&self, message: JobMessage) {
        let guard = self.tracker.register();
        let queued = QueuedMessage { message, guard };

        match self.tx.send(queued).await {
            Ok(()) => debug!("mail queued"),
            Err(mpsc::error::SendError(QueuedMessage { message, guard })) => {
                self.sink.report(
                    PipelineError::new(FailureKind::QueueClosed)
                        .with_recipient(message.to())
                        .with_template(message.template_or_default()),
                );
                drop(guard);
            }
        }
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }
}

/// Consumer side of the mail queue.
#[derive(Debug)]
pub struct MailReceiver {
    rx: mpsc::Receiver<QueuedMessage>,
}

impl MailReceiver {
    pub async fn recv(&mut self) -> Option<QueuedMessage> {
        self.rx.recv().await
    }
}
