use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

use super::{
    Envelope, JobMessage, MailAttachment, MailReceiver, MailRenderer, MailTransport,
    OutboundMail, QueuedMessage, SenderDefaults, inline_css,
};
use crate::application::sink::{ErrorSink, FailureKind, PipelineError};
use crate::application::tasks::TaskError;

/// Consumes the mail queue and delivers each message on its own task.
#[derive(Clone)]
pub struct MailWorker {
    renderer: Arc<dyn MailRenderer>,
    transport: Arc<dyn MailTransport>,
    defaults: SenderDefaults,
    sink: ErrorSink,
}

impl MailWorker {
    pub fn new(
        renderer: Arc<dyn MailRenderer>,
        transport: Arc<dyn MailTransport>,
        defaults: SenderDefaults,
        sink: ErrorSink,
    ) -> Self {
        Self {
            renderer,
            transport,
            defaults,
            sink,
        }
    }

    pub fn spawn(self, rx: MailReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Consume until every [`MailQueue`](super::MailQueue) handle is gone.
    pub async fn run(self, mut rx: MailReceiver) {
        let worker = Arc::new(self);
        while let Some(queued) = rx.recv().await {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.deliver(queued).await });
        }
        info!("mail queue closed, worker stopping");
    }

    /// One delivery attempt. Failures go to the error sink; the message's
    /// registration is released after the outcome has been recorded.
    pub async fn deliver(&self, queued: QueuedMessage) {
        let QueuedMessage { message, guard } = queued;
        let envelope = Envelope::resolve(&message, &self.defaults);
        let span = info_span!(
            "mail.deliver",
            recipient = %envelope.to,
            template = %envelope.template,
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.attempt(&message, &envelope))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(kind)) => Some(kind),
            Err(payload) => Some(FailureKind::Task(TaskError::panicked(payload))),
        };

        match failure {
            None => {
                counter!("plandesk_mail_delivered_total").increment(1);
                info!(parent: &span, elapsed_ms, subject = %envelope.subject, "mail delivered");
            }
            Some(kind) => {
                let error = PipelineError::new(kind)
                    .with_recipient(envelope.to)
                    .with_template(envelope.template);
                counter!("plandesk_mail_failed_total", "stage" => error.stage.as_str())
                    .increment(1);
                self.sink.report(error);
            }
        }

        drop(guard);
    }

    async fn attempt(&self, message: &JobMessage, envelope: &Envelope) -> Result<(), FailureKind> {
        let rendered = self.renderer.render(&envelope.template, message.data())?;
        let html = inline_css(&rendered.html)?;

        let attachments = message
            .attachments()
            .iter()
            .map(|(name, path)| MailAttachment {
                name: name.clone(),
                path: path.clone(),
            })
            .collect();

        self.transport
            .send(OutboundMail {
                envelope: envelope.clone(),
                html,
                text: rendered.text,
                attachments,
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::application::mail::{MailError, RenderError, RenderedMail, mail_queue};
    use crate::application::sink::{Stage, error_sink};
    use crate::application::tracker::CompletionTracker;

    struct EchoRenderer;

    impl MailRenderer for EchoRenderer {
        fn render(&self, template: &str, data: &Value) -> Result<RenderedMail, RenderError> {
            if template == "missing" {
                return Err(RenderError::not_found(template));
            }
            let body = data.as_str().unwrap_or_default();
            Ok(RenderedMail {
                html: format!("<style>p {{ margin: 0 }}</style><p class=\"body\">{body}</p>"),
                text: body.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
            if mail.envelope.to.starts_with("reject") {
                return Err(MailError::smtp("550 mailbox unavailable"));
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    fn defaults() -> SenderDefaults {
        SenderDefaults {
            from_address: "info@example.com".to_string(),
            from_name: "Info".to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_rendered_and_inlined_mail() {
        let tracker = CompletionTracker::new();
        let (sink, mut stream) = error_sink();
        let transport = Arc::new(RecordingTransport::default());
        let worker = MailWorker::new(
            Arc::new(EchoRenderer),
            transport.clone(),
            defaults(),
            sink.clone(),
        );
        let (queue, mut rx) = mail_queue(4, tracker.clone(), sink);

        queue
            .submit(
                JobMessage::builder()
                    .to("user@example.com")
                    .subject("Hi")
                    .data("hello there")
                    .build()
                    .unwrap(),
            )
            .await;
        worker.deliver(rx.recv().await.unwrap()).await;

        assert_eq!(tracker.outstanding(), 0);
        assert!(stream.try_next().is_none());

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope.from_address, "info@example.com");
        assert_eq!(sent[0].envelope.template, "mail");
        assert!(sent[0].html.contains(r#"<p style="margin: 0">hello there</p>"#));
        assert_eq!(sent[0].text, "hello there");
    }

    #[tokio::test]
    async fn failures_are_reported_with_stage() {
        let tracker = CompletionTracker::new();
        let (sink, mut stream) = error_sink();
        let worker = MailWorker::new(
            Arc::new(EchoRenderer),
            Arc::new(RecordingTransport::default()),
            defaults(),
            sink.clone(),
        );
        let (queue, mut rx) = mail_queue(4, tracker.clone(), sink);

        queue
            .submit(
                JobMessage::builder()
                    .to("user@example.com")
                    .subject("Hi")
                    .template("missing")
                    .build()
                    .unwrap(),
            )
            .await;
        queue
            .submit(
                JobMessage::builder()
                    .to("reject@example.com")
                    .subject("Hi")
                    .build()
                    .unwrap(),
            )
            .await;

        worker.deliver(rx.recv().await.unwrap()).await;
        worker.deliver(rx.recv().await.unwrap()).await;
        assert_eq!(tracker.outstanding(), 0);

        let render = stream.try_next().expect("render failure");
        assert_eq!(render.stage, Stage::Render);
        assert_eq!(render.template.as_deref(), Some("missing"));

        let send = stream.try_next().expect("send failure");
        assert_eq!(send.stage, Stage::Send);
        assert_eq!(send.recipient.as_deref(), Some("reject@example.com"));
    }
}
