#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plandesk::application::mail::{
    MailError, MailRenderer, MailTransport, OutboundMail, SenderDefaults,
};
use plandesk::application::pipeline::{Pipeline, PipelineConfig};
use plandesk::application::sink::ErrorStream;
use plandesk::presentation::mail::AskamaMailRenderer;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Records every delivered mail. Recipients containing `fail_marker` are
/// rejected, and a gate (when set) holds each send until released.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMail>>,
    fail_marker: Option<String>,
    gate: Option<Arc<Notify>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        })
    }

    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let rejected = self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| mail.envelope.to.contains(marker));
        if rejected {
            return Err(MailError::smtp("550 mailbox unavailable"));
        }
        self.sent.lock().expect("sent lock").push(mail);
        Ok(())
    }
}

pub fn pipeline_config(capacity: usize) -> PipelineConfig {
    PipelineConfig {
        queue_capacity: NonZeroUsize::new(capacity).expect("non-zero capacity"),
        sender: SenderDefaults {
            from_address: "info@example.com".to_string(),
            from_name: "Info".to_string(),
        },
        drain_timeout: None,
    }
}

pub fn start_pipeline(
    capacity: usize,
    transport: Arc<dyn MailTransport>,
) -> (Pipeline, ErrorStream, JoinHandle<()>) {
    let renderer: Arc<dyn MailRenderer> = Arc::new(AskamaMailRenderer);
    Pipeline::start(pipeline_config(capacity), renderer, transport)
}
