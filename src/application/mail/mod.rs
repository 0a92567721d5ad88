//! Outbound mail pipeline: job messages, the bounded queue and the worker
//! that renders and delivers them.
//!
//! Handlers build a [`JobMessage`] and hand it to [`MailQueue::submit`]. The
//! submission registers with the completion tracker before it is queued; the
//! [`MailWorker`] consumes the queue, renders the named template, inlines the
//! CSS and passes the result to a [`MailTransport`]. Failures never reach the
//! caller: they are reported to the error sink and the registration is
//! released once the attempt ends.

mod inline;
mod message;
mod queue;
mod render;
mod transport;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use inline::inline_css;
pub use message::{DEFAULT_TEMPLATE, Envelope, JobMessage, JobMessageBuilder, SenderDefaults};
pub use queue::{MailQueue, MailReceiver, QueuedMessage, mail_queue};
pub use render::{MailRenderer, RenderError, RenderedMail};
pub use transport::{MailAttachment, MailTransport, OutboundMail};
pub use worker::MailWorker;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address `{address}`")]
    InvalidAddress { address: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to read attachment `{name}` from {}", path.display())]
    Attachment {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMTP {phase} timed out after {}s", after.as_secs())]
    Timeout {
        phase: &'static str,
        after: Duration,
    },
}

impl MailError {
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    pub fn smtp(err: impl std::fmt::Display) -> Self {
        Self::Smtp(err.to_string())
    }
}
