use std::path::PathBuf;

use async_trait::async_trait;

use super::{Envelope, MailError};

/// A file attached to an outbound mail, read from disk at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub name: String,
    pub path: PathBuf,
}

/// Fully rendered mail ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub envelope: Envelope,
    pub html: String,
    pub text: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}
