//! SMTP delivery through `lettre`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::application::mail::{MailAttachment, MailError, MailTransport, OutboundMail};
use crate::config::{Encryption, MailSettings};

/// Delivers rendered mail over SMTP. Connections are not pooled, so every
/// send opens its own session.
#[derive(Clone)]
pub struct SmtpTransport {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl SmtpTransport {
    pub fn new(settings: &MailSettings) -> Result<Self, MailError> {
        let mut builder = match settings.encryption {
            Encryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
            Encryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(MailError::smtp)?
            }
            Encryption::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host).map_err(MailError::smtp)?
            }
        };

        builder = builder
            .port(settings.port)
            .timeout(Some(settings.connect_timeout));

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
            connect_timeout: settings.connect_timeout,
            send_timeout: settings.send_timeout,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        let message = build_message(&mail).await?;

        let response = tokio::time::timeout(self.send_timeout, self.transport.send(message))
            .await
            .map_err(|_| MailError::Timeout {
                phase: "send",
                after: self.send_timeout,
            })?
            .map_err(|err| {
                if err.is_timeout() {
                    MailError::Timeout {
                        phase: "connect",
                        after: self.connect_timeout,
                    }
                } else {
                    MailError::smtp(err)
                }
            })?;

        debug!(
            recipient = %mail.envelope.to,
            code = %response.code(),
            "smtp server accepted message"
        );
        Ok(())
    }
}

/// Assemble the MIME message: text and HTML alternatives, wrapped in a
/// mixed container when files are attached.
pub(crate) async fn build_message(mail: &OutboundMail) -> Result<Message, MailError> {
    let envelope = &mail.envelope;

    let from_address: Address = envelope
        .from_address
        .parse()
        .map_err(|_| MailError::invalid_address(&envelope.from_address))?;
    let from_name = Some(envelope.from_name.clone()).filter(|name| !name.is_empty());
    let to: Mailbox = envelope
        .to
        .parse()
        .map_err(|_| MailError::invalid_address(&envelope.to))?;

    let alternative = MultiPart::alternative_plain_html(mail.text.clone(), mail.html.clone());
    let body = if mail.attachments.is_empty() {
        alternative
    } else {
        let mut mixed = MultiPart::mixed().multipart(alternative);
        for attachment in &mail.attachments {
            mixed = mixed.singlepart(read_attachment(attachment).await?);
        }
        mixed
    };

    Message::builder()
        .from(Mailbox::new(from_name, from_address))
        .to(to)
        .subject(&envelope.subject)
        .multipart(body)
        .map_err(|err| MailError::Build(err.to_string()))
}

async fn read_attachment(
    attachment: &MailAttachment,
) -> Result<lettre::message::SinglePart, MailError> {
    let bytes = tokio::fs::read(&attachment.path)
        .await
        .map_err(|source| MailError::Attachment {
            name: attachment.name.clone(),
            path: attachment.path.clone(),
            source,
        })?;

    let mime = mime_guess::from_path(&attachment.name).first_or_octet_stream();
    let content_type = ContentType::parse(mime.as_ref())
        .map_err(|err| MailError::Build(format!("content type `{mime}`: {err}")))?;

    Ok(Attachment::new(attachment.name.clone()).body(bytes, content_type))
}
