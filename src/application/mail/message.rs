//! Job messages and builder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use super::MailError;

/// Template used when a message does not name one.
pub const DEFAULT_TEMPLATE: &str = "mail";

/// One notification to deliver.
///
/// Built once through [`JobMessage::builder`] and read-only afterwards; the
/// worker resolves defaults into a separate [`Envelope`] instead of mutating
/// the message.
#[derive(Debug, Clone, Serialize)]
pub struct JobMessage {
    from: Option<String>,
    from_name: Option<String>,
    to: String,
    subject: String,
    template: Option<String>,
    data: Value,
    attachments: BTreeMap<String, PathBuf>,
}

impl JobMessage {
    pub fn builder() -> JobMessageBuilder {
        JobMessageBuilder::default()
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn from_name(&self) -> Option<&str> {
        self.from_name.as_deref()
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Opaque payload handed to the template.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Attachment name → file on disk.
    pub fn attachments(&self) -> &BTreeMap<String, PathBuf> {
        &self.attachments
    }

    /// Template name with the default applied.
    pub fn template_or_default(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }
}

/// Builder for [`JobMessage`].
#[derive(Debug, Default)]
pub struct JobMessageBuilder {
    from: Option<String>,
    from_name: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    template: Option<String>,
    data: Option<Value>,
    attachments: BTreeMap<String, PathBuf>,
}

impl JobMessageBuilder {
    /// Override the sender address. Defaults to the server identity.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Override the sender display name.
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn attach(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.attachments
            .insert(name.into(), path.as_ref().to_path_buf());
        self
    }

    /// Build the message, validating required fields.
    pub fn build(self) -> Result<JobMessage, MailError> {
        let to = self
            .to
            .filter(|to| !to.trim().is_empty())
            .ok_or_else(|| MailError::Build("recipient required".into()))?;

        let subject = self
            .subject
            .ok_or_else(|| MailError::Build("subject required".into()))?;

        Ok(JobMessage {
            from: self.from,
            from_name: self.from_name,
            to,
            subject,
            template: self.template,
            data: self.data.unwrap_or(Value::Null),
            attachments: self.attachments,
        })
    }
}

/// Server identity used when a message leaves sender fields unset.
#[derive(Debug, Clone)]
pub struct SenderDefaults {
    pub from_address: String,
    pub from_name: String,
}

/// A [`JobMessage`] with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from_address: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub template: String,
}

impl Envelope {
    pub fn resolve(message: &JobMessage, defaults: &SenderDefaults) -> Self {
        Self {
            from_address: message
                .from()
                .unwrap_or(&defaults.from_address)
                .to_string(),
            from_name: message.from_name().unwrap_or(&defaults.from_name).to_string(),
            to: message.to().to_string(),
            subject: message.subject().to_string(),
            template: message.template_or_default().to_string(),
        }
    }
}
