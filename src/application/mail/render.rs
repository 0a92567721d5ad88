use serde_json::Value;
use thiserror::Error;

/// HTML and plain-text bodies produced for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub html: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("mail template `{template}` not found")]
    TemplateNotFound { template: String },
    #[error("failed to render mail template `{template}`: {message}")]
    Render { template: String, message: String },
    #[error("failed to inline css: {message}")]
    Inline { message: String },
}

impl RenderError {
    pub fn not_found(template: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            template: template.into(),
        }
    }

    pub fn render(template: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Render {
            template: template.into(),
            message: err.to_string(),
        }
    }
}

/// Turns a template name plus payload into mail bodies.
///
/// Implementations return the raw HTML; CSS inlining is applied by the worker.
pub trait MailRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<RenderedMail, RenderError>;
}
