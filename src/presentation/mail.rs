//! Compiled mail templates.

use askama::Template;
use serde_json::Value;

use crate::application::mail::{MailRenderer, RenderError, RenderedMail};

#[derive(Template)]
#[template(path = "mail/mail.html")]
struct GenericHtml<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(path = "mail/mail.txt")]
struct GenericText<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(path = "mail/confirmation-email.html")]
struct ConfirmationHtml<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(path = "mail/confirmation-email.txt")]
struct ConfirmationText<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(path = "mail/invoice-email.html")]
struct InvoiceHtml<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(path = "mail/invoice-email.txt")]
struct InvoiceText<'a> {
    message: &'a str,
}

/// Renders the built-in mail templates: `mail`, `confirmation-email` and
/// `invoice-email`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AskamaMailRenderer;

impl MailRenderer for AskamaMailRenderer {
    fn render(&self, template: &str, data: &Value) -> Result<RenderedMail, RenderError> {
        let message = payload_text(data);
        let message = message.as_str();

        match template {
            "mail" => render_pair(template, GenericHtml { message }, GenericText { message }),
            "confirmation-email" => render_pair(
                template,
                ConfirmationHtml { message },
                ConfirmationText { message },
            ),
            "invoice-email" => {
                render_pair(template, InvoiceHtml { message }, InvoiceText { message })
            }
            other => Err(RenderError::not_found(other)),
        }
    }
}

fn render_pair(
    name: &str,
    html: impl Template,
    text: impl Template,
) -> Result<RenderedMail, RenderError> {
    Ok(RenderedMail {
        html: html.render().map_err(|err| RenderError::render(name, err))?,
        text: text.render().map_err(|err| RenderError::render(name, err))?,
    })
}

/// Templates print the payload as text; structured payloads are shown as JSON.
fn payload_text(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
