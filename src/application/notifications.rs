//! Member notifications built on the mail queue and background tasks.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::documents::{InvoiceGenerator, ManualGenerator};
use super::mail::{JobMessage, MailError, MailQueue};
use super::tasks::{BackgroundTasks, TaskContext};
use crate::domain::entities::{PlanRecord, UserRecord};

pub const CONFIRMATION_TEMPLATE: &str = "confirmation-email";
pub const INVOICE_TEMPLATE: &str = "invoice-email";

/// Handles for the tasks launched by [`Notifier::subscription_documents`].
#[derive(Debug)]
pub struct SubscriptionTasks {
    pub invoice: JoinHandle<()>,
    pub manual: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Notifier {
    queue: MailQueue,
    tasks: BackgroundTasks,
    invoices: Arc<dyn InvoiceGenerator>,
    manuals: Arc<dyn ManualGenerator>,
}

impl Notifier {
    pub fn new(
        queue: MailQueue,
        tasks: BackgroundTasks,
        invoices: Arc<dyn InvoiceGenerator>,
        manuals: Arc<dyn ManualGenerator>,
    ) -> Self {
        Self {
            queue,
            tasks,
            invoices,
            manuals,
        }
    }

    pub fn queue(&self) -> &MailQueue {
        &self.queue
    }

    /// Tell the account owner that a login with a wrong password was attempted.
    pub async fn failed_login_alert(&self, email: &str) -> Result<(), MailError> {
        let message = JobMessage::builder()
            .to(email)
            .subject("Failed login attempt")
            .data("Someone tried to log into your account with an incorrect password.")
            .build()?;
        self.queue.submit(message).await;
        Ok(())
    }

    /// Send the activation link to a newly registered account.
    pub async fn account_confirmation(&self, email: &str, signed_url: &str) -> Result<(), MailError> {
        let message = JobMessage::builder()
            .to(email)
            .subject("Activate your account")
            .template(CONFIRMATION_TEMPLATE)
            .data(signed_url)
            .build()?;
        self.queue.submit(message).await;
        Ok(())
    }

    /// Generate the invoice and the manual for a new subscription, each on
    /// its own background task. Returns immediately.
    pub fn subscription_documents(&self, user: &UserRecord, plan: &PlanRecord) -> SubscriptionTasks {
        let invoice = {
            let queue = self.queue.clone();
            let invoices = Arc::clone(&self.invoices);
            let (user, plan) = (user.clone(), plan.clone());
            self.tasks.spawn(
                TaskContext::new("invoice").for_recipient(&user.email),
                async move {
                    let invoice = invoices.invoice(&user, &plan).await?;
                    let message = JobMessage::builder()
                        .to(&user.email)
                        .subject("Your Invoice")
                        .template(INVOICE_TEMPLATE)
                        .data(invoice)
                        .build()?;
                    queue.submit(message).await;
                    Ok(())
                },
            )
        };

        let manual = {
            let queue = self.queue.clone();
            let manuals = Arc::clone(&self.manuals);
            let (user, plan) = (user.clone(), plan.clone());
            self.tasks.spawn(
                TaskContext::new("manual").for_recipient(&user.email),
                async move {
                    let document = manuals.manual(&user, &plan).await?;
                    let message = JobMessage::builder()
                        .to(&user.email)
                        .subject("Your Manual")
                        .data("Please find your manual attached.")
                        .attach(document.name, document.path)
                        .build()?;
                    queue.submit(message).await;
                    Ok(())
                },
            )
        };

        SubscriptionTasks { invoice, manual }
    }
}
