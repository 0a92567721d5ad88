mod support;

use std::sync::Arc;

use futures::future::join_all;
use plandesk::application::documents::{
    MANUAL_ATTACHMENT_NAME, PlanInvoiceGenerator, ScratchManualWriter,
};
use plandesk::application::mail::JobMessage;
use plandesk::application::notifications::Notifier;
use plandesk::application::sink::Stage;
use plandesk::domain::entities::{PlanRecord, UserRecord};
use plandesk::domain::types::AccountStatus;
use time::OffsetDateTime;
use uuid::Uuid;

use support::{RecordingTransport, start_pipeline};

fn message(to: &str, template: &str) -> JobMessage {
    JobMessage::builder()
        .to(to)
        .subject("Hello")
        .template(template)
        .data("payload")
        .build()
        .expect("valid message")
}

fn member(email: &str) -> UserRecord {
    let now = OffsetDateTime::now_utc();
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        password_digest: String::new(),
        status: AccountStatus::Active,
        is_admin: false,
        plan_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn silver() -> PlanRecord {
    PlanRecord {
        id: 2,
        name: "Silver".to_string(),
        amount_cents: 2000,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn concurrent_submissions_each_get_one_attempt() {
    let transport = RecordingTransport::failing_for("fail");
    let (pipeline, mut errors, _worker) = start_pipeline(4, transport.clone());

    let submissions = (0..20).map(|i| {
        let queue = pipeline.queue.clone();
        let to = if i % 4 == 0 {
            format!("fail-{i}@example.com")
        } else {
            format!("ok-{i}@example.com")
        };
        async move { queue.submit(message(&to, "mail")).await }
    });
    join_all(submissions).await;

    pipeline.tracker.wait_idle().await;

    let failures = errors.drain_pending();
    assert_eq!(transport.sent().len(), 15);
    assert_eq!(failures.len(), 5);
    assert!(failures.iter().all(|failure| failure.stage == Stage::Send));
    assert_eq!(pipeline.tracker.outstanding(), 0);
}

#[tokio::test]
async fn template_failure_does_not_block_other_messages() {
    let transport = RecordingTransport::new();
    let (pipeline, mut errors, _worker) = start_pipeline(8, transport.clone());

    pipeline.queue.submit(message("a@example.com", "mail")).await;
    pipeline
        .queue
        .submit(message("b@example.com", "no-such-template"))
        .await;
    pipeline.queue.submit(message("c@example.com", "mail")).await;
    pipeline.tracker.wait_idle().await;

    let mut delivered: Vec<_> = transport
        .sent()
        .into_iter()
        .map(|mail| mail.envelope.to)
        .collect();
    delivered.sort();
    assert_eq!(delivered, ["a@example.com", "c@example.com"]);

    let failures = errors.drain_pending();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Render);
    assert_eq!(failures[0].recipient.as_deref(), Some("b@example.com"));
    assert_eq!(failures[0].template.as_deref(), Some("no-such-template"));
}

#[tokio::test]
async fn confirmation_mail_carries_the_signed_token() {
    let transport = RecordingTransport::new();
    let (pipeline, mut errors, _worker) = start_pipeline(8, transport.clone());
    let notifier = Notifier::new(
        pipeline.queue.clone(),
        pipeline.tasks.clone(),
        Arc::new(PlanInvoiceGenerator),
        Arc::new(ScratchManualWriter::new(std::env::temp_dir())),
    );

    notifier
        .account_confirmation("user@example.com", "signed-token-abc")
        .await
        .expect("queued");
    pipeline.tracker.wait_idle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].envelope.template, "confirmation-email");
    assert_eq!(sent[0].envelope.subject, "Activate your account");
    assert_eq!(sent[0].envelope.from_address, "info@example.com");
    assert!(sent[0].html.contains("signed-token-abc"));
    assert!(sent[0].text.contains("signed-token-abc"));
    assert!(!sent[0].html.contains("class="));
    assert!(errors.drain_pending().is_empty());
}

#[tokio::test]
async fn failed_confirmation_reports_once_and_releases() {
    let transport = RecordingTransport::failing_for("user@example.com");
    let (pipeline, mut errors, _worker) = start_pipeline(8, transport.clone());
    let notifier = Notifier::new(
        pipeline.queue.clone(),
        pipeline.tasks.clone(),
        Arc::new(PlanInvoiceGenerator),
        Arc::new(ScratchManualWriter::new(std::env::temp_dir())),
    );

    notifier
        .account_confirmation("user@example.com", "signed-token-abc")
        .await
        .expect("queued");
    pipeline.tracker.wait_idle().await;

    let failures = errors.drain_pending();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Send);
    assert_eq!(failures[0].recipient.as_deref(), Some("user@example.com"));
    assert_eq!(failures[0].template.as_deref(), Some("confirmation-email"));
    assert_eq!(pipeline.tracker.outstanding(), 0);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn subscription_documents_run_in_the_background() {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let transport = RecordingTransport::new();
    let (pipeline, mut errors, _worker) = start_pipeline(8, transport.clone());
    let notifier = Notifier::new(
        pipeline.queue.clone(),
        pipeline.tasks.clone(),
        Arc::new(PlanInvoiceGenerator),
        Arc::new(ScratchManualWriter::new(scratch.path())),
    );

    let user = member("ada@example.com");
    let _tasks = notifier.subscription_documents(&user, &silver());

    // Both tasks are registered before the call returns.
    assert_eq!(pipeline.tracker.outstanding(), 2);

    pipeline.tracker.wait_idle().await;
    assert!(errors.drain_pending().is_empty());

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);

    let invoice = sent
        .iter()
        .find(|mail| mail.envelope.subject == "Your Invoice")
        .expect("invoice mail");
    assert_eq!(invoice.envelope.template, "invoice-email");
    assert!(invoice.text.contains("$20.00"));
    assert!(invoice.attachments.is_empty());

    let manual = sent
        .iter()
        .find(|mail| mail.envelope.subject == "Your Manual")
        .expect("manual mail");
    assert_eq!(manual.envelope.template, "mail");
    assert_eq!(manual.attachments.len(), 1);
    assert_eq!(manual.attachments[0].name, MANUAL_ATTACHMENT_NAME);
    assert!(manual.attachments[0].path.starts_with(scratch.path()));
    assert!(manual.attachments[0].path.exists());
}

#[tokio::test]
async fn failed_document_generation_sends_nothing() {
    let scratch = tempfile::tempdir().expect("scratch dir");
    // A regular file where the scratch directory should be.
    let blocker = scratch.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").expect("write blocker");

    let transport = RecordingTransport::new();
    let (pipeline, mut errors, _worker) = start_pipeline(8, transport.clone());
    let notifier = Notifier::new(
        pipeline.queue.clone(),
        pipeline.tasks.clone(),
        Arc::new(PlanInvoiceGenerator),
        Arc::new(ScratchManualWriter::new(&blocker)),
    );

    let _tasks = notifier.subscription_documents(&member("ada@example.com"), &silver());
    pipeline.tracker.wait_idle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].envelope.subject, "Your Invoice");

    let failures = errors.drain_pending();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Task);
    assert_eq!(failures[0].task.as_deref(), Some("manual"));
    assert_eq!(failures[0].recipient.as_deref(), Some("ada@example.com"));
}
