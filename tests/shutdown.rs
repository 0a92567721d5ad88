mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use plandesk::application::mail::{JobMessage, MailRenderer};
use plandesk::application::pipeline::Pipeline;
use plandesk::application::shutdown::{DrainOutcome, Phase, ShutdownCoordinator};
use plandesk::application::tasks::{TaskContext, TaskError};
use plandesk::application::tracker::CompletionTracker;
use plandesk::presentation::mail::AskamaMailRenderer;
use tokio::sync::Notify;

use support::{RecordingTransport, pipeline_config, start_pipeline};

#[tokio::test]
async fn drain_waits_for_task_in_flight() {
    let (pipeline, mut errors, _worker) = start_pipeline(4, RecordingTransport::new());
    let gate = Arc::new(Notify::new());

    let task_gate = Arc::clone(&gate);
    pipeline.tasks.spawn(TaskContext::new("slow"), async move {
        task_gate.notified().await;
        Ok::<(), TaskError>(())
    });

    let coordinator = pipeline.shutdown.clone();
    let drain = tokio::spawn(async move { coordinator.drain().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!drain.is_finished());
    assert_eq!(pipeline.shutdown.phase(), Phase::Draining);
    assert_eq!(pipeline.tracker.outstanding(), 1);

    gate.notify_one();
    let outcome = drain.await.expect("drain task");

    assert_eq!(outcome, DrainOutcome::Idle);
    assert_eq!(pipeline.shutdown.phase(), Phase::Terminated);
    assert_eq!(pipeline.tracker.outstanding(), 0);
    assert!(errors.drain_pending().is_empty());
}

#[tokio::test]
async fn drain_with_nothing_outstanding_returns_immediately() {
    let coordinator = ShutdownCoordinator::new(CompletionTracker::new(), None);

    let outcome = tokio::time::timeout(Duration::from_millis(100), coordinator.drain())
        .await
        .expect("drain should not block");

    assert_eq!(outcome, DrainOutcome::Idle);
    assert_eq!(coordinator.phase(), Phase::Terminated);
}

#[tokio::test]
async fn drain_timeout_still_terminates() {
    let tracker = CompletionTracker::new();
    let coordinator = ShutdownCoordinator::new(tracker.clone(), Some(Duration::from_millis(50)));
    let _stuck = tracker.register();

    let outcome = coordinator.drain().await;

    assert_eq!(outcome, DrainOutcome::TimedOut { outstanding: 1 });
    assert_eq!(coordinator.phase(), Phase::Terminated);
}

#[tokio::test]
async fn mail_submitted_while_draining_is_delivered() {
    let gate = Arc::new(Notify::new());
    let transport = RecordingTransport::gated(Arc::clone(&gate));
    let (pipeline, _errors, _worker) = start_pipeline(4, transport.clone());

    assert!(pipeline.shutdown.begin_draining());
    assert!(!pipeline.shutdown.begin_draining());

    let message = JobMessage::builder()
        .to("late@example.com")
        .subject("Late")
        .build()
        .expect("valid message");
    pipeline.queue.submit(message).await;

    let coordinator = pipeline.shutdown.clone();
    let drain = tokio::spawn(async move { coordinator.drain().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!drain.is_finished());

    gate.notify_one();
    assert_eq!(drain.await.expect("drain task"), DrainOutcome::Idle);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn server_stops_accepting_once_draining() {
    let coordinator = ShutdownCoordinator::new(CompletionTracker::new(), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let router = Router::new().route("/", get(|| async { "ok" }));

    let server = tokio::spawn(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(coordinator.draining())
            .into_future(),
    );

    coordinator.begin_draining();
    tokio::time::timeout(Duration::from_secs(1), server)
        .await
        .expect("server should stop")
        .expect("server task")
        .expect("server result");

    assert_eq!(coordinator.phase(), Phase::Draining);
    coordinator.drain().await;
    assert_eq!(coordinator.phase(), Phase::Terminated);
}

#[tokio::test]
async fn timed_out_shutdown_does_not_wait_for_the_worker() {
    let mut config = pipeline_config(4);
    config.drain_timeout = Some(Duration::from_millis(50));
    let renderer: Arc<dyn MailRenderer> = Arc::new(AskamaMailRenderer);
    let (pipeline, _errors, worker) =
        Pipeline::start(config, renderer, RecordingTransport::new());

    // A stuck task that keeps its own queue handle alive.
    let queue = pipeline.queue.clone();
    pipeline.tasks.spawn(TaskContext::new("stuck"), async move {
        let _queue = queue;
        std::future::pending::<()>().await;
        Ok::<(), TaskError>(())
    });

    let coordinator = pipeline.shutdown.clone();
    let outcome = tokio::time::timeout(Duration::from_secs(1), pipeline.shut_down(worker))
        .await
        .expect("shutdown should finish despite the stuck task");

    assert_eq!(outcome, DrainOutcome::TimedOut { outstanding: 1 });
    assert_eq!(coordinator.phase(), Phase::Terminated);
}

#[tokio::test]
async fn idle_shutdown_stops_the_worker() {
    let transport = RecordingTransport::new();
    let (pipeline, mut errors, worker) = start_pipeline(4, transport.clone());

    let message = JobMessage::builder()
        .to("last@example.com")
        .subject("Last")
        .build()
        .expect("valid message");
    pipeline.queue.submit(message).await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), pipeline.shut_down(worker))
        .await
        .expect("worker should stop once the queue closes");

    assert_eq!(outcome, DrainOutcome::Idle);
    assert_eq!(transport.sent().len(), 1);
    assert!(errors.drain_pending().is_empty());
}
