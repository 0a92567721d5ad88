use std::{process, sync::Arc};

use plandesk::{
    application::{
        documents::{PlanInvoiceGenerator, ScratchManualWriter},
        error::AppError,
        mail::{JobMessage, SenderDefaults},
        notifications::Notifier,
        pipeline::{Pipeline, PipelineConfig},
        shutdown::DrainOutcome,
        sink::ErrorStream,
        tokens::{DigestTokenSigner, TokenSigner},
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        memory::MemoryMembersRepo,
        smtp::SmtpTransport,
        telemetry,
    },
    presentation::mail::AskamaMailRenderer,
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::SendTestEmail(args) => run_send_test_email(settings, args).await,
    }
}

fn start_pipeline(
    settings: &config::Settings,
) -> Result<(Pipeline, ErrorStream, JoinHandle<()>), AppError> {
    let transport = SmtpTransport::new(&settings.mail).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to configure SMTP transport: {err}"
        )))
    })?;

    let config = PipelineConfig {
        queue_capacity: settings.mail.queue_capacity,
        sender: SenderDefaults {
            from_address: settings.mail.from_address.clone(),
            from_name: settings.mail.from_name.clone(),
        },
        drain_timeout: settings.shutdown.drain_timeout,
    };

    Ok(Pipeline::start(
        config,
        Arc::new(AskamaMailRenderer),
        Arc::new(transport),
    ))
}

fn build_signer(settings: &config::Settings) -> Arc<dyn TokenSigner> {
    match settings.security.signing_key.as_deref() {
        Some(key) => Arc::new(DigestTokenSigner::new(key)),
        None => {
            warn!("security.signing_key is unset; activation links expire on restart");
            Arc::new(DigestTokenSigner::ephemeral())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (pipeline, errors, worker) = start_pipeline(&settings)?;
    let error_logger = errors.spawn_logger();
    let signal_listener = pipeline.shutdown.listen_for_signals();

    let notifier = Notifier::new(
        pipeline.queue.clone(),
        pipeline.tasks.clone(),
        Arc::new(PlanInvoiceGenerator),
        Arc::new(ScratchManualWriter::new(settings.storage.scratch_dir.clone())),
    );
    let state = HttpState {
        members: Arc::new(MemoryMembersRepo::new()),
        notifier,
        signer: build_signer(&settings),
        tracker: pipeline.tracker.clone(),
        public_url: settings.security.public_url.clone(),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(pipeline.shutdown.draining())
        .await
        .map_err(|err| AppError::from(InfraError::server(format!("server error: {err}"))));

    let outcome = pipeline.shut_down(worker).await;
    signal_listener.abort();

    match outcome {
        DrainOutcome::Idle => match error_logger.await {
            Ok(failures) => info!(failures, "background pipeline stopped"),
            Err(err) => warn!(error = %err, "error logger ended abnormally"),
        },
        // Stuck tasks still hold sink handles, so the logger would never end.
        DrainOutcome::TimedOut { .. } => error_logger.abort(),
    }

    served
}

async fn run_send_test_email(
    settings: config::Settings,
    args: config::TestEmailArgs,
) -> Result<(), AppError> {
    let (pipeline, mut errors, worker) = start_pipeline(&settings)?;

    let message = JobMessage::builder()
        .to(&args.to)
        .subject(&args.subject)
        .data(args.body)
        .build()
        .map_err(|err| AppError::validation(err.to_string()))?;

    info!(recipient = %args.to, "submitting test email");
    pipeline.queue.submit(message).await;

    if let DrainOutcome::TimedOut { outstanding } = pipeline.shut_down(worker).await {
        return Err(AppError::unexpected(format!(
            "test email still in flight after drain timeout ({outstanding} outstanding)"
        )));
    }

    let failures = errors.drain_pending();
    if failures.is_empty() {
        info!(recipient = %args.to, "test email delivered");
        return Ok(());
    }

    for failure in &failures {
        failure.log();
    }
    Err(AppError::unexpected(format!(
        "test email failed at stage {}",
        failures[0].stage
    )))
}
