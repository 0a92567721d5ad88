use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const QUIET_TARGETS: [&str; 2] = ["lettre=warn", "hyper=warn"];

/// Install a global tracing subscriber using the provided logging settings.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    // Quiet SMTP and HTTP internals unless RUST_LOG says otherwise.
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_TARGETS {
            let directive = directive.parse().map_err(|err| {
                InfraError::telemetry(format!("invalid filter directive `{directive}`: {err}"))
            })?;
            env_filter = env_filter.add_directive(directive);
        }
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "plandesk_mail_delivered_total",
            Unit::Count,
            "Total number of mails handed to the SMTP server."
        );
        describe_counter!(
            "plandesk_mail_failed_total",
            Unit::Count,
            "Total number of mail delivery attempts that failed, by stage."
        );
        describe_counter!(
            "plandesk_background_tasks_total",
            Unit::Count,
            "Total number of background tasks launched from request handlers."
        );
        describe_counter!(
            "plandesk_pipeline_errors_total",
            Unit::Count,
            "Total number of failures reported to the error sink, by stage."
        );
        describe_gauge!(
            "plandesk_pipeline_outstanding",
            Unit::Count,
            "Background units registered with the completion tracker."
        );
    });
}
