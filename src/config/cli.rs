use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the plandesk binary.
#[derive(Debug, Parser)]
#[command(name = "plandesk", version, about = "Membership server with tracked background mail")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PLANDESK_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server and the background pipeline.
    Serve(Box<ServeArgs>),
    /// Push one message through the mail pipeline and wait for the outcome.
    #[command(name = "send-test-email")]
    SendTestEmail(TestEmailArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MailOverrides {
    /// Override the SMTP host.
    #[arg(long = "smtp-host", value_name = "HOST")]
    pub smtp_host: Option<String>,

    /// Override the SMTP port.
    #[arg(long = "smtp-port", value_name = "PORT")]
    pub smtp_port: Option<u16>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub mail: MailOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the mail queue capacity.
    #[arg(long = "mail-queue-capacity", value_name = "COUNT")]
    pub mail_queue_capacity: Option<usize>,

    /// Override the scratch directory for generated documents.
    #[arg(long = "scratch-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub scratch_dir: Option<PathBuf>,

    /// Give up waiting for background work after this many seconds.
    #[arg(long = "drain-timeout-seconds", value_name = "SECONDS")]
    pub drain_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct TestEmailArgs {
    #[command(flatten)]
    pub mail: MailOverrides,

    /// Recipient address.
    #[arg(long, value_name = "ADDRESS")]
    pub to: String,

    /// Subject line.
    #[arg(long, default_value = "Test email", value_name = "TEXT")]
    pub subject: String,

    /// Body passed to the generic template.
    #[arg(long, default_value = "Hello, world.", value_name = "TEXT")]
    pub body: String,
}
