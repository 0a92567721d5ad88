//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, MailOverrides, ServeArgs, ServeOverrides, TestEmailArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "plandesk";
const ENV_PREFIX: &str = "PLANDESK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8811;
const DEFAULT_SMTP_HOST: &str = "localhost";
const DEFAULT_SMTP_PORT: u16 = 1025;
const DEFAULT_FROM_ADDRESS: &str = "info@example.com";
const DEFAULT_FROM_NAME: &str = "Info";
const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SCRATCH_DIR: &str = "tmp";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:8811";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub mail: MailSettings,
    pub storage: StorageSettings,
    pub security: SecuritySettings,
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Plain text. Development servers only.
    None,
    /// Upgrade with STARTTLS.
    StartTls,
    /// Implicit TLS from the first byte.
    Tls,
}

impl FromStr for Encryption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Encryption::None),
            "tls" | "starttls" => Ok(Encryption::StartTls),
            "ssl" => Ok(Encryption::Tls),
            other => Err(format!(
                "unknown encryption `{other}` (expected none, tls, starttls or ssl)"
            )),
        }
    }
}

#[derive(Clone)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: Encryption,
    pub from_address: String,
    pub from_name: String,
    pub queue_capacity: NonZeroUsize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("encryption", &self.encryption)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("queue_capacity", &self.queue_capacity)
            .field("connect_timeout", &self.connect_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub scratch_dir: PathBuf,
}

#[derive(Clone)]
pub struct SecuritySettings {
    /// Key for activation links. `None` means a per-process key.
    pub signing_key: Option<String>,
    pub public_url: Url,
}

impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("public_url", &self.public_url.as_str())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSettings {
    /// Upper bound on the drain wait; unbounded when `None`.
    pub drain_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::SendTestEmail(args)) => raw.apply_mail_overrides(&args.mail),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    mail: RawMailSettings,
    storage: RawStorageSettings,
    security: RawSecuritySettings,
    shutdown: RawShutdownSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(capacity) = overrides.mail_queue_capacity {
            self.mail.queue_capacity = Some(capacity);
        }
        if let Some(dir) = overrides.scratch_dir.as_ref() {
            self.storage.scratch_dir = Some(dir.clone());
        }
        if let Some(seconds) = overrides.drain_timeout_seconds {
            self.shutdown.drain_timeout_seconds = Some(seconds);
        }

        self.apply_mail_overrides(&overrides.mail);
    }

    fn apply_mail_overrides(&mut self, overrides: &MailOverrides) {
        if let Some(host) = overrides.smtp_host.as_ref() {
            self.mail.host = Some(host.clone());
        }
        if let Some(port) = overrides.smtp_port {
            self.mail.port = Some(port);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            mail,
            storage,
            security,
            shutdown,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            mail: build_mail_settings(mail)?,
            storage: build_storage_settings(storage)?,
            security: build_security_settings(security)?,
            shutdown: build_shutdown_settings(shutdown)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let host = non_empty(mail.host).unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string());
    let port = mail.port.unwrap_or(DEFAULT_SMTP_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "mail.port",
            "port must be greater than zero",
        ));
    }

    let encryption = match non_empty(mail.encryption) {
        Some(value) => value
            .parse()
            .map_err(|reason: String| LoadError::invalid("mail.encryption", reason))?,
        None => Encryption::None,
    };

    let from_address =
        non_empty(mail.from_address).unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string());
    if !from_address.contains('@') {
        return Err(LoadError::invalid(
            "mail.from_address",
            format!("`{from_address}` is not an email address"),
        ));
    }
    let from_name = non_empty(mail.from_name).unwrap_or_else(|| DEFAULT_FROM_NAME.to_string());

    let queue_capacity = NonZeroUsize::new(mail.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("mail.queue_capacity", "must be greater than zero"))?;

    let connect_timeout = positive_seconds(
        mail.connect_timeout_seconds
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        "mail.connect_timeout_seconds",
    )?;
    let send_timeout = positive_seconds(
        mail.send_timeout_seconds.unwrap_or(DEFAULT_SEND_TIMEOUT_SECS),
        "mail.send_timeout_seconds",
    )?;

    Ok(MailSettings {
        host,
        port,
        username: non_empty(mail.username),
        password: mail.password.filter(|value| !value.is_empty()),
        encryption,
        from_address,
        from_name,
        queue_capacity,
        connect_timeout,
        send_timeout,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let scratch_dir = storage
        .scratch_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));
    if scratch_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.scratch_dir",
            "path must not be empty",
        ));
    }

    Ok(StorageSettings { scratch_dir })
}

fn build_security_settings(security: RawSecuritySettings) -> Result<SecuritySettings, LoadError> {
    let raw_url =
        non_empty(security.public_url).unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
    let public_url = Url::parse(&raw_url).map_err(|err| {
        LoadError::invalid("security.public_url", format!("`{raw_url}`: {err}"))
    })?;
    if public_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "security.public_url",
            format!("`{raw_url}` cannot be used as a base URL"),
        ));
    }

    Ok(SecuritySettings {
        signing_key: security.signing_key.filter(|key| !key.is_empty()),
        public_url,
    })
}

fn build_shutdown_settings(shutdown: RawShutdownSettings) -> Result<ShutdownSettings, LoadError> {
    let drain_timeout = shutdown
        .drain_timeout_seconds
        .map(|seconds| positive_seconds(seconds, "shutdown.drain_timeout_seconds"))
        .transpose()?;

    Ok(ShutdownSettings { drain_timeout })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    encryption: Option<String>,
    from_address: Option<String>,
    from_name: Option<String>,
    queue_capacity: Option<usize>,
    connect_timeout_seconds: Option<u64>,
    send_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSecuritySettings {
    signing_key: Option<String>,
    public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShutdownSettings {
    drain_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
