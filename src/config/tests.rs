use super::*;

#[test]
fn defaults_match_development_setup() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr, "127.0.0.1:8811".parse().unwrap());
    assert_eq!(settings.mail.host, "localhost");
    assert_eq!(settings.mail.port, 1025);
    assert_eq!(settings.mail.encryption, Encryption::None);
    assert_eq!(settings.mail.from_address, "info@example.com");
    assert_eq!(settings.mail.from_name, "Info");
    assert_eq!(settings.mail.queue_capacity.get(), DEFAULT_QUEUE_CAPACITY);
    assert_eq!(settings.mail.connect_timeout, Duration::from_secs(10));
    assert_eq!(settings.mail.send_timeout, Duration::from_secs(10));
    assert_eq!(settings.storage.scratch_dir, PathBuf::from("tmp"));
    assert_eq!(settings.security.public_url.as_str(), "http://localhost:8811/");
    assert!(settings.security.signing_key.is_none());
    assert!(settings.shutdown.drain_timeout.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.mail.queue_capacity = Some(10);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        mail_queue_capacity: Some(25),
        mail: MailOverrides {
            smtp_port: Some(2525),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.mail.queue_capacity.get(), 25);
    assert_eq!(settings.mail.port, 2525);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.mail.queue_capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "mail.queue_capacity",
            ..
        }
    ));
}

#[test]
fn encryption_aliases_resolve() {
    assert_eq!("none".parse::<Encryption>(), Ok(Encryption::None));
    assert_eq!("TLS".parse::<Encryption>(), Ok(Encryption::StartTls));
    assert_eq!("starttls".parse::<Encryption>(), Ok(Encryption::StartTls));
    assert_eq!("SSL".parse::<Encryption>(), Ok(Encryption::Tls));
    assert!("carrier-pigeon".parse::<Encryption>().is_err());

    let mut raw = RawSettings::default();
    raw.mail.encryption = Some("bogus".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "mail.encryption",
            ..
        })
    ));
}

#[test]
fn drain_timeout_must_be_positive_when_set() {
    let mut raw = RawSettings::default();
    raw.shutdown.drain_timeout_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        drain_timeout_seconds: Some(30),
        ..Default::default()
    };
    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.shutdown.drain_timeout, Some(Duration::from_secs(30)));
}

#[test]
fn public_url_must_parse() {
    let mut raw = RawSettings::default();
    raw.security.public_url = Some("not a url".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "security.public_url",
            ..
        })
    ));
}

#[test]
fn secrets_are_redacted_in_debug_output() {
    let mut raw = RawSettings::default();
    raw.mail.password = Some("hunter2".to_string());
    raw.security.signing_key = Some("s3cret".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");

    let rendered = format!("{settings:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("s3cret"));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["plandesk"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "plandesk",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--smtp-host",
        "mail.internal",
        "--drain-timeout-seconds",
        "15",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.mail.smtp_host.as_deref(),
                Some("mail.internal")
            );
            assert_eq!(serve.overrides.drain_timeout_seconds, Some(15));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_send_test_email_arguments() {
    let args = CliArgs::parse_from([
        "plandesk",
        "send-test-email",
        "--to",
        "me@here.com",
        "--smtp-port",
        "2525",
    ]);

    match args.command.expect("send-test-email command") {
        Command::SendTestEmail(test) => {
            assert_eq!(test.to, "me@here.com");
            assert_eq!(test.subject, "Test email");
            assert_eq!(test.mail.smtp_port, Some(2525));
        }
        _ => panic!("wrong command parsed"),
    }
}
