// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

const FULL: &str = r#"
[lock]
key = "svc/lock"
value = "node-1"
retry_interval = "2s"

[consul]
address = "http://consul:8500"
session_name = "svc"
ttl = "30s"
lock_delay = "1s"

[log]
level = "debug"
file = "/var/log/wardend.log"

[metrics]
listen = "127.0.0.1:9100"
"#;

fn parse(text: &str) -> FileConfig {
    FileConfig::parse(text, Path::new("warden.toml")).unwrap()
}

#[test]
fn full_file_is_resolved() {
    let settings = resolve(parse(FULL), Overrides::default()).unwrap();

    assert_eq!(settings.lock.identity.key(), "svc/lock");
    assert_eq!(settings.lock.identity.value(), b"node-1");
    assert_eq!(settings.lock.retry_interval, Duration::from_secs(2));
    assert_eq!(settings.consul.address, "http://consul:8500");
    assert_eq!(settings.consul.session_name, "svc");
    assert_eq!(settings.consul.ttl, Duration::from_secs(30));
    assert_eq!(settings.consul.lock_delay, Duration::from_secs(1));
    assert_eq!(settings.log_level, "debug");
    assert_eq!(
        settings.log_file,
        Some(PathBuf::from("/var/log/wardend.log"))
    );
    assert_eq!(
        settings.metrics_listen,
        Some("127.0.0.1:9100".parse().unwrap())
    );
}

#[test]
fn flags_override_the_file() {
    let overrides = Overrides {
        key: Some("other/lock".to_string()),
        retry_interval: Some(Duration::from_secs(9)),
        ttl: Some(Duration::from_secs(60)),
        log_level: Some("warn".to_string()),
        ..Overrides::default()
    };

    let settings = resolve(parse(FULL), overrides).unwrap();

    assert_eq!(settings.lock.identity.key(), "other/lock");
    assert_eq!(settings.lock.identity.value(), b"node-1");
    assert_eq!(settings.lock.retry_interval, Duration::from_secs(9));
    assert_eq!(settings.consul.ttl, Duration::from_secs(60));
    assert_eq!(settings.consul.address, "http://consul:8500");
    assert_eq!(settings.log_level, "warn");
}

#[test]
fn defaults_apply_when_only_key_is_given() {
    let overrides = Overrides {
        key: Some("svc/lock".to_string()),
        ..Overrides::default()
    };

    let settings = resolve(FileConfig::default(), overrides).unwrap();

    assert_eq!(settings.lock.retry_interval, DEFAULT_RETRY_INTERVAL);
    assert_eq!(settings.consul.address, DEFAULT_CONSUL_ADDRESS);
    assert_eq!(settings.log_level, DEFAULT_LOG_LEVEL);
    assert_eq!(settings.log_file, None);
    assert_eq!(settings.metrics_listen, None);
}

#[test]
fn default_value_is_unique_per_process() {
    let overrides = Overrides {
        key: Some("svc/lock".to_string()),
        ..Overrides::default()
    };

    let first = resolve(FileConfig::default(), overrides.clone()).unwrap();
    let second = resolve(FileConfig::default(), overrides).unwrap();

    let value = first.lock.identity.value_lossy().into_owned();
    assert!(value.len() > 36, "expected <host>-<uuid>, got {}", value);
    assert_ne!(first.lock.identity.value(), second.lock.identity.value());
}

#[test]
fn missing_key_is_rejected() {
    let err = resolve(FileConfig::default(), Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingKey));
}

#[test]
fn blank_key_is_rejected() {
    let err = resolve(parse("[lock]\nkey = \"  \"\n"), Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingKey));
}

#[test]
fn zero_retry_interval_is_rejected() {
    let file = parse("[lock]\nkey = \"svc/lock\"\nretry_interval = \"0s\"\n");
    let err = resolve(file, Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRetryInterval));
}

#[test]
fn out_of_range_ttl_is_rejected() {
    let file = parse("[lock]\nkey = \"svc/lock\"\n[consul]\nttl = \"5s\"\n");
    let err = resolve(file, Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Consul(msg) if msg.contains("ttl")));
}

#[test]
fn unknown_fields_are_rejected() {
    let err = FileConfig::parse("[lock]\nkye = \"typo\"\n", Path::new("warden.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("warden.toml"));
}

#[test]
fn malformed_duration_is_rejected() {
    let err = FileConfig::parse(
        "[lock]\nretry_interval = \"soon\"\n",
        Path::new("warden.toml"),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn load_reads_an_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let settings = load(Some(file.path()), Overrides::default()).unwrap();

    assert_eq!(settings.lock.identity.key(), "svc/lock");
}

#[test]
fn load_reports_missing_explicit_file() {
    let err = load(
        Some(Path::new("/nonexistent/warden.toml")),
        Overrides::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
