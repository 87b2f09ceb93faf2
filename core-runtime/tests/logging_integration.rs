//! Integration tests for logging system

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::Arc;

#[test]
fn test_logging_initializes_once() {
    // The global subscriber can only be installed once per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(Arc::new(ConsoleLogger::default()));

    assert!(init_logging(config.clone()).is_ok());
    tracing::info!(target: "core_auth", uid = "u1", "session restored");

    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Failed to initialize logging"));
}

#[test]
fn test_pii_redaction_tokens() {
    assert_eq!(redact_if_sensitive("id_token", "eyJhbGciOi"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "AMf-vBx"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("api_key", "AIzaSy"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("email", "alice@example.com");

    assert!(redacted.starts_with('a'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("uid", "u1"), "u1");
    assert_eq!(redact_if_sensitive("username", "alice"), "alice");
    assert_eq!(redact_if_sensitive("status", "401"), "401");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_filter("core_auth=debug,provider_firebase=trace")
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert_eq!(
        config.filter.as_deref(),
        Some("core_auth=debug,provider_firebase=trace")
    );
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
