//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_key, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.redact_pii);
    assert!(config.logger_sink.is_none());
    assert!(config.filter.is_none());
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
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_invalid_filter_is_config_error() {
    let config = LoggingConfig::default().with_filter("core_offline=[");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

// Only test in this binary that installs the global subscriber.
#[test]
fn test_init_once_and_redaction_toggle() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_pii_redaction(false);

    init_logging(config).unwrap();
    tracing::info!(key = %redact_key("upload-photo-u8812"), "logging initialised");
    assert_eq!(redact_key("upload-photo-u8812"), "upload-photo-u8812");

    let again = init_logging(LoggingConfig::default().with_format(LogFormat::Json));
    assert!(matches!(again, Err(Error::Logging(_))));
}
