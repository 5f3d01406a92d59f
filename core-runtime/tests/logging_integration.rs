//! Integration tests for the runtime logging surface.

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, LogFormat, LoggingConfig, TaggedLogger,
};
use std::sync::Arc;

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_stderr(true)
        .with_logger_sink(Arc::new(ConsoleLogger::default()));

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    TaggedLogger::component("Main").child("Local").info("logging initialised");
}

#[test]
fn test_worker_tags_are_distinct() {
    let main = TaggedLogger::component("Main");
    let workers: Vec<_> = (0..3)
        .map(|i| TaggedLogger::component(format!("Worker-{}", i)))
        .collect();

    assert_eq!(workers[2].tag(), "PhotoSync:Worker-2");
    assert!(workers.iter().all(|w| w != &main));
}

#[test]
fn test_credentials_are_redacted() {
    for field in ["token", "secret_access_key", "session_token", "authorization"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]");
    }
    assert_eq!(redact_if_sensitive("storage_key", "2024/a.jpg"), "2024/a.jpg");
}
