//! # tuschel-observability
//!
//! Structured Logging via tracing-subscriber fuer Rendezvous-Server und
//! Node. Beide Binaries teilen den `[logging]`-Abschnitt ihrer
//! Konfiguration ([`LoggingConfig`]).

pub mod logging;

pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat, LoggingConfig,
    LoggingError,
};
