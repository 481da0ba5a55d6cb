//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable, die Vorrang vor der
//! Konfigurationsdatei hat:
//! - `TU_LOG_LEVEL`: Filter (z.B. `debug` oder `tuschel_mesh=trace,info`), Standard: info
//! - `TU_LOG_FORMAT`: Format (text/json), Standard: text

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "TU_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "TU_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(LoggingError::UngueltigesFormat(andere.to_string())),
        }
    }
}

/// `[logging]`-Abschnitt der Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

/// Fehler beim Einrichten des Loggings
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Ungueltiger Log-Filter '{0}'")]
    UngueltigerFilter(String),

    #[error("Ungueltiges Log-Format '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

/// Initialisiert das Logging-System
///
/// `TU_LOG_LEVEL` und `TU_LOG_FORMAT` ueberschreiben die Werte aus
/// `config`. Darf pro Prozess nur einmal aufgerufen werden.
pub fn logging_initialisieren(config: &LoggingConfig) -> Result<(), LoggingError> {
    let level = wert_waehlen(std::env::var(ENV_LOG_LEVEL).ok(), &config.level);
    let format = match std::env::var(ENV_LOG_FORMAT).ok() {
        Some(aus_env) => aus_env.parse()?,
        None => config.format,
    };

    let filter =
        EnvFilter::try_new(&level).map_err(|_| LoggingError::UngueltigerFilter(level.clone()))?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|_| LoggingError::BereitsInitialisiert)
}

/// Wert aus der Umgebung hat Vorrang, leere Werte zaehlen nicht
fn wert_waehlen(aus_env: Option<String>, aus_config: &str) -> String {
    match aus_env {
        Some(wert) if !wert.trim().is_empty() => wert,
        _ => aus_config.to_string(),
    }
}

/// Validiert ob ein Log-Level-String gueltig ist
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
