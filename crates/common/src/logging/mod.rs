//! Logging setup: console output, optional rolling file, optional OTLP export.

pub mod manager;
pub mod types;


pub use manager::{finalize, init, LoggingInitError};
pub use types::{FileOutput, LogFormat, LoggerConfig, OtlpExport, ServiceIdentity};

/// Appends an optional deployment label to a service name.
pub fn format_service_name(base: &str, label: Option<&str>) -> String {
    label.map_or_else(|| base.to_owned(), |label| format!("{base}%{label}"))
}
