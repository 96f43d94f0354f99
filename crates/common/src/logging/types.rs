//! Logger settings.

use std::{iter, path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;

const DEFAULT_OTLP_TIMEOUT: Duration = Duration::from_secs(10);

/// Encoding of a log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Rolling log file next to stdout.
#[derive(Debug, Clone)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// e.g. "taskledger" -> "taskledger.2026-01-01"
    pub file_name_prefix: String,
    pub rotation: Rotation,
    pub format: LogFormat,
}

impl FileOutput {
    pub fn daily(directory: PathBuf, file_name_prefix: String, format: LogFormat) -> Self {
        Self {
            directory,
            file_name_prefix,
            rotation: Rotation::DAILY,
            format,
        }
    }
}

/// Span export to an OTLP collector.
#[derive(Debug, Clone)]
pub struct OtlpExport {
    pub endpoint: String,
    pub timeout: Duration,
}

/// Who is logging. Attached as resource attributes to exported spans.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub name: String,
    pub version: Option<String>,
    /// Address the process signs ledger transactions with.
    pub signer: Option<String>,
}

impl ServiceIdentity {
    pub fn resource(&self) -> Resource {
        let optional = [
            ("service.version", self.version.as_ref()),
            ("taskledger.signer", self.signer.as_ref()),
        ];
        let attributes = iter::once(KeyValue::new("service.name", self.name.clone()))
            .chain(
                optional
                    .into_iter()
                    .filter_map(|(key, value)| Some(KeyValue::new(key, value?.clone()))),
            )
            .collect::<Vec<_>>();
        Resource::new(attributes)
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub identity: ServiceIdentity,
    pub stdout_format: LogFormat,
    /// Span lifecycle events written to stdout. CLOSE carries span durations.
    pub span_events: FmtSpan,
    pub file: Option<FileOutput>,
    pub otlp: Option<OtlpExport>,
}

impl LoggerConfig {
    pub fn new(service_name: String) -> Self {
        Self {
            identity: ServiceIdentity {
                name: service_name,
                version: None,
                signer: None,
            },
            stdout_format: LogFormat::Compact,
            span_events: FmtSpan::CLOSE,
            file: None,
            otlp: None,
        }
    }

    pub fn with_service_version(mut self, version: String) -> Self {
        self.identity.version = Some(version);
        self
    }

    pub fn with_signer(mut self, signer: String) -> Self {
        self.identity.signer = Some(signer);
        self
    }

    pub fn with_stdout_format(mut self, format: LogFormat) -> Self {
        self.stdout_format = format;
        self
    }

    pub fn with_file_output(mut self, file: FileOutput) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_otlp_endpoint(mut self, endpoint: String) -> Self {
        self.otlp = Some(OtlpExport {
            endpoint,
            timeout: DEFAULT_OTLP_TIMEOUT,
        });
        self
    }
}
