use thiserror::Error;

/// Main error type for gcbench runs.
///
/// Every variant is fatal to the run that produced it: a benchmark that hit
/// one of these has no trustworthy numbers left to report.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("setup failed: {op}: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("workload failed: {op}: {source}")]
    Workload {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("coordination failed: {0}")]
    Coordination(String),

    #[error("telemetry query failed: {query}: {reason}")]
    Telemetry { query: &'static str, reason: String },

    #[error("administrative call failed: {op}: {source}")]
    Admin {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl BenchError {
    pub fn setup(op: &'static str, source: std::io::Error) -> Self {
        BenchError::Setup { op, source }
    }

    pub fn workload(op: &'static str, source: std::io::Error) -> Self {
        BenchError::Workload { op, source }
    }

    pub fn telemetry(query: &'static str, reason: impl Into<String>) -> Self {
        BenchError::Telemetry {
            query,
            reason: reason.into(),
        }
    }

    /// Name of the failing operation, when the error carries one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            BenchError::Setup { op, .. }
            | BenchError::Workload { op, .. }
            | BenchError::Admin { op, .. } => Some(op),
            BenchError::Telemetry { query, .. } => Some(query),
            _ => None,
        }
    }

    /// Get the error code used in JSON diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            BenchError::Setup { .. } => "setup_failure",
            BenchError::Workload { .. } => "workload_failure",
            BenchError::Coordination(_) => "coordination_failure",
            BenchError::Telemetry { .. } => "telemetry_failure",
            BenchError::Admin { .. } => "admin_failure",
            BenchError::Config(_) => "invalid_args",
            BenchError::TomlParse(_) => "invalid_args",
            BenchError::Io(_) => "io_error",
            BenchError::Json(_) => "internal_error",
        }
    }

    /// Get the exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Config(_) | BenchError::TomlParse(_) => 2,
            BenchError::Setup { .. } => 3,
            BenchError::Workload { .. } => 4,
            BenchError::Coordination(_) => 5,
            BenchError::Telemetry { .. } => 6,
            BenchError::Admin { .. } => 7,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
