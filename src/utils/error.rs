use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Malformed input in {source_name}: {message}")]
    MalformedInput { source_name: String, message: String },

    #[error("Transient I/O failure during {operation}: {message}")]
    TransientIo { operation: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("API request to {operation} failed with status {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Load job {job_id} failed: {message}")]
    LoadJob { job_id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Data,
    Network,
    Configuration,
    Authentication,
    Warehouse,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::TransientIo {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn auth(message: impl ToString) -> Self {
        Self::Auth {
            message: message.to_string(),
        }
    }

    /// Whether a task failing with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientIo { .. } => true,
            Self::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Source,
            Self::MalformedInput { .. } | Self::Csv(_) => ErrorCategory::Data,
            Self::TransientIo { .. } | Self::Api { .. } => ErrorCategory::Network,
            Self::Configuration { .. }
            | Self::MissingConfig { .. }
            | Self::InvalidConfigValue { .. } => ErrorCategory::Configuration,
            Self::Auth { .. } => ErrorCategory::Authentication,
            Self::LoadJob { .. } => ErrorCategory::Warehouse,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Source | ErrorCategory::Data | ErrorCategory::Warehouse => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration
            | ErrorCategory::Authentication
            | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Source => {
                "Check that the file exists in the Drive folder and is not in the trash"
            }
            ErrorCategory::Data => "Inspect the source file; it could not be read as CSV text",
            ErrorCategory::Network => "Retry later; the remote service may be temporarily unavailable",
            ErrorCategory::Configuration => {
                "Set GCS_BUCKET_NAME, GDRIVE_FOLDER_ID and GCP_PROJECT_ID and check the config file"
            }
            ErrorCategory::Authentication => {
                "Verify the service account secret and the ambient credentials' permissions"
            }
            ErrorCategory::Warehouse => {
                "Inspect the BigQuery job errors; the staged file may not match the table schema"
            }
            ErrorCategory::System => "Check local disk and permissions",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NotFound { what } => format!("Could not find {}", what),
            Self::MissingConfig { field } => format!("{} is not set", field),
            Self::LoadJob { job_id, .. } => format!("BigQuery load job {} failed", job_id),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
