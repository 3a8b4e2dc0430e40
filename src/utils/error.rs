use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error("Remote system rejected the request: {message}")]
    ProtocolError { message: String },

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        hint: Option<String>,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV output error: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Remote,
    Lookup,
    Input,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconcileError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            hint: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::TransportError { .. } => ErrorCategory::Network,
            Self::ProtocolError { .. } => ErrorCategory::Remote,
            Self::NotFound { .. } => ErrorCategory::Lookup,
            Self::ValidationError { .. } => ErrorCategory::Input,
            Self::IoError(_) | Self::SerializationError(_) | Self::CsvError(_) => {
                ErrorCategory::Local
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Lookup => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Remote | ErrorCategory::Input | ErrorCategory::Local => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 只有傳輸層錯誤（網路中斷、逾時）值得由呼叫端重試
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ConfigError { .. } | Self::MissingConfigError { .. } => {
                "Check the config file and make sure every ${VAR} it references is exported"
                    .to_string()
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in the config file", field)
            }
            Self::TransportError { .. } => {
                "The remote service did not answer in time; retry in a moment (use --retries)"
                    .to_string()
            }
            Self::ProtocolError { .. } => {
                "The remote service rejected the request; check credentials and filter values"
                    .to_string()
            }
            Self::NotFound { hint, .. } => hint
                .clone()
                .unwrap_or_else(|| "Double-check the identifier and try again".to_string()),
            Self::ValidationError { .. } => {
                "Correct the supplied identifiers or field names and try again".to_string()
            }
            Self::IoError(_) => "Check file paths and permissions".to_string(),
            Self::SerializationError(_) | Self::CsvError(_) => {
                "Check that the supplied data is well-formed".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NotFound { message, .. } => message.clone(),
            Self::TransportError { .. } => {
                format!("Could not reach a remote service: {}", self)
            }
            _ => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for ReconcileError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport("request timed out")
        } else if err.is_decode() {
            Self::protocol(format!("unreadable response body: {}", err))
        } else {
            Self::transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
