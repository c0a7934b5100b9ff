use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid parameter '{field}' = {value}: {reason}")]
    InvalidParameterError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No eligible fundamental record for {ticker} in snapshot {snapshot_id}")]
    MissingFundamentalError { ticker: String, snapshot_id: String },

    #[error("No fundamental-bound snapshot for {ticker} under {snapshot_id}")]
    NoFundamentalSnapshotError { ticker: String, snapshot_id: String },

    #[error("Feed record error in {source_name} (line {line}): {message}")]
    FeedRecordError {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Parameter,
    Data,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::IoError(_) => ErrorCategory::Io,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::InvalidParameterError { .. } => ErrorCategory::Parameter,
            EtlError::SerializationError(_)
            | EtlError::CsvError(_)
            | EtlError::MissingFundamentalError { .. }
            | EtlError::NoFundamentalSnapshotError { .. }
            | EtlError::FeedRecordError { .. }
            | EtlError::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    /// Per-row failures are `Low`: the batch carries on without the row.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::MissingFundamentalError { .. }
            | EtlError::NoFundamentalSnapshotError { .. } => ErrorSeverity::Low,
            EtlError::FeedRecordError { .. } | EtlError::CsvError(_) => ErrorSeverity::Medium,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidParameterError { .. }
            | EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. } => ErrorSeverity::High,
            EtlError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// Stable machine-readable code, used when a row failure is reported
    /// instead of raised.
    pub fn code(&self) -> &'static str {
        match self {
            EtlError::IoError(_) => "IO_ERROR",
            EtlError::SerializationError(_) => "SERIALIZATION_ERROR",
            EtlError::CsvError(_) => "CSV_ERROR",
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => "CONFIG_ERROR",
            EtlError::InvalidParameterError { .. } => "INVALID_PARAMETER",
            EtlError::MissingFundamentalError { .. } => "MISSING_FUNDAMENTAL",
            EtlError::NoFundamentalSnapshotError { .. } => "NO_FUNDAMENTAL_SNAPSHOT",
            EtlError::FeedRecordError { .. } => "FEED_RECORD_ERROR",
            EtlError::ProcessingError { .. } => "PROCESSING_ERROR",
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::IoError(_) => {
                "Check that the feed files exist and the output directory is writable".to_string()
            }
            EtlError::SerializationError(_) => {
                "Make sure the baseline file was produced by a previous srim-etl run".to_string()
            }
            EtlError::CsvError(_) | EtlError::FeedRecordError { .. } => {
                "Check the feed CSV headers and that numeric columns hold numbers".to_string()
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => {
                "Review the TOML configuration and command line flags".to_string()
            }
            EtlError::InvalidParameterError { field, .. } => {
                format!("Fix '{}' and rerun; no rows were processed", field)
            }
            EtlError::MissingFundamentalError { .. } => {
                "Load a fundamental record with a period at or before the snapshot".to_string()
            }
            EtlError::NoFundamentalSnapshotError { .. } => {
                "Run a full build for this snapshot before recomputing".to_string()
            }
            EtlError::ProcessingError { .. } => "Rerun with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Parameter => format!("Run aborted before processing: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_failures_are_low_severity() {
        let err = EtlError::MissingFundamentalError {
            ticker: "005930".to_string(),
            snapshot_id: "2026Q1".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.code(), "MISSING_FUNDAMENTAL");
        assert_eq!(err.category(), ErrorCategory::Data);
    }

    #[test]
    fn test_invalid_parameter_is_high_severity() {
        let err = EtlError::InvalidParameterError {
            field: "required_return".to_string(),
            value: "0".to_string(),
            reason: "must be > 0".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().starts_with("Run aborted"));
        assert!(err.recovery_suggestion().contains("required_return"));
    }
}
