//! Error types for scadasim-core

use scadasim_rdbc::ErrorCategory;
use std::fmt;
use thiserror::Error;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Run-level error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad connection descriptor or settings
    Configuration,
    /// Run parameters out of range
    Validation,
    /// Table shape does not match the data-logger contract
    Schema,
    /// Connection, statement or transaction failure
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration error"),
            Self::Validation => write!(f, "validation error"),
            Self::Schema => write!(f, "schema error"),
            Self::Execution => write!(f, "execution error"),
        }
    }
}

/// Simulation error
///
/// Every variant is terminal for the run that raised it.
#[derive(Error, Debug)]
pub enum SimError {
    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
        /// Underlying database error
        #[source]
        source: Option<scadasim_rdbc::Error>,
    },

    /// Validation error
    #[error("validation error: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Schema error
    #[error("schema error: {message}")]
    Schema {
        /// Error message
        message: String,
        /// Underlying database error
        #[source]
        source: Option<scadasim_rdbc::Error>,
    },

    /// Execution error
    #[error("execution error: {message}")]
    Execution {
        /// Error message
        message: String,
        /// Underlying database error
        #[source]
        source: Option<scadasim_rdbc::Error>,
    },
}

impl SimError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            source: None,
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// The error message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message, .. }
            | Self::Validation { message }
            | Self::Schema { message, .. }
            | Self::Execution { message, .. } => message,
        }
    }
}

impl From<scadasim_rdbc::Error> for SimError {
    fn from(err: scadasim_rdbc::Error) -> Self {
        let category = err.category();
        let message = err.detail();
        let source = Some(err);
        match category {
            ErrorCategory::Configuration => Self::Configuration { message, source },
            ErrorCategory::Schema => Self::Schema { message, source },
            _ => Self::Execution { message, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdbc_errors_convert_by_category() {
        let err: SimError = scadasim_rdbc::Error::config("no provider").into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "configuration error: no provider");

        let err: SimError = scadasim_rdbc::Error::table_not_found("ANA").into();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("ANA"));

        for rdbc in [
            scadasim_rdbc::Error::connection("refused"),
            scadasim_rdbc::Error::query("syntax"),
            scadasim_rdbc::Error::transaction("deadlock"),
            scadasim_rdbc::Error::type_conversion("overflow"),
        ] {
            let err: SimError = rdbc.into();
            assert_eq!(err.kind(), ErrorKind::Execution);
        }
    }

    #[test]
    fn test_source_is_kept() {
        use std::error::Error as _;

        let err: SimError = scadasim_rdbc::Error::query_with_sql("boom", "INSERT").into();
        assert!(err.source().is_some());
        assert!(SimError::validation("x").source().is_none());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Validation.to_string(), "validation error");
        assert_eq!(SimError::schema("missing _A_Q").message(), "missing _A_Q");
    }
}
