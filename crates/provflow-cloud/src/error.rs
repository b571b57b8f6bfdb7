//! Reconciliation error types

use thiserror::Error;

/// Provider error codes that indicate a transient condition worth retrying
const TRANSIENT_CODES: &[&str] = &["ServiceUnavailable", "InternalError", "InternalError.Unknown"];

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration for {entry}: {message}")]
    InvalidConfig { entry: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous match: {0}")]
    AmbiguousMatch(String),

    #[error("Provider error [{code}]: {message}")]
    Provider { code: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Environment function failed: {0}")]
    EnvFunction(String),

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Configuration error naming the offending declared entry
    pub fn invalid(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Provider error code, if this error came from the provider
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// Throttling, 5xx-style provider failures and IO failures reaching the provider
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { code, .. } => {
                code.starts_with("Throttling") || TRANSIENT_CODES.contains(&code.as_str())
            }
            Self::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_code() {
        let err = CloudError::provider("DomainExist", "rule domain exists");
        assert_eq!(err.code(), Some("DomainExist"));
        assert!(err.is_code("DomainExist"));
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Provider error [DomainExist]: rule domain exists"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(CloudError::provider("Throttling.User", "slow down").is_transient());
        assert!(CloudError::provider("ServiceUnavailable", "").is_transient());
        assert!(!CloudError::NotFound("vpc".into()).is_transient());
        assert!(CloudError::Io(std::io::Error::other("broken pipe")).is_transient());
    }

    #[test]
    fn test_invalid_names_entry() {
        let err = CloudError::invalid("vswitch web", "vpc-name is empty");
        assert!(err.to_string().contains("vswitch web"));
    }
}
