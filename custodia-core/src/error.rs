use thiserror::Error;

pub type CustodiaResult<T> = Result<T, CustodiaError>;

/// Engine error taxonomy. Decision outcomes are inspectable values, never
/// control-flow interrupts; internal failures carry detail for the audit
/// channel, not for end users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodiaError {
    #[error("Subject not found: {0}")]
    NotFound(String),

    #[error("Access denied: {reason}")]
    AccessDenied {
        reason: String,
        additional_consent_required: bool,
    },

    #[error("Consent required for purpose '{purpose}'")]
    ConsentRequired { purpose: String },

    #[error("Deletion blocked by retention policy: {0}")]
    RetentionBlocked(String),

    #[error("Encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("Decryption failure: {0}")]
    DecryptionFailure(String),

    #[error("Compliance violation: {reason}")]
    ComplianceViolation { reason: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Request deadline exceeded")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CustodiaError {
    /// Denials surface their reason; internal failures surface a generic
    /// message while the detail stays in the audit/alert channel.
    pub fn user_message(&self) -> String {
        match self {
            CustodiaError::AccessDenied { reason, .. } => format!("Access denied: {}", reason),
            CustodiaError::ConsentRequired { purpose } => {
                format!("Consent required for purpose '{}'", purpose)
            }
            CustodiaError::NotFound(id) => format!("Subject not found: {}", id),
            CustodiaError::RetentionBlocked(reason) => {
                format!("Deletion blocked by retention policy: {}", reason)
            }
            CustodiaError::Timeout => "Request deadline exceeded".into(),
            CustodiaError::ComplianceViolation { reason } => {
                format!("Compliance violation: {}", reason)
            }
            _ => "Internal processing failure".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_failures_are_opaque_to_users() {
        let err = CustodiaError::EncryptionFailure("no key for tier Critical".into());
        assert_eq!(err.user_message(), "Internal processing failure");
        let err = CustodiaError::StorageUnavailable("connection pool exhausted".into());
        assert_eq!(err.user_message(), "Internal processing failure");
    }

    #[test]
    fn test_denials_surface_reason() {
        let err = CustodiaError::AccessDenied {
            reason: "purpose not permitted".into(),
            additional_consent_required: false,
        };
        assert!(err.user_message().contains("purpose not permitted"));
    }
}
