use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RekeyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid identity pair: {0}")]
    InvalidPair(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl RekeyError {
    /// Errors that mean the datastore itself is gone. Everything else is
    /// contained at the rule boundary and recorded against the pair.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, RekeyError>;

impl<T> From<std::sync::PoisonError<T>> for RekeyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_fatal() {
        assert!(RekeyError::Connection("reset by peer".into()).is_fatal());
        assert!(!RekeyError::ConstraintViolation("dup".into()).is_fatal());
        assert!(!RekeyError::TableNotFound("oc_share".into()).is_fatal());
        assert!(!RekeyError::ExecutionError("boom".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = RekeyError::ColumnNotFound("'uid' in table 'oc_vcategory'".into());
        assert_eq!(err.to_string(), "Column not found: 'uid' in table 'oc_vcategory'");
    }
}
