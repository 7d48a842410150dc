use std::time::Duration;

use uuid::Uuid;

/// Failures raised by the underlying connection or statement execution.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The connection could not be opened or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The engine rejected a statement.
    #[error("statement failed: {message}")]
    Statement {
        code: Option<String>,
        message: String,
    },

    #[error("decode: {0}")]
    Decode(String),

    /// The engine did not admit a transaction within the allowed wait.
    #[error("database busy, gave up after {0:?}")]
    Busy(Duration),
}

impl DatabaseError {
    pub fn code(&self) -> Option<&str> {
        match self {
            DatabaseError::Statement { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Raised when a dialect cannot express a definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialectError {
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: String,
    },

    #[error("invalid definition: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    /// The distributed lock could not be acquired before the timeout elapsed.
    #[error("timed out after {timeout:?} waiting for lock `{name}`")]
    LockTimeout { name: String, timeout: Duration },

    /// Scopes were used against their contract (out of order dispose, bad detach...).
    #[error("scope contract violated: {0}")]
    Contract(String),

    #[error("scope {0} is disposed")]
    Disposed(Uuid),
}

impl ScopeError {
    /// Returns `true` if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScopeError::LockTimeout { .. } | ScopeError::Database(DatabaseError::Busy(_))
        )
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        ScopeError::Contract(message.into())
    }
}

pub type Result<T, E = ScopeError> = std::result::Result<T, E>;
