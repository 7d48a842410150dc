use cairn_core::ScopeError;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// A migration body failed. Its scope was rolled back, nothing it did persists.
    #[error("migration `{name}` failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown migration `{0}`")]
    Unknown(String),

    #[error("invalid migration plan: {0}")]
    InvalidPlan(String),

    /// `migrate_all` needs its own outermost transaction.
    #[error("a scope is already active on this context")]
    AmbientScope,

    #[error("migration run cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Returns `true` if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::Scope(err) if err.is_retryable())
    }

    pub(crate) fn failed(name: &str, source: anyhow::Error) -> Self {
        MigrationError::Failed {
            name: name.to_owned(),
            source,
        }
    }
}

pub type Result<T, E = MigrationError> = std::result::Result<T, E>;
