use cairn_core::{DatabaseError, ScopeError};
use cairn_migrator::MigrationError;
use cairn_sql::UnknownProvider;

#[derive(Debug, thiserror::Error)]
pub enum CairnError {
    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] UnknownProvider),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

pub type Result<T, E = CairnError> = std::result::Result<T, E>;
