use cairn_core::{
    Database, DatabaseError, DistributedLockingMechanism, LockRequest, LockType, ScopeError,
    Statement,
};
use tracing::debug;

use super::{has_code, timeout_millis};

// lock_not_available
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Transaction scoped advisory locks keyed by `hashtext(name)`.
///
/// Read locks use the shared variant so readers only exclude writers.
/// The wait is bounded with `SET LOCAL lock_timeout`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDistributedLocking;

impl PostgresDistributedLocking {
    fn lock_statement(request: &LockRequest) -> Statement {
        let function = match request.lock_type {
            LockType::Write => "pg_advisory_xact_lock",
            LockType::Read => "pg_advisory_xact_lock_shared",
        };

        Statement::new(format!("SELECT {function}(hashtext($1))")).bind(request.name.as_str())
    }

    fn is_timeout(err: &DatabaseError) -> bool {
        has_code(err, &[LOCK_NOT_AVAILABLE])
    }
}

#[async_trait::async_trait]
impl DistributedLockingMechanism for PostgresDistributedLocking {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn acquire(&self, db: &mut dyn Database, request: &LockRequest) -> Result<(), ScopeError> {
        db.execute(&Statement::new(format!(
            "SET LOCAL lock_timeout = {}",
            timeout_millis(request.timeout)
        )))
        .await?;

        // The advisory lock functions return void, which cannot be decoded.
        match db.execute(&Self::lock_statement(request)).await {
            Ok(_) => {}
            Err(err) if Self::is_timeout(&err) => {
                debug!(lock = %request.name, error = %err, "postgres lock timed out");
                return Err(request.timed_out());
            }
            Err(err) => return Err(err.into()),
        }

        db.execute(&Statement::new("SET LOCAL lock_timeout TO DEFAULT"))
            .await?;

        Ok(())
    }
}
