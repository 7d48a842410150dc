//! Database backed mutual exclusion.
//!
//! Locks live inside the transaction of the scope chain that acquired them
//! and are released by the engine when that transaction ends. They can never
//! outlive their scope.

use std::time::Duration;

use uuid::Uuid;

use crate::{Database, ScopeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Read,
    Write,
}

impl LockType {
    /// Whether holding `self` already grants `requested`.
    pub fn covers(self, requested: LockType) -> bool {
        matches!((self, requested), (LockType::Write, _) | (LockType::Read, LockType::Read))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub name: String,
    pub lock_type: LockType,
    pub timeout: Duration,
}

impl LockRequest {
    pub fn new(name: impl Into<String>, lock_type: LockType, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            lock_type,
            timeout,
        }
    }

    pub fn timed_out(&self) -> ScopeError {
        ScopeError::LockTimeout {
            name: self.name.clone(),
            timeout: self.timeout,
        }
    }
}

/// Engine specific lock primitive.
#[async_trait::async_trait]
pub trait DistributedLockingMechanism: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates whatever the mechanism needs at startup. Runs in its own transaction.
    async fn initialize(&self, db: &mut dyn Database) -> Result<(), ScopeError> {
        let _ = db;
        Ok(())
    }

    /// Blocks until the lock is granted inside `db`'s transaction or
    /// `request.timeout` elapses, in which case it fails with
    /// [`ScopeError::LockTimeout`].
    async fn acquire(&self, db: &mut dyn Database, request: &LockRequest) -> Result<(), ScopeError>;
}

/// Handle on a lock held by a scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedLock {
    pub name: String,
    pub lock_type: LockType,
    pub scope_id: Uuid,
    pub chain_id: Uuid,
    /// The chain already held a covering lock, nothing was sent to the engine.
    pub reentrant: bool,
}

pub mod lock_names {
    pub const MAIN_DOM: &str = "cairn:main-dom";
    pub const KEY_VALUES: &str = "cairn:key-values";

    pub fn migration_plan(plan: &str) -> String {
        format!("cairn:migration-plan:{plan}")
    }
}
