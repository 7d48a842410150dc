//! Units of work.
//!
//! A [`Scope`] wraps one logical transaction. Scopes created while another
//! scope is ambient join its chain: they share the outermost scope's
//! transaction and only record a completion vote. The outermost scope makes
//! the physical decision when it is disposed, committing only if it and every
//! inner scope completed.
//!
//! ```rust,ignore
//! let ctx = ScopeContext::new();
//!
//! let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
//! let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;
//! inner.execute(&statement).await?;
//! inner.complete();
//! inner.dispose().await?; // Deferred { completed: true }
//!
//! outer.complete();
//! outer.dispose().await?; // Committed
//! ```

mod chain;
mod context;
mod provider;

pub use context::ScopeContext;
pub use provider::{ScopeOptions, ScopeProvider, ScopeProviderOptions};

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    CacheView, DistributedLock, ExistsCheck, IsolationLevel, LockRequest, LockType, Notification,
    RepositoryCacheMode, Result, Row, ScopeError, SqlDialect, Statement,
};

use chain::ScopeChain;
use context::Frame;

/// What disposing a scope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// An inner scope recorded its vote, the outermost scope decides.
    Deferred { completed: bool },
    Committed,
    RolledBack,
    AlreadyDisposed,
}

pub struct Scope {
    id: Uuid,
    parent_id: Option<Uuid>,
    depth: usize,
    chain: Arc<ScopeChain>,
    cache_mode: RepositoryCacheMode,
    isolation_level: IsolationLevel,
    scope_file_systems: bool,
    auto_complete: bool,
    detachable: bool,
    context: Option<ScopeContext>,
    completed: Option<bool>,
    disposed: bool,
}

impl Scope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// `0` for the outermost scope of a chain.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn chain_id(&self) -> Uuid {
        self.chain.id
    }

    pub fn cache_mode(&self) -> RepositoryCacheMode {
        self.cache_mode
    }

    /// The level this scope asked for or inherited. Never `Unspecified`.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// The level the chain's transaction is opened with.
    pub fn transaction_isolation_level(&self) -> IsolationLevel {
        self.chain.isolation_level
    }

    pub fn scope_file_systems(&self) -> bool {
        self.scope_file_systems
    }

    pub fn is_detachable(&self) -> bool {
        self.detachable
    }

    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    /// `None` until the scope votes or is disposed. `Some(false)` once it
    /// was disposed without completing.
    pub fn completed(&self) -> Option<bool> {
        self.completed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.chain.dialect.clone()
    }

    /// The cache repositories should use while this scope is active.
    pub fn cache(&self) -> CacheView {
        match self.cache_mode {
            RepositoryCacheMode::None => CacheView::global(self.chain.app_cache.clone()),
            _ => CacheView::isolated(self.chain.app_cache.clone(), self.chain.shadow.clone()),
        }
    }

    /// Votes for commit. Returns the recorded vote.
    pub fn complete(&mut self) -> bool {
        if !self.disposed && self.completed.is_none() {
            self.completed = Some(true);
        }

        self.completed == Some(true)
    }

    pub async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.ensure_active()?;

        let mut guard = self.chain.database(None).await?;
        let db = guard
            .as_deref_mut()
            .ok_or_else(|| ScopeError::contract("transaction vanished"))?;

        tracing::trace!(scope_id = %self.id, sql = %statement, "execute");
        Ok(db.execute(statement).await?)
    }

    /// Runs statements in order on the chain's connection.
    pub async fn execute_all(&self, statements: &[Statement]) -> Result<u64> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute(statement).await?;
        }

        Ok(affected)
    }

    pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
        self.ensure_active()?;

        let mut guard = self.chain.database(None).await?;
        let db = guard
            .as_deref_mut()
            .ok_or_else(|| ScopeError::contract("transaction vanished"))?;

        tracing::trace!(scope_id = %self.id, sql = %statement, "fetch");
        Ok(db.fetch_all(statement).await?)
    }

    pub async fn exists(&self, check: &ExistsCheck) -> Result<bool> {
        let statement = self.chain.dialect.exists(check)?;
        let rows = self.fetch_all(&statement).await?;
        let count = match rows.first() {
            Some(row) => row.try_i64(0)?,
            None => 0,
        };

        Ok(count > 0)
    }

    /// Queues read locks, acquired when the transaction starts.
    pub fn read_lock(&self, names: &[&str]) -> Result<()> {
        self.queue_locks(names, LockType::Read, None)
    }

    /// Queues write locks, acquired when the transaction starts.
    pub fn write_lock(&self, names: &[&str]) -> Result<()> {
        self.queue_locks(names, LockType::Write, None)
    }

    pub fn queue_lock(&self, name: &str, lock_type: LockType, timeout: Duration) -> Result<()> {
        self.queue_locks(&[name], lock_type, Some(timeout))
    }

    fn queue_locks(&self, names: &[&str], lock_type: LockType, timeout: Option<Duration>) -> Result<()> {
        self.ensure_active()?;

        let timeout = timeout.unwrap_or(self.chain.default_lock_timeout);
        for name in names {
            self.chain
                .queue_lock(self.id, LockRequest::new(*name, lock_type, timeout));
        }

        Ok(())
    }

    /// Acquires a lock now, starting the transaction if needed.
    ///
    /// Reentrant within the chain: a lock already held by this or any other
    /// scope of the chain is granted without asking the engine again.
    pub async fn acquire_lock(
        &self,
        name: impl Into<String>,
        lock_type: LockType,
        timeout: Option<Duration>,
    ) -> Result<DistributedLock> {
        self.ensure_active()?;

        let request = LockRequest::new(
            name,
            lock_type,
            timeout.unwrap_or(self.chain.default_lock_timeout),
        );

        let mut guard = self.chain.database(Some(&request)).await?;
        let db = guard
            .as_deref_mut()
            .ok_or_else(|| ScopeError::contract("transaction vanished"))?;
        let reentrant = self.chain.acquire_with(db, self.id, &request).await?;

        Ok(DistributedLock {
            name: request.name,
            lock_type,
            scope_id: self.id,
            chain_id: self.chain.id,
            reentrant,
        })
    }

    /// How many times this scope asked for `name`.
    pub fn lock_count(&self, name: &str) -> usize {
        self.chain.lock_count(self.id, name)
    }

    /// The strongest lock the chain holds on `name`.
    pub fn held_lock(&self, name: &str) -> Option<LockType> {
        self.chain.held_lock(name)
    }

    /// Registers an action to run once the outermost scope has committed or
    /// rolled back. It receives `true` on commit. Returns `false` when an
    /// action with the same key is already enlisted.
    pub fn enlist<F>(&self, key: impl Into<String>, priority: i32, action: F) -> Result<bool>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.ensure_active()?;
        Ok(self.chain.enlist(key.into(), priority, Box::new(action)))
    }

    /// Queues a notification on the chain. It is published once the
    /// outermost scope commits and dropped if the chain rolls back.
    pub fn notify<T>(&self, notification: T) -> Result<()>
    where
        T: std::any::Any + Send + Sync,
    {
        self.ensure_active()?;
        self.chain.notify(Notification::new(notification));
        Ok(())
    }

    /// Notifications queued on the chain and not yet published.
    pub fn pending_notifications(&self) -> usize {
        self.chain.pending_notifications()
    }

    /// Ends the scope. Must be the ambient scope of the context it lives on.
    ///
    /// Inner scopes only record their vote; the outermost scope commits or
    /// rolls back the transaction, which releases every lock of the chain,
    /// merges or discards the cache shadow and runs exit hooks. Disposing
    /// twice is a no-op.
    pub async fn dispose(&mut self) -> Result<ScopeOutcome> {
        if self.disposed {
            return Ok(ScopeOutcome::AlreadyDisposed);
        }

        if let Some(ctx) = &self.context {
            ctx.pop(self.id)?;
        }
        self.context = None;
        self.disposed = true;

        if self.completed.is_none() {
            self.completed = Some(self.auto_complete);
        }
        let completed = self.completed == Some(true);

        if self.parent_id.is_some() {
            if !completed {
                self.chain.veto();
            }

            tracing::debug!(scope_id = %self.id, completed, "inner scope disposed");
            return Ok(ScopeOutcome::Deferred { completed });
        }

        self.chain.end(completed).await
    }

    fn ensure_active(&self) -> Result<()> {
        if self.disposed {
            return Err(ScopeError::Disposed(self.id));
        }

        Ok(())
    }

    fn frame(&self) -> Frame {
        Frame {
            scope_id: self.id,
            depth: self.depth,
            chain: self.chain.clone(),
            cache_mode: self.cache_mode,
            isolation_level: self.isolation_level,
            scope_file_systems: self.scope_file_systems,
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        tracing::warn!(scope_id = %self.id, "scope dropped without dispose, rolling back");
        self.disposed = true;
        self.completed = Some(false);

        if let Some(ctx) = self.context.take() {
            ctx.remove(self.id);
        }

        self.chain.veto();
        if self.parent_id.is_none() {
            self.chain.abandon();
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("depth", &self.depth)
            .field("cache_mode", &self.cache_mode)
            .field("isolation_level", &self.isolation_level)
            .field("completed", &self.completed)
            .field("disposed", &self.disposed)
            .finish()
    }
}
