use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    cache::{AppCache, ShadowCache},
    BeginOptions, Database, DatabaseError, DatabaseFactory, DistributedLockingMechanism,
    IsolationLevel, LockRequest, LockType, Notification, NotificationPublisher, Result,
    ScopeError, SqlDialect,
};

use super::ScopeOutcome;

type ExitAction = Box<dyn FnOnce(bool) + Send>;

struct ExitHook {
    key: String,
    priority: i32,
    action: ExitAction,
}

#[derive(Default)]
struct ChainState {
    vetoed: bool,
    ended: bool,
    queued: Vec<(Uuid, LockRequest)>,
    held: HashMap<String, LockType>,
    counters: HashMap<Uuid, HashMap<String, usize>>,
    hooks: Vec<ExitHook>,
    notifications: Vec<Notification>,
}

/// State shared by every scope nested under one outermost scope: the single
/// transaction, the locks it holds, the cache shadow, queued notifications
/// and the exit hooks.
pub(crate) struct ScopeChain {
    pub(crate) id: Uuid,
    factory: Arc<dyn DatabaseFactory>,
    publisher: Option<Arc<dyn NotificationPublisher>>,
    pub(crate) isolation_level: IsolationLevel,
    locking: Arc<dyn DistributedLockingMechanism>,
    pub(crate) dialect: Arc<dyn SqlDialect>,
    database: tokio::sync::Mutex<Option<Box<dyn Database>>>,
    state: Mutex<ChainState>,
    pub(crate) shadow: Arc<ShadowCache>,
    pub(crate) app_cache: Arc<AppCache>,
    pub(crate) default_lock_timeout: Duration,
}

impl ScopeChain {
    pub(crate) fn new(
        factory: Arc<dyn DatabaseFactory>,
        publisher: Option<Arc<dyn NotificationPublisher>>,
        isolation_level: IsolationLevel,
        app_cache: Arc<AppCache>,
        default_lock_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            locking: factory.locking(),
            dialect: factory.dialect(),
            factory,
            publisher,
            isolation_level,
            database: tokio::sync::Mutex::new(None),
            state: Mutex::new(ChainState::default()),
            shadow: Arc::new(ShadowCache::default()),
            app_cache,
            default_lock_timeout,
        }
    }

    /// Returns the chain's transaction, beginning it on first use and
    /// acquiring any queued locks before anything else runs on it.
    ///
    /// `requested` is the lock the caller is about to take, if any. The
    /// begin may wait as long as the first lock it is needed for allows, and
    /// an engine that stays busy for that long fails it with that lock's
    /// timeout.
    pub(crate) async fn database(
        &self,
        requested: Option<&LockRequest>,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<Box<dyn Database>>>> {
        let mut guard = self.database.lock().await;

        if guard.is_none() {
            let waiting_for = {
                let state = self.state.lock();
                if state.ended {
                    return Err(ScopeError::contract(format!(
                        "transaction of scope chain {} has already ended",
                        self.id
                    )));
                }

                state
                    .queued
                    .first()
                    .map(|(_, request)| request.clone())
                    .or_else(|| requested.cloned())
            };

            let options = BeginOptions {
                isolation_level: self.isolation_level,
                wait: waiting_for
                    .as_ref()
                    .map_or(self.default_lock_timeout, |request| request.timeout),
            };

            let db = match self.factory.begin(options).await {
                Ok(db) => db,
                Err(DatabaseError::Busy(waited)) => {
                    tracing::warn!(chain_id = %self.id, ?waited, "engine busy, transaction not started");
                    return Err(match waiting_for {
                        Some(request) => request.timed_out(),
                        None => DatabaseError::Busy(waited).into(),
                    });
                }
                Err(err) => return Err(err.into()),
            };

            tracing::debug!(
                chain_id = %self.id,
                provider = self.factory.provider_name(),
                isolation_level = ?self.isolation_level,
                "transaction started"
            );
            *guard = Some(db);
        }

        let queued = std::mem::take(&mut self.state.lock().queued);
        if !queued.is_empty() {
            let db = guard
                .as_deref_mut()
                .ok_or_else(|| ScopeError::contract("transaction vanished"))?;

            for (scope_id, request) in queued {
                self.acquire_with(db, scope_id, &request).await?;
            }
        }

        Ok(guard)
    }

    pub(crate) fn queue_lock(&self, scope_id: Uuid, request: LockRequest) {
        self.state.lock().queued.push((scope_id, request));
    }

    /// Returns `true` when a lock already held by the chain covered the request.
    pub(crate) async fn acquire_with(
        &self,
        db: &mut dyn Database,
        scope_id: Uuid,
        request: &LockRequest,
    ) -> Result<bool> {
        let covered = self
            .state
            .lock()
            .held
            .get(&request.name)
            .is_some_and(|held| held.covers(request.lock_type));

        if !covered {
            tracing::debug!(
                chain_id = %self.id,
                lock = %request.name,
                lock_type = ?request.lock_type,
                timeout = ?request.timeout,
                "acquiring distributed lock"
            );

            if let Err(err) = self.locking.acquire(db, request).await {
                if matches!(err, ScopeError::LockTimeout { .. }) {
                    tracing::warn!(chain_id = %self.id, lock = %request.name, "lock timeout");
                }
                return Err(err);
            }
        }

        let mut state = self.state.lock();
        state
            .held
            .entry(request.name.clone())
            .and_modify(|held| {
                if !held.covers(request.lock_type) {
                    *held = request.lock_type;
                }
            })
            .or_insert(request.lock_type);
        *state
            .counters
            .entry(scope_id)
            .or_default()
            .entry(request.name.clone())
            .or_insert(0) += 1;

        Ok(covered)
    }

    pub(crate) fn lock_count(&self, scope_id: Uuid, name: &str) -> usize {
        self.state
            .lock()
            .counters
            .get(&scope_id)
            .and_then(|locks| locks.get(name))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn held_lock(&self, name: &str) -> Option<LockType> {
        self.state.lock().held.get(name).copied()
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.state.lock().notifications.push(notification);
    }

    pub(crate) fn pending_notifications(&self) -> usize {
        self.state.lock().notifications.len()
    }

    pub(crate) fn veto(&self) {
        self.state.lock().vetoed = true;
    }

    pub(crate) fn enlist(&self, key: String, priority: i32, action: ExitAction) -> bool {
        let mut state = self.state.lock();
        if state.hooks.iter().any(|hook| hook.key == key) {
            return false;
        }

        state.hooks.push(ExitHook {
            key,
            priority,
            action,
        });
        true
    }

    /// Commits when the outermost scope completed and no inner scope vetoed,
    /// rolls back otherwise. Runs once per chain.
    pub(crate) async fn end(&self, completed: bool) -> Result<ScopeOutcome> {
        let commit = completed && !self.state.lock().vetoed;
        let database = self.database.lock().await.take();
        self.finish_state();

        let result = match database {
            Some(db) if commit => db.commit().await.map(|_| ScopeOutcome::Committed),
            Some(db) => db.rollback().await.map(|_| ScopeOutcome::RolledBack),
            None if commit => Ok(ScopeOutcome::Committed),
            None => Ok(ScopeOutcome::RolledBack),
        };

        let committed = matches!(result, Ok(ScopeOutcome::Committed));
        if committed {
            self.shadow.merge_into(&self.app_cache);
        } else {
            self.shadow.discard();
        }

        match &result {
            Ok(outcome) => tracing::debug!(chain_id = %self.id, ?outcome, "scope chain ended"),
            Err(err) => tracing::error!(chain_id = %self.id, error = %err, "failed to end transaction"),
        }

        self.publish(committed);
        self.run_hooks(committed);

        result.map_err(Into::into)
    }

    /// Best effort rollback used when the outermost scope is dropped undisposed.
    pub(crate) fn abandon(&self) {
        if let Ok(mut guard) = self.database.try_lock() {
            // dropping the transaction rolls it back
            guard.take();
        }

        self.finish_state();
        self.shadow.discard();
        self.publish(false);
        self.run_hooks(false);
    }

    fn finish_state(&self) {
        let mut state = self.state.lock();
        state.ended = true;
        state.queued.clear();
        state.held.clear();
        state.counters.clear();
    }

    /// Hands queued notifications to the publisher after a commit, drops
    /// them otherwise.
    fn publish(&self, committed: bool) {
        let notifications = std::mem::take(&mut self.state.lock().notifications);
        if notifications.is_empty() {
            return;
        }

        match (&self.publisher, committed) {
            (Some(publisher), true) => {
                tracing::debug!(chain_id = %self.id, count = notifications.len(), "publishing notifications");
                for notification in &notifications {
                    publisher.publish(notification);
                }
            }
            _ => {
                tracing::debug!(chain_id = %self.id, count = notifications.len(), "notifications dropped");
            }
        }
    }

    fn run_hooks(&self, completed: bool) {
        let mut hooks = std::mem::take(&mut self.state.lock().hooks);
        hooks.sort_by_key(|hook| hook.priority);

        for hook in hooks {
            tracing::trace!(chain_id = %self.id, key = %hook.key, completed, "running scope exit hook");
            (hook.action)(completed);
        }
    }
}
