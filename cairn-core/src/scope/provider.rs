use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    cache::AppCache, BeginOptions, CacheView, DatabaseFactory, IsolationLevel,
    NotificationPublisher, RepositoryCacheMode, Result, ScopeError,
};

use super::{chain::ScopeChain, context::Frame, Scope, ScopeContext};

/// Provider wide settings.
#[derive(Debug, Clone)]
pub struct ScopeProviderOptions {
    /// Used by lock requests that do not carry their own timeout.
    pub default_lock_timeout: Duration,
}

impl Default for ScopeProviderOptions {
    fn default() -> Self {
        Self {
            default_lock_timeout: Duration::from_secs(20),
        }
    }
}

/// Per scope settings.
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
    pub cache_mode: RepositoryCacheMode,
    /// `Unspecified` inherits from the parent scope, or takes the engine's
    /// default for an outermost scope.
    pub isolation_level: IsolationLevel,
    /// `None` inherits from the parent scope.
    pub scope_file_systems: Option<bool>,
    /// Vote completed at dispose when no vote was cast.
    pub auto_complete: bool,
}

impl ScopeOptions {
    pub fn with_cache_mode(mut self, mode: RepositoryCacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_scope_file_systems(mut self, value: bool) -> Self {
        self.scope_file_systems = Some(value);
        self
    }

    pub fn with_auto_complete(mut self) -> Self {
        self.auto_complete = true;
        self
    }
}

#[derive(Clone)]
struct ProviderInner {
    factory: Arc<dyn DatabaseFactory>,
    publisher: Option<Arc<dyn NotificationPublisher>>,
    app_cache: Arc<AppCache>,
    options: ScopeProviderOptions,
}

/// Creates scopes and tracks the ambient one of each [`ScopeContext`].
#[derive(Clone)]
pub struct ScopeProvider {
    inner: Arc<ProviderInner>,
}

impl ScopeProvider {
    pub fn new(factory: Arc<dyn DatabaseFactory>) -> Self {
        Self::with_options(factory, ScopeProviderOptions::default())
    }

    pub fn with_options(factory: Arc<dyn DatabaseFactory>, options: ScopeProviderOptions) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                factory,
                publisher: None,
                app_cache: Arc::new(AppCache::new()),
                options,
            }),
        }
    }

    /// Publishes the notifications of committed scope chains to `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        Arc::make_mut(&mut self.inner).publisher = Some(publisher);
        self
    }

    pub fn factory(&self) -> &Arc<dyn DatabaseFactory> {
        &self.inner.factory
    }

    pub fn options(&self) -> &ScopeProviderOptions {
        &self.inner.options
    }

    pub fn app_cache(&self) -> Arc<AppCache> {
        self.inner.app_cache.clone()
    }

    /// Lets the locking mechanism prepare the database, in its own transaction.
    pub async fn initialize(&self) -> Result<()> {
        let mut db = self
            .inner
            .factory
            .begin(BeginOptions {
                isolation_level: self.inner.factory.default_isolation_level(),
                wait: self.inner.options.default_lock_timeout,
            })
            .await?;
        let locking = self.inner.factory.locking();

        match locking.initialize(db.as_mut()).await {
            Ok(()) => {
                db.commit().await?;
                tracing::debug!(locking = locking.name(), "distributed locking initialized");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = db.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed lock initialization");
                }
                Err(err)
            }
        }
    }

    /// Creates a scope on `ctx`. When `ctx` has an ambient scope the new one
    /// joins its chain.
    ///
    /// Never touches the database: the transaction begins on first use.
    pub fn create_scope(&self, ctx: &ScopeContext, options: ScopeOptions) -> Result<Scope> {
        let scope = match ctx.top() {
            Some(parent) => self.child_scope(&parent, options)?,
            None => self.root_scope(options, false),
        };

        ctx.push(scope.frame());

        let mut scope = scope;
        scope.context = Some(ctx.clone());

        tracing::debug!(
            scope_id = %scope.id,
            chain_id = %scope.chain.id,
            depth = scope.depth,
            cache_mode = ?scope.cache_mode,
            isolation_level = ?scope.isolation_level,
            "scope created"
        );

        Ok(scope)
    }

    /// Creates an outermost scope that belongs to no context until attached.
    pub fn create_detached_scope(&self, options: ScopeOptions) -> Result<Scope> {
        let scope = self.root_scope(options, true);
        tracing::debug!(scope_id = %scope.id, "detached scope created");
        Ok(scope)
    }

    /// Pushes a detached scope onto `ctx`, making it ambient there.
    pub fn attach_scope(&self, ctx: &ScopeContext, scope: &mut Scope) -> Result<()> {
        if scope.disposed {
            return Err(ScopeError::Disposed(scope.id));
        }

        if !scope.detachable {
            return Err(ScopeError::contract(format!(
                "scope {} is not detachable",
                scope.id
            )));
        }

        if scope.context.is_some() {
            return Err(ScopeError::contract(format!(
                "scope {} is already attached",
                scope.id
            )));
        }

        ctx.push(scope.frame());
        scope.context = Some(ctx.clone());
        tracing::debug!(scope_id = %scope.id, "scope attached");

        Ok(())
    }

    /// Pops a detachable scope off `ctx` without disposing it. The scope must
    /// be the ambient scope of `ctx`.
    pub fn detach_scope(&self, ctx: &ScopeContext, scope: &mut Scope) -> Result<()> {
        if !scope.detachable {
            return Err(ScopeError::contract(format!(
                "scope {} is not detachable",
                scope.id
            )));
        }

        match &scope.context {
            Some(attached) if attached.same_as(ctx) => {}
            _ => {
                return Err(ScopeError::contract(format!(
                    "scope {} is not attached to this context",
                    scope.id
                )))
            }
        }

        ctx.pop(scope.id)?;
        scope.context = None;
        tracing::debug!(scope_id = %scope.id, "scope detached");

        Ok(())
    }

    /// The cache repositories should use on `ctx` right now.
    pub fn repository_cache(&self, ctx: &ScopeContext) -> CacheView {
        match ctx.top() {
            Some(frame) if frame.cache_mode != RepositoryCacheMode::None => {
                CacheView::isolated(self.app_cache(), frame.chain.shadow.clone())
            }
            _ => CacheView::global(self.app_cache()),
        }
    }

    fn root_scope(&self, options: ScopeOptions, detachable: bool) -> Scope {
        let cache_mode = match options.cache_mode {
            RepositoryCacheMode::Unspecified => RepositoryCacheMode::Default,
            mode => mode,
        };
        let isolation_level = match options.isolation_level {
            IsolationLevel::Unspecified => self.inner.factory.default_isolation_level(),
            level => level,
        };

        Scope {
            id: Uuid::new_v4(),
            parent_id: None,
            depth: 0,
            chain: Arc::new(ScopeChain::new(
                self.inner.factory.clone(),
                self.inner.publisher.clone(),
                isolation_level,
                self.app_cache(),
                self.inner.options.default_lock_timeout,
            )),
            cache_mode,
            isolation_level,
            scope_file_systems: options.scope_file_systems.unwrap_or(false),
            auto_complete: options.auto_complete,
            detachable,
            context: None,
            completed: None,
            disposed: false,
        }
    }

    fn child_scope(&self, parent: &Frame, options: ScopeOptions) -> Result<Scope> {
        let cache_mode = match options.cache_mode {
            RepositoryCacheMode::Unspecified => parent.cache_mode,
            mode if mode < parent.cache_mode => {
                return Err(ScopeError::contract(format!(
                    "cache mode {mode:?} is lower than the parent's {:?}",
                    parent.cache_mode
                )))
            }
            mode => mode,
        };

        let isolation_level = match options.isolation_level {
            IsolationLevel::Unspecified => parent.isolation_level,
            level if level > parent.chain.isolation_level => {
                return Err(ScopeError::contract(format!(
                    "isolation level {level:?} is stricter than the transaction's {:?}",
                    parent.chain.isolation_level
                )))
            }
            level => level,
        };

        if options.scope_file_systems == Some(true) && !parent.scope_file_systems {
            return Err(ScopeError::contract(
                "scoped file systems requested inside a scope without them",
            ));
        }

        Ok(Scope {
            id: Uuid::new_v4(),
            parent_id: Some(parent.scope_id),
            depth: parent.depth + 1,
            chain: parent.chain.clone(),
            cache_mode,
            isolation_level,
            scope_file_systems: options
                .scope_file_systems
                .unwrap_or(parent.scope_file_systems),
            auto_complete: options.auto_complete,
            detachable: false,
            context: None,
            completed: None,
            disposed: false,
        })
    }
}
