//! Core building blocks for coordinating work against a relational store.
//!
//! This crate provides the unit of work layer that everything persisting data
//! goes through:
//!
//! - **Scopes** - Nestable, detachable units of work wrapping one transaction
//! - **Repository cache isolation** - A per chain shadow cache merged on commit
//! - **Distributed locks** - Database backed locks bound to a scope's transaction
//! - **Notifications** - Queued per chain, published only after commit
//! - **Dialects** - Translation of schema and data definitions to engine SQL
//!
//! It is engine agnostic. Concrete engines implement [`DatabaseFactory`],
//! [`SqlDialect`] and [`DistributedLockingMechanism`] (see `cairn-sql`).
//!
//! # Example
//!
//! ```rust,ignore
//! use cairn_core::{ScopeContext, ScopeOptions, ScopeProvider, LockType};
//!
//! let provider = ScopeProvider::new(factory);
//! let ctx = ScopeContext::new();
//!
//! let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
//! scope.acquire_lock("cairn:main-dom", LockType::Write, None).await?;
//! scope.execute(&statement).await?;
//! scope.complete();
//! scope.dispose().await?;
//! ```

pub mod cache;
mod database;
mod dialect;
mod error;
pub mod lock;
pub mod notification;
pub mod schema;
pub mod scope;
mod statement;

pub use cache::{AppCache, CacheView, RepositoryCacheMode};
pub use database::*;
pub use dialect::*;
pub use error::*;
pub use lock::{lock_names, DistributedLock, DistributedLockingMechanism, LockRequest, LockType};
pub use notification::{Notification, NotificationPublisher};
pub use schema::*;
pub use scope::{
    Scope, ScopeContext, ScopeOptions, ScopeOutcome, ScopeProvider, ScopeProviderOptions,
};
pub use statement::*;
