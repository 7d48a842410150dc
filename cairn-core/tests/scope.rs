mod common;

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use cairn_core::{
    DatabaseError, ExistsCheck, IsolationLevel, LockType, Notification, RepositoryCacheMode,
    ScopeContext, ScopeError, ScopeOptions, ScopeOutcome, Statement,
};
use parking_lot::Mutex;
use tracing_test::traced_test;

#[tokio::test]
async fn nested_completed_scopes_commit_exactly_once() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scopes = Vec::new();
    for depth in 0..4 {
        let scope = provider.create_scope(&ctx, ScopeOptions::default())?;
        assert_eq!(scope.depth(), depth);
        scope.execute(&Statement::new(format!("INSERT {depth}"))).await?;
        scopes.push(scope);
    }

    let chain = scopes[0].chain_id();
    assert!(scopes.iter().all(|s| s.chain_id() == chain));

    while let Some(mut scope) = scopes.pop() {
        scope.complete();
        let outcome = scope.dispose().await?;
        if scopes.is_empty() {
            assert_eq!(outcome, ScopeOutcome::Committed);
        } else {
            assert_eq!(outcome, ScopeOutcome::Deferred { completed: true });
        }
    }

    assert_eq!(journal.begins(), 1);
    assert_eq!(journal.commits(), 1);
    assert_eq!(journal.rollbacks(), 0);
    assert!(!ctx.has_ambient_scope());

    Ok(())
}

#[tokio::test]
async fn one_uncompleted_child_rolls_back_the_chain() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    outer.execute(&Statement::new("INSERT outer")).await?;

    let mut middle = provider.create_scope(&ctx, ScopeOptions::default())?;
    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;

    inner.complete();
    assert_eq!(
        inner.dispose().await?,
        ScopeOutcome::Deferred { completed: true }
    );
    assert_eq!(
        middle.dispose().await?,
        ScopeOutcome::Deferred { completed: false }
    );

    outer.complete();
    assert_eq!(outer.dispose().await?, ScopeOutcome::RolledBack);
    assert_eq!(journal.commits(), 0);
    assert_eq!(journal.rollbacks(), 1);

    Ok(())
}

#[tokio::test]
async fn dispose_is_idempotent() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    scope.execute(&Statement::new("INSERT 1")).await?;
    scope.complete();

    assert_eq!(scope.dispose().await?, ScopeOutcome::Committed);
    assert_eq!(scope.dispose().await?, ScopeOutcome::AlreadyDisposed);
    assert_eq!(journal.commits(), 1);

    let err = scope.execute(&Statement::new("INSERT 2")).await.unwrap_err();
    assert!(matches!(err, ScopeError::Disposed(id) if id == scope.id()));

    Ok(())
}

#[tokio::test]
async fn disposing_out_of_order_is_a_contract_error() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;

    let err = outer.dispose().await.unwrap_err();
    assert!(matches!(err, ScopeError::Contract(_)));
    assert!(!outer.is_disposed());
    assert_eq!(ctx.ambient_scope_id(), Some(inner.id()));

    inner.complete();
    inner.dispose().await?;
    outer.complete();
    assert_eq!(outer.dispose().await?, ScopeOutcome::Committed);
    assert_eq!(journal.begins(), 0, "nothing ran, no transaction needed");

    Ok(())
}

#[tokio::test]
async fn opening_a_scope_never_touches_the_database() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    journal.fail_begin.store(true, Ordering::SeqCst);

    let ctx = ScopeContext::new();
    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(journal.begins(), 0);

    let err = scope.execute(&Statement::new("INSERT 1")).await.unwrap_err();
    assert!(matches!(
        err,
        ScopeError::Database(cairn_core::DatabaseError::Connection(_))
    ));
    assert!(!err.is_retryable());

    assert_eq!(scope.dispose().await?, ScopeOutcome::RolledBack);

    Ok(())
}

#[tokio::test]
async fn statement_failures_surface_with_their_code() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    let err = scope.execute(&Statement::new("FAIL")).await.unwrap_err();
    match err {
        ScopeError::Database(db) => assert_eq!(db.code(), Some("1")),
        other => panic!("unexpected error {other:?}"),
    }

    scope.dispose().await?;
    assert_eq!(journal.rollbacks(), 1);

    Ok(())
}

#[tokio::test]
async fn detached_scope_moves_between_contexts() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let request = ScopeContext::new();
    let background = ScopeContext::new();

    let mut detached = provider.create_detached_scope(ScopeOptions::default())?;
    assert!(detached.is_detachable());
    assert!(!detached.is_attached());
    assert!(!request.has_ambient_scope());

    provider.attach_scope(&request, &mut detached)?;
    assert_eq!(request.ambient_scope_id(), Some(detached.id()));

    let mut child = provider.create_scope(&request, ScopeOptions::default())?;
    assert_eq!(child.chain_id(), detached.chain_id());
    assert_eq!(child.parent_id(), Some(detached.id()));
    child.execute(&Statement::new("INSERT request")).await?;

    // the child is ambient, so the detachable scope cannot leave yet
    let err = provider.detach_scope(&request, &mut detached).unwrap_err();
    assert!(matches!(err, ScopeError::Contract(_)));

    child.complete();
    child.dispose().await?;

    provider.detach_scope(&request, &mut detached)?;
    assert!(!request.has_ambient_scope());

    provider.attach_scope(&background, &mut detached)?;
    detached
        .execute(&Statement::new("INSERT background"))
        .await?;
    detached.complete();
    assert_eq!(detached.dispose().await?, ScopeOutcome::Committed);

    assert_eq!(journal.begins(), 1);
    assert_eq!(journal.commits(), 1);
    assert!(!background.has_ambient_scope());

    Ok(())
}

#[tokio::test]
async fn only_detachable_scopes_can_be_detached() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();
    let other = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert!(matches!(
        provider.detach_scope(&ctx, &mut scope),
        Err(ScopeError::Contract(_))
    ));
    assert!(matches!(
        provider.attach_scope(&other, &mut scope),
        Err(ScopeError::Contract(_))
    ));

    let mut detached = provider.create_detached_scope(ScopeOptions::default())?;
    provider.attach_scope(&ctx, &mut detached)?;
    assert!(matches!(
        provider.attach_scope(&other, &mut detached),
        Err(ScopeError::Contract(_))
    ));
    assert!(matches!(
        provider.detach_scope(&other, &mut detached),
        Err(ScopeError::Contract(_))
    ));

    detached.dispose().await?;
    scope.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn cache_mode_is_inherited_and_never_lowered() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();

    let mut root = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(root.cache_mode(), RepositoryCacheMode::Default);

    let mut scoped = provider.create_scope(
        &ctx,
        ScopeOptions::default().with_cache_mode(RepositoryCacheMode::Scoped),
    )?;
    assert_eq!(scoped.cache_mode(), RepositoryCacheMode::Scoped);

    let mut inherited = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(inherited.cache_mode(), RepositoryCacheMode::Scoped);

    let err = provider
        .create_scope(
            &ctx,
            ScopeOptions::default().with_cache_mode(RepositoryCacheMode::None),
        )
        .unwrap_err();
    assert!(matches!(err, ScopeError::Contract(_)));
    assert_eq!(ctx.depth(), 3);

    inherited.dispose().await?;
    scoped.dispose().await?;
    root.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn scoped_file_systems_cannot_start_inside_a_scope() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();

    let mut root = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert!(!root.scope_file_systems());

    let err = provider
        .create_scope(&ctx, ScopeOptions::default().with_scope_file_systems(true))
        .unwrap_err();
    assert!(matches!(err, ScopeError::Contract(_)));

    let mut child = provider.create_scope(
        &ctx,
        ScopeOptions::default().with_scope_file_systems(false),
    )?;
    child.dispose().await?;
    root.dispose().await?;

    let mut root = provider.create_scope(
        &ctx,
        ScopeOptions::default().with_scope_file_systems(true),
    )?;
    let mut child = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert!(child.scope_file_systems());
    child.dispose().await?;
    root.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn auto_complete_votes_at_dispose() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default().with_auto_complete())?;
    scope.execute(&Statement::new("INSERT 1")).await?;
    assert_eq!(scope.dispose().await?, ScopeOutcome::Committed);
    assert_eq!(scope.completed(), Some(true));
    assert_eq!(journal.commits(), 1);

    Ok(())
}

#[tokio::test]
async fn queued_locks_run_before_the_first_statement() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    scope.write_lock(&["cairn:content"])?;
    scope.read_lock(&["cairn:languages"])?;
    assert_eq!(journal.begins(), 0);

    scope.execute(&Statement::new("UPDATE content")).await?;

    assert_eq!(
        journal.log(),
        vec![
            "BEGIN",
            "LOCK WRITE cairn:content",
            "LOCK READ cairn:languages",
            "UPDATE content",
        ]
    );
    assert_eq!(scope.held_lock("cairn:content"), Some(LockType::Write));

    scope.complete();
    scope.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn locks_are_reentrant_within_a_chain() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    let first = outer
        .acquire_lock("cairn:migration-plan:core", LockType::Write, None)
        .await?;
    assert!(!first.reentrant);
    assert_eq!(first.scope_id, outer.id());

    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;
    let again = inner
        .acquire_lock("cairn:migration-plan:core", LockType::Write, None)
        .await?;
    let read = inner
        .acquire_lock("cairn:migration-plan:core", LockType::Read, None)
        .await?;
    assert!(again.reentrant);
    assert!(read.reentrant);
    assert_eq!(again.chain_id, first.chain_id);

    assert_eq!(journal.lock_calls(), vec!["LOCK WRITE cairn:migration-plan:core"]);
    assert_eq!(outer.lock_count("cairn:migration-plan:core"), 1);
    assert_eq!(inner.lock_count("cairn:migration-plan:core"), 2);

    inner.complete();
    inner.dispose().await?;
    outer.complete();
    outer.dispose().await?;

    assert_eq!(outer.lock_count("cairn:migration-plan:core"), 0);

    Ok(())
}

#[tokio::test]
async fn read_lock_does_not_cover_a_write_request() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    scope.acquire_lock("cairn:key-values", LockType::Read, None).await?;
    let write = scope
        .acquire_lock("cairn:key-values", LockType::Write, None)
        .await?;
    assert!(!write.reentrant);
    assert_eq!(scope.held_lock("cairn:key-values"), Some(LockType::Write));
    assert_eq!(
        journal.lock_calls(),
        vec!["LOCK READ cairn:key-values", "LOCK WRITE cairn:key-values"]
    );

    scope.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn lock_timeouts_are_retryable() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    let err = scope
        .acquire_lock("busy:main-dom", LockType::Write, None)
        .await
        .unwrap_err();
    assert!(matches!(&err, ScopeError::LockTimeout { name, .. } if name == "busy:main-dom"));
    assert!(err.is_retryable());
    assert_eq!(scope.held_lock("busy:main-dom"), None);

    assert_eq!(scope.dispose().await?, ScopeOutcome::RolledBack);
    assert_eq!(journal.rollbacks(), 1);

    Ok(())
}

#[tokio::test]
async fn exit_hooks_run_once_with_the_final_outcome() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;

    let log = seen.clone();
    assert!(inner.enlist("second", 10, move |completed| {
        log.lock().push(format!("second:{completed}"))
    })?);
    let log = seen.clone();
    assert!(outer.enlist("first", 0, move |completed| {
        log.lock().push(format!("first:{completed}"))
    })?);
    let log = seen.clone();
    assert!(!outer.enlist("second", 0, move |_| log.lock().push("duplicate".into()))?);

    inner.complete();
    inner.dispose().await?;
    assert!(seen.lock().is_empty());

    outer.complete();
    outer.dispose().await?;

    assert_eq!(*seen.lock(), vec!["first:true", "second:true"]);

    Ok(())
}

#[tokio::test]
async fn exit_hooks_observe_rollback() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();
    let seen = Arc::new(Mutex::new(None));

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    let slot = seen.clone();
    scope.enlist("notify", 0, move |completed| *slot.lock() = Some(completed))?;
    scope.dispose().await?;

    assert_eq!(*seen.lock(), Some(false));

    Ok(())
}

#[tokio::test]
#[traced_test]
async fn dropping_an_undisposed_scope_rolls_back() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    {
        let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
        scope.execute(&Statement::new("INSERT 1")).await?;
        scope.complete();
    }

    assert!(!ctx.has_ambient_scope());
    assert_eq!(journal.commits(), 0);
    assert_eq!(journal.rollbacks(), 1);
    assert!(logs_contain("scope dropped without dispose"));

    Ok(())
}

#[tokio::test]
async fn exists_checks_follow_the_transaction() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();

    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    scope
        .execute(&Statement::new("CREATE TABLE cairn_node"))
        .await?;
    assert!(scope.exists(&ExistsCheck::table("cairn_node")).await?);
    scope.dispose().await?;

    let mut fresh = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert!(!fresh.exists(&ExistsCheck::table("cairn_node")).await?);
    fresh.dispose().await?;

    Ok(())
}

#[tokio::test]
async fn current_context_is_task_local() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    assert!(ScopeContext::current().is_none());

    let ctx = ScopeContext::new();
    let id = ctx
        .clone()
        .scope(async move {
            let ctx = ScopeContext::current().expect("context installed");
            let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
            let id = scope.id();

            let seen = tokio::spawn(async { ScopeContext::current().is_some() }).await?;
            assert!(!seen, "spawned tasks start without a context");

            scope.dispose().await?;
            anyhow::Ok(id)
        })
        .await?;

    assert!(!id.is_nil());
    assert!(!ctx.has_ambient_scope());

    Ok(())
}

#[tokio::test]
async fn disposing_without_a_vote_records_a_rollback() -> anyhow::Result<()> {
    let (provider, _) = common::provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(inner.completed(), None);

    inner.dispose().await?;
    assert_eq!(inner.completed(), Some(false));

    outer.complete();
    assert_eq!(outer.dispose().await?, ScopeOutcome::RolledBack);
    assert_eq!(outer.completed(), Some(true));

    Ok(())
}

#[tokio::test]
async fn isolation_is_inherited_and_never_stricter() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    let ctx = ScopeContext::new();

    let mut root = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(root.isolation_level(), IsolationLevel::ReadCommitted);

    let err = provider
        .create_scope(
            &ctx,
            ScopeOptions::default().with_isolation_level(IsolationLevel::Serializable),
        )
        .unwrap_err();
    assert!(matches!(err, ScopeError::Contract(_)), "{err:?}");

    let mut weaker = provider.create_scope(
        &ctx,
        ScopeOptions::default().with_isolation_level(IsolationLevel::ReadUncommitted),
    )?;
    assert_eq!(weaker.isolation_level(), IsolationLevel::ReadUncommitted);
    assert_eq!(
        weaker.transaction_isolation_level(),
        IsolationLevel::ReadCommitted
    );

    let mut inherited = provider.create_scope(&ctx, ScopeOptions::default())?;
    assert_eq!(inherited.isolation_level(), IsolationLevel::ReadUncommitted);

    inherited.execute(&Statement::new("INSERT 1")).await?;
    inherited.dispose().await?;
    weaker.dispose().await?;
    root.dispose().await?;

    let mut serializable = provider.create_scope(
        &ScopeContext::new(),
        ScopeOptions::default().with_isolation_level(IsolationLevel::Serializable),
    )?;
    serializable.execute(&Statement::new("INSERT 2")).await?;
    serializable.dispose().await?;

    let levels: Vec<_> = journal
        .begun_with()
        .iter()
        .map(|options| options.isolation_level)
        .collect();
    assert_eq!(
        levels,
        vec![IsolationLevel::ReadCommitted, IsolationLevel::Serializable]
    );

    Ok(())
}

#[tokio::test]
async fn transactions_wait_as_long_as_the_lock_they_serve() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();

    let mut scope = provider.create_scope(&ScopeContext::new(), ScopeOptions::default())?;
    scope
        .acquire_lock("cairn:main-dom", LockType::Write, Some(Duration::from_millis(250)))
        .await?;
    scope.dispose().await?;

    let mut scope = provider.create_scope(&ScopeContext::new(), ScopeOptions::default())?;
    scope.execute(&Statement::new("INSERT 1")).await?;
    scope.dispose().await?;

    let waits: Vec<_> = journal.begun_with().iter().map(|o| o.wait).collect();
    assert_eq!(
        waits,
        vec![
            Duration::from_millis(250),
            provider.options().default_lock_timeout
        ]
    );

    Ok(())
}

#[tokio::test]
async fn a_busy_engine_times_out_the_lock_it_was_needed_for() -> anyhow::Result<()> {
    let (provider, journal) = common::provider();
    journal.busy.store(true, Ordering::SeqCst);

    let mut scope = provider.create_scope(&ScopeContext::new(), ScopeOptions::default())?;
    let err = scope
        .acquire_lock("cairn:main-dom", LockType::Write, Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, ScopeError::LockTimeout { name, timeout } if name == "cairn:main-dom" && *timeout == Duration::from_millis(100)),
        "{err:?}"
    );
    assert!(err.is_retryable());

    let err = scope.execute(&Statement::new("INSERT 1")).await.unwrap_err();
    assert!(
        matches!(err, ScopeError::Database(DatabaseError::Busy(_))),
        "{err:?}"
    );
    assert!(err.is_retryable());

    journal.busy.store(false, Ordering::SeqCst);
    scope.execute(&Statement::new("INSERT 2")).await?;
    scope.complete();
    assert_eq!(scope.dispose().await?, ScopeOutcome::Committed);

    Ok(())
}

#[derive(Debug, PartialEq)]
struct ContentSaved(&'static str);

fn collecting_provider() -> (cairn_core::ScopeProvider, Arc<Mutex<Vec<&'static str>>>) {
    let (provider, _) = common::provider();
    let published = Arc::new(Mutex::new(Vec::new()));

    let sink = published.clone();
    let provider = provider.with_publisher(Arc::new(move |notification: &Notification| {
        if let Some(saved) = notification.downcast_ref::<ContentSaved>() {
            sink.lock().push(saved.0);
        }
    }));

    (provider, published)
}

#[tokio::test]
async fn notifications_publish_after_the_outermost_commit() -> anyhow::Result<()> {
    let (provider, published) = collecting_provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    outer.notify(ContentSaved("home"))?;

    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;
    inner.notify(ContentSaved("about"))?;
    assert_eq!(inner.pending_notifications(), 2);
    inner.complete();
    inner.dispose().await?;

    assert!(published.lock().is_empty(), "nothing before the outermost scope ends");

    outer.complete();
    assert_eq!(outer.dispose().await?, ScopeOutcome::Committed);
    assert_eq!(*published.lock(), vec!["home", "about"]);
    assert_eq!(outer.pending_notifications(), 0);

    Ok(())
}

#[tokio::test]
async fn rolled_back_chains_drop_their_notifications() -> anyhow::Result<()> {
    let (provider, published) = collecting_provider();
    let ctx = ScopeContext::new();

    let mut outer = provider.create_scope(&ctx, ScopeOptions::default())?;
    let mut inner = provider.create_scope(&ctx, ScopeOptions::default())?;
    inner.notify(ContentSaved("home"))?;
    inner.dispose().await?;

    outer.complete();
    assert_eq!(outer.dispose().await?, ScopeOutcome::RolledBack);

    {
        let dropped = provider.create_scope(&ScopeContext::new(), ScopeOptions::default())?;
        dropped.notify(ContentSaved("contact"))?;
    }

    assert!(published.lock().is_empty());

    let err = outer.notify(ContentSaved("late")).unwrap_err();
    assert!(matches!(err, ScopeError::Disposed(_)));

    Ok(())
}
