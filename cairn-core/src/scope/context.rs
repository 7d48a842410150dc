use std::{future::Future, sync::Arc};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{IsolationLevel, RepositoryCacheMode, Result, ScopeError};

use super::chain::ScopeChain;

tokio::task_local! {
    static CURRENT: ScopeContext;
}

#[derive(Clone)]
pub(crate) struct Frame {
    pub scope_id: Uuid,
    pub depth: usize,
    pub chain: Arc<ScopeChain>,
    pub cache_mode: RepositoryCacheMode,
    pub isolation_level: IsolationLevel,
    pub scope_file_systems: bool,
}

/// The ambient scope stack of one logical execution flow.
///
/// A context is cheap to clone; clones share the same stack. Each flow owns
/// its own context, either passed explicitly or installed for a task with
/// [`ScopeContext::scope`] and found again with [`ScopeContext::current`].
///
/// ```rust,ignore
/// let ctx = ScopeContext::new();
/// ctx.clone().scope(async move {
///     let ctx = ScopeContext::current().expect("installed above");
///     let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
///     // ...
/// }).await;
/// ```
#[derive(Clone, Default)]
pub struct ScopeContext {
    stack: Arc<Mutex<Vec<Frame>>>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context installed for the running task, if any.
    pub fn current() -> Option<ScopeContext> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Runs `fut` with `self` as the task's current context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    pub fn ambient_scope_id(&self) -> Option<Uuid> {
        self.stack.lock().last().map(|frame| frame.scope_id)
    }

    pub fn has_ambient_scope(&self) -> bool {
        !self.stack.lock().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    pub(crate) fn same_as(&self, other: &ScopeContext) -> bool {
        Arc::ptr_eq(&self.stack, &other.stack)
    }

    pub(crate) fn top(&self) -> Option<Frame> {
        self.stack.lock().last().cloned()
    }

    pub(crate) fn push(&self, frame: Frame) {
        self.stack.lock().push(frame);
    }

    /// Pops `scope_id`, which must be the ambient scope.
    pub(crate) fn pop(&self, scope_id: Uuid) -> Result<()> {
        let mut stack = self.stack.lock();
        match stack.last().map(|frame| frame.scope_id) {
            Some(top) if top == scope_id => {
                stack.pop();
                Ok(())
            }
            Some(top) => Err(ScopeError::contract(format!(
                "scope {scope_id} is not the ambient scope, {top} is"
            ))),
            None => Err(ScopeError::contract(format!(
                "scope {scope_id} is not the ambient scope, there is none"
            ))),
        }
    }

    /// Removes `scope_id` wherever it sits. Used when unwinding.
    pub(crate) fn remove(&self, scope_id: Uuid) {
        self.stack.lock().retain(|frame| frame.scope_id != scope_id);
    }
}

impl std::fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<Uuid> = self.stack.lock().iter().map(|frame| frame.scope_id).collect();
        f.debug_struct("ScopeContext").field("stack", &ids).finish()
    }
}
