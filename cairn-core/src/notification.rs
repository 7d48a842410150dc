//! Notifications raised inside a scope.
//!
//! A scope queues what it wants to announce with [`Scope::notify`]. The
//! queue belongs to the scope chain: it is handed to the provider's
//! [`NotificationPublisher`] once the outermost scope has committed, and
//! dropped when the chain rolls back, so listeners never hear about work
//! that did not happen.
//!
//! [`Scope::notify`]: crate::Scope::notify

use std::{any::Any, fmt, sync::Arc};

/// A type erased notification. Publishers downcast to the types they know.
#[derive(Clone)]
pub struct Notification {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Notification {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Notification").field(&self.type_name).finish()
    }
}

/// Receives the notifications of committed scope chains, in the order they
/// were queued.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: &Notification);
}

impl<F> NotificationPublisher for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn publish(&self, notification: &Notification) {
        self(notification)
    }
}
