//! Request-Scoped Context Storage
//!
//! Makes the current request's [`SecurityContext`] reachable from any code
//! running inside the request without passing it down explicitly.
//!
//! Storage is a tokio task-local slot created fresh by [`CurrentSecurityContext::scope`].
//! The slot only lives as long as the scoped future: it is gone when the
//! future completes, returns an error, panics, or is dropped on cancellation,
//! so a worker reused for the next request can never observe a stale
//! identity.

use crate::error::{Result, VomsError};
use crate::security::context::SecurityContext;

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT_SECURITY_CONTEXT: RefCell<Option<Arc<SecurityContext>>>;
}

/// Accessor for the security context bound to the current request
pub struct CurrentSecurityContext;

impl CurrentSecurityContext {
    /// Run `future` as one unit of request execution with an empty slot
    pub async fn scope<F>(future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_SECURITY_CONTEXT.scope(RefCell::new(None), future).await
    }

    /// Synchronous counterpart of [`scope`](Self::scope) for blocking workers
    pub fn sync_scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_SECURITY_CONTEXT.sync_scope(RefCell::new(None), f)
    }

    /// Bind `context` to the current unit of execution
    pub fn publish(context: Arc<SecurityContext>) -> Result<()> {
        CURRENT_SECURITY_CONTEXT
            .try_with(|slot| {
                *slot.borrow_mut() = Some(context);
            })
            .map_err(|_| VomsError::NoActiveScope)
    }

    /// The published context, `None` outside a scope, before publishing or
    /// after [`clear`](Self::clear)
    pub fn current() -> Option<Arc<SecurityContext>> {
        CURRENT_SECURITY_CONTEXT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    pub fn clear() {
        let _ = CURRENT_SECURITY_CONTEXT.try_with(|slot| slot.borrow_mut().take());
    }

    pub fn in_scope() -> bool {
        CURRENT_SECURITY_CONTEXT.try_with(|_| ()).is_ok()
    }
}
