//! Cancellation for a running session.
//!
//! A single [`AbortHandle`] is shared by the foreground and the execution
//! host. Anything that needs active help to stop (the input channel, a wasm
//! store, a compiler process) registers an abort hook on it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    next_hook_id: AtomicU64,
    hooks: Mutex<Vec<(u64, AbortHook)>>,
}

/// Handle for cancelling a session from any thread.
///
/// `AbortHandle` can be cloned and shared across threads; any clone can
/// trigger the abort, which runs every registered hook exactly once.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use tether_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// handle.on_abort(move || flag.store(true, Ordering::SeqCst)).keep();
///
/// handle.clone().abort();
/// assert!(handle.is_aborted());
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Request abort and run all registered hooks.
    ///
    /// Calling this more than once is a no-op.
    pub fn abort(&self) {
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks = std::mem::take(
            &mut *self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        // Hooks run in reverse order of registration
        for (id, hook) in hooks.into_iter().rev() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook));
            if let Err(e) = result {
                tracing::error!("Abort hook {} panicked: {:?}", id, e);
            }
        }
    }

    /// Register a hook to run when the session is aborted.
    ///
    /// If the abort already happened the hook runs immediately. The hook is
    /// unregistered when the returned [`AbortRegistration`] is dropped, unless
    /// it is kept with [`AbortRegistration::keep`].
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) -> AbortRegistration {
        let id = self.inner.next_hook_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut hooks = self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_aborted() {
                hooks.push((id, Box::new(hook)));
                return AbortRegistration {
                    inner: Some(self.inner.clone()),
                    id,
                };
            }
        }

        hook();
        AbortRegistration { inner: None, id }
    }
}

/// Keeps an abort hook registered while alive.
#[must_use = "dropping the registration removes the hook"]
pub struct AbortRegistration {
    inner: Option<Arc<AbortInner>>,
    id: u64,
}

impl AbortRegistration {
    /// Keep the hook registered for the lifetime of the handle.
    pub fn keep(mut self) {
        self.inner = None;
    }
}

impl Drop for AbortRegistration {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
