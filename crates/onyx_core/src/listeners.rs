//! crates/onyx_core/src/listeners.rs
//!
//! A registry of callbacks shared by the stores and the event bus, plus the
//! `Subscription` capability handed back to subscribers.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::error;

/// Callback fired after any store mutation.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Capability to remove a previously registered callback.
///
/// Dropping the handle keeps the callback registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[must_use = "the callback stays registered until `unsubscribe` is called"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

struct Entries<F: ?Sized> {
    next_id: u64,
    items: Vec<(u64, Arc<F>)>,
}

/// Ordered set of callbacks. Registering a reference-identical `Arc` twice is a no-op.
pub struct ListenerSet<F: ?Sized> {
    inner: Arc<Mutex<Entries<F>>>,
}

impl<F: ?Sized> Clone for ListenerSet<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ?Sized> Default for ListenerSet<F> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Entries {
                next_id: 0,
                items: Vec::new(),
            })),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> ListenerSet<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` and returns the capability to remove it.
    pub fn add(&self, callback: Arc<F>) -> Subscription {
        let id = {
            let mut entries = lock(&self.inner);
            let existing = entries
                .items
                .iter()
                .find(|(_, f)| same_callback(f, &callback))
                .map(|(id, _)| *id);
            match existing {
                Some(id) => id,
                None => {
                    let id = entries.next_id;
                    entries.next_id += 1;
                    entries.items.push((id, callback));
                    id
                }
            }
        };

        let weak: Weak<Mutex<Entries<F>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).items.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// The currently registered callbacks, in registration order.
    ///
    /// Callers invoke the snapshot after the lock is released, so a callback may
    /// itself subscribe or unsubscribe.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        lock(&self.inner)
            .items
            .iter()
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListenerSet<dyn Fn() + Send + Sync> {
    /// Invokes every listener; a panicking listener is logged and skipped.
    pub fn notify(&self) {
        for listener in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                error!("Store listener panicked; continuing with remaining listeners");
            }
        }
    }
}

fn same_callback<F: ?Sized>(a: &Arc<F>, b: &Arc<F>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

// A panicking callback runs outside the lock, so poisoning only happens if
// the registry itself panicked mid-update; the data is still a valid Vec.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
